//! SQLite-backed attribute repository and canonical hotel store.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmerge_core::{AttributeRecord, Hotel, NewAttributeRecord};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use tracing::debug;

use crate::{AttributeRepository, HotelFilter, HotelStore, StoreError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS hotel_attributes (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        hotel_id TEXT NOT NULL CHECK (hotel_id <> ''),
        source TEXT NOT NULL,
        ingested_at TEXT NOT NULL,
        attributes TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_hotel_attributes_hotel_id ON hotel_attributes(hotel_id)",
    r#"
    CREATE TABLE IF NOT EXISTS hotels (
        id TEXT PRIMARY KEY,
        destination_id INTEGER,
        name TEXT,
        description TEXT,
        location TEXT NOT NULL,
        amenities TEXT NOT NULL,
        images TEXT NOT NULL,
        booking_conditions TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_hotels_destination_id ON hotels(destination_id)",
];

const HOTEL_COLUMNS: &str =
    "id, destination_id, name, description, location, amenities, images, booking_conditions";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Private in-memory database with the schema already applied. A single pinned connection
    /// keeps the database alive for the lifetime of the store.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(Debug, FromRow)]
struct AttributeRow {
    seq: i64,
    hotel_id: String,
    source: String,
    ingested_at: DateTime<Utc>,
    attributes: String,
}

impl AttributeRow {
    fn into_record(self) -> Result<AttributeRecord, StoreError> {
        Ok(AttributeRecord {
            seq: self.seq,
            hotel_id: self.hotel_id,
            source: self.source,
            ingested_at: self.ingested_at,
            attributes: serde_json::from_str(&self.attributes)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct HotelRow {
    id: String,
    destination_id: Option<i64>,
    name: Option<String>,
    description: Option<String>,
    location: String,
    amenities: String,
    images: String,
    booking_conditions: String,
}

impl HotelRow {
    fn into_hotel(self) -> Result<Hotel, StoreError> {
        Ok(Hotel {
            id: self.id,
            destination_id: self.destination_id,
            name: self.name,
            description: self.description,
            location: serde_json::from_str(&self.location)?,
            amenities: serde_json::from_str(&self.amenities)?,
            images: serde_json::from_str(&self.images)?,
            booking_conditions: serde_json::from_str(&self.booking_conditions)?,
        })
    }
}

#[async_trait]
impl AttributeRepository for SqliteStore {
    async fn append(&self, records: &[NewAttributeRecord]) -> Result<usize, StoreError> {
        let ingested_at = Utc::now();
        let mut tx = self.pool.begin().await?;
        for record in records {
            let attributes = serde_json::to_string(&record.attributes)?;
            sqlx::query(
                "INSERT INTO hotel_attributes (hotel_id, source, ingested_at, attributes) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&record.hotel_id)
            .bind(&record.source)
            .bind(ingested_at)
            .bind(attributes)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!(records = records.len(), "attribute batch committed");
        Ok(records.len())
    }

    async fn load_by_hotel_id(&self, hotel_id: &str) -> Result<Vec<AttributeRecord>, StoreError> {
        let rows = sqlx::query_as::<_, AttributeRow>(
            "SELECT seq, hotel_id, source, ingested_at, attributes \
             FROM hotel_attributes WHERE hotel_id = ? ORDER BY seq",
        )
        .bind(hotel_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AttributeRow::into_record).collect()
    }
}

#[async_trait]
impl HotelStore for SqliteStore {
    async fn upsert(&self, hotel: &Hotel) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO hotels (id, destination_id, name, description, location, amenities, \
             images, booking_conditions) VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
             destination_id = excluded.destination_id, \
             name = excluded.name, \
             description = excluded.description, \
             location = excluded.location, \
             amenities = excluded.amenities, \
             images = excluded.images, \
             booking_conditions = excluded.booking_conditions",
        )
        .bind(&hotel.id)
        .bind(hotel.destination_id)
        .bind(&hotel.name)
        .bind(&hotel.description)
        .bind(serde_json::to_string(&hotel.location)?)
        .bind(serde_json::to_string(&hotel.amenities)?)
        .bind(serde_json::to_string(&hotel.images)?)
        .bind(serde_json::to_string(&hotel.booking_conditions)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_hotel(&self, id: &str) -> Result<Option<Hotel>, StoreError> {
        let row = sqlx::query_as::<_, HotelRow>(&format!(
            "SELECT {HOTEL_COLUMNS} FROM hotels WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(HotelRow::into_hotel).transpose()
    }

    async fn list_hotels(&self, filter: &HotelFilter) -> Result<Vec<Hotel>, StoreError> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {HOTEL_COLUMNS} FROM hotels"));
        let mut has_where = false;

        if !filter.ids.is_empty() {
            qb.push(" WHERE id IN (");
            let mut ids = qb.separated(", ");
            for id in &filter.ids {
                ids.push_bind(id.clone());
            }
            ids.push_unseparated(")");
            has_where = true;
        }
        if let Some(destination_id) = filter.destination_id {
            qb.push(if has_where { " AND " } else { " WHERE " });
            qb.push("destination_id = ").push_bind(destination_id);
        }
        qb.push(" ORDER BY id");

        let rows = qb.build_query_as::<HotelRow>().fetch_all(&self.pool).await?;
        rows.into_iter().map(HotelRow::into_hotel).collect()
    }
}
