//! Supplier feed HTTP fetch + attribute/hotel persistence for hmerge.

mod sqlite;

pub use sqlite::SqliteStore;

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use hmerge_core::{AttributeRecord, Hotel, NewAttributeRecord};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, info_span, Instrument};

pub const CRATE_NAME: &str = "hmerge-storage";

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            user_agent: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("response from {url} is not a JSON array")]
    NotAnArray { url: String },
}

#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch_feed(&self, source_id: &str, url: &str) -> Result<Vec<JsonValue>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    async fn fetch_feed(&self, source_id: &str, url: &str) -> Result<Vec<JsonValue>, FetchError> {
        let span = info_span!("feed_fetch", source_id, url);
        async move {
            let resp = self.client.get(url).send().await?;
            let status = resp.status();
            let final_url = resp.url().to_string();

            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: final_url,
                });
            }

            match resp.json::<JsonValue>().await? {
                JsonValue::Array(records) => {
                    info!(records = records.len(), "feed fetched");
                    Ok(records)
                }
                _ => Err(FetchError::NotAnArray { url: final_url }),
            }
        }
        .instrument(span)
        .await
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("json column error: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait]
pub trait AttributeRepository: Send + Sync {
    async fn append(&self, records: &[NewAttributeRecord]) -> Result<usize, StoreError>;

    async fn load_by_hotel_id(&self, hotel_id: &str) -> Result<Vec<AttributeRecord>, StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HotelFilter {
    pub ids: Vec<String>,
    pub destination_id: Option<i64>,
}

#[async_trait]
pub trait HotelStore: Send + Sync {
    async fn upsert(&self, hotel: &Hotel) -> Result<(), StoreError>;

    async fn get_hotel(&self, id: &str) -> Result<Option<Hotel>, StoreError>;

    async fn list_hotels(&self, filter: &HotelFilter) -> Result<Vec<Hotel>, StoreError>;
}
