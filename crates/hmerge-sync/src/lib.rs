//! Sync cycle orchestration: probe every supplier feed, ingest the non-empty ones, merge.

mod merge;

pub use merge::{MergeEngine, SourcePriority};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use hmerge_adapters::{adapter_for_source, normalize_feed, FeedAdapter};
use hmerge_storage::{
    AttributeRepository, FeedFetcher, HotelStore, HttpClientConfig, HttpFetcher, SqliteStore,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::fs;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "hmerge-sync";

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    pub enabled: bool,
    pub priority: i32,
    pub url: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SourceRegistry {
    pub async fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Priority table over every listed source, enabled or not, so observations stored while a
    /// source was enabled keep their rank.
    pub fn priorities(&self) -> SourcePriority {
        SourcePriority::new(
            self.sources
                .iter()
                .map(|s| (s.source_id.clone(), s.priority)),
        )
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: String,
    pub sources_file: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://hotels.db".to_string()),
            sources_file: std::env::var("HMERGE_SOURCES_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("sources.yaml")),
            user_agent: std::env::var("HMERGE_USER_AGENT")
                .unwrap_or_else(|_| "hmerge-bot/0.1".to_string()),
            http_timeout_secs: std::env::var("HMERGE_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub probed_sources: usize,
    pub ingested_sources: Vec<String>,
    pub attribute_records: usize,
    pub merged_hotels: usize,
}

struct RegisteredSource {
    config: SourceConfig,
    adapter: Box<dyn FeedAdapter>,
}

pub struct SyncPipeline {
    sources: Vec<RegisteredSource>,
    feeds: Arc<dyn FeedFetcher>,
    attributes: Arc<dyn AttributeRepository>,
    hotels: Arc<dyn HotelStore>,
    merge: MergeEngine,
}

impl SyncPipeline {
    pub fn new(
        registry: SourceRegistry,
        feeds: Arc<dyn FeedFetcher>,
        attributes: Arc<dyn AttributeRepository>,
        hotels: Arc<dyn HotelStore>,
    ) -> Result<Self> {
        let merge = MergeEngine::new(registry.priorities());
        let sources = registry
            .sources
            .into_iter()
            .filter(|s| s.enabled)
            .map(|config| {
                let adapter = adapter_for_source(&config.source_id)
                    .with_context(|| format!("no adapter registered for {}", config.source_id))?;
                Ok(RegisteredSource { config, adapter })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            sources,
            feeds,
            attributes,
            hotels,
            merge,
        })
    }

    /// Runs one cycle. Any failed probe, adapter run or write fails the whole cycle; batches
    /// that were already committed for other sources stay committed.
    pub async fn run_once(&self) -> Result<SyncRunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sync_cycle", %run_id);
        self.run_cycle(run_id).instrument(span).await
    }

    async fn run_cycle(&self, run_id: Uuid) -> Result<SyncRunSummary> {
        let started_at = Utc::now();

        let payloads = self.probe().await?;

        let mut ingestions = Vec::new();
        for (source, records) in &payloads {
            if records.is_empty() {
                warn!(source_id = %source.config.source_id, "feed is empty; adapter skipped");
                continue;
            }
            let span = info_span!("ingest_source", source_id = %source.config.source_id);
            ingestions.push(self.ingest_source(source, records).instrument(span));
        }
        let ingested = try_join_all(ingestions).await?;

        let mut ingested_sources = Vec::with_capacity(ingested.len());
        let mut attribute_records = 0usize;
        let mut hotel_ids = BTreeSet::new();
        for (source_id, ids) in ingested {
            attribute_records += ids.len();
            hotel_ids.extend(ids);
            ingested_sources.push(source_id);
        }
        info!(
            sources = ingested_sources.len(),
            hotels = hotel_ids.len(),
            "ingestion complete"
        );

        let merged_hotels = self
            .merge
            .merge_hotels(&hotel_ids, self.attributes.as_ref(), self.hotels.as_ref())
            .await?;

        Ok(SyncRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            probed_sources: payloads.len(),
            ingested_sources,
            attribute_records,
            merged_hotels,
        })
    }

    async fn probe(&self) -> Result<Vec<(&RegisteredSource, Vec<JsonValue>)>> {
        let probes = self.sources.iter().map(|source| async move {
            let records = self
                .feeds
                .fetch_feed(&source.config.source_id, &source.config.url)
                .await
                .with_context(|| format!("fetching feed {}", source.config.source_id))?;
            info!(source_id = %source.config.source_id, records = records.len(), "feed probed");
            Ok::<_, anyhow::Error>((source, records))
        });
        try_join_all(probes).await
    }

    async fn ingest_source(
        &self,
        source: &RegisteredSource,
        records: &[JsonValue],
    ) -> Result<(String, Vec<String>)> {
        let source_id = &source.config.source_id;
        let batch = normalize_feed(source.adapter.as_ref(), records)
            .with_context(|| format!("normalizing feed {source_id}"))?;
        let written = self
            .attributes
            .append(&batch)
            .await
            .with_context(|| format!("persisting attribute batch for {source_id}"))?;
        info!(records = written, "attribute batch persisted");
        Ok((
            source_id.clone(),
            batch.into_iter().map(|r| r.hotel_id).collect(),
        ))
    }
}

pub async fn open_store(config: &SyncConfig) -> Result<SqliteStore> {
    let store = SqliteStore::connect(&config.database_url)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;
    store.migrate().await.context("applying schema")?;
    Ok(store)
}

pub async fn run_sync_once_from_env() -> Result<SyncRunSummary> {
    let config = SyncConfig::from_env();
    let registry = SourceRegistry::load(&config.sources_file).await?;
    let store = Arc::new(open_store(&config).await?);
    let http = HttpFetcher::new(HttpClientConfig {
        timeout: Duration::from_secs(config.http_timeout_secs),
        user_agent: Some(config.user_agent.clone()),
    })?;
    let pipeline = SyncPipeline::new(registry, Arc::new(http), store.clone(), store)?;
    pipeline.run_once().await
}
