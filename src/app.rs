// src/app.rs

//! Application facade shared by every entry point.

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{Config, Period, Record};
use crate::pipeline::{SyncReport, Synchronizer};
use crate::search::{DisjunctiveQuery, IndexState, IndexSynchronizer, QueryExpander, SearchHit};
use crate::services::{BulletinCrawler, BulletinSource};
use crate::storage::{RecordStore, SqliteStore};

/// Snapshot of the engine's on-disk state.
#[derive(Debug, Clone)]
pub struct Status {
    pub watermark: Option<Period>,
    pub records: u64,
    pub index: IndexState,
    pub lexicon_loaded: bool,
}

/// Store, index, expander and synchronizer opened from one [`Config`].
pub struct App {
    config: Arc<Config>,
    store: Arc<dyn RecordStore>,
    index: Arc<IndexSynchronizer>,
    expander: QueryExpander,
    synchronizer: Synchronizer,
}

impl App {
    /// Open the engine against the live bulletin archive.
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let source = Arc::new(BulletinCrawler::new(Arc::clone(&config))?);
        Self::assemble(config, source).await
    }

    /// Open the engine with another bulletin source.
    pub async fn with_source(config: Config, source: Arc<dyn BulletinSource>) -> Result<Self> {
        config.validate()?;
        Self::assemble(Arc::new(config), source).await
    }

    async fn assemble(config: Arc<Config>, source: Arc<dyn BulletinSource>) -> Result<Self> {
        let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open(&config.paths.database).await?);
        let index = Arc::new(IndexSynchronizer::new(
            config.paths.index_dir.clone(),
            &config.index,
        ));
        let expander = QueryExpander::from_path(&config.paths.lexicon, config.index.min_token_length);
        let synchronizer = Synchronizer::new(
            Arc::clone(&config),
            source,
            Arc::clone(&store),
            Arc::clone(&index),
        );

        Ok(Self {
            config,
            store,
            index,
            expander,
            synchronizer,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetch every missing week through the current one.
    pub async fn sync(&self) -> Result<SyncReport> {
        self.synchronizer.sync().await
    }

    pub async fn sync_until(&self, current: Period) -> Result<SyncReport> {
        self.synchronizer.sync_until(current).await
    }

    /// Re-check the given weeks, e.g. ones reported as failed.
    pub async fn sync_periods(&self, periods: &[Period]) -> Result<SyncReport> {
        self.synchronizer.sync_periods(periods).await
    }

    pub fn expand(&self, query: &str) -> DisjunctiveQuery {
        self.expander.build_query(query)
    }

    /// Expanded full-text search. A corrupt index is rebuilt once.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let query = self.expand(query);
        if query.is_empty() {
            return Ok(Vec::new());
        }
        log::debug!("Expanded query: {}", query);

        match self.index.search(&query, limit).await {
            Err(AppError::IndexCorrupt(reason)) => {
                log::warn!("Index unusable ({}), rebuilding before search", reason);
                self.rebuild_index().await?;
                self.index.search(&query, limit).await
            }
            result => result,
        }
    }

    pub async fn all_records(&self) -> Result<Vec<Record>> {
        self.store.all_records().await
    }

    pub async fn rebuild_index(&self) -> Result<usize> {
        self.synchronizer.rebuild_index().await
    }

    pub async fn repair_links(&self) -> Result<u64> {
        let fixed = self.store.repair_links().await?;
        log::info!("Repaired links on {} record(s)", fixed);
        Ok(fixed)
    }

    pub async fn status(&self) -> Result<Status> {
        Ok(Status {
            watermark: self.store.max_period().await?,
            records: self.store.count().await?,
            index: self.index.state().await,
            lexicon_loaded: !self.expander.is_degraded(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::models::Entry;
    use crate::services::PeriodFetch;

    const LEXICON: &str = r#"{
        "lemmas": {"hygiènes": "hygiène"},
        "synsets": [["hygiène", "salubrité", "propreté"]]
    }"#;

    /// Publishes a fixed set of entries in week 2019-W01.
    struct StaticSource(Vec<Entry>);

    #[async_trait]
    impl BulletinSource for StaticSource {
        async fn fetch_period(&self, period: Period) -> PeriodFetch {
            let entries = self
                .0
                .iter()
                .filter(|e| e.period == period)
                .cloned()
                .collect();
            PeriodFetch {
                period,
                entries,
                listing_error: None,
                degraded: 0,
            }
        }
    }

    fn entry(title: &str, subject: &str) -> Entry {
        Entry {
            period: Period::new(2019, 1).unwrap(),
            title: title.to_string(),
            source_link: format!("https://example.com/{title}/detail"),
            document_link: format!("https://example.com/{title}/telechargement"),
            subject: subject.to_string(),
            summary: "Instruction technique".to_string(),
        }
    }

    async fn open_app(dir: &TempDir, with_lexicon: bool) -> App {
        if with_lexicon {
            std::fs::create_dir_all(dir.path().join("data")).unwrap();
            std::fs::write(dir.path().join("data").join("lexicon.json"), LEXICON).unwrap();
        }
        let config = Config::default().rooted_at(dir.path());
        let source = Arc::new(StaticSource(vec![
            entry("SDSSA-1", "Hygiène des abattoirs"),
            entry("SDSSA-2", "Salubrité des locaux"),
            entry("SDSSA-3", "Propreté des ateliers de découpe"),
            entry("SDSSA-4", "Bien-être animal au transport"),
        ]));
        App::with_source(config, source).await.unwrap()
    }

    fn titles(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_search_includes_synonyms() {
        let dir = TempDir::new().unwrap();
        let app = open_app(&dir, true).await;
        app.sync_until(Period::new(2019, 1).unwrap()).await.unwrap();

        let hits = app.search("hygiène", 10).await.unwrap();
        assert_eq!(titles(&hits), vec!["SDSSA-1", "SDSSA-2", "SDSSA-3"]);
    }

    #[tokio::test]
    async fn test_search_without_lexicon_is_literal() {
        let dir = TempDir::new().unwrap();
        let app = open_app(&dir, false).await;
        app.sync_until(Period::new(2019, 1).unwrap()).await.unwrap();

        let status = app.status().await.unwrap();
        assert!(!status.lexicon_loaded);

        let hits = app.search("Hygiène", 10).await.unwrap();
        assert_eq!(titles(&hits), vec!["SDSSA-1"]);
    }

    #[tokio::test]
    async fn test_search_recovers_from_corrupt_index() {
        let dir = TempDir::new().unwrap();
        let app = open_app(&dir, false).await;
        app.sync_until(Period::new(2019, 1).unwrap()).await.unwrap();

        let index_file = app.config().paths.index_dir.join(crate::search::INDEX_FILE);
        std::fs::write(&index_file, "garbage").unwrap();

        let hits = app.search("abattoirs", 10).await.unwrap();
        assert_eq!(titles(&hits), vec!["SDSSA-1"]);
    }

    #[tokio::test]
    async fn test_status_and_records() {
        let dir = TempDir::new().unwrap();
        let app = open_app(&dir, true).await;

        let status = app.status().await.unwrap();
        assert_eq!(status.records, 0);
        assert_eq!(status.watermark, None);
        assert_eq!(status.index, IndexState::Absent);

        app.sync_until(Period::new(2019, 1).unwrap()).await.unwrap();
        let status = app.status().await.unwrap();
        assert_eq!(status.records, 4);
        assert_eq!(status.watermark, Some(Period::new(2019, 1).unwrap()));
        assert_eq!(status.index, IndexState::Open { documents: 4 });
        assert_eq!(app.all_records().await.unwrap().len(), 4);
        assert_eq!(app.repair_links().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default().rooted_at(dir.path());
        config.crawler.max_concurrent = 0;
        let source = Arc::new(StaticSource(Vec::new()));
        assert!(App::with_source(config, source).await.is_err());
    }
}
