// src/search/index.rs

//! On-disk full-text index projected from the record store.
//!
//! The index directory holds a single JSON document plus a lock file while a
//! writer is active:
//!
//! ```text
//! indexdir/
//! ├── index.json   # documents by title, postings term -> titles
//! ├── stale        # store changed since the last successful refresh
//! └── write.lock   # owner pid and host, present only during a write session
//! ```
//!
//! A lock whose owner process no longer exists on this host is broken by the
//! next writer.
//!
//! The index is a pure projection: it can always be rebuilt from
//! [`RecordStore::all_records`](crate::storage::RecordStore::all_records).

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use super::analyzer::Analyzer;
use super::expand::DisjunctiveQuery;
use crate::error::{AppError, Result};
use crate::models::{IndexConfig, Record};

pub const INDEX_FILE: &str = "index.json";
pub const LOCK_FILE: &str = "write.lock";
pub const STALE_FILE: &str = "stale";

/// Bumped whenever analysis or layout changes; older files get rebuilt.
const FORMAT_VERSION: u32 = 1;

const LOCK_POLL: Duration = Duration::from_millis(50);

/// Searchable projection of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub title: String,
    pub subject: String,
    pub summary: String,
    pub content: String,
}

impl From<&Record> for IndexDocument {
    fn from(record: &Record) -> Self {
        Self {
            title: record.title.clone(),
            subject: record.subject.clone(),
            summary: record.summary.clone(),
            content: record.content(),
        }
    }
}

/// A search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub subject: String,
    pub summary: String,
    /// Number of query terms the document matched
    pub score: usize,
}

/// What is on disk in the index directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexState {
    Absent,
    Open { documents: usize },
    Corrupt(String),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexData {
    version: u32,
    documents: BTreeMap<String, IndexDocument>,
    postings: BTreeMap<String, BTreeSet<String>>,
}

impl IndexData {
    fn new() -> Self {
        Self {
            version: FORMAT_VERSION,
            ..Self::default()
        }
    }

    fn upsert(&mut self, document: IndexDocument, analyzer: &Analyzer) {
        self.remove(&document.title);
        for term in analyzer.analyze(&document.content) {
            self.postings
                .entry(term)
                .or_default()
                .insert(document.title.clone());
        }
        self.documents.insert(document.title.clone(), document);
    }

    fn remove(&mut self, title: &str) {
        if self.documents.remove(title).is_none() {
            return;
        }
        self.postings.retain(|_, titles| {
            titles.remove(title);
            !titles.is_empty()
        });
    }

    /// Titles containing every index term of `term`.
    fn matching(&self, terms: &[String]) -> BTreeSet<String> {
        let mut sets = terms.iter().map(|t| self.postings.get(t));
        let Some(Some(first)) = sets.next() else {
            return BTreeSet::new();
        };

        let mut titles = first.clone();
        for set in sets {
            match set {
                Some(set) => titles.retain(|t| set.contains(t)),
                None => return BTreeSet::new(),
            }
        }
        titles
    }
}

/// Exclusive write session on the index directory.
///
/// The lock file is removed when this guard is dropped.
#[derive(Debug)]
pub struct WriteLock {
    path: PathBuf,
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("Failed to release index lock {}: {}", self.path.display(), e);
        }
    }
}

/// Keeps the on-disk index consistent with the store.
pub struct IndexSynchronizer {
    dir: PathBuf,
    analyzer: Analyzer,
    lock_timeout: Duration,
}

impl IndexSynchronizer {
    pub fn new(dir: impl Into<PathBuf>, config: &IndexConfig) -> Self {
        Self {
            dir: dir.into(),
            analyzer: Analyzer::new(config.min_token_length),
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub fn exists(&self) -> bool {
        self.index_path().is_file()
    }

    /// Inspect the index without modifying it.
    pub async fn state(&self) -> IndexState {
        match self.load().await {
            Ok(None) => IndexState::Absent,
            Ok(Some(data)) => IndexState::Open {
                documents: data.documents.len(),
            },
            Err(e) => IndexState::Corrupt(e.to_string()),
        }
    }

    /// Acquire the exclusive write lock, waiting at most the configured time.
    ///
    /// A lock left behind by a dead process is removed and retaken.
    pub async fn lock(&self) -> Result<WriteLock> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(LOCK_FILE);
        let started = Instant::now();

        loop {
            let attempt = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;

            match attempt {
                Ok(mut file) => {
                    let lock = WriteLock { path };
                    file.write_all(LockOwner::current().to_string().as_bytes())
                        .await?;
                    file.flush().await?;
                    return Ok(lock);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if let Some(owner) = orphaned_lock(&path).await {
                        log::warn!(
                            "Breaking index lock {} left by dead process {}",
                            path.display(),
                            owner.pid
                        );
                        match tokio::fs::remove_file(&path).await {
                            Ok(()) => continue,
                            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                            Err(e) => return Err(e.into()),
                        }
                    }

                    let waited = started.elapsed();
                    if waited >= self.lock_timeout {
                        return Err(AppError::IndexBusy {
                            path: path.display().to_string(),
                            waited_ms: waited.as_millis() as u64,
                        });
                    }
                    tokio::time::sleep(LOCK_POLL.min(self.lock_timeout - waited)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Whether stored records may be missing from the index.
    pub fn is_stale(&self) -> bool {
        self.dir.join(STALE_FILE).is_file()
    }

    /// Record that the store is about to change ahead of the index.
    ///
    /// The marker survives failed refreshes and is cleared by the next
    /// successful [`rebuild`](Self::rebuild) or
    /// [`sync_incremental`](Self::sync_incremental).
    pub async fn mark_stale(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(STALE_FILE), b"").await?;
        Ok(())
    }

    /// Drop the marker without refreshing, for runs that wrote nothing.
    pub async fn clear_stale(&self) -> Result<()> {
        match tokio::fs::remove_file(self.dir.join(STALE_FILE)).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Replace the index with one built from `records`.
    ///
    /// Returns the number of indexed documents.
    pub async fn rebuild(&self, records: &[Record]) -> Result<usize> {
        let _lock = self.lock().await?;

        let mut data = IndexData::new();
        for record in records {
            data.upsert(IndexDocument::from(record), &self.analyzer);
        }

        self.store(&data).await?;
        self.clear_stale().await?;
        log::info!(
            "Rebuilt index with {} documents, {} terms",
            data.documents.len(),
            data.postings.len()
        );
        Ok(data.documents.len())
    }

    /// Add or refresh only the given records.
    ///
    /// Fails with [`AppError::IndexCorrupt`] when there is no usable index to
    /// update; callers recover with [`rebuild`](Self::rebuild).
    pub async fn sync_incremental(&self, changed: &[Record]) -> Result<usize> {
        let _lock = self.lock().await?;

        let mut data = self
            .load()
            .await?
            .ok_or_else(|| AppError::IndexCorrupt(format!("{} is missing", INDEX_FILE)))?;

        for record in changed {
            data.upsert(IndexDocument::from(record), &self.analyzer);
        }

        self.store(&data).await?;
        self.clear_stale().await?;
        log::info!("Updated {} index documents", changed.len());
        Ok(changed.len())
    }

    /// Evaluate a disjunctive query; an absent index yields no hits.
    pub async fn search(&self, query: &DisjunctiveQuery, limit: usize) -> Result<Vec<SearchHit>> {
        let Some(data) = self.load().await? else {
            return Ok(Vec::new());
        };

        let mut scores: BTreeMap<&str, usize> = BTreeMap::new();
        for term in &query.terms {
            let analyzed = self.analyzer.analyze(term);
            if analyzed.is_empty() {
                continue;
            }
            for title in data.matching(&analyzed) {
                if let Some((key, _)) = data.documents.get_key_value(&title) {
                    *scores.entry(key.as_str()).or_insert(0) += 1;
                }
            }
        }

        let mut ranked: Vec<(&str, usize)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        Ok(ranked
            .into_iter()
            .take(limit)
            .filter_map(|(title, score)| {
                data.documents.get(title).map(|doc| SearchHit {
                    title: doc.title.clone(),
                    subject: doc.subject.clone(),
                    summary: doc.summary.clone(),
                    score,
                })
            })
            .collect())
    }

    async fn load(&self) -> Result<Option<IndexData>> {
        let path = self.index_path();
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let data: IndexData = serde_json::from_str(&raw)
            .map_err(|e| AppError::IndexCorrupt(format!("{}: {}", path.display(), e)))?;

        if data.version != FORMAT_VERSION {
            return Err(AppError::IndexCorrupt(format!(
                "{}: format version {} (expected {})",
                path.display(),
                data.version,
                FORMAT_VERSION
            )));
        }

        Ok(Some(data))
    }

    /// Write through a temp file so readers never see a partial index.
    async fn store(&self, data: &IndexData) -> Result<()> {
        let json = serde_json::to_string(data)?;
        let tmp = self.dir.join(format!("{INDEX_FILE}.tmp"));
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, self.index_path()).await?;
        Ok(())
    }
}

/// Process holding a write lock, as recorded in the lock file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LockOwner {
    pid: u32,
    host: String,
}

impl LockOwner {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            host: hostname(),
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        let mut lines = raw.lines();
        let pid = lines.next()?.trim().parse().ok()?;
        let host = lines.next().unwrap_or("").trim().to_string();
        Some(Self { pid, host })
    }
}

impl std::fmt::Display for LockOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.pid)?;
        writeln!(f, "{}", self.host)
    }
}

/// The recorded owner, when it is a process of this host that has exited.
///
/// Locks from other hosts, unreadable locks and locks of live processes are
/// left alone.
async fn orphaned_lock(path: &Path) -> Option<LockOwner> {
    let raw = tokio::fs::read_to_string(path).await.ok()?;
    let owner = LockOwner::parse(&raw)?;
    (owner.host == hostname() && !process_alive(owner.pid)).then_some(owner)
}

#[cfg(target_os = "linux")]
fn hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|h| h.trim().to_string())
        .unwrap_or_default()
}

#[cfg(not(target_os = "linux"))]
fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_default()
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

// No portable liveness check: assume the owner is still running.
#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(title: &str, subject: &str, summary: &str) -> Record {
        let now = Utc::now();
        Record {
            id: 0,
            title: title.to_string(),
            year: 2023,
            week: 1,
            source_link: String::new(),
            document_link: String::new(),
            subject: subject.to_string(),
            summary: summary.to_string(),
            content_hash: String::new(),
            created_at: now,
            last_updated: now,
        }
    }

    fn query(terms: &[&str]) -> DisjunctiveQuery {
        DisjunctiveQuery {
            terms: terms.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn synchronizer(dir: &TempDir) -> IndexSynchronizer {
        IndexSynchronizer::new(
            dir.path().join("indexdir"),
            &IndexConfig {
                lock_timeout_ms: 200,
                ..IndexConfig::default()
            },
        )
    }

    fn titles(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_rebuild_then_search() {
        let dir = TempDir::new().unwrap();
        let index = synchronizer(&dir);
        assert_eq!(index.state().await, IndexState::Absent);

        let records = vec![
            record("SDSSA-1", "Hygiène des abattoirs", "Contrôles"),
            record("SDSSA-2", "Lait cru", "Fromages au lait cru"),
        ];
        assert_eq!(index.rebuild(&records).await.unwrap(), 2);
        assert_eq!(index.state().await, IndexState::Open { documents: 2 });

        let hits = index.search(&query(&["abattoir"]), 10).await.unwrap();
        assert_eq!(titles(&hits), vec!["SDSSA-1"]);
        assert!(!dir.path().join("indexdir").join(LOCK_FILE).exists());
    }

    #[tokio::test]
    async fn test_rebuild_drops_stale_documents() {
        let dir = TempDir::new().unwrap();
        let index = synchronizer(&dir);

        index
            .rebuild(&[record("old", "abattoir", "")])
            .await
            .unwrap();
        index.rebuild(&[record("new", "lait", "")]).await.unwrap();

        assert!(index.search(&query(&["abattoir"]), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_incremental_updates_document() {
        let dir = TempDir::new().unwrap();
        let index = synchronizer(&dir);

        index
            .rebuild(&[record("a", "abattoir", ""), record("b", "lait", "")])
            .await
            .unwrap();
        index
            .sync_incremental(&[record("a", "volailles", ""), record("c", "abattoir", "")])
            .await
            .unwrap();

        let hits = index.search(&query(&["abattoir"]), 10).await.unwrap();
        assert_eq!(titles(&hits), vec!["c"]);
        let hits = index.search(&query(&["volailles"]), 10).await.unwrap();
        assert_eq!(titles(&hits), vec!["a"]);
        assert_eq!(index.state().await, IndexState::Open { documents: 3 });
    }

    #[tokio::test]
    async fn test_incremental_without_index_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let index = synchronizer(&dir);

        let err = index.sync_incremental(&[record("a", "x", "")]).await.unwrap_err();
        assert!(matches!(err, AppError::IndexCorrupt(_)));
    }

    #[tokio::test]
    async fn test_unreadable_index_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let index = synchronizer(&dir);
        std::fs::create_dir_all(index.dir()).unwrap();
        std::fs::write(index.dir().join(INDEX_FILE), "{not json").unwrap();

        assert!(matches!(index.state().await, IndexState::Corrupt(_)));
        let err = index.search(&query(&["x"]), 10).await.unwrap_err();
        assert!(matches!(err, AppError::IndexCorrupt(_)));

        index.rebuild(&[record("a", "abattoir", "")]).await.unwrap();
        assert_eq!(index.state().await, IndexState::Open { documents: 1 });
    }

    #[tokio::test]
    async fn test_lock_contention_fails_fast() {
        let dir = TempDir::new().unwrap();
        let index = synchronizer(&dir);

        let held = index.lock().await.unwrap();
        let started = Instant::now();
        let err = index.rebuild(&[]).await.unwrap_err();
        assert!(matches!(err, AppError::IndexBusy { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));

        drop(held);
        assert!(index.rebuild(&[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_lock_records_owner() {
        let dir = TempDir::new().unwrap();
        let index = synchronizer(&dir);

        let _held = index.lock().await.unwrap();
        let raw = std::fs::read_to_string(index.dir().join(LOCK_FILE)).unwrap();
        assert_eq!(LockOwner::parse(&raw), Some(LockOwner::current()));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_lock_of_dead_process_is_broken() {
        let dir = TempDir::new().unwrap();
        let index = synchronizer(&dir);
        std::fs::create_dir_all(index.dir()).unwrap();

        // Left behind by a writer that was killed mid-session.
        let orphan = LockOwner {
            pid: u32::MAX,
            host: hostname(),
        };
        std::fs::write(index.dir().join(LOCK_FILE), orphan.to_string()).unwrap();

        assert_eq!(index.rebuild(&[record("a", "abattoir", "")]).await.unwrap(), 1);
        assert!(!index.dir().join(LOCK_FILE).exists());
    }

    #[tokio::test]
    async fn test_lock_of_other_host_is_kept() {
        let dir = TempDir::new().unwrap();
        let index = synchronizer(&dir);
        std::fs::create_dir_all(index.dir()).unwrap();

        let remote = LockOwner {
            pid: u32::MAX,
            host: format!("{}-elsewhere", hostname()),
        };
        std::fs::write(index.dir().join(LOCK_FILE), remote.to_string()).unwrap();

        let err = index.rebuild(&[]).await.unwrap_err();
        assert!(matches!(err, AppError::IndexBusy { .. }));
    }

    #[tokio::test]
    async fn test_stale_marker_cleared_by_refresh() {
        let dir = TempDir::new().unwrap();
        let index = synchronizer(&dir);
        assert!(!index.is_stale());

        index.mark_stale().await.unwrap();
        assert!(index.is_stale());
        index.rebuild(&[record("a", "abattoir", "")]).await.unwrap();
        assert!(!index.is_stale());

        index.mark_stale().await.unwrap();
        let held = index.lock().await.unwrap();
        assert!(index.sync_incremental(&[record("b", "lait", "")]).await.is_err());
        assert!(index.is_stale());

        drop(held);
        index.sync_incremental(&[record("b", "lait", "")]).await.unwrap();
        assert!(!index.is_stale());
    }

    #[tokio::test]
    async fn test_search_ranks_by_matched_terms() {
        let dir = TempDir::new().unwrap();
        let index = synchronizer(&dir);
        index
            .rebuild(&[
                record("b", "hygiène", ""),
                record("a", "salubrité", ""),
                record("c", "hygiène et salubrité", ""),
            ])
            .await
            .unwrap();

        let hits = index
            .search(&query(&["hygiène", "salubrité"]), 10)
            .await
            .unwrap();
        assert_eq!(titles(&hits), vec!["c", "a", "b"]);
        assert_eq!(hits[0].score, 2);

        let hits = index
            .search(&query(&["hygiène", "salubrité"]), 1)
            .await
            .unwrap();
        assert_eq!(titles(&hits), vec!["c"]);
    }

    #[tokio::test]
    async fn test_multi_word_term_needs_every_word() {
        let dir = TempDir::new().unwrap();
        let index = synchronizer(&dir);
        index
            .rebuild(&[
                record("a", "sécurité sanitaire", ""),
                record("b", "sécurité incendie", ""),
            ])
            .await
            .unwrap();

        let hits = index
            .search(&query(&["sécurité sanitaire"]), 10)
            .await
            .unwrap();
        assert_eq!(titles(&hits), vec!["a"]);
    }
}
