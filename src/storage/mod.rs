//! Durable record storage.
//!
//! Records live in a single SQLite table keyed by title:
//!
//! ```text
//! data/
//! └── sdssa_instructions.db   # table `instructions`, UNIQUE(title)
//! ```

mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Entry, Period, Record, UpsertOutcome};

pub use sqlite::SqliteStore;

/// Trait for record storage backends.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or replace the record keyed by the entry's title.
    ///
    /// Atomic per call. Replacing advances `last_updated` strictly.
    async fn upsert(&self, entry: &Entry) -> Result<UpsertOutcome>;

    /// Lexicographically greatest stored period.
    async fn max_period(&self) -> Result<Option<Period>>;

    /// Every stored record, oldest period first.
    async fn all_records(&self) -> Result<Vec<Record>>;

    async fn get(&self, title: &str) -> Result<Option<Record>>;

    /// Stored records among `titles`; unknown titles are skipped.
    async fn records_by_titles(&self, titles: &[String]) -> Result<Vec<Record>>;

    async fn count(&self) -> Result<u64>;

    /// Rewrite links carrying a doubled host prefix. Returns rows fixed.
    async fn repair_links(&self) -> Result<u64>;
}
