// src/storage/sqlite.rs

//! SQLite record store.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{QueryBuilder, Row, Sqlite};

use super::RecordStore;
use crate::error::{AppError, Result};
use crate::models::{Entry, Period, Record, UpsertOutcome};
use crate::utils::repair_link;

const RECORD_COLUMNS: &str = "id, title, year, week, source_link, document_link, subject, \
                              summary, content_hash, created_at, last_updated";

/// Titles bound per `IN (...)` lookup.
const LOOKUP_CHUNK: usize = 500;

/// Record store backed by a local SQLite file.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and ensure the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        log::debug!("Opened record store at {}", path.display());
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS instructions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                year INTEGER NOT NULL,
                week INTEGER NOT NULL,
                title TEXT NOT NULL UNIQUE,
                source_link TEXT NOT NULL,
                document_link TEXT NOT NULL,
                subject TEXT NOT NULL,
                summary TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                last_updated INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_instructions_period ON instructions(year, week)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Close the pool, waiting for connections to finish.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn upsert(&self, entry: &Entry) -> Result<UpsertOutcome> {
        let hash = entry.content_hash();
        let now = Utc::now().timestamp_millis();

        let mut tx = self.pool.begin().await?;

        let existing: Option<String> =
            sqlx::query_scalar("SELECT content_hash FROM instructions WHERE title = ?")
                .bind(&entry.title)
                .fetch_optional(&mut *tx)
                .await?;

        let outcome = match existing {
            Some(stored) if stored == hash => return Ok(UpsertOutcome::Unchanged),
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        };

        // last_updated never repeats, even within one millisecond
        sqlx::query(
            r#"
            INSERT INTO instructions
                (year, week, title, source_link, document_link, subject, summary,
                 content_hash, created_at, last_updated)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(title) DO UPDATE SET
                year = excluded.year,
                week = excluded.week,
                source_link = excluded.source_link,
                document_link = excluded.document_link,
                subject = excluded.subject,
                summary = excluded.summary,
                content_hash = excluded.content_hash,
                last_updated = MAX(excluded.last_updated, instructions.last_updated + 1)
            "#,
        )
        .bind(entry.period.year)
        .bind(i64::from(entry.period.week))
        .bind(&entry.title)
        .bind(&entry.source_link)
        .bind(&entry.document_link)
        .bind(&entry.subject)
        .bind(&entry.summary)
        .bind(&hash)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(outcome)
    }

    async fn max_period(&self) -> Result<Option<Period>> {
        let row = sqlx::query(
            "SELECT year, week FROM instructions ORDER BY year DESC, week DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Period {
                year: row.try_get("year")?,
                week: week_from_row(&row)?,
            })),
            None => Ok(None),
        }
    }

    async fn all_records(&self) -> Result<Vec<Record>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM instructions ORDER BY year, week, title"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn get(&self, title: &str) -> Result<Option<Record>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM instructions WHERE title = ?"
        ))
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn records_by_titles(&self, titles: &[String]) -> Result<Vec<Record>> {
        let mut records = Vec::with_capacity(titles.len());

        for chunk in titles.chunks(LOOKUP_CHUNK) {
            let mut query = QueryBuilder::<Sqlite>::new(format!(
                "SELECT {RECORD_COLUMNS} FROM instructions WHERE title IN ("
            ));
            let mut separated = query.separated(", ");
            for title in chunk {
                separated.push_bind(title.as_str());
            }
            separated.push_unseparated(")");

            let rows = query.build().fetch_all(&self.pool).await?;
            for row in &rows {
                records.push(record_from_row(row)?);
            }
        }

        records.sort_by(|a, b| (a.period(), &a.title).cmp(&(b.period(), &b.title)));
        Ok(records)
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM instructions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn repair_links(&self) -> Result<u64> {
        let rows = sqlx::query("SELECT id, source_link, document_link FROM instructions")
            .fetch_all(&self.pool)
            .await?;

        let mut tx = self.pool.begin().await?;
        let mut fixed = 0u64;

        for row in &rows {
            let id: i64 = row.try_get("id")?;
            let source: String = row.try_get("source_link")?;
            let document: String = row.try_get("document_link")?;

            let new_source = repair_link(&source);
            let new_document = repair_link(&document);
            if new_source.is_none() && new_document.is_none() {
                continue;
            }

            sqlx::query("UPDATE instructions SET source_link = ?, document_link = ? WHERE id = ?")
                .bind(new_source.unwrap_or(source))
                .bind(new_document.unwrap_or(document))
                .bind(id)
                .execute(&mut *tx)
                .await?;
            fixed += 1;
        }

        tx.commit().await?;
        Ok(fixed)
    }
}

fn week_from_row(row: &SqliteRow) -> Result<u32> {
    let week: i64 = row.try_get("week")?;
    u32::try_from(week).map_err(|_| AppError::validation(format!("stored week {week} is invalid")))
}

fn timestamp_from_row(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let millis: i64 = row.try_get(column)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| AppError::validation(format!("stored {column} {millis} is out of range")))
}

fn record_from_row(row: &SqliteRow) -> Result<Record> {
    Ok(Record {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        year: row.try_get("year")?,
        week: week_from_row(row)?,
        source_link: row.try_get("source_link")?,
        document_link: row.try_get("document_link")?,
        subject: row.try_get("subject")?,
        summary: row.try_get("summary")?,
        content_hash: row.try_get("content_hash")?,
        created_at: timestamp_from_row(row, "created_at")?,
        last_updated: timestamp_from_row(row, "last_updated")?,
    })
}
