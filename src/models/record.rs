//! Bulletin data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::Period;

/// A bulletin extracted from the source, not yet stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entry {
    /// Period whose listing referenced this bulletin
    pub period: Period,

    /// Bulletin title, the natural key
    pub title: String,

    /// Absolute URL of the detail page
    pub source_link: String,

    /// Absolute URL of the downloadable document
    pub document_link: String,

    /// "Objet" field, or the sentinel
    pub subject: String,

    /// "Résumé" field, or the sentinel
    pub summary: String,
}

impl Entry {
    /// Fingerprint of every non-key field.
    ///
    /// Two entries with the same title and hash carry the same content.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for field in [
            self.period.year.to_string(),
            self.period.week.to_string(),
            self.source_link.clone(),
            self.document_link.clone(),
            self.subject.clone(),
            self.summary.clone(),
        ] {
            hasher.update(field.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }
}

/// A bulletin as persisted in the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    /// Surrogate key
    pub id: i64,
    pub title: String,
    pub year: i32,
    pub week: u32,
    pub source_link: String,
    pub document_link: String,
    pub subject: String,
    pub summary: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Record {
    pub fn period(&self) -> Period {
        Period {
            year: self.year,
            week: self.week,
        }
    }

    /// Text indexed for full-text search.
    pub fn content(&self) -> String {
        format!("{}\n{}\n{}", self.title, self.subject, self.summary)
    }

    /// Format record for display using a template.
    ///
    /// Supported placeholders:
    /// - `{title}`, `{period}`, `{subject}`, `{summary}`
    /// - `{link}`, `{document}`
    pub fn format(&self, template: &str) -> String {
        template
            .replace("{title}", &self.title)
            .replace("{period}", &self.period().to_string())
            .replace("{subject}", &self.subject)
            .replace("{summary}", &self.summary)
            .replace("{link}", &self.source_link)
            .replace("{document}", &self.document_link)
    }
}

/// What an upsert did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> Entry {
        Entry {
            period: Period { year: 2023, week: 1 },
            title: "Instruction technique DGAL/SDSSA/2023-01".to_string(),
            source_link: "https://example.com/detail/1".to_string(),
            document_link: "https://example.com/telechargement/1".to_string(),
            subject: "Hygiène des abattoirs".to_string(),
            summary: "Mise à jour des contrôles".to_string(),
        }
    }

    #[test]
    fn test_content_hash_tracks_fields() {
        let entry = sample_entry();
        let mut changed = entry.clone();
        changed.summary = "Nouvelle version".to_string();

        assert_eq!(entry.content_hash(), sample_entry().content_hash());
        assert_ne!(entry.content_hash(), changed.content_hash());
    }

    #[test]
    fn test_content_hash_field_boundaries() {
        let mut a = sample_entry();
        a.subject = "ab".into();
        a.summary = "c".into();
        let mut b = sample_entry();
        b.subject = "a".into();
        b.summary = "bc".into();
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_format() {
        let now = Utc::now();
        let entry = sample_entry();
        let record = Record {
            id: 1,
            title: entry.title.clone(),
            year: 2023,
            week: 1,
            source_link: entry.source_link.clone(),
            document_link: entry.document_link.clone(),
            subject: entry.subject.clone(),
            summary: entry.summary.clone(),
            content_hash: entry.content_hash(),
            created_at: now,
            last_updated: now,
        };
        assert_eq!(
            record.format("[{period}] {subject}"),
            "[2023-W01] Hygiène des abattoirs"
        );
    }
}
