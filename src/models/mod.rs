// src/models/mod.rs

//! Domain models for the synchronization engine.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod period;
mod record;

// Re-export all public types
pub use config::{
    Config, CrawlerConfig, IndexConfig, IndexMode, PathsConfig, SourceConfig, SyncConfig,
};
pub use period::{Period, weeks_in_year};
pub use record::{Entry, Record, UpsertOutcome};
