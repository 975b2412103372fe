//! Service layer for the synchronization engine.
//!
//! - Bulletin fetching and extraction (`BulletinCrawler`)

mod bulletins;

use async_trait::async_trait;

use crate::models::Period;

pub use bulletins::{
    BulletinCrawler, DetailFields, ListingEntry, PeriodFetch, parse_detail, parse_listing,
};

/// A source of bulletins, one period at a time.
///
/// Implementations never fail as a whole: a failed listing is reported in
/// the returned [`PeriodFetch`] so the caller can move on to the next period.
#[async_trait]
pub trait BulletinSource: Send + Sync {
    async fn fetch_period(&self, period: Period) -> PeriodFetch;
}
