//! Synchronization pipeline.
//!
//! - `periods_to_check`: Resolve which weeks a run must visit
//! - `Synchronizer`: Fetch, upsert and re-index those weeks

pub mod periods;
pub mod sync;

pub use periods::periods_to_check;
pub use sync::{IndexRefresh, SyncReport, Synchronizer};
