// src/lib.rs

//! boagri: incremental synchronization of SDSSA bulletins from the
//! agriculture ministry's official bulletin archive.

pub mod app;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod search;
pub mod services;
pub mod storage;
pub mod utils;

pub use app::App;
