//! copycache - build-time source cache for COPY/ADD instructions
//!
//! Keeps hashed, staged copies of build sources (local paths and remote
//! URLs) in an in-memory LRU backed by per-origin JSON records on disk, and
//! decides per source whether the cached copy can be reused.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod ui;

pub use error::{CacheError, CacheResult};
