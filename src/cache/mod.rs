//! Versioned cache generations and the strategies that serve from them.
//!
//! This module provides:
//! - Named cache generations persisted in SQLite, one key → response map each
//! - A handle that enforces which requests and responses may be stored
//! - Stale-while-revalidate and cache-first serving strategies

mod handle;
mod layer;
mod storage;
mod traits;

pub use handle::CacheHandle;
pub use layer::{CacheLayer, Served};
pub use storage::SqliteStorage;
pub use traits::{CacheResult, CacheSource, CacheStorage, CachedEntry};
