//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::net::{RequestKey, Response};

/// A stored response and when it was written.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  pub response: Response,
  pub stored_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
///
/// A backend holds any number of named generations, each an independent
/// key → response mapping. Writes to the same key replace the entry whole.
pub trait CacheStorage: Send + Sync + 'static {
  /// Create the generation if it does not exist.
  fn open_generation(&self, name: &str) -> Result<()>;

  fn has_generation(&self, name: &str) -> Result<bool>;

  /// Names of every stored generation, regardless of owner.
  fn generation_names(&self) -> Result<Vec<String>>;

  /// Delete a generation and all its entries. Returns false if it did not exist.
  fn delete_generation(&self, name: &str) -> Result<bool>;

  fn match_entry(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedEntry>>;

  /// Store one entry, creating the generation if needed.
  fn put_entry(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<()>;

  /// Store all entries or none of them.
  fn put_entries(&self, generation: &str, entries: &[(RequestKey, Response)]) -> Result<()>;

  /// Keys stored in a generation, in insertion order.
  fn entry_keys(&self, generation: &str) -> Result<Vec<RequestKey>>;

  /// Generation recorded as active for a scope.
  fn active_generation(&self, scope: &str) -> Result<Option<String>>;

  fn set_active_generation(&self, scope: &str, generation: &str) -> Result<()>;
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  pub fn is_from_cache(&self) -> bool {
    self.source == CacheSource::Cache
  }
}

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fetched from the network for this request
  Network,
  /// Served from the current cache generation
  Cache,
}

impl std::fmt::Display for CacheSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      CacheSource::Network => write!(f, "network"),
      CacheSource::Cache => write!(f, "cache"),
    }
  }
}
