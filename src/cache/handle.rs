//! Handle to a single named cache generation.

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::sync::Arc;

use super::traits::{CacheStorage, CachedEntry};
use crate::net::{Request, RequestKey, Response};

/// Thin wrapper over one generation of a [`CacheStorage`].
///
/// Enforces the entry invariants: only GET requests are keys, and only
/// status-200 or opaque responses are stored.
pub struct CacheHandle<S: CacheStorage> {
  storage: Arc<S>,
  name: String,
}

impl<S: CacheStorage> CacheHandle<S> {
  /// Handle to `name` without touching storage. The generation is created on first write.
  pub fn new(storage: Arc<S>, name: impl Into<String>) -> Self {
    Self {
      storage,
      name: name.into(),
    }
  }

  /// Open the generation, creating it if absent.
  pub fn open(storage: Arc<S>, name: impl Into<String>) -> Result<Self> {
    let handle = Self::new(storage, name);
    handle.storage.open_generation(&handle.name)?;
    Ok(handle)
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn match_request(&self, request: &Request) -> Result<Option<CachedEntry>> {
    if request.method != Method::GET {
      return Ok(None);
    }
    self.storage.match_entry(&self.name, &request.cache_key())
  }

  /// Store a copy of `response` for `request`, replacing any previous entry.
  pub fn put(&self, request: &Request, response: &Response) -> Result<()> {
    let key = storage_check(request, response)?;
    self.storage.put_entry(&self.name, &key, response)
  }

  /// Store every pair, or none if any pair is rejected or the write fails.
  pub fn put_all(&self, entries: &[(Request, Response)]) -> Result<()> {
    let entries = entries
      .iter()
      .map(|(request, response)| Ok((storage_check(request, response)?, response.clone())))
      .collect::<Result<Vec<(RequestKey, Response)>>>()?;

    self.storage.put_entries(&self.name, &entries)
  }

  pub fn keys(&self) -> Result<Vec<RequestKey>> {
    self.storage.entry_keys(&self.name)
  }
}

/// Key for `request` if the pair may be stored.
fn storage_check(request: &Request, response: &Response) -> Result<RequestKey> {
  if request.method != Method::GET {
    return Err(eyre!(
      "Refusing to cache {} request for {}",
      request.method,
      request.url
    ));
  }
  if !response.is_cacheable() {
    return Err(eyre!(
      "Refusing to cache status {} response for {}",
      response.status,
      request.url
    ));
  }
  Ok(request.cache_key())
}

impl<S: CacheStorage> Clone for CacheHandle<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      name: self.name.clone(),
    }
  }
}
