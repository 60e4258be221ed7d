//! Cache layer that orchestrates caching logic with network fetching.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::handle::CacheHandle;
use super::traits::{CacheResult, CacheStorage};
use crate::net::{Network, Request, Response};

/// Outcome of serving one request through a strategy.
///
/// `result` is what the caller sees. `background` is work that outlives the
/// response (a cache write) and must be awaited before the host tears down.
#[derive(Debug)]
pub struct Served {
  pub result: Result<CacheResult<Response>>,
  pub background: Option<JoinHandle<()>>,
}

impl Served {
  fn ready(result: Result<CacheResult<Response>>) -> Self {
    Self {
      result,
      background: None,
    }
  }
}

/// Cache layer that manages caching logic and network fetching
/// for the current cache generation.
pub struct CacheLayer<S: CacheStorage, N: Network> {
  cache: CacheHandle<S>,
  network: Arc<N>,
}

impl<S: CacheStorage, N: Network> CacheLayer<S, N> {
  pub fn new(cache: CacheHandle<S>, network: Arc<N>) -> Self {
    Self { cache, network }
  }

  #[cfg(test)]
  pub fn cache(&self) -> &CacheHandle<S> {
    &self.cache
  }

  /// Look up a request, treating storage errors as misses.
  fn lookup(&self, request: &Request) -> Option<CacheResult<Response>> {
    match self.cache.match_request(request) {
      Ok(entry) => entry.map(|e| CacheResult::from_cache(e.response, e.stored_at)),
      Err(e) => {
        warn!(url = %request.url, "Cache lookup failed, treating as miss: {}", e);
        None
      }
    }
  }

  /// Stale-while-revalidate.
  ///
  /// 1. Start a network fetch unconditionally
  /// 2. Respond from cache if present, otherwise wait for the network
  /// 3. A status-200 network response replaces the cached entry
  /// 4. Network failures are logged; they only reach the caller on a cache miss
  pub async fn stale_while_revalidate(&self, request: Request) -> Served {
    let (tx, rx) = oneshot::channel();

    let cache = self.cache.clone();
    let network = Arc::clone(&self.network);
    let revalidate = request.clone();
    let background = tokio::spawn(async move {
      let result = network.fetch(&revalidate).await;
      match &result {
        Ok(response) if response.status == 200 => match cache.put(&revalidate, response) {
          Ok(()) => debug!(url = %revalidate.url, generation = cache.name(), "revalidated"),
          Err(e) => warn!(url = %revalidate.url, "Failed to store revalidated response: {}", e),
        },
        Ok(response) => {
          debug!(url = %revalidate.url, status = response.status, "not storing revalidation")
        }
        Err(e) => warn!(url = %revalidate.url, "Offline, keeping cached copy: {}", e),
      }
      // Receiver is gone when the cached copy was served
      let _ = tx.send(result);
    });

    let result = match self.lookup(&request) {
      Some(cached) => Ok(cached),
      None => match rx.await {
        Ok(fetched) => fetched.map(CacheResult::from_network),
        Err(_) => Err(eyre!("Revalidation of {} ended without a result", request.url)),
      },
    };

    Served {
      result,
      background: Some(background),
    }
  }

  /// Cache-first.
  ///
  /// 1. Return the cached entry if present, without touching the network
  /// 2. Otherwise fetch; network errors propagate
  /// 3. Status-200 and opaque responses are stored in the background
  /// 4. Any other status is returned uncached
  pub async fn cache_first(&self, request: Request) -> Served {
    if let Some(cached) = self.lookup(&request) {
      return Served::ready(Ok(cached));
    }

    let response = match self.network.fetch(&request).await {
      Ok(response) => response,
      Err(e) => return Served::ready(Err(e)),
    };

    if !response.is_cacheable() {
      debug!(url = %request.url, status = response.status, "not caching");
      return Served::ready(Ok(CacheResult::from_network(response)));
    }

    let cache = self.cache.clone();
    let copy = response.clone();
    let background = tokio::spawn(async move {
      if let Err(e) = cache.put(&request, &copy) {
        warn!(url = %request.url, "Failed to cache response: {}", e);
      }
    });

    Served {
      result: Ok(CacheResult::from_network(response)),
      background: Some(background),
    }
  }
}

impl<S: CacheStorage, N: Network> Clone for CacheLayer<S, N> {
  fn clone(&self) -> Self {
    Self {
      cache: self.cache.clone(),
      network: Arc::clone(&self.network),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, SqliteStorage};
  use crate::testing::ScriptedNetwork;
  use url::Url;

  const DOC: &str = "https://app.test/index.html";
  const ASSET: &str = "https://app.test/app.js";

  fn layer(
    network: ScriptedNetwork,
  ) -> (CacheLayer<SqliteStorage, ScriptedNetwork>, Arc<ScriptedNetwork>) {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let network = Arc::new(network);
    let cache = CacheHandle::new(storage, "app-v1");
    (CacheLayer::new(cache, Arc::clone(&network)), network)
  }

  fn get(url: &str) -> Request {
    Request::get(Url::parse(url).unwrap())
  }

  async fn settle(served: Served) -> Result<CacheResult<Response>> {
    if let Some(background) = served.background {
      background.await.unwrap();
    }
    served.result
  }

  #[tokio::test]
  async fn test_revalidate_serves_cache_when_offline() {
    let (layer, network) = layer(ScriptedNetwork::new().fail(DOC));
    layer
      .cache()
      .put(&get(DOC), &Response::new(DOC, 200, "cached"))
      .unwrap();

    let result = settle(layer.stale_while_revalidate(get(DOC)).await)
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Cache);
    assert_eq!(result.data.body, b"cached".to_vec());
    assert_eq!(network.calls(DOC), 1);
  }

  #[tokio::test]
  async fn test_revalidate_replaces_entry_on_hit() {
    let (layer, network) = layer(ScriptedNetwork::new().respond(DOC, 200, "fresh"));
    layer
      .cache()
      .put(&get(DOC), &Response::new(DOC, 200, "stale"))
      .unwrap();

    let first = settle(layer.stale_while_revalidate(get(DOC)).await)
      .await
      .unwrap();
    assert_eq!(first.data.body, b"stale".to_vec());

    let entry = layer.cache().match_request(&get(DOC)).unwrap().unwrap();
    assert_eq!(entry.response.body, b"fresh".to_vec());

    let second = settle(layer.stale_while_revalidate(get(DOC)).await)
      .await
      .unwrap();
    assert_eq!(second.data.body, b"fresh".to_vec());
    assert_eq!(network.calls(DOC), 2);
  }

  #[tokio::test]
  async fn test_revalidate_miss_waits_for_network() {
    let (layer, _network) = layer(ScriptedNetwork::new().respond(DOC, 200, "fresh"));

    let served = layer.stale_while_revalidate(get(DOC)).await;
    // The entry is written before a waiting caller gets the response
    assert!(layer.cache().match_request(&get(DOC)).unwrap().is_some());

    let result = settle(served).await.unwrap();
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data.body, b"fresh".to_vec());
  }

  #[tokio::test]
  async fn test_revalidate_miss_offline_fails() {
    let (layer, _network) = layer(ScriptedNetwork::new().fail(DOC));
    assert!(settle(layer.stale_while_revalidate(get(DOC)).await)
      .await
      .is_err());
  }

  #[tokio::test]
  async fn test_revalidate_does_not_store_errors() {
    let (layer, _network) = layer(ScriptedNetwork::new().respond(DOC, 503, "down"));
    layer
      .cache()
      .put(&get(DOC), &Response::new(DOC, 200, "cached"))
      .unwrap();

    settle(layer.stale_while_revalidate(get(DOC)).await)
      .await
      .unwrap();
    let entry = layer.cache().match_request(&get(DOC)).unwrap().unwrap();
    assert_eq!(entry.response.body, b"cached".to_vec());
  }

  #[tokio::test]
  async fn test_cache_first_hit_skips_network() {
    let (layer, network) = layer(ScriptedNetwork::new().respond(ASSET, 200, "net"));
    layer
      .cache()
      .put(&get(ASSET), &Response::new(ASSET, 200, "cached"))
      .unwrap();

    let served = layer.cache_first(get(ASSET)).await;
    assert!(served.background.is_none());
    let result = served.result.unwrap();

    assert!(result.is_from_cache());
    assert_eq!(result.data.body, b"cached".to_vec());
    assert_eq!(network.total_calls(), 0);
  }

  #[tokio::test]
  async fn test_cache_first_miss_populates() {
    let (layer, network) = layer(ScriptedNetwork::new().respond(ASSET, 200, "net"));

    let result = settle(layer.cache_first(get(ASSET)).await).await.unwrap();
    assert_eq!(result.source, CacheSource::Network);
    assert!(layer.cache().match_request(&get(ASSET)).unwrap().is_some());

    // Second request is served from cache
    let again = settle(layer.cache_first(get(ASSET)).await).await.unwrap();
    assert!(again.is_from_cache());
    assert_eq!(network.calls(ASSET), 1);
  }

  #[tokio::test]
  async fn test_cache_first_skips_non_200() {
    let (layer, _network) = layer(ScriptedNetwork::new().respond(ASSET, 404, "nope"));

    let served = layer.cache_first(get(ASSET)).await;
    assert!(served.background.is_none());
    let result = served.result.unwrap();

    assert_eq!(result.data.status, 404);
    assert!(layer.cache().match_request(&get(ASSET)).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_cache_first_stores_opaque() {
    let bg = "https://cdn.test/paper.png";
    let network = ScriptedNetwork::new().respond_with(bg, Response::opaque(bg, vec![7u8]));
    let (layer, _network) = layer(network);

    let result = settle(layer.cache_first(get(bg)).await).await.unwrap();
    assert!(result.data.is_opaque());

    let entry = layer.cache().match_request(&get(bg)).unwrap().unwrap();
    assert_eq!(entry.response.status, 0);
  }

  #[tokio::test]
  async fn test_cache_first_propagates_network_error() {
    let (layer, _network) = layer(ScriptedNetwork::new().fail(ASSET));
    let served = layer.cache_first(get(ASSET)).await;
    assert!(served.result.is_err());
    assert!(served.background.is_none());
  }
}
