//! The offline-caching worker: install, activate and fetch handlers.
//!
//! The worker owns no event loop. A host invokes [`ServiceWorker::on_install`],
//! [`ServiceWorker::on_activate`] and [`ServiceWorker::on_fetch`] and receives
//! takeover signals back through the [`Host`] trait.

mod install;
mod reaper;
mod router;

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheHandle, CacheLayer, CacheStorage, Served};
use crate::config::Config;
use crate::manifest::AssetManifest;
use crate::net::{Network, Request};

pub use install::InstallReport;
pub use reaper::ReapReport;
pub use router::{Route, Router};

/// Lifecycle capabilities the hosting environment offers the worker.
pub trait Host: Send + Sync {
  /// Activate as soon as installation completes, without waiting for
  /// clients of the previous version to close.
  fn skip_waiting(&self);

  /// Take control of every open client immediately.
  fn claim_clients(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Per-version settings, fixed for the lifetime of a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
  pub prefix: String,
  pub version: String,
  pub scope: Url,
  pub entry_document: String,
  generation: String,
}

impl WorkerSettings {
  pub fn new(
    prefix: impl Into<String>,
    version: impl Into<String>,
    scope: Url,
    entry_document: impl Into<String>,
  ) -> Self {
    let prefix = prefix.into();
    let version = version.into();
    let generation = format!("{}{}", prefix, version);
    Self {
      prefix,
      version,
      scope,
      entry_document: entry_document.into(),
      generation,
    }
  }

  pub fn from_config(config: &Config) -> Result<Self> {
    Ok(Self::new(
      config.app.prefix.clone(),
      config.app.version.clone(),
      config.scope_url()?,
      config.app.entry_document.clone(),
    ))
  }

  /// Name of this version's cache generation.
  pub fn generation(&self) -> &str {
    &self.generation
  }
}

/// What the worker did with an intercepted request.
#[derive(Debug)]
pub enum FetchOutcome {
  /// Not intercepted; the host must send the request to the network itself
  Passthrough(Request),
  /// Answered by the worker
  Respond(Served),
}

/// The caching worker for one deployed version.
pub struct ServiceWorker<S: CacheStorage, N: Network> {
  settings: WorkerSettings,
  manifest: AssetManifest,
  storage: Arc<S>,
  network: Arc<N>,
  router: Router,
  layer: CacheLayer<S, N>,
}

impl<S: CacheStorage, N: Network> ServiceWorker<S, N> {
  pub fn new(
    settings: WorkerSettings,
    manifest: AssetManifest,
    storage: Arc<S>,
    network: Arc<N>,
  ) -> Self {
    let cache = CacheHandle::new(Arc::clone(&storage), settings.generation());
    let layer = CacheLayer::new(cache, Arc::clone(&network));
    let router = Router::new(settings.entry_document.clone());

    Self {
      settings,
      manifest,
      storage,
      network,
      router,
      layer,
    }
  }

  pub fn settings(&self) -> &WorkerSettings {
    &self.settings
  }

  pub fn manifest(&self) -> &AssetManifest {
    &self.manifest
  }

  /// Populate this version's generation from the manifest.
  ///
  /// Fails if any required asset cannot be cached. A generation created by a
  /// failed install is deleted again, optional entries included; one that
  /// existed before (such as the active generation) is kept. On success the
  /// host is told to skip waiting.
  pub async fn on_install<H: Host>(&self, host: &H) -> Result<InstallReport> {
    let generation = self.settings.generation();
    info!(generation, "Installing");

    let manifest = self.manifest.resolve(&self.settings.scope)?;
    let existed = self.storage.has_generation(generation)?;
    let cache = CacheHandle::open(Arc::clone(&self.storage), generation)?;

    let report = match install::populate(&manifest, &cache, self.network.as_ref()).await {
      Ok(report) => report,
      Err(e) => {
        if !existed {
          self.discard(generation);
        }
        return Err(e);
      }
    };

    host.skip_waiting();
    Ok(report)
  }

  fn discard(&self, generation: &str) {
    match self.storage.delete_generation(generation) {
      Ok(_) => debug!(generation, "Discarded failed generation"),
      Err(e) => warn!(generation, "Failed to discard generation: {}", e),
    }
  }

  /// Claim clients and delete this application's other generations.
  ///
  /// Reaping is best effort: failures are logged, never returned.
  pub async fn on_activate<H: Host>(&self, host: &H) -> Result<ReapReport> {
    let generation = self.settings.generation();
    info!(generation, "Activating, removing old cache generations");

    let reap = async {
      reaper::reap(self.storage.as_ref(), &self.settings.prefix, generation).unwrap_or_else(|e| {
        warn!("Failed to enumerate cache generations: {}", e);
        ReapReport::default()
      })
    };
    let (claimed, report) = tokio::join!(host.claim_clients(), reap);
    claimed.map_err(|e| eyre!("Failed to claim clients: {}", e))?;

    Ok(report)
  }

  /// Route one intercepted request.
  pub async fn on_fetch(&self, request: Request) -> FetchOutcome {
    let route = self.router.classify(&request);
    debug!(method = %request.method, url = %request.url, ?route, "fetch");

    match route {
      Route::Passthrough => FetchOutcome::Passthrough(request),
      Route::Document => FetchOutcome::Respond(self.layer.stale_while_revalidate(request).await),
      Route::Asset => FetchOutcome::Respond(self.layer.cache_first(request).await),
    }
  }
}
