//! In-process host that drives a worker through its lifecycle.
//!
//! Tracks the lifecycle of the incoming worker, the open clients and which
//! generation controls them, persists the active generation, and keeps
//! background work alive until it is settled. Only the worker whose generation
//! is active intercepts fetches, whatever state an update is in.

use color_eyre::{eyre::eyre, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheResult, CacheStorage};
use crate::net::{Network, Request, Response};
use crate::worker::{FetchOutcome, Host, ServiceWorker};

/// Worker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Loaded, not yet installed
  Parsed,
  Installing,
  Installed,
  Activating,
  /// Active and intercepting fetches
  Activated,
  /// Failed to install or replaced
  Redundant,
}

impl std::fmt::Display for WorkerState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      WorkerState::Parsed => write!(f, "parsed"),
      WorkerState::Installing => write!(f, "installing"),
      WorkerState::Installed => write!(f, "installed"),
      WorkerState::Activating => write!(f, "activating"),
      WorkerState::Activated => write!(f, "activated"),
      WorkerState::Redundant => write!(f, "redundant"),
    }
  }
}

/// An open page and the generation that controls it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
  pub id: u64,
  pub controller: Option<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Host for a single application scope.
pub struct LocalHost<S: CacheStorage, N: Network> {
  storage: Arc<S>,
  network: Arc<N>,
  scope: String,
  /// Lifecycle of the most recently attached or updated worker
  state: Mutex<WorkerState>,
  /// Generation recorded as active in storage
  active: Mutex<Option<String>>,
  /// Generation currently being activated, the target of a claim
  incoming: Mutex<Option<String>>,
  clients: Mutex<Vec<Client>>,
  next_client: AtomicU64,
  pending: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: CacheStorage, N: Network> LocalHost<S, N> {
  pub fn new(storage: Arc<S>, network: Arc<N>, scope: impl Into<String>) -> Result<Self> {
    let scope = scope.into();
    let active = storage.active_generation(&scope)?;

    Ok(Self {
      storage,
      network,
      scope,
      state: Mutex::new(WorkerState::Parsed),
      active: Mutex::new(active),
      incoming: Mutex::new(None),
      clients: Mutex::new(Vec::new()),
      next_client: AtomicU64::new(1),
      pending: Mutex::new(Vec::new()),
    })
  }

  pub fn state(&self) -> WorkerState {
    *lock(&self.state)
  }

  fn set_state(&self, state: WorkerState) {
    debug!(%state, "worker state");
    *lock(&self.state) = state;
  }

  pub fn active_generation(&self) -> Option<String> {
    lock(&self.active).clone()
  }

  /// Resume a worker whose generation is already recorded as active.
  pub fn attach(&self, worker: &ServiceWorker<S, N>) -> WorkerState {
    if self.active_generation().as_deref() == Some(worker.settings().generation()) {
      self.set_state(WorkerState::Activated);
    }
    self.state()
  }

  /// Open a client; it is controlled by the active generation, if any.
  pub fn open_client(&self) -> u64 {
    let id = self.next_client.fetch_add(1, Ordering::SeqCst);
    let controller = self.active_generation();
    lock(&self.clients).push(Client { id, controller });
    id
  }

  pub fn close_client(&self, id: u64) {
    lock(&self.clients).retain(|c| c.id != id);
  }

  #[cfg(test)]
  pub fn clients(&self) -> Vec<Client> {
    lock(&self.clients).clone()
  }

  /// Install `worker` and activate it.
  ///
  /// On installation failure the worker becomes redundant and the previously
  /// active generation keeps serving.
  pub async fn update(&self, worker: &ServiceWorker<S, N>) -> Result<WorkerState> {
    let generation = worker.settings().generation();
    self.set_state(WorkerState::Installing);

    if let Err(e) = worker.on_install(self).await {
      self.set_state(WorkerState::Redundant);
      return Err(eyre!("Installation of {} failed: {}", generation, e));
    }
    self.set_state(WorkerState::Installed);

    self.activate(worker).await
  }

  /// Activate an installed worker and record its generation as active.
  pub async fn activate(&self, worker: &ServiceWorker<S, N>) -> Result<WorkerState> {
    let generation = worker.settings().generation();
    if !self.storage.has_generation(generation)? {
      return Err(eyre!("Generation {} is not installed", generation));
    }

    self.set_state(WorkerState::Activating);
    *lock(&self.incoming) = Some(generation.to_string());

    let activated = worker.on_activate(self).await;
    *lock(&self.incoming) = None;
    let report = match activated {
      Ok(report) => report,
      Err(e) => {
        self.set_state(WorkerState::Redundant);
        return Err(e);
      }
    };

    self.storage.set_active_generation(&self.scope, generation)?;
    *lock(&self.active) = Some(generation.to_string());
    self.set_state(WorkerState::Activated);

    info!(
      generation,
      deleted = report.deleted.len(),
      failed = report.failed.len(),
      "Activated"
    );
    Ok(WorkerState::Activated)
  }

  /// Dispatch a request from a page.
  ///
  /// Only the worker of the active generation intercepts; otherwise the
  /// request goes straight to the network. Background work is kept until
  /// [`LocalHost::settle`].
  pub async fn fetch(
    &self,
    worker: &ServiceWorker<S, N>,
    request: Request,
  ) -> Result<CacheResult<Response>> {
    let generation = worker.settings().generation();
    if self.active_generation().as_deref() != Some(generation) {
      debug!(url = %request.url, generation, "worker not active, not intercepting");
      return self.network.fetch(&request).await.map(CacheResult::from_network);
    }

    match worker.on_fetch(request).await {
      FetchOutcome::Passthrough(request) => {
        self.network.fetch(&request).await.map(CacheResult::from_network)
      }
      FetchOutcome::Respond(served) => {
        if let Some(background) = served.background {
          lock(&self.pending).push(background);
        }
        served.result
      }
    }
  }

  /// Wait for every background task started by fetches so far.
  pub async fn settle(&self) {
    let pending: Vec<JoinHandle<()>> = lock(&self.pending).drain(..).collect();
    for handle in pending {
      if let Err(e) = handle.await {
        warn!("Background cache task failed: {}", e);
      }
    }
  }
}

impl<S: CacheStorage, N: Network> Host for LocalHost<S, N> {
  // Activation always follows a successful install
  fn skip_waiting(&self) {
    debug!("Skip waiting requested");
  }

  async fn claim_clients(&self) -> Result<()> {
    let incoming = lock(&self.incoming)
      .clone()
      .ok_or_else(|| eyre!("No activating generation to claim clients for"))?;

    let mut clients = lock(&self.clients);
    for client in clients.iter_mut() {
      client.controller = Some(incoming.clone());
    }
    debug!(generation = %incoming, clients = clients.len(), "Claimed clients");
    Ok(())
  }
}
