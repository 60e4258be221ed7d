mod cache;
mod config;
mod host;
mod logging;
mod manifest;
mod net;
#[cfg(test)]
mod testing;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use cache::{CacheHandle, CacheStorage, SqliteStorage};
use host::{LocalHost, WorkerState};
use manifest::Criticality;
use net::{HttpClient, Request, RequestMode};
use worker::{ServiceWorker, WorkerSettings};

#[derive(Parser, Debug)]
#[command(name = "swcache")]
#[command(about = "An offline-caching agent for single-page applications")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/swcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Deployed version token, overriding app.version
  #[arg(long)]
  version_token: Option<String>,

  /// Also write logs to this file
  #[arg(long)]
  log_file: Option<PathBuf>,

  /// Increase log verbosity (-v debug, -vv trace)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Install the configured version and activate it
  Update,
  /// Re-run activation (claim and reap) for the installed version
  Activate,
  /// Send one request through the active worker
  Fetch {
    /// Absolute URL, or a path relative to app.scope
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    #[arg(long, value_enum, default_value_t = RequestMode::Cors)]
    mode: RequestMode,
    /// Request body
    #[arg(short, long)]
    data: Option<String>,
    /// Write the response body to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// List stored cache generations
  Generations,
  /// Show manifest entries and whether the current generation holds them
  Manifest,
}

type Worker = ServiceWorker<SqliteStorage, HttpClient>;
type Host = LocalHost<SqliteStorage, HttpClient>;

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override version if specified on command line
  let config = if let Some(version) = args.version_token {
    let config = config::Config {
      app: config::AppConfig {
        version,
        ..config.app
      },
      ..config
    };
    config.validate()?;
    config
  } else {
    config
  };

  let log_file = args.log_file.or_else(|| config.log.file.clone());
  let _log_guard = logging::init(args.verbose, log_file.as_deref())?;

  let settings = WorkerSettings::from_config(&config)?;
  let storage = Arc::new(SqliteStorage::open(&config.storage_path()?)?);
  let network = Arc::new(HttpClient::new(&config.network, settings.scope.clone())?);
  let host = LocalHost::new(
    Arc::clone(&storage),
    Arc::clone(&network),
    settings.scope.as_str(),
  )?;
  let worker = ServiceWorker::new(
    settings,
    config.manifest.clone(),
    Arc::clone(&storage),
    network,
  );

  match args.command {
    Command::Update => update(&host, &worker).await,
    Command::Activate => {
      host.activate(&worker).await?;
      println!("activated {}", worker.settings().generation());
      Ok(())
    }
    Command::Fetch {
      url,
      method,
      mode,
      data,
      output,
    } => {
      let page = host.open_client();
      let fetched = fetch(&host, &worker, &url, &method, mode, data, output).await;
      host.close_client(page);
      fetched
    }
    Command::Generations => generations(&storage, &host, &worker),
    Command::Manifest => manifest(storage, &worker),
  }
}

async fn update(host: &Host, worker: &Worker) -> Result<()> {
  let generation = worker.settings().generation();
  match host.update(worker).await? {
    WorkerState::Activated => println!("{} installed and active", generation),
    state => println!("{} {}", generation, state),
  }
  Ok(())
}

async fn fetch(
  host: &Host,
  worker: &Worker,
  url: &str,
  method: &str,
  mode: RequestMode,
  data: Option<String>,
  output: Option<PathBuf>,
) -> Result<()> {
  let url = worker
    .settings()
    .scope
    .join(url)
    .map_err(|e| eyre!("Invalid URL '{}': {}", url, e))?;
  let method = Method::from_bytes(method.to_uppercase().as_bytes())
    .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;

  if host.attach(worker) != WorkerState::Activated {
    warn!(
      generation = worker.settings().generation(),
      "Worker is not active, request will not be intercepted. Run `swcache update` first."
    );
  }

  let mut request = Request::new(method, url).with_mode(mode);
  if let Some(data) = data {
    request = request.with_body(data.into_bytes());
  }
  let result = host.fetch(worker, request).await;
  host.settle().await;
  let result = result?;

  println!(
    "{} {} {} bytes from {}",
    result.data.status,
    result.data.kind.as_str(),
    result.data.body.len(),
    result.source
  );
  if let Some(content_type) = result.data.header("content-type") {
    println!("content-type: {}", content_type);
  }
  if result.is_from_cache() {
    if let Some(cached_at) = result.cached_at {
      println!("stored at {}", cached_at.to_rfc3339());
    }
  }

  if let Some(path) = output {
    std::fs::write(&path, &result.data.body)
      .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
  }

  Ok(())
}

fn generations(storage: &Arc<SqliteStorage>, host: &Host, worker: &Worker) -> Result<()> {
  let active = host.active_generation();
  let prefix = &worker.settings().prefix;
  let names = storage.generation_names()?;

  if names.is_empty() {
    println!("no cache generations");
    return Ok(());
  }

  for name in names {
    let marker = if active.as_deref() == Some(name.as_str()) {
      "*"
    } else {
      " "
    };
    let owner = if name.starts_with(prefix.as_str()) {
      "this app"
    } else {
      "other"
    };
    let entries = CacheHandle::new(Arc::clone(storage), name.as_str()).keys()?.len();
    println!("{} {:<32} {:>5} entries  ({})", marker, name, entries, owner);
  }

  Ok(())
}

fn manifest(storage: Arc<SqliteStorage>, worker: &Worker) -> Result<()> {
  let settings = worker.settings();
  let cache = CacheHandle::new(storage, settings.generation());

  for entry in worker.manifest().entries() {
    let url = settings
      .scope
      .join(&entry.id)
      .map_err(|e| eyre!("Invalid manifest entry '{}': {}", entry.id, e))?;
    let cached = cache.match_request(&Request::get(url.clone()))?.is_some();
    let criticality = match entry.criticality {
      Criticality::Required => "required",
      Criticality::Optional => "optional",
    };
    println!(
      "{:<8} {:<8} {}",
      criticality,
      if cached { "cached" } else { "missing" },
      url
    );
  }

  Ok(())
}
