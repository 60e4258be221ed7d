use color_eyre::Result;
use tracing::{info, warn};

use crate::cache::CacheStorage;

/// What one activation removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
  pub deleted: Vec<String>,
  /// Generations whose deletion failed; retried on the next activation
  pub failed: Vec<String>,
}

/// Generations owned by `prefix` that are not `current`.
pub fn stale_generations<'a>(names: &'a [String], prefix: &str, current: &str) -> Vec<&'a str> {
  names
    .iter()
    .map(String::as_str)
    .filter(|name| name.starts_with(prefix) && *name != current)
    .collect()
}

/// Delete every generation of this application except `current`.
///
/// Generations belonging to other applications on the same storage are
/// left alone. Each deletion is independent of the others.
pub fn reap<S: CacheStorage>(storage: &S, prefix: &str, current: &str) -> Result<ReapReport> {
  let names = storage.generation_names()?;
  let mut report = ReapReport::default();

  for name in stale_generations(&names, prefix, current) {
    match storage.delete_generation(name) {
      Ok(_) => {
        info!(generation = name, "Deleted old cache generation");
        report.deleted.push(name.to_string());
      }
      Err(e) => {
        warn!(generation = name, "Failed to delete old cache generation: {}", e);
        report.failed.push(name.to_string());
      }
    }
  }

  Ok(report)
}
