use color_eyre::{eyre::eyre, Result};
use futures::future::{join_all, try_join_all};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheHandle, CacheStorage};
use crate::manifest::ResolvedManifest;
use crate::net::{Network, Request, Response};

/// What an installation stored.
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
  pub generation: String,
  /// Number of required assets stored (always all of them on success)
  pub required: usize,
  pub optional_stored: Vec<String>,
  pub optional_failed: Vec<String>,
}

/// Fetch one manifest asset; anything but status 200 counts as a failure.
async fn fetch_asset<N: Network>(network: &N, url: &Url) -> Result<(Request, Response)> {
  let request = Request::get(url.clone());
  let response = network.fetch(&request).await?;
  if response.status != 200 {
    return Err(eyre!("Fetching {} returned status {}", url, response.status));
  }
  Ok((request, response))
}

/// Populate `cache` from the manifest.
///
/// Optional assets are fetched and stored one by one; their failures are
/// logged and swallowed. Required assets are fetched together and stored in
/// a single batch: if any fetch fails nothing from the batch is stored and the
/// installation fails.
pub async fn populate<S: CacheStorage, N: Network>(
  manifest: &ResolvedManifest,
  cache: &CacheHandle<S>,
  network: &N,
) -> Result<InstallReport> {
  let optional = join_all(manifest.optional.iter().map(|url| async move {
    let stored = match fetch_asset(network, url).await {
      Ok((request, response)) => cache.put(&request, &response),
      Err(e) => Err(e),
    };
    (url, stored)
  }));

  let required = async {
    let fetches = manifest.required.iter().map(|url| fetch_asset(network, url));
    let fetched = try_join_all(fetches).await?;
    cache.put_all(&fetched)?;
    Ok::<usize, color_eyre::Report>(fetched.len())
  };

  let (optional, required) = tokio::join!(optional, required);

  let mut report = InstallReport {
    generation: cache.name().to_string(),
    ..Default::default()
  };
  for (url, stored) in optional {
    match stored {
      Ok(()) => {
        debug!(url = %url, "Cached optional asset");
        report.optional_stored.push(url.to_string());
      }
      Err(e) => {
        warn!(url = %url, "Skipping optional asset: {}", e);
        report.optional_failed.push(url.to_string());
      }
    }
  }

  report.required =
    required.map_err(|e| eyre!("Failed to cache required assets for {}: {}", cache.name(), e))?;

  info!(
    generation = cache.name(),
    required = report.required,
    optional = report.optional_stored.len(),
    skipped = report.optional_failed.len(),
    "Cache generation populated"
  );

  Ok(report)
}
