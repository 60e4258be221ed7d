//! Asset manifest: the resources installed into every new cache generation.

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use url::Url;

/// Whether an asset must be cached for installation to succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criticality {
  Required,
  Optional,
}

/// A single manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
  pub id: String,
  pub criticality: Criticality,
}

/// Resource identifiers partitioned by criticality, supplied by the deployment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetManifest {
  #[serde(default)]
  pub required: Vec<String>,
  #[serde(default)]
  pub optional: Vec<String>,
}

/// Manifest with every identifier resolved to an absolute URL.
#[derive(Debug, Clone, Default)]
pub struct ResolvedManifest {
  pub required: Vec<Url>,
  pub optional: Vec<Url>,
}

impl AssetManifest {
  pub fn new(required: Vec<String>, optional: Vec<String>) -> Self {
    Self { required, optional }
  }

  /// All entries in manifest order, required first.
  pub fn entries(&self) -> impl Iterator<Item = ManifestEntry> + '_ {
    let required = self.required.iter().map(|id| ManifestEntry {
      id: id.clone(),
      criticality: Criticality::Required,
    });
    let optional = self.optional.iter().map(|id| ManifestEntry {
      id: id.clone(),
      criticality: Criticality::Optional,
    });
    required.chain(optional)
  }

  /// Resolve identifiers against the application scope.
  pub fn resolve(&self, scope: &Url) -> Result<ResolvedManifest> {
    let resolve_all = |ids: &[String]| -> Result<Vec<Url>> {
      ids
        .iter()
        .map(|id| {
          scope
            .join(id)
            .map_err(|e| eyre!("Invalid manifest entry '{}': {}", id, e))
        })
        .collect()
    };

    Ok(ResolvedManifest {
      required: resolve_all(&self.required)?,
      optional: resolve_all(&self.optional)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_resolve_relative_and_absolute() {
    let manifest = AssetManifest::new(
      vec!["./".into(), "./index.html".into()],
      vec!["https://cdn.test/paper.png".into()],
    );
    let scope = Url::parse("https://app.test/chess/").unwrap();
    let resolved = manifest.resolve(&scope).unwrap();

    assert_eq!(resolved.required[0].as_str(), "https://app.test/chess/");
    assert_eq!(resolved.required[1].as_str(), "https://app.test/chess/index.html");
    assert_eq!(resolved.optional[0].as_str(), "https://cdn.test/paper.png");
  }

  #[test]
  fn test_entries_keep_partition() {
    let manifest = AssetManifest::new(vec!["/".into()], vec!["/icon.png".into()]);
    let entries: Vec<_> = manifest.entries().collect();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].criticality, Criticality::Required);
    assert_eq!(entries[1].id, "/icon.png");
    assert_eq!(entries[1].criticality, Criticality::Optional);
  }

  #[test]
  fn test_invalid_entry() {
    let manifest = AssetManifest::new(vec!["https://[bad".into()], vec![]);
    let scope = Url::parse("https://app.test/").unwrap();
    assert!(manifest.resolve(&scope).is_err());
  }
}
