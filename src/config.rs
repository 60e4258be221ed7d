use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::manifest::AssetManifest;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub app: AppConfig,
  #[serde(default)]
  pub manifest: AssetManifest,
  #[serde(default)]
  pub network: NetworkConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Prefix shared by every cache generation of this application
  pub prefix: String,
  /// Deployed version token; changing it forces a reinstall
  pub version: String,
  /// URL the application is served under; relative manifest entries resolve against it
  pub scope: String,
  /// File name of the entry document (routed as a navigation)
  #[serde(default = "default_entry_document")]
  pub entry_document: String,
}

fn default_entry_document() -> String {
  "index.html".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  #[serde(default = "default_user_agent")]
  pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_user_agent() -> String {
  format!("swcache/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      timeout_secs: default_timeout_secs(),
      user_agent: default_user_agent(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// SQLite database path (defaults to $XDG_DATA_HOME/swcache/cache.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
  /// Also write logs to this file
  pub file: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./swcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/swcache/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/swcache/config.yaml\n\
                 See swcache.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("swcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("swcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    config
      .validate()
      .map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Check the values serde cannot: non-empty naming parts and resolvable URLs.
  pub fn validate(&self) -> Result<()> {
    if self.app.prefix.trim().is_empty() {
      return Err(eyre!("app.prefix must not be empty"));
    }
    if self.app.version.trim().is_empty() {
      return Err(eyre!("app.version must not be empty"));
    }
    if self.app.entry_document.is_empty() {
      return Err(eyre!("app.entry_document must not be empty"));
    }
    let scope = self.scope_url()?;
    self.manifest.resolve(&scope)?;
    Ok(())
  }

  pub fn scope_url(&self) -> Result<Url> {
    Url::parse(&self.app.scope).map_err(|e| eyre!("Invalid app.scope '{}': {}", self.app.scope, e))
  }

  /// Path of the cache database.
  pub fn storage_path(&self) -> Result<PathBuf> {
    if let Some(path) = &self.storage.path {
      return Ok(path.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("swcache").join("cache.db"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  const EXAMPLE: &str = r#"
app:
  prefix: "chess-"
  version: "v3-hotfix"
  scope: "https://app.test/chess/"
manifest:
  required:
    - "./"
    - "./index.html"
    - "https://cdn.test/react.production.min.js"
  optional:
    - "./icon.png"
network:
  timeout_secs: 5
"#;

  #[test]
  fn test_parse_example() {
    let config: Config = serde_yaml::from_str(EXAMPLE).unwrap();
    config.validate().unwrap();

    assert_eq!(config.app.entry_document, "index.html");
    assert_eq!(config.network.timeout_secs, 5);
    assert!(config.network.user_agent.starts_with("swcache/"));
    assert_eq!(config.manifest.required.len(), 3);
    assert_eq!(config.manifest.optional, vec!["./icon.png".to_string()]);
    assert!(config.storage.path.is_none());
  }

  #[test]
  fn test_empty_version_rejected() {
    let yaml = EXAMPLE.replace("v3-hotfix", " ");
    let config: Config = serde_yaml::from_str(&yaml).unwrap();
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_relative_scope_rejected() {
    let yaml = EXAMPLE.replace("https://app.test/chess/", "/chess/");
    let config: Config = serde_yaml::from_str(&yaml).unwrap();
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_load_explicit_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(EXAMPLE.as_bytes()).unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.app.prefix, "chess-");
  }

  #[test]
  fn test_load_missing_path() {
    let err = Config::load(Some(Path::new("/nonexistent/swcache.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_storage_path_override() {
    let mut config: Config = serde_yaml::from_str(EXAMPLE).unwrap();
    config.storage.path = Some(PathBuf::from("/tmp/sw.db"));
    assert_eq!(config.storage_path().unwrap(), PathBuf::from("/tmp/sw.db"));
  }
}
