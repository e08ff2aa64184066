use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cache::Partitions;
use crate::rules::{Rule, RuleSet};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Cache version string; bumping it invalidates all partitions on the
  /// next activation
  #[serde(default = "default_version")]
  pub version: String,
  /// Ordered classification rules; empty means the built-in defaults
  #[serde(default)]
  pub rules: Vec<Rule>,
  /// Static asset URLs precached on install
  #[serde(default)]
  pub precache: Vec<String>,
  /// URL of the offline page served to navigations (default /offline.html)
  pub offline_url: Option<String>,
  /// Base URL prepended to relative precache/warm entries
  pub base_url: Option<String>,
  /// Override for the cache database location
  pub cache_db: Option<PathBuf>,
}

fn default_version() -> String {
  "v1".to_string()
}

impl Default for Config {
  fn default() -> Self {
    Self {
      version: default_version(),
      rules: Vec::new(),
      precache: Vec::new(),
      offline_url: None,
      base_url: None,
      cache_db: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offcache/config.yaml
  ///
  /// Absent config is not an error; defaults apply.
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
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("offcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offcache").join("config.yaml");
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

    Ok(config)
  }

  /// The rule set to classify with: configured rules, or the defaults.
  pub fn rule_set(&self) -> RuleSet {
    if self.rules.is_empty() {
      RuleSet::default()
    } else {
      RuleSet::new(self.rules.clone())
    }
  }

  pub fn partitions(&self) -> Partitions {
    Partitions::new(&self.version)
  }

  /// Resolve a possibly-relative URL against the configured base.
  pub fn resolve_url(&self, url: &str) -> String {
    if url.starts_with('/') {
      if let Some(base) = &self.base_url {
        return format!("{}{}", base.trim_end_matches('/'), url);
      }
    }
    url.to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::rules::Strategy;

  #[test]
  fn test_parse_full_config() {
    let yaml = r#"
version: v3
rules:
  - pattern: /icons/
    strategy: cache-first
  - pattern: /api/
    strategy: network-first
  - pattern: /questions/
    strategy: stale-while-revalidate
precache:
  - /
  - /offline.html
offline_url: /offline.html
base_url: https://prep.example.com
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.version, "v3");
    assert_eq!(config.partitions().static_name(), "static-v3");
    assert_eq!(config.rule_set().classify("/icons/a.png"), Strategy::CacheFirst);
    assert_eq!(config.precache.len(), 2);
    assert_eq!(
      config.resolve_url("/offline.html"),
      "https://prep.example.com/offline.html"
    );
    assert_eq!(
      config.resolve_url("https://cdn.example.com/x"),
      "https://cdn.example.com/x"
    );
  }

  #[test]
  fn test_empty_config_uses_defaults() {
    let config: Config = serde_yaml::from_str("{}").unwrap();
    assert_eq!(config.version, "v1");
    assert_eq!(config.rule_set().classify("/anything"), Strategy::NetworkFirst);
    assert_eq!(config.resolve_url("/x"), "/x");
  }
}
