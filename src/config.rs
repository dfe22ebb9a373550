use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cache::FailurePolicy;
use crate::identity::Identity;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  /// Hosted backend; without it everything runs in guest mode
  pub backend: Option<BackendConfig>,
  /// Id of the signed-in user (the `user_id` column of their rows)
  pub user_id: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  pub url: String,
  /// Public project key sent with every request
  pub anon_key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  /// What to do with a create the backend rejected.
  ///
  /// The default `revert` drops the failed entity, so the list ends up with no
  /// copy of it. Use `keep-pending` to keep exactly one copy marked as failed.
  #[serde(default)]
  pub failure_policy: FailurePolicy,
  /// Where the guest store and logs live (defaults to the platform data dir)
  pub data_dir: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./kiden.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/kiden/config.yaml
  ///
  /// With no file found the defaults apply, which means guest mode.
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
    let local = PathBuf::from("kiden.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("kiden").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file is valid and means all defaults
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Get the backend access token from the environment.
  ///
  /// Checks KIDEN_ACCESS_TOKEN.
  pub fn get_access_token() -> Option<String> {
    std::env::var("KIDEN_ACCESS_TOKEN")
      .ok()
      .filter(|token| !token.trim().is_empty())
  }

  /// Identity to start with: a user when backend, user id and token are all
  /// present, a guest otherwise.
  pub fn identity(&self, access_token: Option<String>) -> Identity {
    match (&self.backend, &self.user_id, access_token) {
      (Some(_), Some(user_id), Some(token)) => Identity::user(user_id.clone(), token),
      _ => Identity::Guest,
    }
  }

  /// Directory for the guest store and log files.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.cache.data_dir {
      return Ok(dir.clone());
    }
    dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .map(|p| p.join("kiden"))
      .ok_or_else(|| eyre!("Could not determine data directory"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_full_config() {
    let config = Config::parse(
      r#"
backend:
  url: https://project.example.test
  anon_key: public-anon-key
user_id: u-1
cache:
  failure_policy: keep-pending
  data_dir: /tmp/kiden-test
"#,
    )
    .unwrap();

    let backend = config.backend.as_ref().unwrap();
    assert_eq!(backend.url, "https://project.example.test");
    assert_eq!(backend.anon_key, "public-anon-key");
    assert_eq!(config.cache.failure_policy, FailurePolicy::KeepPending);
    assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/kiden-test"));
    assert_eq!(
      config.identity(Some("token".into())),
      Identity::user("u-1", "token")
    );
  }

  #[test]
  fn test_missing_pieces_mean_guest() {
    let config = Config::parse("user_id: u-1\n").unwrap();
    assert!(config.identity(Some("token".into())).is_guest());
    assert_eq!(config.cache.failure_policy, FailurePolicy::Revert);

    let config = Config::parse(
      "backend:\n  url: https://project.example.test\n  anon_key: k\nuser_id: u-1\n",
    )
    .unwrap();
    assert!(config.identity(None).is_guest());
  }

  #[test]
  fn test_empty_file_is_default() {
    let config = Config::parse("   \n").unwrap();
    assert!(config.backend.is_none());
    assert!(config.identity(None).is_guest());
  }

  #[test]
  fn test_default_config_reverts_failed_creates() {
    assert_eq!(Config::default().cache.failure_policy, FailurePolicy::Revert);
    assert_eq!(Config::parse("").unwrap().cache.failure_policy, FailurePolicy::Revert);
  }

  #[test]
  fn test_rejects_unknown_policy() {
    assert!(Config::parse("cache:\n  failure_policy: retry\n").is_err());
  }

  #[test]
  fn test_explicit_path_must_exist() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Config::load(Some(&dir.path().join("missing.yaml"))).is_err());

    let path = dir.path().join("kiden.yaml");
    std::fs::write(&path, "user_id: u-9\n").unwrap();
    assert_eq!(
      Config::load(Some(&path)).unwrap().user_id.as_deref(),
      Some("u-9")
    );
  }
}
