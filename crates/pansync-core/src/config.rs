use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per remote call (including the first).
    pub max_attempts: u32,
    /// Fixed delay between attempts, in milliseconds.
    pub delay_ms: u64,
    /// How many times a slice pool may be respawned after all its workers failed.
    pub pool_max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_ms: 3000,
            pool_max_attempts: 3,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            delay: Duration::from_millis(self.delay_ms),
        }
    }
}

/// Which way a folder moves files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
    #[default]
    Mixed,
}

/// Which side overwrites the other when a file differs on both sides (mixed only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    #[default]
    LocalWins,
    RemoteWins,
}

/// When a folder syncs: a start/stop window, or a recurring check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerConfig {
    Window { start: String, stop: String },
    Check { check: String },
}

/// One synced folder pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderConfig {
    pub id: String,
    /// Local root directory.
    pub local: PathBuf,
    /// Remote root path (absolute, `/`-separated).
    pub remote: String,
    /// Optional encryption key (<= 32 chars, no whitespace).
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub conflict: ConflictPolicy,
    /// Also propagate deletions (create/modify/delete instead of create/modify only).
    #[serde(default)]
    pub delete: bool,
    #[serde(default)]
    pub trigger: Option<TriggerConfig>,
    /// Glob patterns matched against paths relative to the sync root.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// One configured remote account with its folders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub name: String,
    /// Root of the directory-backed remote disk for this account.
    pub remote_root: PathBuf,
    #[serde(default)]
    pub folders: Vec<FolderConfig>,
}

/// Global configuration loaded from `~/.config/pansync/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanSyncConfig {
    /// Slices transferred in parallel per task.
    pub worker_threads: usize,
    /// Healthy running tasks per account.
    pub max_running_tasks: usize,
    /// Failed (not yet removed) tasks per account before the scheduler stops pulling work.
    pub max_failed_tasks: usize,
    /// Minimum spacing between recursive remote listings, per account.
    pub listing_interval_secs: u64,
    /// How long a resolved upload endpoint stays valid.
    pub upload_endpoint_ttl_hours: u64,
    /// Re-read downloaded files and compare digests before finishing.
    #[serde(default = "default_true")]
    pub verify_downloads: bool,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

fn default_true() -> bool {
    true
}

impl Default for PanSyncConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            max_running_tasks: 2,
            max_failed_tasks: 5,
            listing_interval_secs: 7,
            upload_endpoint_ttl_hours: 6,
            verify_downloads: true,
            retry: None,
            accounts: Vec::new(),
        }
    }
}

impl PanSyncConfig {
    pub fn retry_config(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_default()
    }

    pub fn listing_interval(&self) -> Duration {
        Duration::from_secs(self.listing_interval_secs)
    }

    pub fn upload_endpoint_ttl(&self) -> Duration {
        Duration::from_secs(self.upload_endpoint_ttl_hours * 3600)
    }

    pub fn account(&self, name: Option<&str>) -> Option<&AccountConfig> {
        match name {
            Some(n) => self.accounts.iter().find(|a| a.name == n),
            None => self.accounts.first(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("pansync")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<PanSyncConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = PanSyncConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: PanSyncConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = PanSyncConfig::default();
        assert_eq!(cfg.worker_threads, 4);
        assert_eq!(cfg.max_running_tasks, 2);
        assert_eq!(cfg.max_failed_tasks, 5);
        assert_eq!(cfg.listing_interval(), Duration::from_secs(7));
        assert_eq!(cfg.upload_endpoint_ttl(), Duration::from_secs(6 * 3600));
        assert!(cfg.verify_downloads);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = PanSyncConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: PanSyncConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.worker_threads, cfg.worker_threads);
        assert_eq!(parsed.max_running_tasks, cfg.max_running_tasks);
        assert_eq!(parsed.listing_interval_secs, cfg.listing_interval_secs);
    }

    #[test]
    fn config_toml_accounts_and_folders() {
        let toml = r#"
            worker_threads = 8
            max_running_tasks = 3
            max_failed_tasks = 2
            listing_interval_secs = 10
            upload_endpoint_ttl_hours = 1

            [retry]
            max_attempts = 3
            delay_ms = 500
            pool_max_attempts = 2

            [[accounts]]
            name = "main"
            remote_root = "/srv/disk"

            [[accounts.folders]]
            id = "photos"
            local = "/home/me/Photos"
            remote = "/backup/photos"
            key = "secret"
            direction = "upload"
            delete = true
            exclude = ["*.tmp", "cache/*"]
            trigger = { check = "*/30 * * * *" }

            [[accounts.folders]]
            id = "docs"
            local = "/home/me/Docs"
            remote = "/docs"
            conflict = "remote-wins"
            trigger = { start = "0 1 * * *", stop = "0 7 * * *" }
        "#;
        let cfg: PanSyncConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.worker_threads, 8);
        assert!(cfg.verify_downloads);
        let retry = cfg.retry_config();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.policy().delay, Duration::from_millis(500));

        let account = cfg.account(Some("main")).unwrap();
        assert_eq!(account.folders.len(), 2);
        let photos = &account.folders[0];
        assert_eq!(photos.direction, Direction::Upload);
        assert_eq!(photos.conflict, ConflictPolicy::LocalWins);
        assert!(photos.delete);
        assert_eq!(photos.exclude.len(), 2);
        assert_eq!(
            photos.trigger,
            Some(TriggerConfig::Check {
                check: "*/30 * * * *".to_string()
            })
        );
        let docs = &account.folders[1];
        assert_eq!(docs.direction, Direction::Mixed);
        assert_eq!(docs.conflict, ConflictPolicy::RemoteWins);
        assert!(!docs.delete);
        assert!(matches!(docs.trigger, Some(TriggerConfig::Window { .. })));
    }

    #[test]
    fn missing_account_lookup() {
        let cfg = PanSyncConfig::default();
        assert!(cfg.account(None).is_none());
        assert!(cfg.account(Some("nope")).is_none());
    }
}
