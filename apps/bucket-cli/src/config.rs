//! CLI configuration management.
//!
//! Configuration is stored as TOML:
//! - `$XDG_CONFIG_HOME/bucketmgr/config.toml` when set
//! - Unix: `~/.config/bucketmgr/config.toml`
//! - Windows: `%APPDATA%/bucketmgr/config.toml`

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use bucketmgr_aps::{Credentials, DEFAULT_BASE_URL};
use bucketmgr_derivatives::PollConfig;
use bucketmgr_protocol::Region;
use bucketmgr_transfer::{DEFAULT_CHUNK_SIZE, UploadPolicy};
use serde::{Deserialize, Serialize};

/// Bucket manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// `US` or `EMEA`.
    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Overridden by `APS_CLIENT_ID` when empty.
    #[serde(default)]
    pub client_id: String,

    /// Overridden by `APS_CLIENT_SECRET` when empty.
    #[serde(default)]
    pub client_secret: String,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    /// Upload chunk size in bytes; also the single-shot threshold.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_expiry_retries")]
    pub max_token_retries: u32,

    #[serde(default = "default_expiry_retries")]
    pub max_url_retries: u32,
}

fn default_region() -> String {
    Region::Us.as_str().into()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_poll_timeout_secs() -> u64 {
    60 * 60
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_max_retries() -> u32 {
    5
}

fn default_expiry_retries() -> u32 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: default_region(),
            base_url: default_base_url(),
            client_id: String::new(),
            client_secret: String::new(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_secs: default_poll_timeout_secs(),
            chunk_size: default_chunk_size(),
            max_retries: default_max_retries(),
            max_token_retries: default_expiry_retries(),
            max_url_retries: default_expiry_retries(),
        }
    }
}

impl Config {
    /// Loads configuration from `path` (or the default location), creating
    /// a default file if none exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // The file may hold a client secret.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn region(&self) -> Region {
        Region::parse(&self.region)
    }

    /// Configured credentials, falling back to `env` when either is empty.
    pub fn credentials(&self, env: Option<Credentials>) -> Option<Credentials> {
        let configured = Credentials::new(self.client_id.trim(), self.client_secret.trim());
        if configured.is_complete() {
            Some(configured)
        } else {
            env.filter(Credentials::is_complete)
        }
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        let chunk_size = self.chunk_size.max(1);
        UploadPolicy {
            chunk_size,
            single_shot_threshold: chunk_size,
            max_retries: self.max_retries,
            max_token_retries: self.max_token_retries,
            max_url_retries: self.max_url_retries,
            ..UploadPolicy::default()
        }
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            max_elapsed: Duration::from_secs(self.poll_timeout_secs),
            max_token_retries: self.max_token_retries,
            ..PollConfig::default()
        }
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    let base_var = if cfg!(windows) { "APPDATA" } else { "HOME" };
    config_path_from(
        std::env::var_os("XDG_CONFIG_HOME"),
        std::env::var_os(base_var),
    )
}

/// The file may hold a client secret, so there is no fallback to a shared
/// directory when the environment names no home.
fn config_path_from(xdg: Option<OsString>, base: Option<OsString>) -> anyhow::Result<PathBuf> {
    let dir = match xdg.filter(|v| !v.is_empty()) {
        Some(xdg) => PathBuf::from(xdg),
        None => {
            let base = base
                .filter(|v| !v.is_empty())
                .context("cannot locate a config directory; pass --config")?;
            if cfg!(windows) {
                PathBuf::from(base)
            } else {
                PathBuf::from(base).join(".config")
            }
        }
    };
    Ok(dir.join("bucketmgr").join("config.toml"))
}
