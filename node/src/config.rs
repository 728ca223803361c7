//! # Node Configuration
//!
//! Non-secret settings live in `config.toml` inside the data directory.
//! Every field has a default, so a missing file or a partial file is fine.
//! Command-line flags (with `WARDEN_*` environment fallbacks) override the
//! file.
//!
//! Secrets never go in the file: the device passphrase and the
//! authentication passphrase come from the environment or flags only.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use warden_protocol::custody::{KeyParams, SignatureCurve};

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_DIR_NAME: &str = "db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    /// Address the signing API binds to. Keep this on loopback.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `pretty` or `json`.
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Curve for newly generated keys.
    #[serde(default)]
    pub curve: SignatureCurve,
    /// Authentication window for newly generated keys, in seconds. Zero
    /// means new keys do not require authentication.
    #[serde(default = "default_auth_validity_secs")]
    pub auth_validity_secs: u64,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9750))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_auth_validity_secs() -> u64 {
    warden_protocol::config::DEFAULT_AUTH_VALIDITY.as_secs()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            curve: SignatureCurve::default(),
            auth_validity_secs: default_auth_validity_secs(),
        }
    }
}

impl NodeConfig {
    /// Load `config.toml` from `data_dir`, or defaults if it does not exist.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("invalid config in {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Write the config to `data_dir/config.toml` unless one already exists.
    pub fn write_default_if_missing(&self, data_dir: &Path) -> Result<Option<PathBuf>> {
        let path = data_dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            return Ok(None);
        }
        let body = toml::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(Some(path))
    }

    /// Key parameters for `keygen`, before command-line overrides.
    pub fn key_params(&self) -> KeyParams {
        let validity = match self.auth_validity_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        KeyParams::default()
            .with_curve(self.curve)
            .with_auth_validity(validity)
    }
}
