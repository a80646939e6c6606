use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::reconcile::RetryPolicy;

/// Connection settings for the Transmission RPC endpoint.
/// `Debug` masks the password; the config is logged at startup.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub host: String,
    pub port: u16,
    /// RPC path on the daemon (Transmission's default unless reverse-proxied).
    pub path: String,
    pub user: Option<String>,
    pub pass: Option<String>,
    /// Talk HTTPS instead of HTTP.
    pub tls: bool,
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9091,
            path: "/transmission/rpc".to_string(),
            user: None,
            pass: None,
            tls: false,
            timeout_secs: 30,
        }
    }
}

impl fmt::Debug for RpcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("path", &self.path)
            .field("user", &self.user)
            .field("pass", &self.pass.as_ref().map(|_| "***"))
            .field("tls", &self.tls)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl RpcConfig {
    pub fn endpoint(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("{}://{}:{}{}", scheme, self.host, self.port, path)
    }
}

/// Bounded retry for completion notices (optional section in config.toml).
/// Without this section notices are retried on every tick, forever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyRetryConfig {
    /// Maximum delivery attempts per job (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff between attempts.
    #[serde(default)]
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

fn default_max_delay_secs() -> u64 {
    300
}

impl NotifyRetryConfig {
    pub fn to_policy(&self) -> Result<RetryPolicy> {
        let base_delay = Duration::try_from_secs_f64(self.base_delay_secs.max(0.0))
            .with_context(|| {
                format!("notify_retry.base_delay_secs is out of range: {}", self.base_delay_secs)
            })?;
        Ok(RetryPolicy::bounded(
            self.max_attempts,
            base_delay,
            Duration::from_secs(self.max_delay_secs),
        ))
    }
}

/// Global configuration loaded from `~/.config/seedpush/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedpushConfig {
    /// Port the HTTP surface listens on.
    pub listen_port: u16,
    /// Public base URI of the app; notification icons are served below it.
    pub base_uri: String,
    /// Reconciliation interval in milliseconds.
    pub sync_interval_ms: u64,
    /// Job snapshot file (None = `~/.local/state/seedpush/jobs.json`).
    pub state_file: Option<PathBuf>,
    /// VAPID key file (None = `~/.local/state/seedpush/vapid.json`).
    pub vapid_file: Option<PathBuf>,
    /// `sub` claim of the VAPID signature.
    pub vapid_subject: String,
    /// How long push services keep an undelivered notice, in seconds.
    pub notification_ttl_secs: u64,
    pub rpc: RpcConfig,
    pub notify_retry: Option<NotifyRetryConfig>,
}

impl Default for SeedpushConfig {
    fn default() -> Self {
        Self {
            listen_port: 8080,
            base_uri: "http://localhost:8080".to_string(),
            sync_interval_ms: 1000,
            state_file: None,
            vapid_file: None,
            vapid_subject: "mailto:example@example.com".to_string(),
            notification_ttl_secs: 60 * 60 * 24,
            rpc: RpcConfig::default(),
            notify_retry: None,
        }
    }
}

impl SeedpushConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms.max(1))
    }

    pub fn notification_ttl(&self) -> Duration {
        Duration::from_secs(self.notification_ttl_secs)
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        match &self.notify_retry {
            Some(retry) => retry.to_policy(),
            None => Ok(RetryPolicy::default()),
        }
    }

    pub fn state_file_path(&self) -> Result<PathBuf> {
        match &self.state_file {
            Some(p) => Ok(p.clone()),
            None => Ok(state_dir()?.join("jobs.json")),
        }
    }

    pub fn vapid_file_path(&self) -> Result<PathBuf> {
        match &self.vapid_file {
            Some(p) => Ok(p.clone()),
            None => Ok(state_dir()?.join("vapid.json")),
        }
    }

    /// Apply the deployment's environment variables on top of the file config.
    /// `lookup` is `std::env::var(..).ok()` in production.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = get("TRANSMISSION_RPC_HOST") {
            self.rpc.host = v;
        }
        if let Some(v) = get("TRANSMISSION_RPC_USER") {
            self.rpc.user = Some(v);
        }
        if let Some(v) = get("TRANSMISSION_RPC_PASS") {
            self.rpc.pass = Some(v);
        }
        if let Some(v) = get("TRANSMISSION_RPC_TLS") {
            self.rpc.tls = v != "0" && v != "false";
        }
        if let Some(v) = get("TRANSMISSION_RPC_PORT") {
            self.rpc.port = v
                .parse()
                .with_context(|| format!("TRANSMISSION_RPC_PORT is not a port: {v}"))?;
        }
        if let Some(v) = get("LISTEN_PORT") {
            self.listen_port = v
                .parse()
                .with_context(|| format!("LISTEN_PORT is not a port: {v}"))?;
        }
        if let Some(v) = get("BASE_URI") {
            self.base_uri = v;
        }
        Ok(())
    }
}

fn state_dir() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("seedpush")?;
    Ok(xdg_dirs.get_state_home().join("seedpush"))
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("seedpush")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<SeedpushConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = SeedpushConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: SeedpushConfig =
        toml::from_str(&data).with_context(|| format!("parse config: {}", path.display()))?;
    Ok(cfg)
}
