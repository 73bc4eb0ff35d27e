//! Configuration system for Pulse.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $PULSE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/pulse/config.toml
//!   3. ~/.config/pulse/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub registry: RegistryConfig,
    pub tls: TlsConfig,
    pub liveness: LivenessConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// TCP port agents connect to.
    #[serde(alias = "registryPort")]
    pub port: u16,
    /// Address the registry listener binds to.
    pub bind_addr: String,
    /// Longest accepted packet line. Longer lines are discarded.
    pub max_frame_bytes: usize,
    /// Listener setup failures halt the daemon when true; otherwise they are
    /// logged and the registry keeps running without a listener. `None`
    /// when the config file leaves it out.
    #[serde(alias = "makeServerThrow", default, skip_serializing_if = "Option::is_none")]
    pub make_server_throw: Option<bool>,
}

impl RegistryConfig {
    /// Effective setting. Unset means setup failures are fatal.
    pub fn make_server_throw(&self) -> bool {
        self.make_server_throw.unwrap_or(DEFAULT_MAKE_SERVER_THROW)
    }
}

/// Mutual TLS material. All three paths set = TLS listener; none = plain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// PEM server certificate chain.
    #[serde(alias = "certFile")]
    pub cert_file: Option<PathBuf>,
    /// PEM private key for `cert_file`.
    #[serde(alias = "certKeyFile")]
    pub cert_key_file: Option<PathBuf>,
    /// PEM bundle of CAs that client certificates must chain to.
    pub ca: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Tolerance added to each record's update interval before it is
    /// considered stale.
    pub grace_period_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    /// Loopback port for the operator API.
    pub port: u16,
}

/// Which listener variant the config selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSelection {
    Plain,
    MutualTls {
        cert_file: PathBuf,
        cert_key_file: PathBuf,
        ca: PathBuf,
    },
}

// ── Defaults ──────────────────────────────────────────────────────────────────

pub const DEFAULT_REGISTRY_PORT: u16 = 9150;
pub const DEFAULT_API_PORT: u16 = 9151;
pub const DEFAULT_GRACE_PERIOD_SECS: f64 = 1.5;
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;
pub const DEFAULT_MAKE_SERVER_THROW: bool = true;

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_REGISTRY_PORT,
            bind_addr: "0.0.0.0".to_string(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            make_server_throw: Some(DEFAULT_MAKE_SERVER_THROW),
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: DEFAULT_API_PORT,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("pulse")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("tls needs cert_file, cert_key_file and ca together; missing {0}")]
    IncompleteTls(&'static str),
    #[error("liveness.grace_period_secs must be a non-negative number, got {0}")]
    InvalidGracePeriod(f64),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl PulseConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::file_path())?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Read `path`, or defaults if it does not exist. A file that exists but
    /// can't be read or parsed is an error, never a silent fall back.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(PulseConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("PULSE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&PulseConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Pick the listener variant. A partial TLS block is an error rather
    /// than a silent fall back to plain.
    pub fn transport(&self) -> Result<TransportSelection, ConfigError> {
        let tls = &self.tls;
        match (&tls.cert_file, &tls.cert_key_file, &tls.ca) {
            (None, None, None) => Ok(TransportSelection::Plain),
            (Some(cert), Some(key), Some(ca)) => Ok(TransportSelection::MutualTls {
                cert_file: cert.clone(),
                cert_key_file: key.clone(),
                ca: ca.clone(),
            }),
            (None, _, _) => Err(ConfigError::IncompleteTls("cert_file")),
            (_, None, _) => Err(ConfigError::IncompleteTls("cert_key_file")),
            (_, _, None) => Err(ConfigError::IncompleteTls("ca")),
        }
    }

    /// Check values that parse fine but make no sense.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let grace = self.liveness.grace_period_secs;
        if !grace.is_finite() || grace < 0.0 {
            return Err(ConfigError::InvalidGracePeriod(grace));
        }
        self.transport().map(|_| ())
    }

    /// Apply PULSE_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PULSE_REGISTRY__PORT") {
            if let Ok(p) = v.parse() {
                self.registry.port = p;
            }
        }
        if let Ok(v) = std::env::var("PULSE_REGISTRY__BIND_ADDR") {
            self.registry.bind_addr = v;
        }
        if let Ok(v) = std::env::var("PULSE_REGISTRY__MAKE_SERVER_THROW") {
            self.registry.make_server_throw = Some(v == "true" || v == "1");
        }
        if let Ok(v) = std::env::var("PULSE_TLS__CERT_FILE") {
            self.tls.cert_file = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("PULSE_TLS__CERT_KEY_FILE") {
            self.tls.cert_key_file = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("PULSE_TLS__CA") {
            self.tls.ca = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("PULSE_API__PORT") {
            if let Ok(p) = v.parse() {
                self.api.port = p;
            }
        }
        if let Ok(v) = std::env::var("PULSE_API__ENABLED") {
            self.api.enabled = v == "true" || v == "1";
        }
    }
}
