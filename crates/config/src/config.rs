//! The node configuration value.

use crate::{ConfigError, ConfigResult};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding the data directory.
pub const ENV_DATA_DIR: &str = "AXIOM_DATA_DIR";
/// Environment variable enabling the shared test keypair.
pub const ENV_SHARED_KEYS: &str = "AXIOM_SHARED_KEYS";
/// Environment variable gating the debug control surface.
pub const ENV_DEBUG: &str = "AXIOM_DEBUG";
/// Environment variable feeding the tracing filter.
pub const ENV_LOG_LEVEL: &str = "AXIOM_LOG_LEVEL";

/// Complete, immutable node configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Interface both listeners bind to.
    pub host: String,
    /// P2P listen port.
    pub p2p_port: u16,
    /// HTTP API listen port.
    pub api_port: u16,
    /// Bootstrap peer addresses (`host:port`), dialed at startup.
    pub bootstrap_peers: Vec<String>,
    /// Directory holding `ledger.db`, `identity.pem` and `tls/`.
    pub data_dir: PathBuf,
    /// Node key file; defaults to `<data_dir>/identity.pem`.
    pub identity_path: PathBuf,
    /// Test-only: every node derives the same deterministic keypair.
    pub shared_keys: bool,
    /// Enables `/debug/*` HTTP endpoints.
    pub debug: bool,
}

impl Config {
    /// Builds a config from already-parsed CLI values, then overlays the
    /// `AXIOM_*` environment and validates.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        host: String,
        p2p_port: u16,
        api_port: u16,
        bootstrap_peers: Vec<String>,
        data_dir: Option<PathBuf>,
        identity_path: Option<PathBuf>,
        shared_keys: bool,
    ) -> ConfigResult<Self> {
        let mut config = Self {
            host,
            p2p_port,
            api_port,
            bootstrap_peers,
            data_dir: data_dir.unwrap_or_else(|| PathBuf::from("./axiom-data")),
            identity_path: PathBuf::new(),
            shared_keys,
            debug: false,
        };
        config.apply_env()?;
        if let Some(path) = identity_path {
            config.identity_path = path;
        } else if config.identity_path.as_os_str().is_empty() {
            config.identity_path = config.data_dir.join("identity.pem");
        }
        config.validate()?;
        debug!(?config, "configuration resolved");
        Ok(config)
    }

    /// Overlays `AXIOM_DATA_DIR`, `AXIOM_SHARED_KEYS` and `AXIOM_DEBUG`.
    fn apply_env(&mut self) -> ConfigResult<()> {
        if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            if !dir.is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(value) = std::env::var(ENV_SHARED_KEYS) {
            self.shared_keys = parse_bool(ENV_SHARED_KEYS, &value)? || self.shared_keys;
        }
        if let Ok(value) = std::env::var(ENV_DEBUG) {
            self.debug = parse_bool(ENV_DEBUG, &value)?;
        }
        Ok(())
    }

    /// Checks internal consistency. Violations are fatal at startup.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.p2p_port == 0 {
            return Err(ConfigError::InvalidPort("p2p port is 0".into()));
        }
        if self.api_port == 0 {
            return Err(ConfigError::InvalidPort("api port is 0".into()));
        }
        if self.p2p_port == self.api_port {
            return Err(ConfigError::PortCollision(self.p2p_port));
        }
        for peer in &self.bootstrap_peers {
            let valid = peer
                .rsplit_once(':')
                .map(|(h, p)| !h.is_empty() && p.parse::<u16>().is_ok())
                .unwrap_or(false);
            if !valid {
                return Err(ConfigError::InvalidBootstrapPeer(peer.clone()));
            }
        }
        Ok(())
    }

    /// Creates the data directory tree.
    pub fn prepare_data_dir(&self) -> ConfigResult<()> {
        std::fs::create_dir_all(&self.data_dir).map_err(|e| ConfigError::DataDir {
            path: self.data_dir.display().to_string(),
            source: e,
        })
    }

    /// `host:p2p_port`, the P2P bind and advertised address.
    pub fn p2p_addr(&self) -> String {
        format!("{}:{}", self.host, self.p2p_port)
    }

    /// `host:api_port`, the HTTP bind address.
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.host, self.api_port)
    }

    /// Path of the ledger database.
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("ledger.db")
    }

    /// Directory of the transport certificate pair.
    pub fn tls_dir(&self) -> PathBuf {
        self.data_dir.join("tls")
    }

    /// Path of the node key file.
    pub fn identity_path(&self) -> &Path {
        &self.identity_path
    }
}

fn parse_bool(name: &'static str, value: &str) -> ConfigResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(ConfigError::InvalidEnvValue {
            name,
            value: other.to_string(),
        }),
    }
}
