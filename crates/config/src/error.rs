//! Configuration errors. All of them are fatal at startup (exit code 1).

use thiserror::Error;

/// Errors raised while building or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A port value is unusable.
    #[error("invalid port: {0}")]
    InvalidPort(String),

    /// The P2P and API ports collide.
    #[error("p2p and api ports must differ (both {0})")]
    PortCollision(u16),

    /// A bootstrap peer is not `host:port`.
    #[error("invalid bootstrap peer '{0}': expected host:port")]
    InvalidBootstrapPeer(String),

    /// An environment variable held an unparseable value.
    #[error("invalid value for {name}: {value}")]
    InvalidEnvValue {
        /// The variable name.
        name: &'static str,
        /// The offending value.
        value: String,
    },

    /// The data directory could not be prepared.
    #[error("data directory {path}: {source}")]
    DataDir {
        /// The configured path.
        path: String,
        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
