//! # Axiom
//!
//! Entry point of the Axiom node: a participant in the decentralized fact
//! ledger. Parses the CLI, resolves configuration, starts the runtime and
//! maps failures to the documented exit codes.

use anyhow::Result;
use axiom_config::{Config, ConfigError};
use axiom_node::Node;
use axiom_storage::StorageError;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit code for configuration problems.
const EXIT_CONFIG: u8 = 1;
/// Exit code for ledger invariant violations.
const EXIT_INVARIANT: u8 = 2;
/// Exit code for unrecoverable I/O.
const EXIT_IO: u8 = 3;

/// Axiom node - decentralized ledger of corroborated facts
#[derive(Parser, Debug)]
#[command(name = "axiom")]
#[command(version)]
#[command(about = "Run an Axiom fact-network node")]
struct Cli {
    /// P2P listen port
    #[arg(long)]
    p2p_port: u16,

    /// HTTP API listen port
    #[arg(long)]
    api_port: u16,

    /// Interface to bind both listeners to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Bootstrap peer address (host:port); repeatable
    #[arg(long = "bootstrap-peer")]
    bootstrap_peers: Vec<String>,

    /// Data directory (ledger, identity, TLS material)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Node key file; defaults to <data-dir>/identity.pem
    #[arg(long)]
    identity: Option<PathBuf>,

    /// Test-only: derive the shared deterministic keypair
    #[arg(long)]
    shared_keys: bool,
}

fn init_tracing() {
    let filter = std::env::var(axiom_config::config::ENV_LOG_LEVEL)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let config = match Config::build(
        cli.host,
        cli.p2p_port,
        cli.api_port,
        cli.bootstrap_peers,
        cli.data_dir,
        cli.identity,
        cli.shared_keys,
    ) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    info!(
        p2p = %config.p2p_addr(),
        api = %config.api_addr(),
        data_dir = %config.data_dir.display(),
        "starting axiom node v{}",
        axiom_node::VERSION
    );

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "node failed");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let node = Node::start(config).await?;
    node.run_until_signalled().await
}

/// Maps a failure to the documented exit codes: a corrupt ledger must not
/// be hidden behind a generic error.
fn exit_code_for(error: &anyhow::Error) -> u8 {
    for cause in error.chain() {
        if cause.downcast_ref::<ConfigError>().is_some() {
            return EXIT_CONFIG;
        }
        if let Some(storage) = cause.downcast_ref::<StorageError>() {
            return match storage {
                StorageError::InvariantViolation(_) => EXIT_INVARIANT,
                _ => EXIT_IO,
            };
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return EXIT_IO;
        }
    }
    EXIT_IO
}
