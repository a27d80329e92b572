//! Chatgate CLI entry point

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use chatgate_cli::{
    cli::Cli,
    commands::CommandDispatcher,
    error::Result,
    GateConfig, ReconnectPolicy, SessionRegistry, UnavailableTransport,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = build_config(&cli);

    // This host ships without a real messaging transport; every session runs
    // the simulated fallback. Embedders wire their own TransportClient in.
    let registry = SessionRegistry::new(Arc::new(UnavailableTransport), config)?;
    info!("chatgate registry ready");

    CommandDispatcher::execute(cli.command, &registry).await?;

    registry.shutdown().await;
    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Apply command-line overrides onto the default configuration
fn build_config(cli: &Cli) -> GateConfig {
    let mut config = GateConfig::default();
    if let Some(grace) = cli.grace {
        config.simulated_grace = Duration::from_secs(grace);
    }
    if let Some(timeout) = cli.qr_timeout {
        config.qr_wait_timeout = Duration::from_secs(timeout);
    }
    if let Some(delay) = cli.reconnect {
        config.reconnect = ReconnectPolicy::FixedDelay {
            delay: Duration::from_secs(delay),
        };
    }
    if let Some(capacity) = cli.ring_capacity {
        config.ring_capacity = capacity;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_timing_contract() {
        let cli = Cli::parse_from([
            "chatgate",
            "--grace",
            "2",
            "--qr-timeout",
            "7",
            "--reconnect",
            "9",
            "--ring-capacity",
            "50",
            "info",
        ]);
        let config = build_config(&cli);
        assert_eq!(config.simulated_grace, Duration::from_secs(2));
        assert_eq!(config.qr_wait_timeout, Duration::from_secs(7));
        assert_eq!(
            config.reconnect,
            ReconnectPolicy::FixedDelay {
                delay: Duration::from_secs(9)
            }
        );
        assert_eq!(config.ring_capacity, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_without_flags() {
        let cli = Cli::parse_from(["chatgate", "info"]);
        assert_eq!(build_config(&cli), GateConfig::default());
    }
}
