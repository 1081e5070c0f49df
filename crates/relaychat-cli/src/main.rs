//! Relaychat CLI entry point

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use relaychat_cli::{Cli, CliAppConfig, Result, TerminalInterface};
use relaychat_runtime::ClientBuilder;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", CliAppConfig::example_config());
        return Ok(());
    }

    let config = match CliAppConfig::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };
    setup_logging(config.cli.verbose);

    let (username, token) = config.credentials()?;
    info!(url = %config.connection.url, username = %username, "Starting relaychat");

    let handle = ClientBuilder::new(username, token)
        .with_config(config.client_config())
        .spawn()?;

    if let Err(e) = TerminalInterface::new(config.cli.clone(), handle)?.run().await {
        error!("Terminal session failed: {}", e);
        std::process::exit(1);
    }

    info!("Relaychat exited");
    Ok(())
}

/// Logging goes to stderr; `RUST_LOG` wins over `--verbose`
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
