//! Command-line interface definitions and parsing

use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Relay WebSocket endpoint (ws:// or wss://)
    #[arg(short, long)]
    pub url: Option<String>,

    /// Login token sent to the relay
    #[arg(short, long)]
    pub token: Option<String>,

    /// Name the relay knows you by (defaults to the token)
    #[arg(short = 'n', long)]
    pub username: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Print an example configuration file and exit
    #[arg(long)]
    pub print_config: bool,
}
