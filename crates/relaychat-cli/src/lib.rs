//! Relaychat CLI library
//!
//! Terminal presentation layer for the relaychat client: argument parsing,
//! layered configuration, line commands and event rendering.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod terminal_interface;

pub use cli::Cli;
pub use config::{CliAppConfig, ConfigError};
pub use error::{CliError, Result};
pub use terminal_interface::TerminalInterface;
