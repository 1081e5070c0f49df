//! Relaychat CLI Configuration Management
//!
//! Configuration is layered with figment, lowest priority first:
//! - built-in defaults
//! - `~/.config/relaychat/config.toml`, then `relaychat.toml` in the working
//!   directory (or only the file given with `--config`)
//! - `RELAYCHAT_*` environment variables, `__` separating sections
//!   (`RELAYCHAT_CONNECTION__URL`)
//! - command line flags

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use relaychat_core::{ChannelConfig, ClientConfig, ConnectionConfig, SessionConfig};
use serde::{Deserialize, Serialize};

use crate::cli::Cli;

/// File looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "relaychat.toml";

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the relaychat CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliAppConfig {
    pub identity: IdentityConfig,
    pub cli: CliConfig,
    pub connection: ConnectionConfig,
    pub session: SessionConfig,
    pub channels: ChannelConfig,
}

/// Who we are on the relay
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Login token appended to the endpoint URL
    pub token: Option<String>,
    /// Name the relay derives from the token; defaults to the token itself
    pub username: Option<String>,
}

/// Terminal presentation options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub verbose: bool,
    /// Show peer key fingerprints when keys are exchanged
    pub show_fingerprints: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            show_fingerprints: true,
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl CliAppConfig {
    /// Load configuration for the given command line
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        figment = match &cli.config {
            Some(path) => {
                if !Path::new(path).is_file() {
                    return Err(ConfigError::FileSystem(format!(
                        "Configuration file not found: {}",
                        path
                    )));
                }
                figment.merge(Toml::file(path))
            }
            None => {
                if let Some(user_config) = Self::default_config_path() {
                    figment = figment.merge(Toml::file(user_config));
                }
                figment.merge(Toml::file(CONFIG_FILE_NAME))
            }
        };

        figment = figment.merge(Env::prefixed("RELAYCHAT_").split("__"));

        // Command line overrides
        if let Some(url) = &cli.url {
            figment = figment.merge(("connection.url", url));
        }
        if let Some(token) = &cli.token {
            figment = figment.merge(("identity.token", token));
        }
        if let Some(username) = &cli.username {
            figment = figment.merge(("identity.username", username));
        }
        if cli.verbose {
            figment = figment.merge(("cli.verbose", true));
        }

        let config: CliAppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// `~/.config/relaychat/config.toml` (platform equivalent elsewhere)
    fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("relaychat").join("config.toml"))
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(token) = &self.identity.token {
            if token.trim().is_empty() {
                return Err(ConfigError::Validation("Token must not be empty".to_string()));
            }
        }
        self.client_config()
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))
    }

    /// The runtime configuration part
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            connection: self.connection.clone(),
            session: self.session.clone(),
            channels: self.channels.clone(),
        }
    }

    /// Username and token to log in with
    pub fn credentials(&self) -> Result<(String, String), ConfigError> {
        let token = self.identity.token.clone().ok_or_else(|| {
            ConfigError::Validation(
                "No token configured (use --token, identity.token or RELAYCHAT_IDENTITY__TOKEN)"
                    .to_string(),
            )
        })?;
        let username = self
            .identity
            .username
            .clone()
            .unwrap_or_else(|| token.clone());
        Ok((username, token))
    }

    /// Example configuration file content
    pub fn example_config() -> String {
        let example = CliAppConfig {
            identity: IdentityConfig {
                token: Some("alice".to_string()),
                username: Some("alice".to_string()),
            },
            ..Default::default()
        };
        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Failed to generate example config".to_string())
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("File system error: {0}")]
    FileSystem(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
