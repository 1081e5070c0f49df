//! Centralized Configuration Management
//!
//! All tunables of the session layer: transport resilience (backoff, heartbeat),
//! PM session policy, and channel buffer sizes. Durations are stored as
//! milliseconds so the structures stay friendly to TOML and environment overrides.

use core::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{RelaychatError, Result};

// ----------------------------------------------------------------------------
// Connection Configuration
// ----------------------------------------------------------------------------

/// What to do when a heartbeat ping goes unanswered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissedPongPolicy {
    /// Log a liveness warning and keep the socket
    #[default]
    Warn,
    /// Drop the socket and go through the reconnect path
    Reconnect,
}

/// Configuration for the single relay connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// WebSocket endpoint of the relay (`ws://` or `wss://`)
    pub url: String,
    /// Maximum time to wait for the WebSocket handshake
    pub connect_timeout_ms: u64,
    /// Delay before the first reconnect attempt
    pub base_reconnect_delay_ms: u64,
    /// Upper bound for the reconnect delay
    pub max_reconnect_delay_ms: u64,
    /// Interval between heartbeat pings
    pub heartbeat_interval_ms: u64,
    /// How long to wait for a pong after each ping
    pub pong_timeout_ms: u64,
    pub missed_pong_policy: MissedPongPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8118/ws".to_string(),
            connect_timeout_ms: 10_000,
            base_reconnect_delay_ms: 1_000,
            max_reconnect_delay_ms: 30_000,
            heartbeat_interval_ms: 30_000,
            pong_timeout_ms: 10_000,
            missed_pong_policy: MissedPongPolicy::Warn,
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn base_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.base_reconnect_delay_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }

    /// Build the authenticated endpoint URL (`?token=...`)
    pub fn endpoint_with_token(&self, token: &str) -> Result<Url> {
        let mut url = Url::parse(&self.url).map_err(|_| {
            RelaychatError::Transport(crate::errors::TransportError::InvalidUrl {
                url: self.url.clone(),
            })
        })?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }

    /// Check the connection settings for consistency
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url)
            .map_err(|e| RelaychatError::config_error(format!("invalid url {}: {}", self.url, e)))?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(RelaychatError::config_error(format!(
                "url scheme must be ws or wss, got {}",
                url.scheme()
            )));
        }
        if self.base_reconnect_delay_ms == 0 {
            return Err(RelaychatError::config_error(
                "base_reconnect_delay_ms must be greater than zero",
            ));
        }
        if self.base_reconnect_delay_ms > self.max_reconnect_delay_ms {
            return Err(RelaychatError::config_error(
                "base_reconnect_delay_ms must not exceed max_reconnect_delay_ms",
            ));
        }
        if self.heartbeat_interval_ms == 0 || self.pong_timeout_ms == 0 {
            return Err(RelaychatError::config_error(
                "heartbeat_interval_ms and pong_timeout_ms must be greater than zero",
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Policy knobs for private-messaging sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Master switch for private messaging
    pub private_messaging: bool,
    /// Lifetime of the accept/decline prompt shown for an inbound invite
    pub invite_prompt_timeout_ms: u64,
    /// Send `pm_decline` when an invite prompt expires unanswered
    pub decline_on_prompt_expiry: bool,
    /// Keep a read-only session after the peer disconnects instead of deleting it
    pub retain_disconnected_sessions: bool,
    /// Re-send pending invites and missing key requests after every reconnect
    pub resume_handshakes_on_reconnect: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            private_messaging: true,
            invite_prompt_timeout_ms: 15_000,
            decline_on_prompt_expiry: false,
            retain_disconnected_sessions: false,
            resume_handshakes_on_reconnect: false,
        }
    }
}

impl SessionConfig {
    pub fn invite_prompt_timeout(&self) -> Duration {
        Duration::from_millis(self.invite_prompt_timeout_ms)
    }
}

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the channels between the runtime and presentation layers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Buffer size for Command channels (UI → runtime)
    pub command_buffer_size: usize,
    /// Buffer size for AppEvent channels (runtime → UI)
    pub app_event_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32,
            app_event_buffer_size: 128,
        }
    }
}

// ----------------------------------------------------------------------------
// Client Configuration
// ----------------------------------------------------------------------------

/// Complete configuration of one client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub connection: ConnectionConfig,
    pub session: SessionConfig,
    pub channels: ChannelConfig,
}

impl ClientConfig {
    /// Short delays for tests against a local relay
    pub fn testing(url: &str) -> Self {
        Self {
            connection: ConnectionConfig {
                url: url.to_string(),
                connect_timeout_ms: 2_000,
                base_reconnect_delay_ms: 50,
                max_reconnect_delay_ms: 400,
                heartbeat_interval_ms: 200,
                pong_timeout_ms: 100,
                missed_pong_policy: MissedPongPolicy::Warn,
            },
            session: SessionConfig {
                invite_prompt_timeout_ms: 500,
                ..SessionConfig::default()
            },
            channels: ChannelConfig {
                command_buffer_size: 10,
                app_event_buffer_size: 256,
            },
        }
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<()> {
        self.connection.validate()?;
        if self.channels.command_buffer_size == 0 || self.channels.app_event_buffer_size == 0 {
            return Err(RelaychatError::config_error(
                "channel buffer sizes must be greater than zero",
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
