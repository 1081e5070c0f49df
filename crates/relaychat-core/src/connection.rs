//! Connection bookkeeping
//!
//! The sans-IO half of the connection manager: reconnect backoff, the
//! single-pending-reconnect guard and heartbeat liveness. The runtime owns the
//! socket and the timers and feeds every transition through [`ConnectionState`].

use core::time::Duration;
use std::time::Instant;

use tracing::{debug, warn};

use crate::config::{ConnectionConfig, MissedPongPolicy};

/// Normal closure
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint going away
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close frame without a status code
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Connection dropped without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Whether `code` ends the connection on purpose (no reconnect)
pub fn is_clean_close(code: u16) -> bool {
    code == CLOSE_NORMAL || code == CLOSE_GOING_AWAY
}

// ----------------------------------------------------------------------------
// Reconnect Policy
// ----------------------------------------------------------------------------

/// Capped exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(config.base_reconnect_delay(), config.max_reconnect_delay())
    }

    /// `min(base * 2^attempts, max)`
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let factor = 1u32.checked_shl(attempts).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

// ----------------------------------------------------------------------------
// Connection State
// ----------------------------------------------------------------------------

/// Where the single socket currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// What the runtime should do after the socket closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Schedule a reconnect
    Reconnect,
    /// Stay closed
    Stop,
}

/// A reconnect attempt that was just scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledReconnect {
    /// 1-based attempt number
    pub attempt: u32,
    pub delay: Duration,
}

/// Reconnect and heartbeat state of the one relay connection
#[derive(Debug, Clone)]
pub struct ConnectionState {
    policy: ReconnectPolicy,
    pong_timeout: Duration,
    missed_pong_policy: MissedPongPolicy,
    phase: ConnectionPhase,
    reconnect_attempts: u32,
    is_reconnecting: bool,
    last_heartbeat_at: Option<Instant>,
    awaiting_pong_since: Option<Instant>,
    closed_by_user: bool,
}

impl ConnectionState {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            policy: ReconnectPolicy::from_config(config),
            pong_timeout: config.pong_timeout(),
            missed_pong_policy: config.missed_pong_policy,
            phase: ConnectionPhase::Idle,
            reconnect_attempts: 0,
            is_reconnecting: false,
            last_heartbeat_at: None,
            awaiting_pong_since: None,
            closed_by_user: false,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn is_open(&self) -> bool {
        self.phase == ConnectionPhase::Open
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn is_reconnecting(&self) -> bool {
        self.is_reconnecting
    }

    pub fn closed_by_user(&self) -> bool {
        self.closed_by_user
    }

    pub fn last_heartbeat_at(&self) -> Option<Instant> {
        self.last_heartbeat_at
    }

    // --- Transport Lifecycle ---

    pub fn on_connecting(&mut self) {
        self.phase = ConnectionPhase::Connecting;
    }

    /// The socket opened: reset backoff and start liveness tracking
    pub fn on_open(&mut self, now: Instant) {
        self.phase = ConnectionPhase::Open;
        self.reconnect_attempts = 0;
        self.is_reconnecting = false;
        self.last_heartbeat_at = Some(now);
        self.awaiting_pong_since = None;
    }

    /// The socket closed with `code` (or failed to open)
    pub fn on_close(&mut self, code: u16) -> CloseAction {
        self.phase = ConnectionPhase::Closed;
        self.awaiting_pong_since = None;
        if self.closed_by_user || is_clean_close(code) {
            debug!(code, "Connection closed cleanly");
            CloseAction::Stop
        } else {
            debug!(code, "Connection closed abnormally");
            CloseAction::Reconnect
        }
    }

    /// The user asked to close; suppresses every later reconnect
    pub fn on_user_close(&mut self) {
        self.closed_by_user = true;
        self.is_reconnecting = false;
        self.awaiting_pong_since = None;
        self.phase = ConnectionPhase::Closed;
    }

    /// Schedule the next reconnect unless one is already pending
    ///
    /// The attempt counter is bumped now, before the timer fires.
    pub fn schedule_reconnect(&mut self) -> Option<ScheduledReconnect> {
        if self.closed_by_user || self.is_reconnecting {
            return None;
        }
        self.is_reconnecting = true;
        let delay = self.policy.delay_for(self.reconnect_attempts);
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
        debug!(
            attempt = self.reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduled reconnect"
        );
        Some(ScheduledReconnect {
            attempt: self.reconnect_attempts,
            delay,
        })
    }

    /// The reconnect timer fired; a new connect attempt starts
    pub fn on_reconnect_timer(&mut self) {
        self.is_reconnecting = false;
        self.phase = ConnectionPhase::Connecting;
    }

    // --- Heartbeat ---

    /// A heartbeat tick. Returns true when a ping should be sent.
    pub fn on_heartbeat_tick(&mut self, now: Instant) -> bool {
        if !self.is_open() {
            return false;
        }
        if self.awaiting_pong_since.is_none() {
            self.awaiting_pong_since = Some(now);
        }
        true
    }

    /// Any ping or pong from the relay proves the link is alive
    pub fn on_liveness(&mut self, now: Instant) {
        self.last_heartbeat_at = Some(now);
        self.awaiting_pong_since = None;
    }

    /// When the outstanding ping times out, if one is outstanding
    pub fn pong_deadline(&self) -> Option<Instant> {
        self.awaiting_pong_since.map(|sent| sent + self.pong_timeout)
    }

    /// The pong deadline passed; the policy decides what happens next
    pub fn on_pong_timeout(&mut self) -> MissedPongPolicy {
        self.awaiting_pong_since = None;
        warn!(
            timeout_ms = self.pong_timeout.as_millis() as u64,
            "No pong received within timeout"
        );
        self.missed_pong_policy
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
