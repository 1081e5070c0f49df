//! Error types for the relaychat session layer
//!
//! This module contains all error types used throughout the core: cryptographic
//! errors, transport errors, session errors, frame decoding errors, and the main
//! RelaychatError type that unifies them all.

use crate::types::Peer;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Cryptographic error types
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// No usable randomness source or private messaging switched off.
    /// Callers treat this as "private messaging disabled", never as fatal.
    #[error("Cryptography unavailable: {reason}")]
    CryptoUnavailable { reason: String },
    #[error("No public key available for peer {peer}")]
    NoKeyAvailable { peer: Peer },
    #[error("No local key pair has been generated")]
    NoLocalKeyPair,
    #[error("Invalid public key: {reason}")]
    InvalidPublicKey { reason: String },
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
}

/// Transport error types
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Socket is not open")]
    NotConnected,
    #[error("Connection failed: {reason}")]
    ConnectFailed { reason: String },
    #[error("Invalid relay URL: {url}")]
    InvalidUrl { url: String },
    #[error("Connection closed with code {code}: {reason}")]
    Closed { code: u16, reason: String },
}

/// PM session error types
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No private session with {peer}")]
    SessionNotFound { peer: Peer },
    #[error("Private session with {peer} already exists")]
    SessionAlreadyExists { peer: Peer },
    #[error("Private session with {peer} is {actual}, expected {expected}")]
    InvalidState {
        peer: Peer,
        expected: String,
        actual: String,
    },
    #[error("Private messaging is disabled")]
    PrivateMessagingDisabled,
}

/// Inbound/outbound frame error types
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Malformed frame: {reason}")]
    Malformed { reason: String },
    #[error("Frame {kind} is missing field {field}")]
    MissingField { kind: String, field: &'static str },
    #[error("Frame serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ----------------------------------------------------------------------------
// Unified Error
// ----------------------------------------------------------------------------

/// Core error types for relaychat
#[derive(Debug, thiserror::Error)]
pub enum RelaychatError {
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Channel communication error between the runtime and its handles
    #[error("Channel error: {message}")]
    Channel { message: String },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl RelaychatError {
    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        RelaychatError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a channel error with a message
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        RelaychatError::Channel {
            message: message.into(),
        }
    }

    /// Create a malformed frame error
    pub fn malformed<T: Into<String>>(reason: T) -> Self {
        RelaychatError::Frame(FrameError::Malformed {
            reason: reason.into(),
        })
    }

    /// Create a session-not-found error
    pub fn session_not_found(peer: &Peer) -> Self {
        RelaychatError::Session(SessionError::SessionNotFound { peer: peer.clone() })
    }

    /// Create an invalid-state error
    pub fn invalid_state<E: Into<String>, A: Into<String>>(
        peer: &Peer,
        expected: E,
        actual: A,
    ) -> Self {
        RelaychatError::Session(SessionError::InvalidState {
            peer: peer.clone(),
            expected: expected.into(),
            actual: actual.into(),
        })
    }

    /// Whether this error means private messaging cannot work at all
    pub fn is_crypto_unavailable(&self) -> bool {
        matches!(
            self,
            RelaychatError::Crypto(CryptoError::CryptoUnavailable { .. })
                | RelaychatError::Session(SessionError::PrivateMessagingDisabled)
        )
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, RelaychatError>;
pub type RelaychatResult<T> = Result<T>;
