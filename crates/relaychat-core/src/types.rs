//! Core types for relaychat
//!
//! Peer identities, conversation log entries, key fingerprints and timestamps.

use core::fmt;
use core::ops::Deref;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{CryptoError, RelaychatError};

// ----------------------------------------------------------------------------
// Peer
// ----------------------------------------------------------------------------

/// Opaque identity of another chat user (their username)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Peer(String);

impl Peer {
    /// Create a new peer identity
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self(name.into())
    }

    /// Get the username
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Peer {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Peer {
    fn from(name: String) -> Self {
        Self(name)
    }
}

// ----------------------------------------------------------------------------
// Conversation Log
// ----------------------------------------------------------------------------

/// Author of an entry in a private conversation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Author {
    /// The local user
    #[serde(rename = "self")]
    Local,
    /// The remote peer
    Peer(Peer),
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Author::Local => f.write_str("self"),
            Author::Peer(peer) => write!(f, "{}", peer),
        }
    }
}

/// Text shown in place of a message that could not be decrypted
pub const DECRYPTION_FAILED_PLACEHOLDER: &str = "[Encrypted message - decryption failed]";

/// One entry in a private conversation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub author: Author,
    pub text: String,
    /// False when `text` is the decryption-failure placeholder
    pub decrypted: bool,
    pub timestamp: Timestamp,
}

impl LogEntry {
    /// Entry written by the local user
    pub fn local(text: String) -> Self {
        Self {
            author: Author::Local,
            text,
            decrypted: true,
            timestamp: Timestamp::now(),
        }
    }

    /// Successfully decrypted entry from a peer
    pub fn from_peer(peer: Peer, text: String) -> Self {
        Self {
            author: Author::Peer(peer),
            text,
            decrypted: true,
            timestamp: Timestamp::now(),
        }
    }

    /// Placeholder entry for a message from `peer` that failed to decrypt
    pub fn undecryptable(peer: Peer) -> Self {
        Self {
            author: Author::Peer(peer),
            text: DECRYPTION_FAILED_PLACEHOLDER.to_string(),
            decrypted: false,
            timestamp: Timestamp::now(),
        }
    }
}

// ----------------------------------------------------------------------------
// Fingerprint
// ----------------------------------------------------------------------------

/// SHA-256 fingerprint of a public key, for out-of-band comparison
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Create a new fingerprint from 32 bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Fingerprint of raw public key bytes
    pub fn of_key(key_bytes: &[u8]) -> Self {
        let digest = Sha256::digest(key_bytes);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short form shown to users (first 8 bytes as hex)
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Fingerprint {
    type Err = RelaychatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let clean_str = s.strip_prefix("0x").unwrap_or(s);

        let bytes = hex::decode(clean_str).map_err(|_| CryptoError::InvalidPublicKey {
            reason: "invalid hex in fingerprint".to_string(),
        })?;

        if bytes.len() != 32 {
            return Err(CryptoError::InvalidPublicKey {
                reason: "fingerprint must be exactly 32 bytes".to_string(),
            }
            .into());
        }

        let mut fingerprint = [0u8; 32];
        fingerprint.copy_from_slice(&bytes);
        Ok(Self(fingerprint))
    }
}

impl Deref for Fingerprint {
    type Target = [u8; 32];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a new timestamp
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as u64)
    }

    /// Get the raw milliseconds
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Get duration since another timestamp
    pub fn duration_since(&self, other: Self) -> core::time::Duration {
        core::time::Duration::from_millis(self.0.saturating_sub(other.0))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_author_serialization() {
        let local = serde_json::to_value(Author::Local).unwrap();
        assert_eq!(local, serde_json::json!("self"));

        let peer = serde_json::to_value(Author::Peer(Peer::new("alice"))).unwrap();
        assert_eq!(peer, serde_json::json!({ "peer": "alice" }));
    }

    #[test]
    fn test_fingerprint_roundtrip() {
        let fingerprint = Fingerprint::of_key(&[7u8; 32]);
        let parsed: Fingerprint = fingerprint.to_string().parse().unwrap();
        assert_eq!(parsed, fingerprint);
        assert_eq!(fingerprint.short().len(), 16);
    }

    #[test]
    fn test_fingerprint_rejects_wrong_length() {
        assert!("abcd".parse::<Fingerprint>().is_err());
        assert!("zz".parse::<Fingerprint>().is_err());
    }

    #[test]
    fn test_undecryptable_entry() {
        let entry = LogEntry::undecryptable(Peer::new("bob"));
        assert!(!entry.decrypted);
        assert_eq!(entry.text, DECRYPTION_FAILED_PLACEHOLDER);
        assert_eq!(entry.author, Author::Peer(Peer::new("bob")));
    }
}
