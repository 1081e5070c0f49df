//! Key exchange service
//!
//! Owns the local X25519 key pair and the cache of peers' public keys. Public
//! keys travel as base64 of the raw 32-byte key in `pubkey_response` frames;
//! the relay is trusted only to route them, never to vouch for them.

use core::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hashbrown::HashMap;
use rand_core::{OsRng, RngCore};
use tracing::{debug, info, warn};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::channel::{AppEvent, Outbound};
use crate::errors::{CryptoError, Result};
use crate::frame::Frame;
use crate::types::{Fingerprint, Peer};

/// Length of an encoded X25519 public key
pub const PUBLIC_KEY_LEN: usize = 32;

// ----------------------------------------------------------------------------
// Local Key Pair
// ----------------------------------------------------------------------------

/// The local asymmetric key pair, generated once per client session
pub struct LocalKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl LocalKeyPair {
    /// Generate a fresh key pair from the OS randomness source
    ///
    /// Fails with `CryptoUnavailable` when no randomness source can be used.
    pub fn generate() -> core::result::Result<Self, CryptoError> {
        let mut seed = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut seed)
            .map_err(|e| CryptoError::CryptoUnavailable {
                reason: format!("no usable randomness source: {}", e),
            })?;
        let secret = StaticSecret::from(seed);
        seed.fill(0);
        let public = PublicKey::from(&secret);
        Ok(Self { secret, public })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }

    /// Base64 encoding of the public key for `pubkey_response`
    pub fn export_public_key(&self) -> String {
        STANDARD.encode(self.public.as_bytes())
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_key(self.public.as_bytes())
    }
}

impl fmt::Debug for LocalKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalKeyPair")
            .field("fingerprint", &self.fingerprint().short())
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Key Exchange Service
// ----------------------------------------------------------------------------

/// Local key pair plus the lazily populated cache of peer public keys
#[derive(Debug)]
pub struct KeyExchangeService {
    /// False when private messaging is switched off by configuration
    enabled: bool,
    local: Option<LocalKeyPair>,
    peer_keys: HashMap<Peer, PublicKey>,
}

impl KeyExchangeService {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            local: None,
            peer_keys: HashMap::new(),
        }
    }

    /// Generate the local key pair unless one already exists
    pub fn ensure_local_key_pair(&mut self) -> Result<&LocalKeyPair> {
        if !self.enabled {
            return Err(CryptoError::CryptoUnavailable {
                reason: "private messaging disabled by configuration".to_string(),
            }
            .into());
        }
        if self.local.is_none() {
            let pair = LocalKeyPair::generate()?;
            info!(fingerprint = %pair.fingerprint().short(), "Generated local key pair");
            self.local = Some(pair);
        }
        self.local.as_ref().ok_or_else(|| CryptoError::NoLocalKeyPair.into())
    }

    pub fn local_key_pair(&self) -> Option<&LocalKeyPair> {
        self.local.as_ref()
    }

    /// Whether private messaging can work at all
    pub fn is_available(&self) -> bool {
        self.enabled && self.local.is_some()
    }

    /// Transmissible encoding of the local public key
    pub fn export_local_public_key(&self) -> Result<String> {
        self.local
            .as_ref()
            .map(LocalKeyPair::export_public_key)
            .ok_or_else(|| CryptoError::NoLocalKeyPair.into())
    }

    /// Decode a peer's public key from its transmissible encoding
    pub fn import_peer_public_key(encoded: &str) -> Result<PublicKey> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidPublicKey {
                reason: format!("invalid base64: {}", e),
            })?;
        let bytes: [u8; PUBLIC_KEY_LEN] =
            bytes
                .try_into()
                .map_err(|bytes: Vec<u8>| CryptoError::InvalidPublicKey {
                    reason: format!("expected {} bytes, got {}", PUBLIC_KEY_LEN, bytes.len()),
                })?;
        Ok(PublicKey::from(bytes))
    }

    pub fn peer_key(&self, peer: &Peer) -> Option<&PublicKey> {
        self.peer_keys.get(peer)
    }

    pub fn peer_fingerprint(&self, peer: &Peer) -> Option<Fingerprint> {
        self.peer_keys
            .get(peer)
            .map(|key| Fingerprint::of_key(key.as_bytes()))
    }

    /// Return the cached key for `peer`, or send a `pubkey_request` and return None
    ///
    /// The eventual `pubkey_response` fills the cache; nothing waits for it here.
    pub fn get_or_request_peer_key<O: Outbound>(
        &self,
        peer: &Peer,
        out: &mut O,
    ) -> Option<PublicKey> {
        if let Some(key) = self.peer_keys.get(peer) {
            return Some(*key);
        }
        self.request_peer_key(peer, out);
        None
    }

    /// Unconditionally ask `peer` for its public key
    pub fn request_peer_key<O: Outbound>(&self, peer: &Peer, out: &mut O) -> bool {
        debug!(peer = %peer, "Requesting public key");
        out.send_frame(Frame::pubkey_request(peer))
    }

    /// Answer a peer's `pubkey_request`
    ///
    /// Without a local key pair the request is dropped and the requester times out.
    pub fn handle_pubkey_request<O: Outbound>(&self, from: &Peer, out: &mut O) {
        match self.export_local_public_key() {
            Ok(public_key) => {
                debug!(peer = %from, "Answering public key request");
                out.send_frame(Frame::pubkey_response(from, public_key));
            }
            Err(_) => {
                debug!(peer = %from, "Dropping public key request: no local key pair");
            }
        }
    }

    /// Import and cache a peer's key from `pubkey_response`, replacing any prior key
    pub fn handle_pubkey_response<O: Outbound>(
        &mut self,
        from: &Peer,
        encoded: &str,
        out: &mut O,
    ) -> Result<Fingerprint> {
        let key = Self::import_peer_public_key(encoded).map_err(|e| {
            warn!(peer = %from, error = %e, "Rejected public key");
            e
        })?;
        let fingerprint = Fingerprint::of_key(key.as_bytes());
        if self.peer_keys.insert(from.clone(), key).is_some() {
            debug!(peer = %from, "Replaced cached public key");
        }
        info!(peer = %from, fingerprint = %fingerprint.short(), "Stored public key");
        out.emit(AppEvent::PeerKeyCached {
            peer: from.clone(),
            fingerprint: fingerprint.clone(),
        });
        Ok(fingerprint)
    }

    /// Drop every cached peer key (client teardown)
    pub fn clear_peer_keys(&mut self) {
        self.peer_keys.clear();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
