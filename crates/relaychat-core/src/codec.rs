//! Private message codec
//!
//! Sealed-box encryption to a peer's X25519 public key: an ephemeral key pair
//! per message, HKDF-SHA256 over the shared secret, ChaCha20-Poly1305 with a
//! random nonce. Wire form is base64 of `ephemeral_public || nonce || ciphertext`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::errors::{CryptoError, Result};
use crate::keys::{KeyExchangeService, PUBLIC_KEY_LEN};
use crate::types::Peer;

/// HKDF info string binding derived keys to this protocol
const HKDF_INFO: &[u8] = b"relaychat-pm-sealed-box-v1";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Stateless encryptor/decryptor for `pm_message` payloads
pub struct MessageCodec;

impl MessageCodec {
    /// Encrypt `plaintext` for `peer` using its cached public key
    ///
    /// Fails with `NoKeyAvailable` when the key has not been received yet. The
    /// caller must not queue the message.
    pub fn encrypt(plaintext: &str, peer: &Peer, keys: &KeyExchangeService) -> Result<String> {
        let recipient = keys
            .peer_key(peer)
            .ok_or_else(|| CryptoError::NoKeyAvailable { peer: peer.clone() })?;
        Ok(Self::seal(plaintext.as_bytes(), recipient)?)
    }

    /// Decrypt a `pm_message` ciphertext with the local private key
    ///
    /// Every failure collapses to `DecryptionFailed`.
    pub fn decrypt(ciphertext: &str, keys: &KeyExchangeService) -> Result<String> {
        let local = keys
            .local_key_pair()
            .ok_or(CryptoError::DecryptionFailed)?;
        let bytes = Self::open(ciphertext, local.secret())?;
        String::from_utf8(bytes).map_err(|_| CryptoError::DecryptionFailed.into())
    }

    /// Seal raw bytes to `recipient`, returning the base64 wire form
    pub fn seal(
        plaintext: &[u8],
        recipient: &PublicKey,
    ) -> core::result::Result<String, CryptoError> {
        let mut ephemeral_seed = [0u8; 32];
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut ephemeral_seed)
            .and_then(|_| OsRng.try_fill_bytes(&mut nonce_bytes))
            .map_err(|e| CryptoError::CryptoUnavailable {
                reason: format!("no usable randomness source: {}", e),
            })?;

        let ephemeral_secret = StaticSecret::from(ephemeral_seed);
        ephemeral_seed.fill(0);
        let ephemeral_public = PublicKey::from(&ephemeral_secret);
        let shared = ephemeral_secret.diffie_hellman(recipient);

        let cipher = derive_cipher(shared.as_bytes()).ok_or(CryptoError::EncryptionFailed)?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut sealed = Vec::with_capacity(PUBLIC_KEY_LEN + NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(ephemeral_public.as_bytes());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    /// Open a base64 sealed box with `secret`
    pub fn open(encoded: &str, secret: &StaticSecret) -> core::result::Result<Vec<u8>, CryptoError> {
        let data = STANDARD
            .decode(encoded.trim())
            .map_err(|_| CryptoError::DecryptionFailed)?;
        if data.len() < PUBLIC_KEY_LEN + NONCE_LEN + TAG_LEN {
            return Err(CryptoError::DecryptionFailed);
        }

        let (ephemeral, rest) = data.split_at(PUBLIC_KEY_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let mut ephemeral_bytes = [0u8; PUBLIC_KEY_LEN];
        ephemeral_bytes.copy_from_slice(ephemeral);
        let shared = secret.diffie_hellman(&PublicKey::from(ephemeral_bytes));

        let cipher = derive_cipher(shared.as_bytes()).ok_or(CryptoError::DecryptionFailed)?;
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

fn derive_cipher(shared_secret: &[u8]) -> Option<ChaCha20Poly1305> {
    let hk = Hkdf::<Sha256>::new(None, shared_secret);
    let mut key = [0u8; 32];
    hk.expand(HKDF_INFO, &mut key).ok()?;
    let cipher = ChaCha20Poly1305::new_from_slice(&key).ok();
    key.fill(0);
    cipher
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
