//! Fixed-length message sealing.
//!
//! Every envelope carries exactly [`MESSAGE_LENGTH`] bytes of plaintext under
//! XChaCha20-Poly1305, keyed by an X25519 exchange between a fresh ephemeral
//! key and the recipient's long-term encryption key. Cover traffic is sealed
//! the same way against a throwaway key, so without the recipient's secret the
//! two are indistinguishable.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::constants::{
    KDF_CONTEXT_MESSAGE_KEY, KEY_SIZE, MESSAGE_LENGTH, NONCE_SIZE, PADDING_BLOCK, PADDING_FILLER,
};
use crate::error::CryptoError;

pub type SymmetricKey = [u8; 32];

/// The public, encrypted part of a message envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedMessage {
    /// Ephemeral X25519 public key, hex
    pub encrypt: String,
    /// Nonce, base64
    pub iv: String,
    /// Ciphertext with tag, base64
    pub cipher: String,
}

/// A successfully opened message and the candidate key that opened it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedMessage<K> {
    pub recipient: K,
    pub message: String,
}

#[derive(Serialize)]
struct PaddedRef<'a> {
    m: &'a str,
    p: &'a str,
}

#[derive(Deserialize)]
struct Padded {
    m: String,
}

/// Seal `message` so that only the holder of `recipient`'s secret can open it.
pub fn pack_for(message: &str, recipient: &PublicKey) -> Result<SealedMessage, CryptoError> {
    let normalized = pad_message(message)?;
    seal(&normalized, recipient)
}

/// Seal random content against a discarded key (cover traffic).
pub fn pack_cover() -> Result<SealedMessage, CryptoError> {
    let discarded = PublicKey::from(&EphemeralSecret::random_from_rng(rand::rngs::OsRng));
    seal(&cover_content(), &discarded)
}

/// Try each candidate secret in order; the first that authenticates and yields
/// a well-formed padded message is the recipient.
///
/// `Ok(None)` means the message is not addressed to any candidate. Errors are
/// reserved for envelopes whose fields cannot be decoded at all.
pub fn unpack<'a, K>(
    sealed: &SealedMessage,
    candidates: impl IntoIterator<Item = (K, &'a StaticSecret)>,
) -> Result<Option<OpenedMessage<K>>, CryptoError> {
    let ephemeral = decode_public(&sealed.encrypt)?;
    let nonce = STANDARD
        .decode(&sealed.iv)
        .map_err(|e| CryptoError::InvalidEncoding(format!("iv: {e}")))?;
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidEncoding(format!(
            "iv of {} bytes",
            nonce.len()
        )));
    }
    let ciphertext = STANDARD
        .decode(&sealed.cipher)
        .map_err(|e| CryptoError::InvalidEncoding(format!("cipher: {e}")))?;

    for (recipient, secret) in candidates {
        let shared = secret.diffie_hellman(&ephemeral);
        if !shared.was_contributory() {
            continue;
        }
        let key = derive_message_key(shared.as_bytes(), &ephemeral);
        let Ok(plaintext) = decrypt(&key, &nonce, &ciphertext) else {
            continue;
        };
        if let Some(message) = unpad_message(&plaintext) {
            return Ok(Some(OpenedMessage { recipient, message }));
        }
    }
    Ok(None)
}

/// Wrap `message` as `{"m":…,"p":…}` of exactly `MESSAGE_LENGTH` bytes.
///
/// Padding is random hex in blocks of `PADDING_BLOCK`, topped up with
/// `PADDING_FILLER`.
pub fn pad_message(message: &str) -> Result<String, CryptoError> {
    let room = padding_room(message)?;

    let blocks = room / PADDING_BLOCK;
    let mut random = vec![0u8; blocks * PADDING_BLOCK / 2];
    rand::rngs::OsRng.fill_bytes(&mut random);
    let mut padding = hex::encode(random);
    while padding.len() < room {
        padding.push(PADDING_FILLER);
    }

    let normalized = serde_json::to_string(&PaddedRef {
        m: message,
        p: &padding,
    })
    .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;

    if normalized.len() != MESSAGE_LENGTH {
        return Err(CryptoError::InvalidPaddedLength {
            actual: normalized.len(),
            expected: MESSAGE_LENGTH,
        });
    }
    Ok(normalized)
}

/// Check that `message` fits the padded frame without building it.
pub fn check_fits(message: &str) -> Result<(), CryptoError> {
    padding_room(message).map(|_| ())
}

/// `MESSAGE_LENGTH` random hex characters
pub fn cover_content() -> String {
    let mut random = vec![0u8; MESSAGE_LENGTH / 2];
    rand::rngs::OsRng.fill_bytes(&mut random);
    hex::encode(random)
}

fn padding_room(message: &str) -> Result<usize, CryptoError> {
    let bare = serde_json::to_string(&PaddedRef { m: message, p: "" })
        .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
    MESSAGE_LENGTH
        .checked_sub(bare.len())
        .ok_or(CryptoError::MessageTooLong {
            len: message.len(),
            max: MESSAGE_LENGTH - (bare.len() - message.len()),
        })
}

fn unpad_message(plaintext: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(plaintext).ok()?;
    serde_json::from_str::<Padded>(text).ok().map(|p| p.m)
}

fn seal(normalized: &str, recipient: &PublicKey) -> Result<SealedMessage, CryptoError> {
    if normalized.len() != MESSAGE_LENGTH {
        return Err(CryptoError::InvalidPaddedLength {
            actual: normalized.len(),
            expected: MESSAGE_LENGTH,
        });
    }

    let ephemeral = EphemeralSecret::random_from_rng(rand::rngs::OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient);
    let key = derive_message_key(shared.as_bytes(), &ephemeral_public);

    let nonce = generate_nonce();
    let ciphertext = XChaCha20Poly1305::new((&key).into())
        .encrypt(XNonce::from_slice(&nonce), normalized.as_bytes())
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok(SealedMessage {
        encrypt: hex::encode(ephemeral_public.as_bytes()),
        iv: STANDARD.encode(nonce),
        cipher: STANDARD.encode(ciphertext),
    })
}

fn decrypt(key: &SymmetricKey, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    XChaCha20Poly1305::new(key.into())
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

// BLAKE3 KDF over the DH output, bound to the ephemeral key
fn derive_message_key(shared_secret: &[u8], ephemeral: &PublicKey) -> SymmetricKey {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_MESSAGE_KEY);
    hasher.update(shared_secret);
    hasher.update(ephemeral.as_bytes());
    let hash = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&hash.as_bytes()[..32]);
    key
}

fn decode_public(value: &str) -> Result<PublicKey, CryptoError> {
    let bytes = hex::decode(value)
        .map_err(|e| CryptoError::InvalidEncoding(format!("encrypt: {e}")))?;
    let bytes: [u8; KEY_SIZE] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength)?;
    Ok(PublicKey::from(bytes))
}
