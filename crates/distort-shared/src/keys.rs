use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::constants::KEY_SIZE;
use crate::error::IdentityError;

/// Long-term X25519 key pair used to receive messages.
#[derive(Clone)]
pub struct EncryptionKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

/// Long-term Ed25519 key pair used to sign certificates and ciphertexts.
#[derive(Clone)]
pub struct SigningKeyPair {
    signing_key: SigningKey,
}

/// Both key pairs of a locally created certificate.
#[derive(Clone)]
pub struct AccountKeys {
    pub encryption: EncryptionKeyPair,
    pub signing: SigningKeyPair,
}

/// Hex strings of a key pair as stored in a certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedKeyPair {
    pub public: String,
    pub secret: String,
}

impl EncryptionKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn from_secret_bytes(secret: [u8; KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(secret);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn from_secret_hex(secret: &str) -> Result<Self, IdentityError> {
        Ok(Self::from_secret_bytes(decode_key(secret)?))
    }

    pub fn secret(&self) -> &StaticSecret {
        &self.secret
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    pub fn encode(&self) -> EncodedKeyPair {
        EncodedKeyPair {
            public: hex::encode(self.public.as_bytes()),
            secret: hex::encode(self.secret.to_bytes()),
        }
    }
}

impl SigningKeyPair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_secret_bytes(secret: &[u8; KEY_SIZE]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    pub fn from_secret_hex(secret: &str) -> Result<Self, IdentityError> {
        Ok(Self::from_secret_bytes(&decode_key(secret)?))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Sign `text` and return the base64 signature carried on the wire
    pub fn sign_text(&self, text: &str) -> String {
        let signature: Signature = self.signing_key.sign(text.as_bytes());
        STANDARD.encode(signature.to_bytes())
    }

    pub fn encode(&self) -> EncodedKeyPair {
        EncodedKeyPair {
            public: hex::encode(self.signing_key.verifying_key().to_bytes()),
            secret: hex::encode(self.signing_key.to_bytes()),
        }
    }
}

impl AccountKeys {
    pub fn generate() -> Self {
        Self {
            encryption: EncryptionKeyPair::generate(),
            signing: SigningKeyPair::generate(),
        }
    }
}

/// Decode a hex X25519 public key.
pub fn parse_encryption_public(public: &str) -> Result<PublicKey, IdentityError> {
    Ok(PublicKey::from(decode_key(public)?))
}

/// Verify a base64 signature over `text` against a hex Ed25519 public key.
pub fn verify_text(public: &str, text: &str, signature: &str) -> Result<(), IdentityError> {
    let verifying_key = VerifyingKey::from_bytes(&decode_key(public)?)
        .map_err(|_| IdentityError::InvalidKeyBytes)?;
    let signature_bytes = STANDARD
        .decode(signature)
        .map_err(|_| IdentityError::InvalidSignature)?;
    let signature =
        Signature::from_slice(&signature_bytes).map_err(|_| IdentityError::InvalidSignature)?;
    verifying_key
        .verify(text.as_bytes(), &signature)
        .map_err(|_| IdentityError::InvalidSignature)
}

fn decode_key(value: &str) -> Result<[u8; KEY_SIZE], IdentityError> {
    let bytes = hex::decode(value).map_err(|_| IdentityError::InvalidKeyBytes)?;
    bytes.try_into().map_err(|_| IdentityError::InvalidKeyBytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encryption_keys_restore_from_hex() {
        let keys = EncryptionKeyPair::generate();
        let encoded = keys.encode();
        let restored = EncryptionKeyPair::from_secret_hex(&encoded.secret).unwrap();
        assert_eq!(restored.public().as_bytes(), keys.public().as_bytes());
        assert_eq!(
            parse_encryption_public(&encoded.public).unwrap().as_bytes(),
            keys.public().as_bytes()
        );
    }

    #[test]
    fn test_sign_verify_text() {
        let keys = SigningKeyPair::generate();
        let public = keys.encode().public;
        let signature = keys.sign_text("QmPeer:alice");

        assert!(verify_text(&public, "QmPeer:alice", &signature).is_ok());
        assert!(verify_text(&public, "QmPeer:mallory", &signature).is_err());
    }

    #[test]
    fn test_verify_with_other_key_fails() {
        let signer = SigningKeyPair::generate();
        let other = SigningKeyPair::generate();
        let signature = signer.sign_text("cipher");
        assert!(verify_text(&other.encode().public, "cipher", &signature).is_err());
    }

    #[test]
    fn test_signing_keys_restore_from_hex() {
        let keys = SigningKeyPair::generate();
        let restored = SigningKeyPair::from_secret_hex(&keys.encode().secret).unwrap();
        assert_eq!(restored.verifying_key(), keys.verifying_key());
    }

    #[test]
    fn test_malformed_inputs_rejected() {
        assert!(parse_encryption_public("zz").is_err());
        assert!(parse_encryption_public("abcd").is_err());
        let public = SigningKeyPair::generate().encode().public;
        assert!(verify_text(&public, "x", "not base64!").is_err());
        assert!(verify_text(&public, "x", "AAAA").is_err());
    }
}
