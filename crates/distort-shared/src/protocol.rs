use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::codec::SealedMessage;
use crate::constants::{PROTOCOL_VERSION, ROOT_ACCOUNT, SUPPORTED_PROTOCOLS};
use crate::error::ProtocolError;

/// Message envelope published on `<group>-all` / `<group>-<index>` topics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub v: String,
    #[serde(default = "root_account")]
    pub from_account: String,
    /// Ephemeral public key, hex
    pub encrypt: String,
    /// Nonce, base64
    pub iv: String,
    /// Ciphertext, base64
    pub cipher: String,
    /// Sender's signature over `cipher`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Certificate announcement published on `<group>-certs` topics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateEnvelope {
    pub v: String,
    #[serde(default = "root_account")]
    pub from_account: String,
    pub key: CertificateKeys,
    pub expiration: DateTime<Utc>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_media: Option<Vec<SocialMediaHandle>>,
    /// Signature over the sender's canonical peer string
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateKeys {
    pub encrypt: PublicKeyField,
    pub sign: PublicKeyField,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyField {
    #[serde(rename = "pub")]
    pub public: String,
}

/// A social identity linked to a certificate
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SocialMediaHandle {
    pub platform: String,
    pub handle: String,
}

#[derive(Deserialize)]
struct VersionProbe {
    #[serde(default)]
    v: Option<String>,
}

impl MessageEnvelope {
    pub fn new(from_account: &str, sealed: SealedMessage) -> Self {
        Self {
            v: PROTOCOL_VERSION.to_string(),
            from_account: from_account.to_string(),
            encrypt: sealed.encrypt,
            iv: sealed.iv,
            cipher: sealed.cipher,
            signature: None,
        }
    }

    pub fn sealed(&self) -> SealedMessage {
        SealedMessage {
            encrypt: self.encrypt.clone(),
            iv: self.iv.clone(),
            cipher: self.cipher.clone(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        decode_versioned(data)
    }
}

impl CertificateEnvelope {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        decode_versioned(data)
    }
}

/// Check the `v` discriminator before decoding the full envelope.
fn decode_versioned<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    let probe: VersionProbe = serde_json::from_slice(data)?;
    match probe.v {
        None => Err(ProtocolError::MissingVersion),
        Some(v) if !SUPPORTED_PROTOCOLS.contains(&v.as_str()) => {
            Err(ProtocolError::UnsupportedVersion(v))
        }
        Some(_) => Ok(serde_json::from_slice(data)?),
    }
}

fn root_account() -> String {
    ROOT_ACCOUNT.to_string()
}
