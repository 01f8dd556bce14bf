use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Invalid key length")]
    InvalidKeyLength,

    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("Message of {len} bytes does not fit the {max} byte frame")]
    MessageTooLong { len: usize, max: usize },

    /// The normalized plaintext is not exactly `MESSAGE_LENGTH`. Always a bug.
    #[error("Invalid normalized message length: {actual} (expected {expected})")]
    InvalidPaddedLength { actual: usize, expected: usize },
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid key bytes")]
    InvalidKeyBytes,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Certificate holds no secret key")]
    MissingSecretKey,
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("No version given")]
    MissingVersion,

    #[error("No support for given version: {0}")]
    UnsupportedVersion(String),

    #[error("Malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TopicError {
    #[error("Topic does not name a message subgroup: {0}")]
    NotAMessageTopic(String),

    #[error("Invalid group membership string: {0}")]
    InvalidMembership(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GroupTreeError {
    #[error("Subgroup level {level} outside [0, {max}]")]
    LevelOutOfRange { level: usize, max: usize },
}
