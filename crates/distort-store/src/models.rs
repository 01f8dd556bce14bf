//! Domain model structs persisted in the local SQLite database.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use distort_shared::protocol::SocialMediaHandle;

// ---------------------------------------------------------------------------
// Certificate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CertStatus {
    Valid,
    Invalidated,
}

/// Key material and memberships bound to one `(peer_id, account_name)`.
///
/// Secret keys are present only for certificates created on this node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Certificate {
    pub id: Uuid,
    pub peer_id: String,
    pub account_name: String,
    pub encrypt_public: String,
    #[serde(skip_serializing)]
    pub encrypt_secret: Option<String>,
    pub sign_public: String,
    #[serde(skip_serializing)]
    pub sign_secret: Option<String>,
    /// `"name:index"` membership strings
    pub groups: Vec<String>,
    pub social_media: Vec<SocialMediaHandle>,
    pub last_expiration: DateTime<Utc>,
    pub status: CertStatus,
}

impl Certificate {
    /// Whether this node holds the secret keys.
    pub fn is_owned(&self) -> bool {
        self.encrypt_secret.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.last_expiration <= now
    }
}

/// A locally generated certificate about to be stored.
#[derive(Debug, Clone)]
pub struct NewOwnedCertificate {
    pub peer_id: String,
    pub account_name: String,
    pub encrypt_public: String,
    pub encrypt_secret: String,
    pub sign_public: String,
    pub sign_secret: String,
    pub expiration: DateTime<Utc>,
}

/// A certificate announced by another node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCertificate {
    pub peer_id: String,
    pub account_name: String,
    pub encrypt_public: String,
    pub sign_public: String,
    pub groups: Vec<String>,
    pub social_media: Vec<SocialMediaHandle>,
    pub expiration: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// A local identity hosted by this node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub peer_id: String,
    pub account_name: String,
    pub cert_id: Uuid,
    pub enabled: bool,
    pub active_group_id: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// A group membership of a local account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    pub subgroup_index: u32,
    /// Number of messages recorded under this group
    pub height: i64,
    pub last_read_index: i64,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// Exchange between a local account and one remote identity inside a group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: Uuid,
    pub group_id: Uuid,
    pub account_id: Uuid,
    pub peer_id: String,
    pub account_name: String,
    /// Next index to assign
    pub height: i64,
    pub latest_status_change: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OutMessageStatus {
    Enqueued,
    Cancelled,
    Sent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub index: i64,
    pub message: String,
    pub to_cert_id: Uuid,
    pub status: OutMessageStatus,
    pub last_status_change: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub index: i64,
    pub message: String,
    pub verified: bool,
    pub date_received: DateTime<Utc>,
}

/// An enqueued message together with its recipient's certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub message: OutMessage,
    pub recipient: Certificate,
}

/// One entry of a conversation history, ordered by index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "direction", rename_all = "lowercase")]
pub enum ConversationEntry {
    In(InMessage),
    Out(OutMessage),
}

impl ConversationEntry {
    pub fn index(&self) -> i64 {
        match self {
            ConversationEntry::In(m) => m.index,
            ConversationEntry::Out(m) => m.index,
        }
    }
}

// ---------------------------------------------------------------------------
// Peer
// ---------------------------------------------------------------------------

/// Address-book entry of a local account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Peer {
    pub id: Uuid,
    pub account_id: Uuid,
    pub peer_id: String,
    pub account_name: String,
    pub nickname: Option<String>,
    pub cert_id: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// Text encodings
// ---------------------------------------------------------------------------

/// Error for status columns holding an unknown value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl CertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertStatus::Valid => "valid",
            CertStatus::Invalidated => "invalidated",
        }
    }
}

impl FromStr for CertStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "valid" => Ok(CertStatus::Valid),
            "invalidated" => Ok(CertStatus::Invalidated),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl OutMessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutMessageStatus::Enqueued => "enqueued",
            OutMessageStatus::Cancelled => "cancelled",
            OutMessageStatus::Sent => "sent",
        }
    }
}

impl FromStr for OutMessageStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enqueued" => Ok(OutMessageStatus::Enqueued),
            "cancelled" => Ok(OutMessageStatus::Cancelled),
            "sent" => Ok(OutMessageStatus::Sent),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Timestamp text as stored in every table.
pub(crate) fn to_sql_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

pub(crate) fn get_uuid(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn get_opt_uuid(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub(crate) fn get_time(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

pub(crate) fn get_json<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn get_parsed<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_time_orders_as_text() {
        let early = DateTime::parse_from_rfc3339("2024-01-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let late = early + chrono::Duration::milliseconds(1);
        assert!(to_sql_time(early) < to_sql_time(late));
        assert!(to_sql_time(early).ends_with('Z'));
    }

    #[test]
    fn test_status_strings() {
        for status in [CertStatus::Valid, CertStatus::Invalidated] {
            assert_eq!(status.as_str().parse::<CertStatus>().unwrap(), status);
        }
        for status in [
            OutMessageStatus::Enqueued,
            OutMessageStatus::Cancelled,
            OutMessageStatus::Sent,
        ] {
            assert_eq!(status.as_str().parse::<OutMessageStatus>().unwrap(), status);
        }
        assert!("pending".parse::<OutMessageStatus>().is_err());
    }
}
