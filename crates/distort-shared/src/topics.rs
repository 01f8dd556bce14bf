//! Topic and membership string grammar.
//!
//! - message topic: `<group>-all` for subgroup 0, `<group>-<index>` otherwise
//! - certificate topic: `<group>-certs`
//! - membership (stored in certificates): `<group>:<index>`
//!
//! Group names may themselves contain `-` and `:`; parsing always splits on
//! the last separator.

use crate::constants::ROOT_ACCOUNT;
use crate::error::TopicError;

const ALL_SUFFIX: &str = "all";
const CERTS_SUFFIX: &str = "certs";

/// Which inbound handler a topic is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicKind {
    Message,
    Certificate,
}

pub fn message_topic(group: &str, subgroup_index: u32) -> String {
    if subgroup_index > 0 {
        format!("{group}-{subgroup_index}")
    } else {
        format!("{group}-{ALL_SUFFIX}")
    }
}

pub fn cert_topic(group: &str) -> String {
    format!("{group}-{CERTS_SUFFIX}")
}

/// Split a message topic back into `(group, subgroup_index)`.
pub fn parse_message_topic(topic: &str) -> Result<(String, u32), TopicError> {
    let invalid = || TopicError::NotAMessageTopic(topic.to_string());

    let (group, suffix) = topic.rsplit_once('-').ok_or_else(invalid)?;
    if suffix == ALL_SUFFIX {
        return Ok((group.to_string(), 0));
    }
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let index = suffix.parse::<u32>().map_err(|_| invalid())?;
    Ok((group.to_string(), index))
}

/// Group name of a certificate topic, if `topic` is one.
pub fn parse_cert_topic(topic: &str) -> Option<&str> {
    topic
        .rsplit_once('-')
        .filter(|(_, suffix)| *suffix == CERTS_SUFFIX)
        .map(|(group, _)| group)
}

pub fn membership(group: &str, subgroup_index: u32) -> String {
    format!("{group}:{subgroup_index}")
}

pub fn parse_membership(value: &str) -> Result<(String, u32), TopicError> {
    let invalid = || TopicError::InvalidMembership(value.to_string());
    let (group, index) = value.rsplit_once(':').ok_or_else(invalid)?;
    let index = index.parse::<u32>().map_err(|_| invalid())?;
    Ok((group.to_string(), index))
}

/// Canonical printable address of an account: `peerId` for root,
/// `peerId:account` otherwise. Certificates are signed over this string.
pub fn format_peer_string(peer_id: &str, account_name: &str) -> String {
    if account_name.is_empty() || account_name == ROOT_ACCOUNT {
        peer_id.to_string()
    } else {
        format!("{peer_id}:{account_name}")
    }
}
