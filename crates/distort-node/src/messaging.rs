//! Message rounds: one fixed-size publication per account along a random
//! group-tree path, and decryption of whatever arrives on our subgroups.

use chrono::Utc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use distort_shared::codec::{pack_cover, pack_for, unpack, SealedMessage};
use distort_shared::error::{CryptoError, IdentityError};
use distort_shared::group_tree::{path_contains_membership, random_path, GroupPath};
use distort_shared::keys::{parse_encryption_public, verify_text, EncryptionKeyPair, SigningKeyPair};
use distort_shared::protocol::MessageEnvelope;
use distort_shared::topics::{message_topic, parse_message_topic};
use distort_store::{Account, Certificate, CertificateStore, InMessage, QueuedMessage};

use crate::error::NodeError;
use crate::node::Node;

#[derive(Debug)]
pub enum MessageOutcome {
    /// Envelope undecodable, unsupported version or unusable fields
    Malformed,
    /// None of our certificates opens it; cover traffic or someone else's mail
    NotForUs,
    Stored(InMessage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DequeueOutcome {
    NoActiveGroup,
    /// Published on every subgroup of `path`. `sent` is the queued message
    /// carried this round, `None` for cover traffic.
    Published { path: GroupPath, sent: Option<Uuid> },
}

impl Node {
    pub async fn dequeue_and_publish(&self, account: &Account) -> Result<DequeueOutcome, NodeError> {
        self.dequeue_on_path(account, random_path()).await
    }

    /// One round for `account` along an already drawn `path`.
    ///
    /// The first queued message of the active group whose recipient holds a
    /// membership on the path is sealed for that recipient; otherwise cover
    /// content goes out. Either way the envelope is published on every node of
    /// the path, and the message is marked sent only once all of those
    /// publications went through.
    pub async fn dequeue_on_path(&self, account: &Account, path: GroupPath) -> Result<DequeueOutcome, NodeError> {
        let (group, own_cert, queued) = {
            let db = self.store.lock().await;
            let Some(group_id) = db.account(account.id)?.active_group_id else {
                trace!(account = %account.account_name, "No active group, skipping round");
                return Ok(DequeueOutcome::NoActiveGroup);
            };
            let group = db.group(group_id)?;
            let own_cert = db.certificate(account.cert_id)?;
            let queued = db.enqueued_for_group(group.id)?;
            (group, own_cert, queued)
        };

        let selected: Option<QueuedMessage> = queued
            .into_iter()
            .find(|q| path_contains_membership(&group.name, &path, &q.recipient.groups));

        let sign_secret = own_cert.sign_secret.ok_or(IdentityError::MissingSecretKey)?;
        let payload = selected
            .as_ref()
            .map(|q| (q.message.message.clone(), q.recipient.encrypt_public.clone()));
        let (sealed, signature) = tokio::task::spawn_blocking(move || seal_and_sign(payload, &sign_secret)).await??;

        let mut envelope = MessageEnvelope::new(&account.account_name, sealed);
        envelope.signature = Some(signature);
        let data = envelope.to_bytes()?;

        for index in path {
            let topic = message_topic(&group.name, index);
            self.transport.publish(&topic, data.clone()).await?;
        }

        let sent = match selected {
            Some(q) => {
                let marked = self.store.lock().await.mark_sent(q.message.id, Utc::now())?;
                if marked {
                    info!(
                        account = %account.account_name,
                        group = %group.name,
                        message_id = %q.message.id,
                        index = q.message.index,
                        "Message sent"
                    );
                } else {
                    // Cancelled while the round was publishing
                    debug!(message_id = %q.message.id, "Message left the queue during publish");
                }
                Some(q.message.id)
            }
            None => {
                debug!(account = %account.account_name, group = %group.name, "Published cover traffic");
                None
            }
        };

        Ok(DequeueOutcome::Published { path, sent })
    }

    /// Try to open a delivery from `from` on message topic `topic`.
    pub async fn handle_message(&self, data: &[u8], from: &str, topic: &str) -> Result<MessageOutcome, NodeError> {
        let envelope = match MessageEnvelope::from_bytes(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(from = %from, topic = %topic, error = %e, "Could not decode message");
                return Ok(MessageOutcome::Malformed);
            }
        };

        let now = Utc::now();
        let (owned, sender) = {
            let db = self.store.lock().await;
            (
                db.owned_certificates(self.peer_id(), now)?,
                db.latest_valid_certificate(from, &envelope.from_account, now)?,
            )
        };
        if owned.is_empty() {
            return Ok(MessageOutcome::NotForUs);
        }

        let sealed = envelope.sealed();
        let signature = envelope.signature.clone();
        let sender_sign = sender.map(|c| c.sign_public);
        let opened = tokio::task::spawn_blocking(move || {
            open_and_verify(&sealed, owned, sender_sign.as_deref(), signature.as_deref())
        })
        .await?;

        let (recipient, text, verified) = match opened {
            Ok(Some(opened)) => opened,
            Ok(None) => {
                trace!(topic = %topic, "Message not for us");
                return Ok(MessageOutcome::NotForUs);
            }
            Err(CryptoError::InvalidEncoding(reason)) => {
                debug!(from = %from, topic = %topic, reason = %reason, "Message carries undecodable fields");
                return Ok(MessageOutcome::Malformed);
            }
            Err(e) => return Err(e.into()),
        };

        let (group_name, index) = parse_message_topic(topic)?;
        let db = self.store.lock().await;
        let group = db
            .group_for_topic(&recipient.peer_id, &recipient.account_name, &group_name, index)?
            .ok_or_else(|| NodeError::NoMatchingGroup {
                topic: topic.to_string(),
                account: recipient.account_name.clone(),
            })?;
        let conversation = db.find_or_create_conversation(&group, from, &envelope.from_account)?;
        let stored = db.store_in_message(conversation.id, &text, verified, now)?;

        info!(
            account = %recipient.account_name,
            group = %group.name,
            from = %from,
            from_account = %envelope.from_account,
            index = stored.index,
            verified,
            "Message received"
        );
        Ok(MessageOutcome::Stored(stored))
    }
}

/// Seal `payload` (text, recipient encryption key) or cover content, then sign
/// the resulting cipher.
fn seal_and_sign(
    payload: Option<(String, String)>,
    sign_secret: &str,
) -> Result<(SealedMessage, String), NodeError> {
    let sealed = match payload {
        Some((text, recipient)) => pack_for(&text, &parse_encryption_public(&recipient)?)?,
        None => pack_cover()?,
    };
    let signature = SigningKeyPair::from_secret_hex(sign_secret)?.sign_text(&sealed.cipher);
    Ok((sealed, signature))
}

/// Open `sealed` with the first owned certificate that fits. The sender's
/// signature over the cipher only decides `verified`.
fn open_and_verify(
    sealed: &SealedMessage,
    owned: Vec<Certificate>,
    sender_sign: Option<&str>,
    signature: Option<&str>,
) -> Result<Option<(Certificate, String, bool)>, CryptoError> {
    let candidates: Vec<(Certificate, EncryptionKeyPair)> = owned
        .into_iter()
        .filter_map(|cert| {
            let secret = cert.encrypt_secret.as_deref()?;
            match EncryptionKeyPair::from_secret_hex(secret) {
                Ok(keys) => Some((cert, keys)),
                Err(e) => {
                    warn!(cert_id = %cert.id, error = %e, "Stored encryption secret unusable");
                    None
                }
            }
        })
        .collect();

    let Some(opened) = unpack(sealed, candidates.iter().map(|(cert, keys)| (cert, keys.secret())))? else {
        return Ok(None);
    };

    let verified = match (sender_sign, signature) {
        (Some(public), Some(signature)) => verify_text(public, &sealed.cipher, signature).is_ok(),
        _ => false,
    };
    Ok(Some((opened.recipient.clone(), opened.message, verified)))
}
