//! Certificate announcements: renewal and publication of our own, validation
//! and import of everybody else's.

use chrono::Utc;
use tracing::{debug, info};

use distort_shared::constants::{cert_length, PROTOCOL_VERSION};
use distort_shared::error::IdentityError;
use distort_shared::keys::{parse_encryption_public, verify_text, SigningKeyPair};
use distort_shared::protocol::{CertificateEnvelope, CertificateKeys, PublicKeyField};
use distort_shared::topics::{cert_topic, format_peer_string};
use distort_store::{Account, CertificateStore, RemoteCertificate};

use crate::error::NodeError;
use crate::node::Node;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateOutcome {
    /// Announced on the given certs topic
    Published { topic: String },
    /// Renewed locally; the account has no active group to announce on
    NoActiveGroup,
    /// Envelope could not be decoded or carried unusable keys
    Malformed,
    /// Signature does not bind the keys to the sending identity
    BadSignature,
    /// Our own certificate reflected back to us
    Own,
    /// Known certificate, announced fields updated in place
    Refreshed,
    /// New certificate for the identity
    Imported { invalidated: usize },
}

impl Node {
    /// Extend `account`'s certificate and announce it on the active group's
    /// certs topic.
    pub async fn publish_certificate(&self, account: &Account) -> Result<CertificateOutcome, NodeError> {
        let expiration = Utc::now() + cert_length();

        let (cert, group) = {
            let db = self.store.lock().await;
            db.extend_certificate(account.cert_id, expiration)?;
            let cert = db.certificate(account.cert_id)?;
            let group = match db.account(account.id)?.active_group_id {
                Some(id) => Some(db.group(id)?),
                None => None,
            };
            (cert, group)
        };

        let Some(group) = group else {
            debug!(account = %account.account_name, "No active group, certificate not announced");
            return Ok(CertificateOutcome::NoActiveGroup);
        };

        let sign_secret = cert.sign_secret.clone().ok_or(IdentityError::MissingSecretKey)?;
        let peer_string = format_peer_string(self.peer_id(), &account.account_name);
        let signature = tokio::task::spawn_blocking(move || {
            SigningKeyPair::from_secret_hex(&sign_secret).map(|keys| keys.sign_text(&peer_string))
        })
        .await??;

        let envelope = CertificateEnvelope {
            v: PROTOCOL_VERSION.to_string(),
            from_account: account.account_name.clone(),
            key: CertificateKeys {
                encrypt: PublicKeyField {
                    public: cert.encrypt_public.clone(),
                },
                sign: PublicKeyField {
                    public: cert.sign_public.clone(),
                },
            },
            expiration,
            groups: cert.groups.clone(),
            social_media: (!cert.social_media.is_empty()).then(|| cert.social_media.clone()),
            signature,
        };

        let topic = cert_topic(&group.name);
        self.transport.publish(&topic, envelope.to_bytes()?).await?;
        debug!(account = %account.account_name, topic = %topic, "Published certificate");
        Ok(CertificateOutcome::Published { topic })
    }

    /// Validate and store a certificate announced by `from`.
    pub async fn handle_certificate(&self, data: &[u8], from: &str) -> Result<CertificateOutcome, NodeError> {
        let envelope = match CertificateEnvelope::from_bytes(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(from = %from, error = %e, "Could not decode certificate");
                return Ok(CertificateOutcome::Malformed);
            }
        };

        let peer_string = format_peer_string(from, &envelope.from_account);
        let checked = envelope.clone();
        let verdict = tokio::task::spawn_blocking(move || -> Result<(), IdentityError> {
            parse_encryption_public(&checked.key.encrypt.public)?;
            verify_text(&checked.key.sign.public, &peer_string, &checked.signature)
        })
        .await?;
        match verdict {
            Ok(()) => {}
            Err(IdentityError::InvalidSignature) => {
                debug!(from = %from, account = %envelope.from_account, "Certificate signature mismatch");
                return Ok(CertificateOutcome::BadSignature);
            }
            Err(e) => {
                debug!(from = %from, error = %e, "Certificate carries unusable keys");
                return Ok(CertificateOutcome::Malformed);
            }
        }

        let social_media = envelope.social_media.clone().unwrap_or_default();
        let db = self.store.lock().await;
        let existing = db.find_valid_certificate_with_keys(
            from,
            &envelope.from_account,
            &envelope.key.encrypt.public,
            &envelope.key.sign.public,
        )?;

        if let Some(existing) = existing {
            if existing.is_owned() {
                debug!(account = %envelope.from_account, "Own certificate reflected, ignoring");
                return Ok(CertificateOutcome::Own);
            }
            db.refresh_certificate(existing.id, envelope.expiration, &envelope.groups, &social_media)?;
            debug!(peer = %format_peer_string(from, &envelope.from_account), "Refreshed certificate");
            return Ok(CertificateOutcome::Refreshed);
        }

        let imported = db.import_certificate(&RemoteCertificate {
            peer_id: from.to_string(),
            account_name: envelope.from_account.clone(),
            encrypt_public: envelope.key.encrypt.public.clone(),
            sign_public: envelope.key.sign.public.clone(),
            groups: envelope.groups.clone(),
            social_media,
            expiration: envelope.expiration,
        })?;
        info!(
            peer = %format_peer_string(from, &envelope.from_account),
            invalidated = imported.invalidated,
            peers_updated = imported.peers_updated,
            "Imported certificate"
        );
        Ok(CertificateOutcome::Imported {
            invalidated: imported.invalidated,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use distort_net::{MemoryHub, MemoryPubSub, PubSub};
    use distort_shared::keys::AccountKeys;
    use distort_store::{CertStatus, Database, SocialMediaHandle};

    use super::*;
    use crate::node::NodeSettings;

    fn node(hub: &MemoryHub, peer: &str) -> (Arc<Node>, MemoryPubSub) {
        let (transport, _rx) = hub.join(peer);
        let db = Database::open_in_memory().unwrap();
        let node = Node::new(Arc::new(transport.clone()), db, NodeSettings::default());
        (node, transport)
    }

    fn signed_envelope(keys: &AccountKeys, from: &str, account: &str) -> CertificateEnvelope {
        CertificateEnvelope {
            v: PROTOCOL_VERSION.to_string(),
            from_account: account.to_string(),
            key: CertificateKeys {
                encrypt: PublicKeyField {
                    public: keys.encryption.encode().public,
                },
                sign: PublicKeyField {
                    public: keys.signing.encode().public,
                },
            },
            expiration: Utc::now() + Duration::days(14),
            groups: vec!["news:3".to_string()],
            social_media: None,
            signature: keys.signing.sign_text(&format_peer_string(from, account)),
        }
    }

    #[tokio::test]
    async fn test_import_then_refresh_then_replace() {
        let hub = MemoryHub::new();
        let (node, _) = node(&hub, "QmLocal");
        let keys = AccountKeys::generate();

        let first = signed_envelope(&keys, "QmRemote", "root");
        let outcome = node
            .handle_certificate(&first.to_bytes().unwrap(), "QmRemote")
            .await
            .unwrap();
        assert_eq!(outcome, CertificateOutcome::Imported { invalidated: 0 });

        let mut again = first.clone();
        again.groups = vec!["news:5".to_string()];
        let outcome = node
            .handle_certificate(&again.to_bytes().unwrap(), "QmRemote")
            .await
            .unwrap();
        assert_eq!(outcome, CertificateOutcome::Refreshed);

        let rotated = signed_envelope(&AccountKeys::generate(), "QmRemote", "root");
        let outcome = node
            .handle_certificate(&rotated.to_bytes().unwrap(), "QmRemote")
            .await
            .unwrap();
        assert_eq!(outcome, CertificateOutcome::Imported { invalidated: 1 });

        let db = node.store().lock().await;
        let certs = db.certificates_for_identity("QmRemote", "root").unwrap();
        assert_eq!(certs.len(), 2);
        assert_eq!(
            certs.iter().filter(|c| c.status == CertStatus::Valid).count(),
            1
        );
        let old = certs.iter().find(|c| c.status == CertStatus::Invalidated).unwrap();
        assert_eq!(old.groups, vec!["news:5".to_string()]);
    }

    #[tokio::test]
    async fn test_signature_must_match_sender() {
        let hub = MemoryHub::new();
        let (node, _) = node(&hub, "QmLocal");
        let envelope = signed_envelope(&AccountKeys::generate(), "QmRemote", "root");

        // Replayed by another peer
        let outcome = node
            .handle_certificate(&envelope.to_bytes().unwrap(), "QmMallory")
            .await
            .unwrap();
        assert_eq!(outcome, CertificateOutcome::BadSignature);

        // Claimed for another account
        let mut renamed = envelope.clone();
        renamed.from_account = "alice".to_string();
        let outcome = node
            .handle_certificate(&renamed.to_bytes().unwrap(), "QmRemote")
            .await
            .unwrap();
        assert_eq!(outcome, CertificateOutcome::BadSignature);

        let db = node.store().lock().await;
        assert!(db.certificates_for_identity("QmRemote", "root").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_certificates_dropped() {
        let hub = MemoryHub::new();
        let (node, _) = node(&hub, "QmLocal");

        for raw in [
            b"not json".to_vec(),
            br#"{"fromAccount":"root"}"#.to_vec(),
            br#"{"v":"0.1.0","fromAccount":"root"}"#.to_vec(),
        ] {
            assert_eq!(
                node.handle_certificate(&raw, "QmRemote").await.unwrap(),
                CertificateOutcome::Malformed
            );
        }

        let mut bad_key = signed_envelope(&AccountKeys::generate(), "QmRemote", "root");
        bad_key.key.encrypt.public = "abcd".to_string();
        assert_eq!(
            node.handle_certificate(&bad_key.to_bytes().unwrap(), "QmRemote")
                .await
                .unwrap(),
            CertificateOutcome::Malformed
        );
    }

    #[tokio::test]
    async fn test_publish_requires_active_group() {
        let hub = MemoryHub::new();
        let (node, transport) = node(&hub, "QmLocal");
        let account = node.create_account("root").await.unwrap();

        let before = node.store().lock().await.certificate(account.cert_id).unwrap();
        let outcome = node.publish_certificate(&account).await.unwrap();
        assert_eq!(outcome, CertificateOutcome::NoActiveGroup);
        assert!(transport.published_topics().is_empty());

        // Expiration is still renewed
        let after = node.store().lock().await.certificate(account.cert_id).unwrap();
        assert!(after.last_expiration >= before.last_expiration);

        node.join_group_at("root", "news", 3).await.unwrap();
        let outcome = node.publish_certificate(&account).await.unwrap();
        assert_eq!(
            outcome,
            CertificateOutcome::Published {
                topic: "news-certs".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_own_certificate_reflected() {
        let hub = MemoryHub::new();
        let (node, _) = node(&hub, "QmLocal");
        let (observer, mut observer_rx) = hub.join("QmObserver");
        observer.subscribe("news-certs").await.unwrap();

        let account = node.create_account("root").await.unwrap();
        node.join_group_at("root", "news", 3).await.unwrap();
        node.publish_certificate(&account).await.unwrap();

        let delivery = observer_rx.recv().await.unwrap();
        assert_eq!(delivery.from, "QmLocal");
        let outcome = node
            .handle_certificate(&delivery.data, &delivery.from)
            .await
            .unwrap();
        assert_eq!(outcome, CertificateOutcome::Own);

        let envelope = CertificateEnvelope::from_bytes(&delivery.data).unwrap();
        assert_eq!(envelope.groups, vec!["news:3".to_string()]);
        assert!(envelope.social_media.is_none());
    }

    #[tokio::test]
    async fn test_announcement_carries_social_media() {
        let hub = MemoryHub::new();
        let (remote, _) = node(&hub, "QmRemote");
        let (node, _) = node(&hub, "QmLocal");
        let (observer, mut observer_rx) = hub.join("QmObserver");
        observer.subscribe("news-certs").await.unwrap();

        let account = node.create_account("root").await.unwrap();
        node.join_group_at("root", "news", 0).await.unwrap();
        let handles = vec![SocialMediaHandle {
            platform: "mastodon".to_string(),
            handle: "@root@example.org".to_string(),
        }];
        node.set_social_media("root", &handles).await.unwrap();
        node.publish_certificate(&account).await.unwrap();

        let delivery = observer_rx.recv().await.unwrap();
        let envelope = CertificateEnvelope::from_bytes(&delivery.data).unwrap();
        assert_eq!(envelope.social_media, Some(handles.clone()));

        // A remote node stores the handles with the certificate
        remote.handle_certificate(&delivery.data, &delivery.from).await.unwrap();
        let db = remote.store().lock().await;
        let stored = db.latest_valid_certificate("QmLocal", "root", Utc::now()).unwrap().unwrap();
        assert_eq!(stored.social_media, handles);
    }
}
