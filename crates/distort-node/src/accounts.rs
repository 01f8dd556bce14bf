//! Local account, group, queue and peer-book operations.
//!
//! Everything here addresses accounts by name under this node's peer ID and
//! keeps three things in step: the store rows, the subscription table and the
//! membership list of the account's certificate.

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use distort_shared::codec::check_fits;
use distort_shared::constants::{cert_length, ROOT_ACCOUNT};
use distort_shared::group_tree::{level_of, random_from_level};
use distort_shared::keys::AccountKeys;
use distort_shared::topics::{format_peer_string, membership};
use distort_store::{
    Account, CertificateStore, ConversationEntry, Database, Group, NewOwnedCertificate, OutMessage,
    Peer, SocialMediaHandle,
};

use crate::error::NodeError;
use crate::node::Node;

/// Addressee of an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Identity { peer_id: String, account_name: String },
    /// Entry of the sending account's peer book
    Nickname(String),
}

impl Node {
    /// Create an enabled account with a freshly generated certificate.
    pub async fn create_account(&self, name: &str) -> Result<Account, NodeError> {
        if name.is_empty() || name.contains(':') {
            return Err(NodeError::InvalidAccountName(name.to_string()));
        }

        let keys = tokio::task::spawn_blocking(AccountKeys::generate).await?;
        let encryption = keys.encryption.encode();
        let signing = keys.signing.encode();
        let cert = NewOwnedCertificate {
            peer_id: self.peer_id().to_string(),
            account_name: name.to_string(),
            encrypt_public: encryption.public,
            encrypt_secret: encryption.secret,
            sign_public: signing.public,
            sign_secret: signing.secret,
            expiration: Utc::now() + cert_length(),
        };

        let (account, _) = self.store.lock().await.create_account(&cert)?;
        info!(account = %name, cert_id = %account.cert_id, "Created account");
        Ok(account)
    }

    /// Enabling subscribes every group of the account, disabling releases them.
    pub async fn set_account_enabled(&self, name: &str, enabled: bool) -> Result<Account, NodeError> {
        if !enabled && name == ROOT_ACCOUNT {
            return Err(NodeError::RootAccountRequired);
        }
        let account = self.account_named(name).await?;
        if account.enabled == enabled {
            return Ok(account);
        }

        // Subscriptions change first; the flag is only stored once they all did
        if enabled {
            self.subscribe_account_groups(&account).await?;
        } else {
            self.unsubscribe_account_groups(&account).await?;
        }
        let persisted = self.store.lock().await.set_account_enabled(account.id, enabled);
        if let Err(e) = persisted {
            let undone = if enabled {
                self.unsubscribe_account_groups(&account).await
            } else {
                self.subscribe_account_groups(&account).await
            };
            if let Err(undo) = undone {
                warn!(account = %name, error = %undo, "Failed to undo subscription change");
            }
            return Err(e.into());
        }
        info!(account = %name, enabled, "Account state changed");
        Ok(Account { enabled, ..account })
    }

    /// Point the account's rounds at `group`, or stop them with `None`.
    pub async fn set_active_group(&self, account: &str, group: Option<&str>) -> Result<(), NodeError> {
        let db = self.store.lock().await;
        let account = lookup_account(&db, self.peer_id(), account)?;
        let group_id = match group {
            Some(name) => Some(member_group(&db, &account, name)?.id),
            None => None,
        };
        db.set_active_group(account.id, group_id)?;
        Ok(())
    }

    /// Join `name` at a random subgroup on tree level `level`.
    pub async fn join_group(&self, account: &str, name: &str, level: usize) -> Result<Group, NodeError> {
        let index = random_from_level(level)?;
        self.join_group_at(account, name, index).await
    }

    /// Join `name` at subgroup `index`, or move an existing membership there.
    pub async fn join_group_at(&self, account: &str, name: &str, index: u32) -> Result<Group, NodeError> {
        if level_of(index).is_none() {
            return Err(NodeError::InvalidSubgroup(index));
        }
        let account = self.account_named(account).await?;
        let existing = self.store.lock().await.group_by_name(account.id, name)?;

        match existing {
            Some(group) if group.subgroup_index == index => Ok(group),
            Some(group) => {
                // New index first so the certs topic never drops
                if account.enabled {
                    self.subscriptions.subscribe(name, index).await?;
                    if let Err(e) = self.subscriptions.unsubscribe(name, group.subgroup_index).await {
                        if let Err(release) = self.subscriptions.unsubscribe(name, index).await {
                            warn!(group = %name, error = %release, "Failed to release subscription");
                        }
                        return Err(e.into());
                    }
                }
                let db = self.store.lock().await;
                db.set_group_subgroup(group.id, index)?;
                update_memberships(&db, &account, |groups| {
                    let old = membership(name, group.subgroup_index);
                    groups.retain(|g| *g != old);
                    groups.push(membership(name, index));
                })?;
                info!(
                    account = %account.account_name,
                    group = %name,
                    from = group.subgroup_index,
                    to = index,
                    "Moved to another subgroup"
                );
                Ok(Group {
                    subgroup_index: index,
                    ..group
                })
            }
            None => {
                if account.enabled {
                    self.subscriptions.subscribe(name, index).await?;
                }
                let inserted = self.store.lock().await.insert_group(account.id, name, index);
                let group = match inserted {
                    Ok(group) => group,
                    Err(e) => {
                        if account.enabled {
                            if let Err(release) = self.subscriptions.unsubscribe(name, index).await {
                                warn!(group = %name, error = %release, "Failed to release subscription");
                            }
                        }
                        return Err(e.into());
                    }
                };

                let db = self.store.lock().await;
                if account.active_group_id.is_none() {
                    db.set_active_group(account.id, Some(group.id))?;
                }
                update_memberships(&db, &account, |groups| groups.push(membership(name, index)))?;
                info!(account = %account.account_name, group = %name, index, "Joined group");
                Ok(group)
            }
        }
    }

    /// Leave `name`, dropping its conversations and messages.
    ///
    /// The subscription is released before the group row goes, so a refusing
    /// transport leaves the membership intact for a retry.
    pub async fn leave_group(&self, account: &str, name: &str) -> Result<(), NodeError> {
        let account = self.account_named(account).await?;
        let group = {
            let db = self.store.lock().await;
            member_group(&db, &account, name)?
        };

        if account.enabled {
            self.subscriptions.unsubscribe(name, group.subgroup_index).await?;
        }
        let deleted = self.store.lock().await.delete_group(group.id);
        if let Err(e) = deleted {
            if account.enabled {
                if let Err(retake) = self.subscriptions.subscribe(name, group.subgroup_index).await {
                    warn!(group = %name, error = %retake, "Failed to restore subscription");
                }
            }
            return Err(e.into());
        }

        let db = self.store.lock().await;
        update_memberships(&db, &account, |groups| {
            let old = membership(name, group.subgroup_index);
            groups.retain(|g| *g != old);
        })?;
        info!(account = %account.account_name, group = %name, "Left group");
        Ok(())
    }

    /// Queue `text` for `recipient` in `group`, which becomes the account's
    /// active group.
    pub async fn enqueue_message(
        &self,
        account: &str,
        group: &str,
        recipient: &Recipient,
        text: &str,
    ) -> Result<OutMessage, NodeError> {
        check_fits(text)?;

        let now = Utc::now();
        let db = self.store.lock().await;
        let account = lookup_account(&db, self.peer_id(), account)?;
        let group = member_group(&db, &account, group)?;

        let (peer_id, account_name) = match recipient {
            Recipient::Identity {
                peer_id,
                account_name,
            } => (peer_id.clone(), account_name.clone()),
            Recipient::Nickname(nickname) => {
                let peer = db
                    .peer_by_nickname(account.id, nickname)?
                    .ok_or_else(|| NodeError::UnknownPeer(nickname.clone()))?;
                (peer.peer_id, peer.account_name)
            }
        };
        let cert = db
            .latest_valid_certificate(&peer_id, &account_name, now)?
            .ok_or_else(|| NodeError::NoValidCertificate(format_peer_string(&peer_id, &account_name)))?;

        db.set_active_group(account.id, Some(group.id))?;
        let conversation = db.find_or_create_conversation(&group, &peer_id, &account_name)?;
        let message = db.enqueue_out_message(conversation.id, cert.id, text, now)?;
        debug!(
            account = %account.account_name,
            group = %group.name,
            to = %format_peer_string(&peer_id, &account_name),
            index = message.index,
            "Message enqueued"
        );
        Ok(message)
    }

    /// Withdraw a message that has not gone out yet. `false` if it already
    /// left the queue.
    pub async fn cancel_message(&self, id: Uuid) -> Result<bool, NodeError> {
        Ok(self.store.lock().await.cancel_out_message(id, Utc::now())?)
    }

    pub async fn conversation_messages(
        &self,
        conversation_id: Uuid,
        start: i64,
        end: i64,
    ) -> Result<Vec<ConversationEntry>, NodeError> {
        Ok(self
            .store
            .lock()
            .await
            .conversation_messages(conversation_id, start, end)?)
    }

    /// Remember how far the account has read in `group`.
    pub async fn mark_group_read(&self, account: &str, group: &str, last_read_index: i64) -> Result<(), NodeError> {
        let db = self.store.lock().await;
        let account = lookup_account(&db, self.peer_id(), account)?;
        let group = member_group(&db, &account, group)?;
        db.set_group_last_read(group.id, last_read_index)?;
        Ok(())
    }

    /// Replace the handles announced alongside the account's certificate.
    pub async fn set_social_media(&self, account: &str, handles: &[SocialMediaHandle]) -> Result<(), NodeError> {
        let db = self.store.lock().await;
        let account = lookup_account(&db, self.peer_id(), account)?;
        db.set_certificate_social_media(account.cert_id, handles)?;
        Ok(())
    }

    /// Add a remote identity to the account's peer book, linked to its
    /// current valid certificate if one is known.
    pub async fn add_peer(
        &self,
        account: &str,
        peer_id: &str,
        account_name: &str,
        nickname: Option<&str>,
    ) -> Result<Peer, NodeError> {
        let db = self.store.lock().await;
        let account = lookup_account(&db, self.peer_id(), account)?;
        let cert = db.latest_valid_certificate(peer_id, account_name, Utc::now())?;
        Ok(db.insert_peer(account.id, peer_id, account_name, nickname, cert.map(|c| c.id))?)
    }

    pub async fn remove_peer(&self, account: &str, nickname: &str) -> Result<(), NodeError> {
        let db = self.store.lock().await;
        let account = lookup_account(&db, self.peer_id(), account)?;
        let peer = db
            .peer_by_nickname(account.id, nickname)?
            .ok_or_else(|| NodeError::UnknownPeer(nickname.to_string()))?;
        db.delete_peer(peer.id)?;
        Ok(())
    }

    async fn account_named(&self, name: &str) -> Result<Account, NodeError> {
        let db = self.store.lock().await;
        lookup_account(&db, self.peer_id(), name)
    }
}

fn lookup_account(db: &Database, peer_id: &str, name: &str) -> Result<Account, NodeError> {
    db.account_by_name(peer_id, name)?
        .ok_or_else(|| NodeError::UnknownAccount(name.to_string()))
}

fn member_group(db: &Database, account: &Account, name: &str) -> Result<Group, NodeError> {
    db.group_by_name(account.id, name)?
        .ok_or_else(|| NodeError::NotAMember {
            account: account.account_name.clone(),
            group: name.to_string(),
        })
}

fn update_memberships(
    db: &Database,
    account: &Account,
    edit: impl FnOnce(&mut Vec<String>),
) -> Result<(), NodeError> {
    let mut groups = db.certificate(account.cert_id)?.groups;
    edit(&mut groups);
    db.set_certificate_groups(account.cert_id, &groups)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use distort_net::{MemoryHub, MemoryPubSub};
    use distort_shared::error::CryptoError;
    use distort_store::OutMessageStatus;

    use super::*;
    use crate::node::NodeSettings;

    fn node() -> (Arc<Node>, MemoryPubSub) {
        let hub = MemoryHub::new();
        let (transport, _rx) = hub.join("QmLocal");
        let db = Database::open_in_memory().unwrap();
        let node = Node::new(Arc::new(transport.clone()), db, NodeSettings::default());
        (node, transport)
    }

    async fn cert_groups(node: &Node, account: &str) -> Vec<String> {
        let db = node.store().lock().await;
        let account = db.account_by_name("QmLocal", account).unwrap().unwrap();
        db.certificate(account.cert_id).unwrap().groups
    }

    #[tokio::test]
    async fn test_account_names_validated() {
        let (node, _) = node();
        assert!(matches!(
            node.create_account("").await,
            Err(NodeError::InvalidAccountName(_))
        ));
        assert!(matches!(
            node.create_account("a:b").await,
            Err(NodeError::InvalidAccountName(_))
        ));
        node.create_account("alice").await.unwrap();
        assert!(matches!(
            node.create_account("alice").await,
            Err(NodeError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_join_subscribes_and_records_membership() {
        let (node, transport) = node();
        node.create_account("root").await.unwrap();

        let group = node.join_group_at("root", "news", 3).await.unwrap();
        assert_eq!(group.subgroup_index, 3);
        assert!(transport.is_subscribed("news-3"));
        assert!(transport.is_subscribed("news-certs"));
        assert_eq!(cert_groups(&node, "root").await, vec!["news:3".to_string()]);

        // First group becomes active
        let db = node.store().lock().await;
        let account = db.account_by_name("QmLocal", "root").unwrap().unwrap();
        assert_eq!(account.active_group_id, Some(group.id));
    }

    #[tokio::test]
    async fn test_rejoin_moves_subgroup() {
        let (node, transport) = node();
        node.create_account("root").await.unwrap();
        node.join_group_at("root", "news", 3).await.unwrap();

        let moved = node.join_group_at("root", "news", 12).await.unwrap();
        assert_eq!(moved.subgroup_index, 12);
        assert!(!transport.is_subscribed("news-3"));
        assert!(transport.is_subscribed("news-12"));
        assert!(transport.is_subscribed("news-certs"));
        assert_eq!(transport.unsubscribe_calls("news-certs"), 0);
        assert_eq!(cert_groups(&node, "root").await, vec!["news:12".to_string()]);

        // Same index again is a no-op
        node.join_group_at("root", "news", 12).await.unwrap();
        assert_eq!(transport.subscribe_calls("news-12"), 1);
    }

    #[tokio::test]
    async fn test_join_level_and_index_bounds() {
        let (node, _) = node();
        node.create_account("root").await.unwrap();

        let group = node.join_group("root", "news", 2).await.unwrap();
        assert!((3..=6).contains(&group.subgroup_index));

        assert!(matches!(
            node.join_group("root", "sports", 6).await,
            Err(NodeError::GroupTree(_))
        ));
        assert!(matches!(
            node.join_group_at("root", "sports", 63).await,
            Err(NodeError::InvalidSubgroup(63))
        ));
    }

    #[tokio::test]
    async fn test_failed_subscribe_leaves_no_group() {
        let (node, transport) = node();
        node.create_account("root").await.unwrap();
        transport.fail_subscribe("news-certs");

        assert!(node.join_group_at("root", "news", 3).await.is_err());
        assert!(!transport.is_subscribed("news-3"));
        let db = node.store().lock().await;
        let account = db.account_by_name("QmLocal", "root").unwrap().unwrap();
        assert!(db.groups_for_account(account.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_leave_group() {
        let (node, transport) = node();
        node.create_account("root").await.unwrap();
        node.join_group_at("root", "news", 3).await.unwrap();
        node.join_group_at("root", "sports", 0).await.unwrap();

        node.leave_group("root", "news").await.unwrap();
        assert!(!transport.is_subscribed("news-3"));
        assert!(!transport.is_subscribed("news-certs"));
        assert!(transport.is_subscribed("sports-all"));
        assert_eq!(cert_groups(&node, "root").await, vec!["sports:0".to_string()]);

        // Active group was news, cleared with it
        let db = node.store().lock().await;
        let account = db.account_by_name("QmLocal", "root").unwrap().unwrap();
        assert_eq!(account.active_group_id, None);
        drop(db);

        assert!(matches!(
            node.leave_group("root", "news").await,
            Err(NodeError::NotAMember { .. })
        ));
    }

    #[tokio::test]
    async fn test_enable_disable() {
        let (node, transport) = node();
        node.create_account("root").await.unwrap();
        node.create_account("alice").await.unwrap();
        node.join_group_at("alice", "news", 3).await.unwrap();
        node.join_group_at("root", "news", 3).await.unwrap();

        assert!(matches!(
            node.set_account_enabled("root", false).await,
            Err(NodeError::RootAccountRequired)
        ));

        // Topic shared with root stays subscribed
        let alice = node.set_account_enabled("alice", false).await.unwrap();
        assert!(!alice.enabled);
        assert!(transport.is_subscribed("news-3"));
        assert_eq!(node.subscriptions().ref_count("news-3").await, 1);

        // Disabling twice changes nothing
        node.set_account_enabled("alice", false).await.unwrap();
        assert_eq!(node.subscriptions().ref_count("news-3").await, 1);

        node.set_account_enabled("alice", true).await.unwrap();
        assert_eq!(node.subscriptions().ref_count("news-3").await, 2);
    }

    /// `bob` is disabled and belongs to arts:1, news:3 (shared with root) and
    /// zine:2, which is visited last.
    async fn disabled_bob(node: &Node) {
        node.create_account("root").await.unwrap();
        node.join_group_at("root", "news", 3).await.unwrap();
        node.create_account("bob").await.unwrap();
        node.set_account_enabled("bob", false).await.unwrap();
        for (group, index) in [("arts", 1), ("news", 3), ("zine", 2)] {
            node.join_group_at("bob", group, index).await.unwrap();
        }
    }

    async fn is_enabled(node: &Node, name: &str) -> bool {
        let db = node.store().lock().await;
        db.account_by_name("QmLocal", name).unwrap().unwrap().enabled
    }

    #[tokio::test]
    async fn test_failed_enable_takes_nothing() {
        let (node, transport) = node();
        disabled_bob(&node).await;
        transport.fail_subscribe("zine-2");

        assert!(node.set_account_enabled("bob", true).await.is_err());
        assert!(!is_enabled(&node, "bob").await);
        assert_eq!(node.subscriptions().ref_count("news-3").await, 1);
        assert_eq!(node.subscriptions().ref_count("arts-1").await, 0);
        assert!(!transport.is_subscribed("arts-1"));

        // Retry takes every group
        transport.clear_failures();
        node.set_account_enabled("bob", true).await.unwrap();
        assert!(is_enabled(&node, "bob").await);
        assert_eq!(node.subscriptions().ref_count("news-3").await, 2);
        assert!(transport.is_subscribed("arts-1"));
        assert!(transport.is_subscribed("zine-2"));

        // Disabling leaves root's reference alone
        node.set_account_enabled("bob", false).await.unwrap();
        assert_eq!(node.subscriptions().ref_count("news-3").await, 1);
        assert!(transport.is_subscribed("news-3"));
        assert!(!transport.is_subscribed("arts-1"));
        assert!(!transport.is_subscribed("zine-2"));
    }

    #[tokio::test]
    async fn test_failed_disable_releases_nothing() {
        let (node, transport) = node();
        disabled_bob(&node).await;
        node.set_account_enabled("bob", true).await.unwrap();
        transport.fail_unsubscribe("zine-2");

        assert!(node.set_account_enabled("bob", false).await.is_err());
        assert!(is_enabled(&node, "bob").await);
        assert_eq!(node.subscriptions().ref_count("news-3").await, 2);
        assert_eq!(node.subscriptions().ref_count("arts-1").await, 1);
        assert!(transport.is_subscribed("arts-1"));

        transport.clear_failures();
        node.set_account_enabled("bob", false).await.unwrap();
        assert!(!is_enabled(&node, "bob").await);
        assert_eq!(node.subscriptions().ref_count("news-3").await, 1);
        assert!(!transport.is_subscribed("zine-2"));
    }

    #[tokio::test]
    async fn test_failed_leave_keeps_membership() {
        let (node, transport) = node();
        node.create_account("root").await.unwrap();
        node.join_group_at("root", "news", 3).await.unwrap();
        node.join_group_at("root", "sports", 0).await.unwrap();
        transport.fail_unsubscribe("news-3");

        assert!(node.leave_group("root", "news").await.is_err());
        assert_eq!(node.subscriptions().ref_count("news-3").await, 1);
        assert_eq!(node.subscriptions().ref_count("news-certs").await, 1);
        assert_eq!(
            cert_groups(&node, "root").await,
            vec!["news:3".to_string(), "sports:0".to_string()]
        );
        {
            let db = node.store().lock().await;
            let account = db.account_by_name("QmLocal", "root").unwrap().unwrap();
            assert!(db.group_by_name(account.id, "news").unwrap().is_some());
        }

        transport.clear_failures();
        node.leave_group("root", "news").await.unwrap();
        assert_eq!(node.subscriptions().ref_count("news-3").await, 0);
        assert!(!transport.is_subscribed("news-certs"));
        assert_eq!(cert_groups(&node, "root").await, vec!["sports:0".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_move_keeps_old_subgroup() {
        let (node, transport) = node();
        node.create_account("root").await.unwrap();
        node.join_group_at("root", "news", 3).await.unwrap();
        transport.fail_unsubscribe("news-3");

        assert!(node.join_group_at("root", "news", 12).await.is_err());
        assert!(transport.is_subscribed("news-3"));
        assert!(!transport.is_subscribed("news-12"));
        assert_eq!(node.subscriptions().ref_count("news-certs").await, 1);
        assert_eq!(cert_groups(&node, "root").await, vec!["news:3".to_string()]);
    }

    #[tokio::test]
    async fn test_social_media_handles() {
        let (node, _) = node();
        node.create_account("root").await.unwrap();
        let handles = vec![SocialMediaHandle {
            platform: "mastodon".to_string(),
            handle: "@root@example.org".to_string(),
        }];

        node.set_social_media("root", &handles).await.unwrap();
        let db = node.store().lock().await;
        let account = db.account_by_name("QmLocal", "root").unwrap().unwrap();
        assert_eq!(db.certificate(account.cert_id).unwrap().social_media, handles);
        drop(db);

        assert!(matches!(
            node.set_social_media("nobody", &handles).await,
            Err(NodeError::UnknownAccount(_))
        ));
    }

    #[tokio::test]
    async fn test_active_group_requires_membership() {
        let (node, _) = node();
        node.create_account("root").await.unwrap();
        node.join_group_at("root", "news", 0).await.unwrap();
        node.join_group_at("root", "sports", 0).await.unwrap();

        node.set_active_group("root", Some("sports")).await.unwrap();
        assert!(matches!(
            node.set_active_group("root", Some("cooking")).await,
            Err(NodeError::NotAMember { .. })
        ));
        node.set_active_group("root", None).await.unwrap();
        node.mark_group_read("root", "news", 7).await.unwrap();
        {
            let db = node.store().lock().await;
            let account = db.account_by_name("QmLocal", "root").unwrap().unwrap();
            let news = db.group_by_name(account.id, "news").unwrap().unwrap();
            assert_eq!(news.last_read_index, 7);
        }
        assert!(matches!(
            node.set_active_group("nobody", None).await,
            Err(NodeError::UnknownAccount(_))
        ));
    }

    #[tokio::test]
    async fn test_enqueue_and_cancel() {
        let (node, _) = node();
        node.create_account("alice").await.unwrap();
        node.create_account("bob").await.unwrap();
        node.join_group_at("alice", "news", 0).await.unwrap();
        node.join_group_at("alice", "sports", 0).await.unwrap();

        let to_bob = Recipient::Identity {
            peer_id: "QmLocal".to_string(),
            account_name: "bob".to_string(),
        };
        let first = node.enqueue_message("alice", "sports", &to_bob, "one").await.unwrap();
        let second = node.enqueue_message("alice", "sports", &to_bob, "two").await.unwrap();
        assert_eq!((first.index, second.index), (0, 1));
        assert_eq!(first.conversation_id, second.conversation_id);

        // Enqueueing switches the active group
        {
            let db = node.store().lock().await;
            let alice = db.account_by_name("QmLocal", "alice").unwrap().unwrap();
            let sports = db.group_by_name(alice.id, "sports").unwrap().unwrap();
            assert_eq!(alice.active_group_id, Some(sports.id));
        }

        assert!(node.cancel_message(first.id).await.unwrap());
        assert!(!node.cancel_message(first.id).await.unwrap());
        let entries = node
            .conversation_messages(first.conversation_id, 0, 10)
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(
            &entries[0],
            ConversationEntry::Out(m) if m.status == OutMessageStatus::Cancelled
        ));
    }

    #[tokio::test]
    async fn test_enqueue_rejections() {
        let (node, _) = node();
        node.create_account("alice").await.unwrap();
        node.join_group_at("alice", "news", 0).await.unwrap();

        let stranger = Recipient::Identity {
            peer_id: "QmNobody".to_string(),
            account_name: "root".to_string(),
        };
        assert!(matches!(
            node.enqueue_message("alice", "news", &stranger, "hi").await,
            Err(NodeError::NoValidCertificate(_))
        ));
        assert!(matches!(
            node.enqueue_message("alice", "sports", &stranger, "hi").await,
            Err(NodeError::NotAMember { .. })
        ));
        assert!(matches!(
            node.enqueue_message("alice", "news", &Recipient::Nickname("bob".into()), "hi")
                .await,
            Err(NodeError::UnknownPeer(_))
        ));
        assert!(matches!(
            node.enqueue_message("alice", "news", &stranger, &"x".repeat(2000)).await,
            Err(NodeError::Crypto(CryptoError::MessageTooLong { .. }))
        ));
    }

    #[tokio::test]
    async fn test_peer_book() {
        let (node, _) = node();
        node.create_account("alice").await.unwrap();
        node.create_account("bob").await.unwrap();
        node.join_group_at("alice", "news", 0).await.unwrap();

        let peer = node
            .add_peer("alice", "QmLocal", "bob", Some("bobby"))
            .await
            .unwrap();
        assert!(peer.cert_id.is_some());
        let unknown = node
            .add_peer("alice", "QmNobody", "root", Some("ghost"))
            .await
            .unwrap();
        assert!(unknown.cert_id.is_none());

        let message = node
            .enqueue_message("alice", "news", &Recipient::Nickname("bobby".into()), "hey")
            .await
            .unwrap();
        assert_eq!(message.to_cert_id, peer.cert_id.unwrap());

        node.remove_peer("alice", "bobby").await.unwrap();
        assert!(matches!(
            node.remove_peer("alice", "bobby").await,
            Err(NodeError::UnknownPeer(_))
        ));
    }
}
