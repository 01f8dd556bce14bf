//! Node context: owns the store, the transport and the subscription table,
//! and drives the periodic message and certificate rounds.

use std::sync::Arc;
use std::time::Duration;

use libp2p::Multiaddr;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use distort_net::{choose_redials, InboundMessage, PubSub, SubscriptionManager};
use distort_shared::constants::{
    DEFAULT_CERT_INTERVAL_SECS, DEFAULT_MESSAGE_INTERVAL_SECS, MAX_BOOTSTRAP_REDIALS, ROOT_ACCOUNT,
};
use distort_shared::topics::TopicKind;
use distort_store::{Account, Database};

use crate::certificates::CertificateOutcome;
use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::messaging::MessageOutcome;

/// Scheduling and bootstrap settings of a running node.
#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub message_interval: Duration,
    pub cert_interval: Duration,
    pub bootstrap: Vec<Multiaddr>,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            message_interval: Duration::from_secs(DEFAULT_MESSAGE_INTERVAL_SECS),
            cert_interval: Duration::from_secs(DEFAULT_CERT_INTERVAL_SECS),
            bootstrap: Vec::new(),
        }
    }
}

impl From<&NodeConfig> for NodeSettings {
    fn from(config: &NodeConfig) -> Self {
        Self {
            message_interval: config.message_interval,
            cert_interval: config.cert_interval,
            bootstrap: config.bootstrap.clone(),
        }
    }
}

/// What became of one inbound delivery.
#[derive(Debug)]
pub enum InboundOutcome {
    Message(MessageOutcome),
    Certificate(CertificateOutcome),
    /// Delivery on a topic no local group holds any more
    Unrouted,
}

pub struct Node {
    peer_id: String,
    pub(crate) store: Mutex<Database>,
    pub(crate) transport: Arc<dyn PubSub>,
    pub(crate) subscriptions: SubscriptionManager,
    settings: NodeSettings,
    shutdown_tx: watch::Sender<bool>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
    pub fn new(transport: Arc<dyn PubSub>, db: Database, settings: NodeSettings) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            peer_id: transport.local_peer_id().to_string(),
            store: Mutex::new(db),
            subscriptions: SubscriptionManager::new(transport.clone()),
            transport,
            settings,
            shutdown_tx,
            tasks: std::sync::Mutex::new(Vec::new()),
        })
    }

    /// Transport identity shared by every local account.
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn store(&self) -> &Mutex<Database> {
        &self.store
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// Bring the node up.
    ///
    /// Creates the root account on first start, otherwise subscribes every
    /// group of every enabled account. Then starts the message and
    /// certificate timers and announces certificates once right away.
    pub async fn init(self: &Arc<Self>) -> Result<(), NodeError> {
        self.redial_bootstrap(self.settings.bootstrap.len()).await;

        let existing = {
            let db = self.store.lock().await;
            db.account_by_name(&self.peer_id, ROOT_ACCOUNT)?
        };
        match existing {
            None => {
                info!(peer_id = %self.peer_id, "Creating root account");
                self.create_account(ROOT_ACCOUNT).await?;
            }
            Some(_) => {
                let accounts = self.enabled_accounts().await?;
                for account in &accounts {
                    self.subscribe_account_groups(account).await?;
                }
                info!(accounts = accounts.len(), "Restored group subscriptions");
            }
        }

        self.spawn_timers();
        self.publish_all_certificates().await;
        Ok(())
    }

    /// Route transport deliveries to the protocol handlers until shutdown.
    ///
    /// Each delivery is handled in its own task so a slow decrypt never holds
    /// up the queue.
    pub fn spawn_dispatch(self: &Arc<Self>, mut inbound: mpsc::Receiver<InboundMessage>) {
        let node = self.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    message = inbound.recv() => {
                        let Some(message) = message else {
                            info!("Inbound channel closed, stopping dispatch");
                            break;
                        };
                        let node = node.clone();
                        tokio::spawn(async move {
                            let topic = message.topic.clone();
                            if let Err(e) = node.handle_inbound(message).await {
                                if e.is_routine() {
                                    debug!(topic = %topic, error = %e, "Dropped inbound delivery");
                                } else {
                                    error!(topic = %topic, error = %e, "Failed to handle inbound delivery");
                                }
                            }
                        });
                    }
                    _ = shutdown.changed() => break,
                }
            }
        });
        self.track(handle);
    }

    /// Handle one delivery according to the kind of topic it arrived on.
    pub async fn handle_inbound(&self, message: InboundMessage) -> Result<InboundOutcome, NodeError> {
        match self.subscriptions.handler_for(&message.topic).await {
            Some(TopicKind::Message) => Ok(InboundOutcome::Message(
                self.handle_message(&message.data, &message.from, &message.topic)
                    .await?,
            )),
            Some(TopicKind::Certificate) => Ok(InboundOutcome::Certificate(
                self.handle_certificate(&message.data, &message.from).await?,
            )),
            None => {
                debug!(topic = %message.topic, "Delivery on unsubscribed topic");
                Ok(InboundOutcome::Unrouted)
            }
        }
    }

    /// One dequeue round for every enabled account, each on its own path.
    pub async fn dequeue_all(&self) {
        self.redial_bootstrap(MAX_BOOTSTRAP_REDIALS).await;

        let accounts = match self.enabled_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                error!(error = %e, "Failed to list accounts for dequeue");
                return;
            }
        };
        for account in accounts {
            if let Err(e) = self.dequeue_and_publish(&account).await {
                warn!(account = %account.account_name, error = %e, "Dequeue round failed");
            }
        }
    }

    pub async fn publish_all_certificates(&self) {
        let accounts = match self.enabled_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                error!(error = %e, "Failed to list accounts for certificate round");
                return;
            }
        };
        for account in accounts {
            if let Err(e) = self.publish_certificate(&account).await {
                warn!(account = %account.account_name, error = %e, "Certificate publish failed");
            }
        }
    }

    /// Stop timers and dispatch. Rounds already running finish normally.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<JoinHandle<()>> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            let _ = handle.await;
        }
        info!("Node stopped");
    }

    pub(crate) async fn enabled_accounts(&self) -> Result<Vec<Account>, NodeError> {
        let db = self.store.lock().await;
        Ok(db.accounts_for_peer(&self.peer_id, true)?)
    }

    /// Take a subscription for every group of `account`. On failure the
    /// groups already taken by this call are released again.
    pub(crate) async fn subscribe_account_groups(&self, account: &Account) -> Result<(), NodeError> {
        let groups = {
            let db = self.store.lock().await;
            db.groups_for_account(account.id)?
        };
        for (taken, group) in groups.iter().enumerate() {
            if let Err(e) = self.subscriptions.subscribe(&group.name, group.subgroup_index).await {
                for done in &groups[..taken] {
                    if let Err(release) = self.subscriptions.unsubscribe(&done.name, done.subgroup_index).await {
                        warn!(group = %done.name, error = %release, "Failed to release subscription");
                    }
                }
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Release the subscription of every group of `account`. On failure the
    /// groups already released by this call are taken again.
    pub(crate) async fn unsubscribe_account_groups(&self, account: &Account) -> Result<(), NodeError> {
        let groups = {
            let db = self.store.lock().await;
            db.groups_for_account(account.id)?
        };
        for (released, group) in groups.iter().enumerate() {
            if let Err(e) = self.subscriptions.unsubscribe(&group.name, group.subgroup_index).await {
                for done in &groups[..released] {
                    if let Err(retake) = self.subscriptions.subscribe(&done.name, done.subgroup_index).await {
                        warn!(group = %done.name, error = %retake, "Failed to restore subscription");
                    }
                }
                return Err(e.into());
            }
        }
        Ok(())
    }

    async fn redial_bootstrap(&self, max: usize) {
        for address in choose_redials(&self.settings.bootstrap, max) {
            if let Err(e) = self.transport.dial(&address.to_string()).await {
                warn!(addr = %address, error = %e, "Failed to dial bootstrap peer");
            }
        }
    }

    fn spawn_timers(self: &Arc<Self>) {
        let node = self.clone();
        let period = self.settings.message_interval;
        let mut shutdown = self.shutdown_tx.subscribe();
        let messages = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => node.dequeue_all().await,
                    _ = shutdown.changed() => break,
                }
            }
        });

        let node = self.clone();
        let period = self.settings.cert_interval;
        let mut shutdown = self.shutdown_tx.subscribe();
        let certificates = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => node.publish_all_certificates().await,
                    _ = shutdown.changed() => break,
                }
            }
        });

        self.track(messages);
        self.track(certificates);
    }

    fn track(&self, handle: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(handle);
        }
    }
}
