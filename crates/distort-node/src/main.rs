use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use distort_net::{spawn_swarm, SwarmConfig};
use distort_node::identity::load_or_create_keypair;
use distort_node::{Node, NodeConfig, NodeSettings};
use distort_store::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,distort_node=debug,distort_net=info")),
        )
        .init();

    info!("Starting distort node v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = NodeConfig::from_env();
    info!(?config, "Loaded configuration");

    let db_path = config.resolved_db_path()?;
    let db = Database::open_at(&db_path)?;
    info!(path = %db_path.display(), "Opened database");

    let keypair = load_or_create_keypair(&config.resolved_key_path()?)?;

    // -----------------------------------------------------------------------
    // 3. Spawn the libp2p swarm (runs in background tokio task)
    // -----------------------------------------------------------------------
    let (swarm, inbound) = spawn_swarm(
        keypair,
        SwarmConfig {
            listen_port: config.listen_port,
            bootstrap: config.bootstrap.clone(),
        },
    )
    .await?;

    // -----------------------------------------------------------------------
    // 4. Bring the node up: accounts, subscriptions, timers
    // -----------------------------------------------------------------------
    let node = Node::new(Arc::new(swarm.clone()), db, NodeSettings::from(&config));
    node.spawn_dispatch(inbound);
    node.init().await?;
    info!(peer_id = %node.peer_id(), "Node running");

    // -----------------------------------------------------------------------
    // 5. Run until Ctrl+C
    // -----------------------------------------------------------------------
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");

    node.shutdown().await;
    swarm.shutdown().await;
    Ok(())
}
