//! Node configuration loaded from environment variables.
//!
//! All settings have sensible defaults so a node can start with zero
//! configuration for local development.

use std::path::PathBuf;
use std::time::Duration;

use libp2p::Multiaddr;

use distort_net::{load_bootstrap_peers, parse_multiaddrs};
use distort_shared::constants::{
    DEFAULT_CERT_INTERVAL_SECS, DEFAULT_MESSAGE_INTERVAL_SECS, DEFAULT_QUIC_PORT,
};
use distort_store::Database;

/// Node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// QUIC port to listen on.
    /// Env: `DISTORT_LISTEN_PORT`
    /// Default: `4001`
    pub listen_port: u16,

    /// SQLite database file.
    /// Env: `DISTORT_DB_PATH`
    /// Default: platform data directory
    pub db_path: Option<PathBuf>,

    /// File holding the hex ed25519 seed of the transport identity. Created
    /// on first run.
    /// Env: `DISTORT_KEY_PATH`
    /// Default: `node.key` next to the database
    pub key_path: Option<PathBuf>,

    /// Env: `DISTORT_BOOTSTRAP` (comma separated) and `DISTORT_BOOTSTRAP_FILE`
    /// (one multiaddr per line)
    pub bootstrap: Vec<Multiaddr>,

    /// Env: `DISTORT_MESSAGE_INTERVAL_SECS`
    /// Default: 300
    pub message_interval: Duration,

    /// Env: `DISTORT_CERT_INTERVAL_SECS`
    /// Default: 1800
    pub cert_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_QUIC_PORT,
            db_path: None,
            key_path: None,
            bootstrap: Vec::new(),
            message_interval: Duration::from_secs(DEFAULT_MESSAGE_INTERVAL_SECS),
            cert_interval: Duration::from_secs(DEFAULT_CERT_INTERVAL_SECS),
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = var("DISTORT_LISTEN_PORT") {
            match val.parse::<u16>() {
                Ok(port) => config.listen_port = port,
                Err(_) => tracing::warn!(value = %val, "Invalid DISTORT_LISTEN_PORT, using default"),
            }
        }

        if let Some(path) = var("DISTORT_DB_PATH").filter(|p| !p.is_empty()) {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Some(path) = var("DISTORT_KEY_PATH").filter(|p| !p.is_empty()) {
            config.key_path = Some(PathBuf::from(path));
        }

        if let Some(list) = var("DISTORT_BOOTSTRAP") {
            let raw: Vec<&str> = list.split(',').collect();
            config.bootstrap.extend(parse_multiaddrs(&raw));
        }

        if let Some(path) = var("DISTORT_BOOTSTRAP_FILE").filter(|p| !p.is_empty()) {
            config
                .bootstrap
                .extend(load_bootstrap_peers(&PathBuf::from(path)));
        }

        if let Some(secs) = parse_secs(var("DISTORT_MESSAGE_INTERVAL_SECS"), "DISTORT_MESSAGE_INTERVAL_SECS") {
            config.message_interval = secs;
        }

        if let Some(secs) = parse_secs(var("DISTORT_CERT_INTERVAL_SECS"), "DISTORT_CERT_INTERVAL_SECS") {
            config.cert_interval = secs;
        }

        config
    }

    /// Database location, resolving the platform default if unset.
    pub fn resolved_db_path(&self) -> distort_store::Result<PathBuf> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => Database::default_path(),
        }
    }

    pub fn resolved_key_path(&self) -> distort_store::Result<PathBuf> {
        if let Some(path) = &self.key_path {
            return Ok(path.clone());
        }
        let db_path = self.resolved_db_path()?;
        Ok(db_path.with_file_name("node.key"))
    }
}

fn parse_secs(value: Option<String>, name: &str) -> Option<Duration> {
    let value = value?;
    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => {
            tracing::warn!(value = %value, var = name, "Invalid interval, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> NodeConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        NodeConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = config_from(&[]);
        assert_eq!(config.listen_port, 4001);
        assert_eq!(config.message_interval, Duration::from_secs(300));
        assert_eq!(config.cert_interval, Duration::from_secs(1800));
        assert!(config.bootstrap.is_empty());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("DISTORT_LISTEN_PORT", "5001"),
            ("DISTORT_DB_PATH", "/tmp/distort/node.db"),
            (
                "DISTORT_BOOTSTRAP",
                "/ip4/10.0.0.1/udp/4001/quic-v1, not-an-addr,/ip4/10.0.0.2/udp/4001/quic-v1",
            ),
            ("DISTORT_MESSAGE_INTERVAL_SECS", "10"),
        ]);
        assert_eq!(config.listen_port, 5001);
        assert_eq!(config.bootstrap.len(), 2);
        assert_eq!(config.message_interval, Duration::from_secs(10));
        assert_eq!(
            config.resolved_key_path().unwrap(),
            PathBuf::from("/tmp/distort/node.key")
        );
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("DISTORT_LISTEN_PORT", "not-a-port"),
            ("DISTORT_CERT_INTERVAL_SECS", "0"),
        ]);
        assert_eq!(config.listen_port, 4001);
        assert_eq!(config.cert_interval, Duration::from_secs(1800));
    }
}
