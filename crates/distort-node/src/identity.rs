//! Persistent transport identity.
//!
//! The node's peer ID is derived from an ed25519 key whose 32-byte seed is
//! kept hex encoded in a key file, generated on first start.

use std::path::Path;

use anyhow::Context;
use libp2p::identity::Keypair;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::info;

pub fn load_or_create_keypair(path: &Path) -> anyhow::Result<Keypair> {
    if path.exists() {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading node key {}", path.display()))?;
        let seed = hex::decode(raw.trim()).context("node key is not hex")?;
        let keypair = Keypair::ed25519_from_bytes(seed).context("node key is not an ed25519 seed")?;
        info!(peer_id = %keypair.public().to_peer_id(), "Loaded node identity");
        return Ok(keypair);
    }

    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, hex::encode(seed))
        .with_context(|| format!("writing node key {}", path.display()))?;

    let keypair = Keypair::ed25519_from_bytes(seed).context("generated seed rejected")?;
    info!(peer_id = %keypair.public().to_peer_id(), path = %path.display(), "Created node identity");
    Ok(keypair)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("node.key");

        let first = load_or_create_keypair(&path).unwrap();
        let second = load_or_create_keypair(&path).unwrap();
        assert_eq!(first.public().to_peer_id(), second.public().to_peer_id());
    }

    #[test]
    fn test_garbage_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.key");
        std::fs::write(&path, "zz").unwrap();
        assert!(load_or_create_keypair(&path).is_err());
    }
}
