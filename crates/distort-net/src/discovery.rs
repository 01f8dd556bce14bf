//! Bootstrap peer loading and re-dial selection.
//!
//! Bootstrap peers come from a file (one multiaddr per line) and/or an inline
//! list. The swarm dials all of them on startup; the scheduler re-dials a few
//! at random before each dequeue cycle to keep the mesh populated.

use std::fs;
use std::path::Path;

use libp2p::Multiaddr;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

/// Load bootstrap peer multiaddrs from a configuration file.
///
/// Empty lines and lines starting with `#` are ignored. Malformed lines are
/// logged and skipped; an unreadable file yields an empty list.
///
/// ```text
/// # bootstrap nodes
/// /ip4/198.51.100.10/udp/4001/quic-v1/p2p/12D3KooW...
/// ```
pub fn load_bootstrap_peers(path: &Path) -> Vec<Multiaddr> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Failed to read bootstrap peers file"
            );
            return Vec::new();
        }
    };

    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();
    let addrs = parse_multiaddrs(&lines);

    info!(
        count = addrs.len(),
        path = %path.display(),
        "Loaded bootstrap peers"
    );
    addrs
}

/// Parse multiaddr strings, skipping the ones that do not parse.
pub fn parse_multiaddrs<S: AsRef<str>>(raw: &[S]) -> Vec<Multiaddr> {
    raw.iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<Multiaddr>() {
            Ok(addr) => {
                debug!(addr = %addr, "Loaded bootstrap peer");
                Some(addr)
            }
            Err(e) => {
                warn!(addr = %s, error = %e, "Skipping invalid multiaddr");
                None
            }
        })
        .collect()
}

/// Pick at most `max` distinct peers to re-dial, uniformly at random.
pub fn choose_redials(peers: &[Multiaddr], max: usize) -> Vec<Multiaddr> {
    let mut rng = rand::thread_rng();
    peers.choose_multiple(&mut rng, max).cloned().collect()
}
