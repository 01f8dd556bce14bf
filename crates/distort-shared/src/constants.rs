use chrono::Duration;

/// Wire protocol version carried in the `v` field of every envelope
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Versions this node accepts on inbound envelopes
pub const SUPPORTED_PROTOCOLS: &[&str] = &[PROTOCOL_VERSION];

/// Protocol string for libp2p identify
pub const IDENTIFY_PROTOCOL: &str = "/distort/1.0.0";

/// Name of the implicit account every node owns. It can never be disabled.
pub const ROOT_ACCOUNT: &str = "root";

/// Exact length in bytes of the normalized (padded) message before encryption.
/// Part of the protocol, not configurable.
pub const MESSAGE_LENGTH: usize = 1024;

/// Padding is drawn in blocks of this many hex characters
pub const PADDING_BLOCK: usize = 8;

/// Filler used for the sub-block remainder of the padding
pub const PADDING_FILLER: char = 'a';

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// X25519 / Ed25519 key size in bytes
pub const KEY_SIZE: usize = 32;

/// Depth of the group tree. Paths hold `MAX_PATH_DEPTH + 1` node indices.
pub const MAX_PATH_DEPTH: usize = 5;

/// Highest node index in the group tree (`2^(D+1) - 2`)
pub const MAX_INDEX: u32 = (1 << (MAX_PATH_DEPTH + 1)) - 2;

/// Maximum gossipsub frame (envelopes are ~2 KiB, certificates smaller)
pub const MAX_TRANSMIT_SIZE: usize = 16 * 1024;

/// GossipSub heartbeat interval in seconds
pub const GOSSIPSUB_HEARTBEAT_SECS: u64 = 1;

/// Default QUIC listen port
pub const DEFAULT_QUIC_PORT: u16 = 4001;

/// Default interval between dequeue cycles (5 minutes)
pub const DEFAULT_MESSAGE_INTERVAL_SECS: u64 = 5 * 60;

/// Default interval between certificate announcements (30 minutes)
pub const DEFAULT_CERT_INTERVAL_SECS: u64 = 30 * 60;

/// Configured bootstrap peers re-dialed before each dequeue cycle
pub const MAX_BOOTSTRAP_REDIALS: usize = 2;

/// Key derivation context (BLAKE3) for per-message symmetric keys
pub const KDF_CONTEXT_MESSAGE_KEY: &str = "distort-message-key-v1";

/// Lifetime granted to a certificate each time it is created or refreshed
pub fn cert_length() -> Duration {
    Duration::days(14)
}
