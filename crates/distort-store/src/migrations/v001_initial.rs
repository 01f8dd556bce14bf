//! v001 -- Initial schema creation.
//!
//! Creates the seven core tables: `certificates`, `accounts`, `groups`,
//! `conversations`, `out_messages`, `in_messages` and `peers`.
//!
//! Timestamps are RFC-3339 strings with millisecond precision and a `Z`
//! suffix, so they order correctly as text.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Certificates
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS certificates (
    id              TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    peer_id         TEXT NOT NULL,
    account_name    TEXT NOT NULL DEFAULT 'root',
    encrypt_public  TEXT NOT NULL,              -- hex X25519
    encrypt_secret  TEXT,                       -- present only for our own
    sign_public     TEXT NOT NULL,              -- hex Ed25519
    sign_secret     TEXT,
    groups          TEXT NOT NULL DEFAULT '[]', -- JSON array of "name:index"
    social_media    TEXT NOT NULL DEFAULT '[]', -- JSON array of handles
    last_expiration TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'valid'
        CHECK (status IN ('valid', 'invalidated'))
);

-- At most one valid certificate per identity
CREATE UNIQUE INDEX IF NOT EXISTS idx_certificates_one_valid
    ON certificates(peer_id, account_name) WHERE status = 'valid';

-- ----------------------------------------------------------------
-- Accounts
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS accounts (
    id              TEXT PRIMARY KEY NOT NULL,
    peer_id         TEXT NOT NULL,
    account_name    TEXT NOT NULL DEFAULT 'root',
    cert_id         TEXT NOT NULL,
    enabled         INTEGER NOT NULL DEFAULT 1,
    active_group_id TEXT,

    UNIQUE (peer_id, account_name),
    FOREIGN KEY (cert_id) REFERENCES certificates(id),
    FOREIGN KEY (active_group_id) REFERENCES groups(id) ON DELETE SET NULL
);

-- ----------------------------------------------------------------
-- Groups
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS groups (
    id              TEXT PRIMARY KEY NOT NULL,
    account_id      TEXT NOT NULL,
    name            TEXT NOT NULL,
    subgroup_index  INTEGER NOT NULL CHECK (subgroup_index >= 0),
    height          INTEGER NOT NULL DEFAULT 0,
    last_read_index INTEGER NOT NULL DEFAULT -1,

    UNIQUE (account_id, name),
    FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Conversations
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id                   TEXT PRIMARY KEY NOT NULL,
    group_id             TEXT NOT NULL,
    account_id           TEXT NOT NULL,          -- local owner
    peer_id              TEXT NOT NULL,          -- remote party
    account_name         TEXT NOT NULL DEFAULT 'root',
    height               INTEGER NOT NULL DEFAULT 0,
    latest_status_change TEXT NOT NULL,

    UNIQUE (group_id, peer_id, account_name),
    FOREIGN KEY (group_id) REFERENCES groups(id) ON DELETE CASCADE,
    FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS out_messages (
    id                 TEXT PRIMARY KEY NOT NULL,
    conversation_id    TEXT NOT NULL,
    idx                INTEGER NOT NULL,
    message            TEXT NOT NULL,
    to_cert_id         TEXT NOT NULL,
    status             TEXT NOT NULL DEFAULT 'enqueued'
        CHECK (status IN ('enqueued', 'cancelled', 'sent')),
    last_status_change TEXT NOT NULL,

    UNIQUE (conversation_id, idx),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
    FOREIGN KEY (to_cert_id) REFERENCES certificates(id)
);

CREATE INDEX IF NOT EXISTS idx_out_messages_queue
    ON out_messages(status, last_status_change);

CREATE TABLE IF NOT EXISTS in_messages (
    id              TEXT PRIMARY KEY NOT NULL,
    conversation_id TEXT NOT NULL,
    idx             INTEGER NOT NULL,
    message         TEXT NOT NULL,
    verified        INTEGER NOT NULL DEFAULT 0,
    date_received   TEXT NOT NULL,

    UNIQUE (conversation_id, idx),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Peers (address book)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS peers (
    id           TEXT PRIMARY KEY NOT NULL,
    account_id   TEXT NOT NULL,
    peer_id      TEXT NOT NULL,
    account_name TEXT NOT NULL DEFAULT 'root',
    nickname     TEXT,
    cert_id      TEXT,

    UNIQUE (account_id, nickname),
    UNIQUE (account_id, peer_id, account_name),
    FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE,
    FOREIGN KEY (cert_id) REFERENCES certificates(id)
);
"#;

/// Apply the initial schema.
pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)
}
