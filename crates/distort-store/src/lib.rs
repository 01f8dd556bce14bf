//! # distort-store
//!
//! Local SQLite storage for a distort node: certificates, accounts, groups,
//! conversations, queued and received messages, and the address book.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! model. Operations that must be atomic (certificate import, index
//! reservation, status transitions) run inside a single transaction.

pub mod accounts;
pub mod certificates;
pub mod conversations;
pub mod database;
pub mod groups;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod peers;

mod error;

pub use certificates::{CertificateStore, ImportedCertificate};
pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
