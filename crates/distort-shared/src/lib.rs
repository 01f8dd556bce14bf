//! Protocol primitives shared by every distort crate: the group tree, key
//! material, fixed-length message sealing, wire envelopes and topic grammar.

pub mod codec;
pub mod constants;
pub mod error;
pub mod group_tree;
pub mod keys;
pub mod protocol;
pub mod topics;
