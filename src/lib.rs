//! Append-only proof-of-work ledger node.
//!
//! [`blockchain`] holds the core (payloads, blocks, the ledger and its
//! signature rules); [`api`] and [`client`] expose it over HTTP and replicate
//! it from peers.

pub mod api;
pub mod blockchain;
pub mod client;
pub mod config;
