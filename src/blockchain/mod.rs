// Blockchain module
//
// This module contains the ledger core:
// - Payload kinds carried by blocks
// - Block structure, hashing and proof of work
// - Ledger with append-time validation and replication cursors
// - Signature utilities

pub mod block;
pub mod chain;
pub mod crypto;
pub mod payload;

// Re-export main components for easier access
pub use block::{Block, BlockError};
pub use chain::{Ledger, LedgerError, ValidationError, GENESIS_SENTINEL};
pub use crypto::KeyPair;
pub use payload::{Payload, PayloadError, Transfer, WalletRegistration};
