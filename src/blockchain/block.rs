use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use std::fmt;

use super::payload::{Payload, PayloadError};

/// Errors that can occur while building, mining or decoding a block
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("Mining exhausted: no hash with prefix {difficulty:?} within {attempts} attempts")]
    MiningExhausted { attempts: u64, difficulty: String },

    #[error("Malformed block: {0}")]
    MalformedBlock(#[from] serde_json::Error),

    #[error("Payload error: {0}")]
    PayloadError(#[from] PayloadError),
}

/// Represents a block in the ledger.
///
/// Field names on the wire follow the replication format:
/// `{from, data_type_id, data_string, signature, nonce, previous_block_hash}`.
/// The decoded payload never travels; receivers rebuild it from
/// `payload_json` with [`Block::decode_payload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Identity that issued the block
    #[serde(rename = "from")]
    pub issuer: String,

    /// Decoded payload cache, absent until parsed from `payload_json`
    #[serde(skip)]
    payload: Option<Payload>,

    /// Type tag of the payload
    #[serde(rename = "data_type_id")]
    pub payload_type_tag: String,

    /// Canonical payload JSON, authoritative for hashing and signing
    #[serde(rename = "data_string")]
    pub payload_json: String,

    /// Base64 signature over `payload_json`
    pub signature: String,

    /// Proof of work
    pub nonce: u64,

    /// Hash of the previous block
    #[serde(rename = "previous_block_hash")]
    pub previous_hash: String,
}

/// Hasher primed with every field except the nonce, which always comes last.
fn prefix_hasher(type_tag: &str, payload_json: &str, previous_hash: &str) -> Sha256 {
    let mut hasher = Sha256::new();
    hasher.update(type_tag.as_bytes());
    hasher.update(payload_json.as_bytes());
    hasher.update(previous_hash.as_bytes());
    hasher
}

fn finish(mut hasher: Sha256, nonce: u64) -> String {
    hasher.update(nonce.to_be_bytes());
    hex::encode(hasher.finalize())
}

impl Block {
    /// Creates a new block, deriving the type tag and JSON from `payload`
    pub fn make(
        issuer: &str,
        payload: Payload,
        signature: &str,
        nonce: u64,
        previous_hash: &str,
    ) -> Self {
        Block {
            issuer: issuer.to_string(),
            payload_type_tag: payload.type_tag().to_string(),
            payload_json: payload.serialize(),
            payload: Some(payload),
            signature: signature.to_string(),
            nonce,
            previous_hash: previous_hash.to_string(),
        }
    }

    /// SHA-256 over `type_tag || payload_json || previous_hash || nonce (8 bytes, BE)`,
    /// as lowercase hex
    pub fn hash(&self) -> String {
        let hasher = prefix_hasher(&self.payload_type_tag, &self.payload_json, &self.previous_hash);
        finish(hasher, self.nonce)
    }

    pub fn meets_difficulty(&self, difficulty: &str) -> bool {
        self.hash().starts_with(difficulty)
    }

    /// Searches nonces `0..max_attempts` for a block whose hash starts with
    /// `difficulty`.
    ///
    /// The expected attempt count for an n-digit hex prefix is `16^n`, so
    /// `max_attempts` has to grow with the difficulty.
    pub fn mine(
        difficulty: &str,
        issuer: &str,
        payload: Payload,
        signature: &str,
        previous_hash: &str,
        max_attempts: u64,
    ) -> Result<Self, BlockError> {
        let hasher = prefix_hasher(payload.type_tag(), &payload.serialize(), previous_hash);

        let nonce = (0..max_attempts)
            .find(|nonce| finish(hasher.clone(), *nonce).starts_with(difficulty))
            .ok_or_else(|| BlockError::MiningExhausted {
                attempts: max_attempts,
                difficulty: difficulty.to_string(),
            })?;

        debug!("Mined block for {} after {} attempts", issuer, nonce + 1);

        Ok(Block::make(issuer, payload, signature, nonce, previous_hash))
    }

    /// The decoded payload, if it has been built or parsed
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Rebuilds the payload cache from `payload_type_tag` and `payload_json`
    pub fn decode_payload(&mut self) -> Result<&Payload, PayloadError> {
        let payload = Payload::parse(&self.payload_type_tag, &self.payload_json)?;
        Ok(&*self.payload.insert(payload))
    }

    /// Wire form of the block
    pub fn serialize(&self) -> Result<String, BlockError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses the wire form. The payload stays undecoded.
    pub fn parse(json: &str) -> Result<Self, BlockError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn is_wallet_registration(&self) -> bool {
        self.payload_type_tag == Payload::WALLET_REGISTRATION
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary: String = self.payload_json.chars().take(80).collect();
        write!(f, "{} [{}] {}", self.hash(), self.issuer, summary)
    }
}
