// Client module
//
// Replication: pulls blocks from peers and replays them through local
// validation.

use awc::Client;
use log::{info, warn};
use thiserror::Error;

use crate::blockchain::{Block, Ledger, PayloadError, ValidationError};

/// Upper bound on a catch-up response body
const MAX_RESPONSE_BYTES: usize = 64 * 1024 * 1024;

/// Errors that can occur while catching up from a peer
#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("Request to {peer} failed: {reason}")]
    Request { peer: String, reason: String },

    #[error("Invalid response from {peer}: {reason}")]
    Response { peer: String, reason: String },

    #[error("Block #{index} has an undecodable payload: {source}")]
    Payload { index: usize, source: PayloadError },

    #[error("Block #{index} rejected after {applied} applied: {source}")]
    Rejected {
        index: usize,
        applied: usize,
        source: ValidationError,
    },
}

/// Outcome of one catch-up pass over every peer
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CatchupReport {
    /// Blocks appended to the local ledger
    pub applied: usize,

    /// Peers that were unreachable or sent an unacceptable batch
    pub failed_peers: usize,
}

/// Replays a peer's blocks in order, stopping at the first rejection.
///
/// Payloads are re-decoded from their JSON before anything is appended; one
/// undecodable payload discards the whole batch.
pub fn apply_blocks(ledger: &Ledger, mut blocks: Vec<Block>) -> Result<usize, ReplicationError> {
    for (index, block) in blocks.iter_mut().enumerate() {
        block
            .decode_payload()
            .map_err(|source| ReplicationError::Payload { index, source })?;
    }

    let mut applied = 0;
    for (index, block) in blocks.into_iter().enumerate() {
        ledger
            .append(block)
            .map_err(|source| ReplicationError::Rejected {
                index,
                applied,
                source,
            })?;
        applied += 1;
    }

    Ok(applied)
}

/// Catches a local ledger up from a list of peers
pub struct ReplicationClient {
    ledger: Ledger,
    peers: Vec<String>,
    http: Client,
}

impl ReplicationClient {
    pub fn new(ledger: Ledger, peers: Vec<String>) -> Self {
        ReplicationClient {
            ledger,
            peers,
            http: Client::default(),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    async fn fetch(&self, peer: &str, last_hash: &str) -> Result<Vec<Block>, ReplicationError> {
        let url = format!("http://{}/catchup", peer);

        let request = self
            .http
            .get(url.as_str())
            .query(&[("lastIdx", last_hash)])
            .map_err(|e| ReplicationError::Request {
                peer: peer.to_string(),
                reason: e.to_string(),
            })?;

        let mut response = request.send().await.map_err(|e| ReplicationError::Request {
            peer: peer.to_string(),
            reason: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(ReplicationError::Response {
                peer: peer.to_string(),
                reason: format!("status {}", response.status()),
            });
        }

        response
            .json::<Vec<Block>>()
            .limit(MAX_RESPONSE_BYTES)
            .await
            .map_err(|e| ReplicationError::Response {
                peer: peer.to_string(),
                reason: e.to_string(),
            })
    }

    /// Asks every peer for the blocks after the local tip and applies them.
    ///
    /// A failing peer is logged and skipped; retries are left to the caller.
    pub async fn catchup(&self) -> CatchupReport {
        let mut report = CatchupReport::default();

        for peer in &self.peers {
            let last_hash = if self.ledger.is_empty() {
                String::new()
            } else {
                self.ledger.last_hash()
            };

            let blocks = match self.fetch(peer, &last_hash).await {
                Ok(blocks) => blocks,
                Err(err) => {
                    warn!("Skipping peer {}: {}", peer, err);
                    report.failed_peers += 1;
                    continue;
                }
            };

            match apply_blocks(&self.ledger, blocks) {
                Ok(applied) => {
                    info!("Applied {} block(s) from {}", applied, peer);
                    report.applied += applied;
                }
                Err(err) => {
                    warn!("Stopped catching up from {}: {}", peer, err);
                    if let ReplicationError::Rejected { applied, .. } = err {
                        report.applied += applied;
                    }
                    report.failed_peers += 1;
                }
            }
        }

        report
    }
}
