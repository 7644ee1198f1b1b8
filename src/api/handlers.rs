use actix_web::{web, HttpResponse, Responder};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::blockchain::{Block, BlockError, Ledger, LedgerError, Payload};

/// Shared ledger handle; every handler sees the same chain
pub type LedgerData = web::Data<Ledger>;

/// Form fields of a mining request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MineForm {
    /// Issuer identity
    pub from: String,

    /// Payload type tag
    #[serde(rename = "typeId")]
    pub type_id: String,

    /// Payload JSON
    pub data: String,

    /// Base64 signature over the canonical payload JSON
    pub signature: String,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// Hash of the newly mined block
    pub hash: String,

    /// The newly mined block
    pub block: Block,
}

/// Query of the catchup endpoint
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CatchupQuery {
    /// Hash of the last block the caller already has
    #[serde(rename = "lastIdx", default)]
    pub last_idx: String,
}

/// Response for the chain endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The length of the chain
    pub length: usize,

    /// Required hash prefix
    pub difficulty: String,

    /// The blocks in the chain
    pub blocks: Vec<Block>,
}

fn error_body(message: String) -> serde_json::Value {
    serde_json::json!({ "error": message })
}

/// Mine a new block
///
/// Parses the payload, mines it on top of the current tip and appends it.
/// The signature must cover the canonical JSON of the payload, which is
/// what the ledger hashes and verifies.
#[utoipa::path(
    post,
    path = "/mine",
    request_body(content = MineForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Block mined and appended", body = MineResponse),
        (status = 400, description = "Unparseable payload or rejected block"),
        (status = 503, description = "No valid nonce within the attempt cap"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn mine(ledger: LedgerData, form: web::Form<MineForm>) -> impl Responder {
    let MineForm {
        from,
        type_id,
        data,
        signature,
    } = form.into_inner();

    let payload = match Payload::parse(&type_id, &data) {
        Ok(payload) => payload,
        Err(err) => {
            return HttpResponse::BadRequest()
                .json(error_body(format!("Failed to parse data: {}", err)));
        }
    };

    // Mining is CPU bound, keep it off the worker thread
    let ledger = ledger.get_ref().clone();
    let result = web::block(move || ledger.mine_and_append(&from, payload, &signature)).await;

    match result {
        Ok(Ok(block)) => HttpResponse::Ok().json(MineResponse {
            message: "New Block Mined".to_string(),
            hash: block.hash(),
            block,
        }),
        Ok(Err(err @ LedgerError::Block(BlockError::MiningExhausted { .. }))) => {
            warn!("Mining request failed: {}", err);
            HttpResponse::ServiceUnavailable().json(error_body(err.to_string()))
        }
        Ok(Err(err)) => {
            warn!("Mining request rejected: {}", err);
            HttpResponse::BadRequest().json(error_body(format!("Failed to mine block: {}", err)))
        }
        Err(err) => {
            error!("Mining task failed: {}", err);
            HttpResponse::InternalServerError().json(error_body(err.to_string()))
        }
    }
}

/// Blocks after a given hash
///
/// Returns the blocks following `lastIdx`, or the most recent window when
/// the hash is empty or unknown.
#[utoipa::path(
    get,
    path = "/catchup",
    params(CatchupQuery),
    responses(
        (status = 200, description = "Blocks in chain order", body = Vec<Block>)
    )
)]
pub async fn catchup(ledger: LedgerData, query: web::Query<CatchupQuery>) -> impl Responder {
    let blocks: Vec<Block> = ledger
        .iterate_from(&query.last_idx)
        .map(|(_, block)| Block::clone(&block))
        .collect();

    HttpResponse::Ok().json(blocks)
}

/// Get the full chain
#[utoipa::path(
    get,
    path = "/chain",
    responses(
        (status = 200, description = "Chain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(ledger: LedgerData) -> impl Responder {
    let blocks: Vec<Block> = ledger.blocks().iter().map(|block| Block::clone(block)).collect();

    HttpResponse::Ok().json(ChainResponse {
        length: blocks.len(),
        difficulty: ledger.difficulty().to_string(),
        blocks,
    })
}

/// Check if the chain is valid
///
/// Replays every block through a fresh ledger
#[utoipa::path(
    get,
    path = "/validate",
    responses(
        (status = 200, description = "Chain validation status", body = bool)
    )
)]
pub async fn validate_chain(ledger: LedgerData) -> impl Responder {
    let ledger = ledger.get_ref().clone();

    match web::block(move || ledger.is_valid()).await {
        Ok(is_valid) => HttpResponse::Ok().json(is_valid),
        Err(err) => HttpResponse::InternalServerError().json(error_body(err.to_string())),
    }
}

/// Human-readable chain dump
#[utoipa::path(
    get,
    path = "/dump",
    responses(
        (status = 200, description = "One line per block", body = String, content_type = "text/plain")
    )
)]
pub async fn dump(ledger: LedgerData) -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(ledger.dump())
}

/// Registration block of an issuer
#[utoipa::path(
    get,
    path = "/wallet/{issuer}",
    params(
        ("issuer" = String, Path, description = "Issuer identity")
    ),
    responses(
        (status = 200, description = "Registration block", body = Block),
        (status = 404, description = "Issuer never registered")
    )
)]
pub async fn get_wallet(ledger: LedgerData, issuer: web::Path<String>) -> impl Responder {
    let issuer = issuer.into_inner();

    match ledger.registration_of(&issuer) {
        Some(block) => HttpResponse::Ok().json(Block::clone(&block)),
        None => HttpResponse::NotFound()
            .json(error_body(format!("No wallet registered for {}", issuer))),
    }
}
