use actix_web::web;

use super::handlers;

/// Configures the node routes
///
/// `mine` and `catchup` sit at the root, where peers expect them.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/mine", web::post().to(handlers::mine))
        .route("/catchup", web::get().to(handlers::catchup))
        .route("/chain", web::get().to(handlers::get_chain))
        .route("/validate", web::get().to(handlers::validate_chain))
        .route("/dump", web::get().to(handlers::dump))
        .route("/wallet/{issuer}", web::get().to(handlers::get_wallet));
}
