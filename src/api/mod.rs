// API module
//
// HTTP surface of a node: mining requests and catch-up responses

pub mod handlers;
pub mod routes;

// Re-export main components for easier access
pub use routes::configure_routes;
