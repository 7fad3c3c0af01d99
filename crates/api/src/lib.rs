//! WebSocket ingest layer for the game event gateway.

pub mod config;
pub mod connections;
pub mod ingest;
pub mod rate_limit;
pub mod response;
pub mod routes;
pub mod server;
pub mod state;

pub use config::GatewayConfig;
pub use ingest::{process_message, MessageOutcome};
pub use rate_limit::{Admission, ClientRateLimiter, RateLimitConfig};
pub use routes::router;
pub use server::Gateway;
pub use state::AppState;
