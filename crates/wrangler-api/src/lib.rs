//! wrangler-api: HTTP API layer for the Lendroid wrangler
//!
//! Exposes fill underwriting, loan health and transaction sender checks to
//! relayers and lenders.

pub mod dto;
pub mod routes;
pub mod server;
pub mod state;

pub use server::*;
pub use state::AppState;
