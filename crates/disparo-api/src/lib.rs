//! Disparo API - HTTP intake and control surface
//!
//! Inbound messages for conversation recovery, campaign acknowledgements
//! and force resets, and health probes.

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
