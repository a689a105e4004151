//! Duocall signaling relay
//!
//! A WebSocket relay that admits at most two participants per room,
//! broadcasts membership changes to the room group, and forwards peer
//! negotiation messages between the two members. Media never touches this
//! server.

use axum::routing::get;
use axum::Router;

pub mod registry;
pub mod relay;
pub mod state;
pub mod ws;

use state::AppState;

/// Builds the router; split out of `main` so tests can serve the app on an
/// ephemeral port.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}
