//! Broadcast Hub
//!
//! Fans out incremental updates to all WebSocket subscribers and serves
//! one-shot snapshot queries over HTTP.

mod api;
mod broadcast;
mod types;

pub use api::create_router;
pub use broadcast::Broadcaster;
pub use types::*;
