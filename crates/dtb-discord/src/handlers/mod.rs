//! Gateway dispatch handlers.

use std::sync::Arc;

use crate::{gateway::GatewayEvent, router::AppState};

mod message;
mod ready;

pub use message::parse_message_create;
pub use ready::{parse_ready, ReadyInfo};

/// Route one gateway event. Events are awaited one at a time.
pub async fn handle_event(state: &Arc<AppState>, event: GatewayEvent) {
    match event {
        GatewayEvent::Ready(d) => ready::handle_ready(Arc::clone(state), d),
        GatewayEvent::MessageCreate(d) => message::handle_message(state, d).await,
    }
}
