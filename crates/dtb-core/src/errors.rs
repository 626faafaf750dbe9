use crate::{backend::BackendError, domain::ChannelId};

/// Core error type for the translation bot.
///
/// Adapter crates map their specific errors into this type so the bot core can
/// handle failures consistently (user-facing message vs logged-only).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("a translation session is already active in channel {0}")]
    AlreadyActive(ChannelId),

    #[error("no active translation session in channel {0}")]
    NoActiveSession(ChannelId),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
