//! Translation backend port (language-model providers live in `dtb-llm`).

pub mod client;
pub mod types;

pub use client::TranslationBackend;
pub use types::{BackendError, BackendKind, BackendTranslation, TokenUsage};
