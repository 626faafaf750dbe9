//! Core domain + application logic for the Discord translation bot.
//!
//! This crate is framework-agnostic. Discord and the language-model providers
//! live behind ports (traits) implemented in adapter crates.

pub mod backend;
pub mod bot;
pub mod commands;
pub mod config;
pub mod delivery;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod language;
pub mod logging;
pub mod memory;
pub mod messaging;
pub mod metrics;
pub mod pipeline;
pub mod preprocess;
pub mod queue;
pub mod server_config;
pub mod session;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
