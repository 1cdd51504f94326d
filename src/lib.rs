//! Chat-model adapter for local llama.cpp models.
//!
//! `ChatLlamaCpp` wraps one native inference session and translates between chat messages
//! and the native chat-completion dictionaries, in full-response or streaming mode.
//! On top of that it offers tool binding (`bind_tools`) and schema-validated structured
//! output (`with_structured_output`), both built from function-calling primitives.
//!
//! The concrete llama.cpp session lives behind the `llamacpp` feature. Without it, any
//! `SessionLoader` can be plugged in with `ChatLlamaCpp::with_loader`.

// region:    --- Modules

mod error;

pub mod adapter;
pub mod chat;
pub mod output;

pub use adapter::adapters::llamacpp::{ChatLlamaCpp, Grammar, LlamaCppConfig, ValidatedConfig};
pub use error::{Error, Result};

// endregion: --- Modules
