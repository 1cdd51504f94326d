//! LlamaCpp adapter for local models loaded with llama.cpp.
//!
//! `ChatLlamaCpp` owns one native session, created once at construction from a
//! validated `LlamaCppConfig`. The concrete llama.cpp session (`LlamaCppLoader`)
//! requires the `llamacpp` feature.

// region:    --- Modules

mod adapter_impl;
mod config;
mod grammar;
mod schema_to_grammar;

#[cfg(any(feature = "llamacpp", test))]
mod piece_decoder;
#[cfg(any(feature = "llamacpp", test))]
mod stop_scanner;
#[cfg(any(feature = "llamacpp", test))]
mod tool_format;

#[cfg(feature = "llamacpp")]
mod native;

pub use adapter_impl::*;
pub use config::*;
pub use grammar::*;
pub use schema_to_grammar::schema_to_gbnf;

#[cfg(feature = "llamacpp")]
pub use native::{LlamaCppLoader, LlamaCppSession};

// endregion: --- Modules
