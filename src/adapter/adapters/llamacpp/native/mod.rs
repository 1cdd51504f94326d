//! The llama.cpp `ChatSession`, built on `llama-cpp-2`.

// region:    --- Modules

mod backend;
mod generator;
mod prompt;
mod session;

pub use session::{LlamaCppLoader, LlamaCppSession};

// endregion: --- Modules
