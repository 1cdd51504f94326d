//! The adapter module holds the chat-model contract (`ChatModel`), the native session seam
//! (`ChatSession`/`SessionLoader`), the tool binding, and the llama.cpp adapter.

// region:    --- Modules

mod adapter_types;
mod binding;
mod session;

pub mod adapters;

pub use adapter_types::*;
pub use binding::*;
pub use session::*;

// endregion: --- Modules
