//! The chat module contains the message, option, response, and stream constructs
//! exchanged with a `ChatModel`.

// region:    --- Modules

mod chat_callback;
mod chat_message;
mod chat_options;
mod chat_response;
mod chat_stream;
mod tool;
mod usage;

// -- Flatten
pub use chat_callback::*;
pub use chat_message::*;
pub use chat_options::*;
pub use chat_response::*;
pub use chat_stream::*;
pub use tool::*;
pub use usage::*;

// endregion: --- Modules
