//! Output parsers for tool-call messages, and the structured-output pipeline built on them.

// region:    --- Modules

mod structured;
mod tools_parser;

pub use structured::*;
pub use tools_parser::*;

// endregion: --- Modules
