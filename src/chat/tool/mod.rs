// region:    --- Modules

mod tool_base;
mod tool_call;
mod tool_choice;
mod tool_spec;

pub use tool_base::*;
pub use tool_call::*;
pub use tool_choice::*;
pub use tool_spec::*;

// endregion: --- Modules
