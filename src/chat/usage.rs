use serde::{Deserialize, Serialize};

/// Token usage reported by the native session (`usage` entry of a completion).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
	/// Number of tokens in the rendered prompt.
	pub prompt_tokens: Option<u32>,
	/// Number of generated tokens.
	pub completion_tokens: Option<u32>,
	pub total_tokens: Option<u32>,
}

impl Usage {
	pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
		Self {
			prompt_tokens: Some(prompt_tokens),
			completion_tokens: Some(completion_tokens),
			total_tokens: Some(prompt_tokens.saturating_add(completion_tokens)),
		}
	}
}

// region:    --- Tests


// endregion: --- Tests
