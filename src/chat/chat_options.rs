//! `ChatOptions` allows per-call customization of a generation.
//! - It can be provided at the `generate(..)`/`stream(..)` level as an argument,
//! - or bound to the model with `bind_tools(..)`/`RunnableBinding::bind(..)` to apply to every call made through the binding.
//!
//! Only the options that are set are forwarded, and they override the model's default parameters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::chat::Tool;

/// Per-call overrides of the native chat-completion parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
	pub temperature: Option<f64>,

	pub max_tokens: Option<u32>,

	pub top_p: Option<f64>,

	pub top_k: Option<i32>,

	pub repeat_penalty: Option<f64>,

	/// Number of log-probabilities to return per token.
	pub logprobs: Option<u32>,

	pub seed: Option<i64>,

	// -- Tools
	/// Normalized tools offered to the model. Forwarded as `tools` when not empty.
	pub tools: Vec<Tool>,

	/// Resolved tool choice (`{"type": "function", "function": {"name": ..}}`).
	pub tool_choice: Option<Value>,

	/// Any other native parameter, forwarded as is (merged last).
	pub extra: Map<String, Value>,
}

/// Chainable Setters
impl ChatOptions {
	#[must_use]
	pub const fn with_temperature(mut self, value: f64) -> Self {
		self.temperature = Some(value);
		self
	}

	#[must_use]
	pub const fn with_max_tokens(mut self, value: u32) -> Self {
		self.max_tokens = Some(value);
		self
	}

	#[must_use]
	pub const fn with_top_p(mut self, value: f64) -> Self {
		self.top_p = Some(value);
		self
	}

	#[must_use]
	pub const fn with_top_k(mut self, value: i32) -> Self {
		self.top_k = Some(value);
		self
	}

	#[must_use]
	pub const fn with_repeat_penalty(mut self, value: f64) -> Self {
		self.repeat_penalty = Some(value);
		self
	}

	#[must_use]
	pub const fn with_logprobs(mut self, value: u32) -> Self {
		self.logprobs = Some(value);
		self
	}

	#[must_use]
	pub const fn with_seed(mut self, value: i64) -> Self {
		self.seed = Some(value);
		self
	}

	#[must_use]
	pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
		self.tools = tools;
		self
	}

	#[must_use]
	pub fn with_tool_choice(mut self, tool_choice: Option<Value>) -> Self {
		self.tool_choice = tool_choice;
		self
	}

	#[must_use]
	pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.extra.insert(key.into(), value.into());
		self
	}
}

impl ChatOptions {
	/// The set options as native parameters.
	pub fn to_params(&self) -> Map<String, Value> {
		let mut params = Map::new();

		if let Some(value) = self.temperature {
			params.insert("temperature".to_string(), value.into());
		}
		if let Some(value) = self.max_tokens {
			params.insert("max_tokens".to_string(), value.into());
		}
		if let Some(value) = self.top_p {
			params.insert("top_p".to_string(), value.into());
		}
		if let Some(value) = self.top_k {
			params.insert("top_k".to_string(), value.into());
		}
		if let Some(value) = self.repeat_penalty {
			params.insert("repeat_penalty".to_string(), value.into());
		}
		if let Some(value) = self.logprobs {
			params.insert("logprobs".to_string(), value.into());
		}
		if let Some(value) = self.seed {
			params.insert("seed".to_string(), value.into());
		}
		if !self.tools.is_empty() {
			let tools = self.tools.iter().map(Tool::to_function_value).collect();
			params.insert("tools".to_string(), Value::Array(tools));
		}
		if let Some(tool_choice) = &self.tool_choice {
			params.insert("tool_choice".to_string(), tool_choice.clone());
		}

		params.extend(self.extra.clone());

		params
	}
}

// region:    --- ChatOptionsSet

/// This is an internal crate struct to resolve the `ChatOptions` in a cascading manner.
///
/// The call-level options (`generate`/`stream` argument) win over the bound ones
/// (`RunnableBinding`), key by key.
#[derive(Default, Clone, Debug)]
pub struct ChatOptionsSet<'a, 'b> {
	bound: Option<&'a ChatOptions>,
	call: Option<&'b ChatOptions>,
}

impl<'a, 'b> ChatOptionsSet<'a, 'b> {
	#[must_use]
	pub const fn with_bound_options(mut self, options: Option<&'a ChatOptions>) -> Self {
		self.bound = options;
		self
	}

	#[must_use]
	pub const fn with_call_options(mut self, options: Option<&'b ChatOptions>) -> Self {
		self.call = options;
		self
	}
}

impl ChatOptionsSet<'_, '_> {
	/// The cascaded native parameters.
	pub fn to_params(&self) -> Map<String, Value> {
		let mut params = self.bound.map(ChatOptions::to_params).unwrap_or_default();
		if let Some(call) = self.call {
			params.extend(call.to_params());
		}
		params
	}
}

// endregion: --- ChatOptionsSet

// region:    --- Tests


// endregion: --- Tests
