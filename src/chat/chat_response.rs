//! This module contains all the types related to a Chat Result (except ChatStream, which has its own file).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::{ChatMessage, ToolCall, Usage};

// region:    --- ChatResult

/// The aggregated result of a (non-streaming) generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResult {
	/// One generation per native choice.
	pub generations: Vec<ChatGeneration>,

	/// Provider-level output. `None` when the result was aggregated from a stream.
	pub llm_output: Option<LlmOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmOutput {
	pub token_usage: Usage,
}

/// One candidate generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatGeneration {
	pub message: ChatMessage,
	pub generation_info: Option<GenerationInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationInfo {
	pub finish_reason: Option<String>,
	pub logprobs: Option<Value>,
}

// endregion: --- ChatResult

// Getters
impl ChatResult {
	/// Returns the text content of the first generation, if any.
	pub fn first_text(&self) -> Option<&str> {
		self.generations.first().map(ChatGeneration::text)
	}

	/// Consumes the result and returns the message of the first generation, if any.
	pub fn into_first_message(self) -> Option<ChatMessage> {
		self.generations.into_iter().next().map(|g| g.message)
	}

	/// Returns the tool calls of the first generation, if any.
	pub fn first_tool_calls(&self) -> Option<&[ToolCall]> {
		self.generations
			.first()
			.map(|g| g.message.tool_calls.as_slice())
			.filter(|tool_calls| !tool_calls.is_empty())
	}
}

impl ChatGeneration {
	pub fn text(&self) -> &str {
		&self.message.content
	}

	pub fn finish_reason(&self) -> Option<&str> {
		self.generation_info.as_ref().and_then(|info| info.finish_reason.as_deref())
	}
}

impl GenerationInfo {
	pub fn is_empty(&self) -> bool {
		self.finish_reason.is_none() && self.logprobs.is_none()
	}

	/// Merges the info of a later chunk: finish reason is replaced, logprobs are concatenated.
	pub fn merge(&mut self, later: GenerationInfo) {
		if later.finish_reason.is_some() {
			self.finish_reason = later.finish_reason;
		}
		self.logprobs = match (self.logprobs.take(), later.logprobs) {
			(Some(earlier), Some(later)) => Some(merge_logprobs(earlier, later)),
			(earlier, later) => later.or(earlier),
		};
	}
}

fn merge_logprobs(earlier: Value, later: Value) -> Value {
	match (earlier, later) {
		(Value::Array(mut earlier), Value::Array(later)) => {
			earlier.extend(later);
			Value::Array(earlier)
		}
		(Value::Object(mut earlier), Value::Object(later)) => {
			for (key, value) in later {
				let merged = match earlier.remove(&key) {
					Some(previous) => merge_logprobs(previous, value),
					None => value,
				};
				earlier.insert(key, merged);
			}
			Value::Object(earlier)
		}
		(_, later) => later,
	}
}

// region:    --- Tests


// endregion: --- Tests
