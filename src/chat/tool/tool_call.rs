use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A function call emitted by the model, with its arguments parsed as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
	pub call_id: String,
	pub fn_name: String,
	pub fn_arguments: Value,
}

/// A function call whose arguments could not be parsed as JSON.
///
/// Kept on the message so output parsers can report the failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidToolCall {
	pub call_id: Option<String>,
	pub fn_name: Option<String>,
	pub raw_arguments: Option<String>,
	pub error: String,
}

/// An incremental piece of a tool call, as found in streaming deltas.
///
/// Chunks sharing the same `index` belong to the same call, and their
/// `fn_arguments` fragments are concatenated in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallChunk {
	pub index: Option<u64>,
	pub call_id: Option<String>,
	pub fn_name: Option<String>,
	pub fn_arguments: Option<String>,
}

impl ToolCallChunk {
	/// Appends `other` onto this chunk (same index).
	pub(crate) fn absorb(&mut self, other: ToolCallChunk) {
		if self.call_id.is_none() {
			self.call_id = other.call_id;
		}
		if self.fn_name.is_none() {
			self.fn_name = other.fn_name;
		}
		if let Some(more) = other.fn_arguments {
			self.fn_arguments.get_or_insert_with(String::new).push_str(&more);
		}
	}
}
