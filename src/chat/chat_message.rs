//! Chat messages and their translation to/from the native chat-completion dictionaries.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::chat::{InvalidToolCall, ToolCall, ToolCallChunk};
use crate::{Error, Result};

// region:    --- ChatRole

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatRole {
	System,
	User,
	Assistant,
	Tool,
	/// Any other role name carried by the native session (e.g., "function").
	Other(String),
}

impl ChatRole {
	pub fn as_str(&self) -> &str {
		match self {
			Self::System => "system",
			Self::User => "user",
			Self::Assistant => "assistant",
			Self::Tool => "tool",
			Self::Other(role) => role,
		}
	}

	pub fn from_native(role: &str) -> Self {
		match role {
			"system" => Self::System,
			"user" => Self::User,
			"assistant" => Self::Assistant,
			"tool" => Self::Tool,
			other => Self::Other(other.to_string()),
		}
	}
}

// endregion: --- ChatRole

// region:    --- ChatMessage

/// A role-tagged chat message with its optional tool-call metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
	pub role: ChatRole,
	pub content: String,
	pub name: Option<String>,

	/// (assistant) The parsed tool calls requested by the model.
	pub tool_calls: Vec<ToolCall>,
	/// (assistant) The tool calls whose arguments are not valid JSON.
	pub invalid_tool_calls: Vec<InvalidToolCall>,

	/// (tool) The id of the tool call this message responds to.
	pub tool_call_id: Option<String>,
}

/// Constructors
impl ChatMessage {
	pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
		Self {
			role,
			content: content.into(),
			name: None,
			tool_calls: Vec::new(),
			invalid_tool_calls: Vec::new(),
			tool_call_id: None,
		}
	}

	pub fn system(content: impl Into<String>) -> Self {
		Self::new(ChatRole::System, content)
	}

	pub fn user(content: impl Into<String>) -> Self {
		Self::new(ChatRole::User, content)
	}

	pub fn assistant(content: impl Into<String>) -> Self {
		Self::new(ChatRole::Assistant, content)
	}

	/// An assistant message carrying only tool calls.
	pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
		Self {
			tool_calls,
			..Self::assistant("")
		}
	}

	/// A tool message answering the tool call `call_id`.
	pub fn tool_response(call_id: impl Into<String>, content: impl Into<String>) -> Self {
		Self {
			tool_call_id: Some(call_id.into()),
			..Self::new(ChatRole::Tool, content)
		}
	}

	#[must_use]
	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}
}

// endregion: --- ChatMessage

// region:    --- Native Conversion

/// Converts a message into the native `{"role", "content", ...}` dictionary.
pub fn message_to_dict(message: &ChatMessage) -> Value {
	let mut dict = Map::new();
	dict.insert("role".to_string(), Value::String(message.role.as_str().to_string()));

	let has_tool_calls = !message.tool_calls.is_empty() || !message.invalid_tool_calls.is_empty();
	// Native tool-call messages carry a null content when there is no text.
	let content = if has_tool_calls && message.content.is_empty() {
		Value::Null
	} else {
		Value::String(message.content.clone())
	};
	dict.insert("content".to_string(), content);

	if let Some(name) = &message.name {
		dict.insert("name".to_string(), Value::String(name.clone()));
	}

	if has_tool_calls {
		let valid = message.tool_calls.iter().map(|tc| {
			json!({
				"id": tc.call_id,
				"type": "function",
				"function": {"name": tc.fn_name, "arguments": tc.fn_arguments.to_string()},
			})
		});
		let invalid = message.invalid_tool_calls.iter().map(|tc| {
			json!({
				"id": tc.call_id,
				"type": "function",
				"function": {"name": tc.fn_name, "arguments": tc.raw_arguments},
			})
		});
		dict.insert("tool_calls".to_string(), Value::Array(valid.chain(invalid).collect()));
	}

	if let Some(call_id) = &message.tool_call_id {
		dict.insert("tool_call_id".to_string(), Value::String(call_id.clone()));
	}

	Value::Object(dict)
}

/// Converts a native message dictionary into a `ChatMessage`.
///
/// A bare string is taken as the text of an assistant message.
pub fn dict_to_message(value: &Value) -> Result<ChatMessage> {
	let dict = match value {
		Value::String(text) => return Ok(ChatMessage::assistant(text.clone())),
		Value::Object(dict) => dict,
		other => return Err(Error::NativeResponse(format!("expected a message object, got: {other}"))),
	};

	let role = dict
		.get("role")
		.and_then(Value::as_str)
		.map(ChatRole::from_native)
		.unwrap_or(ChatRole::Assistant);
	let mut message = ChatMessage::new(role, content_text(dict.get("content")));
	message.name = dict.get("name").and_then(Value::as_str).map(String::from);
	message.tool_call_id = dict.get("tool_call_id").and_then(Value::as_str).map(String::from);

	if let Some(Value::Array(raw_tool_calls)) = dict.get("tool_calls") {
		for raw in raw_tool_calls {
			let call_id = raw.get("id").and_then(Value::as_str).map(String::from);
			let function = raw.get("function");
			let fn_name = function.and_then(|f| f.get("name")).and_then(Value::as_str).map(String::from);
			let raw_arguments = function.and_then(|f| f.get("arguments")).and_then(Value::as_str);

			match parse_arguments(raw_arguments, fn_name.is_some()) {
				Ok(fn_arguments) => message.tool_calls.push(ToolCall {
					call_id: call_id.unwrap_or_default(),
					fn_name: fn_name.unwrap_or_default(),
					fn_arguments,
				}),
				Err(error) => message.invalid_tool_calls.push(InvalidToolCall {
					call_id,
					fn_name,
					raw_arguments: raw_arguments.map(String::from),
					error,
				}),
			}
		}
	}

	Ok(message)
}

/// Converts a native streaming delta into a `MessageChunk`.
///
/// Deltas usually carry a role only on the first event, so the role of the
/// previous chunk (`default_role`) is used when the delta has none.
pub fn delta_to_message_chunk(delta: &Value, default_role: &ChatRole) -> Result<MessageChunk> {
	let Some(dict) = delta.as_object() else {
		return Err(Error::NativeResponse(format!("expected a delta object, got: {delta}")));
	};

	let role = dict
		.get("role")
		.and_then(Value::as_str)
		.map(ChatRole::from_native)
		.unwrap_or_else(|| default_role.clone());

	let tool_call_chunks = match dict.get("tool_calls") {
		Some(Value::Array(raw_chunks)) => raw_chunks
			.iter()
			.map(|raw| {
				let function = raw.get("function");
				ToolCallChunk {
					index: raw.get("index").and_then(Value::as_u64),
					call_id: raw.get("id").and_then(Value::as_str).map(String::from),
					fn_name: function.and_then(|f| f.get("name")).and_then(Value::as_str).map(String::from),
					fn_arguments: function
						.and_then(|f| f.get("arguments"))
						.and_then(Value::as_str)
						.map(String::from),
				}
			})
			.collect(),
		_ => Vec::new(),
	};

	Ok(MessageChunk {
		role,
		content: content_text(dict.get("content")),
		name: dict.get("name").and_then(Value::as_str).map(String::from),
		tool_call_chunks,
		tool_call_id: dict.get("tool_call_id").and_then(Value::as_str).map(String::from),
	})
}

fn content_text(content: Option<&Value>) -> String {
	match content {
		Some(Value::String(text)) => text.clone(),
		Some(Value::Null) | None => String::new(),
		Some(other) => other.to_string(),
	}
}

/// Empty arguments of a named call mean "no arguments".
fn parse_arguments(raw_arguments: Option<&str>, named: bool) -> core::result::Result<Value, String> {
	match raw_arguments {
		_ if !named => Err("tool call has no function name".to_string()),
		None => Ok(Value::Object(Map::new())),
		Some(raw) if raw.trim().is_empty() => Ok(Value::Object(Map::new())),
		Some(raw) => serde_json::from_str(raw).map_err(|err| format!("Function arguments are not valid JSON: {err}")),
	}
}

// endregion: --- Native Conversion

// region:    --- MessageChunk

/// The message part of a streaming chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageChunk {
	pub role: ChatRole,
	pub content: String,
	pub name: Option<String>,
	pub tool_call_chunks: Vec<ToolCallChunk>,
	pub tool_call_id: Option<String>,
}

impl MessageChunk {
	/// Appends `other` onto this chunk: content is concatenated and tool-call
	/// chunks with the same index are merged.
	pub fn concat(&mut self, other: MessageChunk) {
		self.content.push_str(&other.content);
		if self.name.is_none() {
			self.name = other.name;
		}
		if self.tool_call_id.is_none() {
			self.tool_call_id = other.tool_call_id;
		}
		for chunk in other.tool_call_chunks {
			let existing = chunk
				.index
				.and_then(|index| self.tool_call_chunks.iter_mut().find(|c| c.index == Some(index)));
			match existing {
				Some(existing) => existing.absorb(chunk),
				None => self.tool_call_chunks.push(chunk),
			}
		}
	}

	/// Finalizes the (aggregated) chunk into a message, parsing the tool-call arguments.
	pub fn into_message(self) -> ChatMessage {
		let MessageChunk {
			role,
			content,
			name,
			tool_call_chunks,
			tool_call_id,
		} = self;

		let mut message = ChatMessage::new(role, content);
		message.name = name;
		message.tool_call_id = tool_call_id;

		for chunk in tool_call_chunks {
			let raw_arguments = chunk.fn_arguments.as_deref();
			match parse_arguments(raw_arguments, chunk.fn_name.is_some()) {
				Ok(fn_arguments) => message.tool_calls.push(ToolCall {
					call_id: chunk.call_id.unwrap_or_default(),
					fn_name: chunk.fn_name.unwrap_or_default(),
					fn_arguments,
				}),
				Err(error) => message.invalid_tool_calls.push(InvalidToolCall {
					call_id: chunk.call_id,
					fn_name: chunk.fn_name,
					raw_arguments: chunk.fn_arguments,
					error,
				}),
			}
		}

		message
	}
}

// endregion: --- MessageChunk

// region:    --- Tests


// endregion: --- Tests
