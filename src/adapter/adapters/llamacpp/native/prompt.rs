//! Prompt rendering: native message dictionaries to the model chat template.

use llama_cpp_2::model::{LlamaChatMessage, LlamaChatTemplate, LlamaModel};
use serde_json::{Value, json};

use super::super::tool_format::{forced_tool_prompt, render_tool_calls, tools_system_prompt};
use crate::{Error, Result};

/// How the offered tools shape the prompt and the output.
#[derive(Debug, Clone)]
pub(super) enum ToolMode {
	/// No tools.
	Plain,
	/// Tools described in the prompt. The model may answer with text or tool calls.
	Auto { tools: Vec<Value> },
	/// One tool must be called. Its arguments are constrained by a grammar.
	Forced {
		tools: Vec<Value>,
		name: String,
		parameters: Value,
	},
}

impl ToolMode {
	/// From the native `tools` and `tool_choice` call parameters.
	pub fn new(tools: Vec<Value>, tool_choice: Option<&Value>) -> Result<Self> {
		if tools.is_empty() {
			return Ok(Self::Plain);
		}

		match tool_choice {
			Some(Value::String(choice)) if choice == "none" => Ok(Self::Plain),
			Some(choice @ Value::Object(_)) => {
				let name = choice
					.pointer("/function/name")
					.and_then(Value::as_str)
					.ok_or_else(|| Error::Session(format!("tool_choice has no function name: {choice}")))?;
				let parameters = tools
					.iter()
					.find(|tool| tool.pointer("/function/name").and_then(Value::as_str) == Some(name))
					.map(|tool| {
						tool.pointer("/function/parameters")
							.cloned()
							.unwrap_or_else(|| json!({"type": "object", "properties": {}}))
					})
					.ok_or_else(|| Error::Session(format!("tool_choice names an unknown tool '{name}'")))?;

				Ok(Self::Forced {
					name: name.to_string(),
					tools,
					parameters,
				})
			}
			_ => Ok(Self::Auto { tools }),
		}
	}

	fn system_instructions(&self) -> Option<String> {
		match self {
			Self::Plain => None,
			Self::Auto { tools } => Some(tools_system_prompt(tools)),
			Self::Forced { tools, name, .. } => Some(forced_tool_prompt(tools, name)),
		}
	}
}

/// Renders the conversation with the model chat template, ready for generation.
pub(super) fn build_prompt(
	model: &LlamaModel,
	template: &LlamaChatTemplate,
	messages: &[Value],
	mode: &ToolMode,
) -> Result<String> {
	let mut turns: Vec<(String, String)> = messages.iter().map(message_turn).collect();

	if let Some(instructions) = mode.system_instructions() {
		match turns.first_mut() {
			Some((role, content)) if role == "system" => {
				content.push_str("\n\n");
				content.push_str(&instructions);
			}
			_ => turns.insert(0, ("system".to_string(), instructions)),
		}
	}

	let chat = turns
		.into_iter()
		.map(|(role, content)| {
			LlamaChatMessage::new(role, content)
				.map_err(|err| Error::Session(format!("Failed to create chat message: {err}")))
		})
		.collect::<Result<Vec<_>>>()?;

	model
		.apply_chat_template(template, &chat, true)
		.map_err(|err| Error::Session(format!("Failed to apply chat template: {err}")))
}

/// The (role, text) of one native message. Tool calls are rendered in the text.
fn message_turn(message: &Value) -> (String, String) {
	let role = message.get("role").and_then(Value::as_str).unwrap_or("user").to_string();
	let mut content = match message.get("content") {
		Some(Value::String(text)) => text.clone(),
		Some(Value::Null) | None => String::new(),
		Some(other) => other.to_string(),
	};

	if let Some(Value::Array(tool_calls)) = message.get("tool_calls")
		&& !tool_calls.is_empty()
	{
		if !content.is_empty() {
			content.push('\n');
		}
		content.push_str(&render_tool_calls(tool_calls));
	}

	(role, content)
}
