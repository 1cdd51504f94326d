use serde_json::Value;

use crate::chat::Tool;
use crate::{Error, Result};

/// The tool-choice policy given to `bind_tools`.
///
/// Built from a JSON value with `From<Value>`, which classifies it by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolChoice {
	/// `{"type": "function", "function": {"name": <tool_name>}}`
	Function(Value),
	/// A tool name.
	Name(String),
	/// `true` forces the single bound tool. `false` forces nothing.
	Required(bool),
	/// Any other shape. Always rejected when resolved.
	Unsupported(Value),
}

impl From<Value> for ToolChoice {
	fn from(value: Value) -> Self {
		match value {
			Value::String(name) => Self::Name(name),
			Value::Bool(flag) => Self::Required(flag),
			obj @ Value::Object(_) => Self::Function(obj),
			other => Self::Unsupported(other),
		}
	}
}

impl From<&str> for ToolChoice {
	fn from(name: &str) -> Self {
		Self::Name(name.to_string())
	}
}

impl From<bool> for ToolChoice {
	fn from(flag: bool) -> Self {
		Self::Required(flag)
	}
}

impl ToolChoice {
	/// Empty or false choices force nothing and are not validated.
	fn is_empty(&self) -> bool {
		match self {
			Self::Function(Value::Object(obj)) => obj.is_empty(),
			Self::Name(name) => name.is_empty(),
			Self::Required(flag) => !flag,
			_ => false,
		}
	}

	/// Validates the choice against the normalized `tools` and returns the
	/// forced-choice dictionary, or `None` when nothing is forced.
	pub fn resolve(&self, tools: &[Tool]) -> Result<Option<Value>> {
		if self.is_empty() {
			return Ok(None);
		}

		let tool_names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();

		match self {
			Self::Function(choice) => {
				let name = choice
					.get("function")
					.and_then(|f| f.get("name"))
					.and_then(Value::as_str)
					.ok_or_else(|| {
						Error::ToolChoice(format!(
							"Tool choice {choice} does not have the form {{\"type\": \"function\", \"function\": {{\"name\": <tool_name>}}}}"
						))
					})?;
				let tool = find_tool(tools, name).ok_or_else(|| not_provided(&choice.to_string(), &tool_names))?;
				Ok(Some(tool.to_forced_choice()))
			}
			Self::Name(name) => {
				let tool = find_tool(tools, name).ok_or_else(|| not_provided(&format!("'{name}'"), &tool_names))?;
				Ok(Some(tool.to_forced_choice()))
			}
			Self::Required(_) => match tools {
				[tool] => Ok(Some(tool.to_forced_choice())),
				_ => Err(Error::ToolChoice(format!(
					"tool_choice=true can only be specified when a single tool is passed in. Received {} tools.",
					tools.len()
				))),
			},
			Self::Unsupported(other) => Err(Error::ToolChoice(format!(
				"Unrecognized tool_choice type. Expected dict having format like this {{\"type\": \"function\", \"function\": {{\"name\": <tool_name>}}}}. Received: {other}"
			))),
		}
	}
}

fn find_tool<'a>(tools: &'a [Tool], name: &str) -> Option<&'a Tool> {
	tools.iter().find(|tool| tool.name == name)
}

fn not_provided(choice: &str, tool_names: &[&str]) -> Error {
	Error::ToolChoice(format!(
		"Tool choice {choice} was specified, but the only provided tools were {tool_names:?}."
	))
}

// region:    --- Tests


// endregion: --- Tests
