//! Tool calling in plain generated text.
//!
//! Offered tools are described in the system prompt, and the model is asked to answer
//! with `<tool_call>{"name": .., "arguments": {..}}</tool_call>` blocks, which are then
//! parsed back into native `tool_calls` entries.

use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use serde_json::{Value, json};

pub(super) const TOOL_CALL_OPEN: &str = "<tool_call>";
pub(super) const TOOL_CALL_CLOSE: &str = "</tool_call>";
/// Opens a markdown code block, where some models put their call object.
pub(super) const CODE_FENCE: &str = "```";

const FENCED_JSON: &str = r"(?s)```(?:json)?\s*(\{.*?\})\s*```";

/// A tool call found in generated text. `arguments` is JSON text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ParsedToolCall {
	pub name: String,
	pub arguments: String,
}

// region:    --- Prompt

/// The system prompt describing `tools` (native function values).
pub(super) fn tools_system_prompt(tools: &[Value]) -> String {
	let mut prompt = String::from("You are a function calling AI model. ");
	prompt.push_str("You may call one or more of the functions below to answer the user.\n");
	prompt.push_str("Available functions:\n<tools>\n");
	for tool in tools {
		let function = tool.get("function").unwrap_or(tool);
		prompt.push_str(&function.to_string());
		prompt.push('\n');
	}
	prompt.push_str("</tools>\n");
	prompt.push_str("To call a function, reply with a JSON object wrapped in tool call tags:\n");
	prompt.push_str(&format!(
		"{TOOL_CALL_OPEN}\n{{\"name\": \"<function-name>\", \"arguments\": {{<args-dict>}}}}\n{TOOL_CALL_CLOSE}\n"
	));
	prompt
}

/// The instruction appended when one function must be called.
pub(super) fn forced_tool_prompt(tools: &[Value], name: &str) -> String {
	let mut prompt = tools_system_prompt(tools);
	prompt.push_str(&format!(
		"You must call the function \"{name}\" now. Reply only with the JSON object of its arguments.\n"
	));
	prompt
}

/// Renders the tool calls of a previous assistant message, so the model sees its own format.
pub(super) fn render_tool_calls(tool_calls: &[Value]) -> String {
	let mut rendered = String::new();
	for tool_call in tool_calls {
		let function = tool_call.get("function");
		let name = function.and_then(|f| f.get("name")).and_then(Value::as_str).unwrap_or_default();
		let arguments = match function.and_then(|f| f.get("arguments")) {
			Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())),
			Some(other) => other.clone(),
			None => json!({}),
		};
		let call = json!({"name": name, "arguments": arguments});
		rendered.push_str(&format!("{TOOL_CALL_OPEN}\n{call}\n{TOOL_CALL_CLOSE}\n"));
	}
	rendered
}

// endregion: --- Prompt

// region:    --- Parsing

/// Splits generated text into its plain text and its tool calls.
///
/// Without any `<tool_call>` tag, a text made only of a `{"name", "arguments"}` object,
/// or a fenced json block holding one, is taken as one call.
pub(super) fn split_tool_calls(text: &str) -> (String, Vec<ParsedToolCall>) {
	let mut content = String::new();
	let mut calls = Vec::new();
	let mut rest = text;

	while let Some(start) = rest.find(TOOL_CALL_OPEN) {
		content.push_str(&rest[..start]);
		let after_open = &rest[start + TOOL_CALL_OPEN.len()..];
		let (inner, after) = match after_open.find(TOOL_CALL_CLOSE) {
			Some(end) => (&after_open[..end], &after_open[end + TOOL_CALL_CLOSE.len()..]),
			None => (after_open, ""),
		};

		match parse_call_object(inner) {
			Some(call) => calls.push(call),
			None => {
				tracing::debug!("unparsable tool call block kept as text: {inner}");
				content.push_str(&rest[start..rest.len() - after.len()]);
			}
		}
		rest = after;
	}
	content.push_str(rest);

	if calls.is_empty()
		&& let Some(call) = parse_call_object(content.trim()).filter(|_| content.trim().starts_with('{'))
	{
		return (String::new(), vec![call]);
	}
	if calls.is_empty()
		&& let Some((content, call)) = fenced_call(&content)
	{
		return (content, vec![call]);
	}

	(content.trim().to_string(), calls)
}

/// The call object of the first fenced json block, with the text around the block.
fn fenced_call(text: &str) -> Option<(String, ParsedToolCall)> {
	let re = Regex::new(FENCED_JSON).ok()?;
	let caps = re.captures(text)?;
	let call = parse_call_object(caps.get(1)?.as_str())?;
	let block = caps.get(0)?;

	let content = format!("{}{}", &text[..block.start()], &text[block.end()..]);
	Some((content.trim().to_string(), call))
}

fn parse_call_object(text: &str) -> Option<ParsedToolCall> {
	let start = text.find('{')?;
	let json_part = &text[start..];
	let end = find_json_end(json_part)?;
	let value: Value = serde_json::from_str(&json_part[..=end]).ok()?;

	let name = value.get("name")?.as_str()?.to_string();
	let arguments = match value.get("arguments").or_else(|| value.get("parameters")) {
		Some(Value::String(raw)) => raw.clone(),
		Some(args) => args.to_string(),
		None => "{}".to_string(),
	};

	Some(ParsedToolCall { name, arguments })
}

/// Finds the end of a JSON object by counting braces.
fn find_json_end(json_str: &str) -> Option<usize> {
	let mut brace_count = 0;
	let mut in_string = false;
	let mut escaped = false;

	for (i, ch) in json_str.char_indices() {
		if escaped {
			escaped = false;
			continue;
		}

		match ch {
			'\\' if in_string => escaped = true,
			'"' => in_string = !in_string,
			'{' if !in_string => brace_count += 1,
			'}' if !in_string => {
				brace_count -= 1;
				if brace_count == 0 {
					return Some(i);
				}
			}
			_ => {}
		}
	}

	None
}

// endregion: --- Parsing

// region:    --- Native Shapes

/// A unique tool call id.
pub(super) fn new_call_id(index: usize) -> String {
	let timestamp = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_nanos())
		.unwrap_or_default();
	format!("call_{timestamp}_{index}")
}

/// The native `tool_calls` entry of a complete call.
pub(super) fn tool_call_value(index: usize, id: &str, name: &str, arguments: &str) -> Value {
	json!({
		"index": index,
		"id": id,
		"type": "function",
		"function": {"name": name, "arguments": arguments},
	})
}

// endregion: --- Native Shapes

// region:    --- Tests


// endregion: --- Tests
