mod support;

use genai_llamacpp::adapter::ChatModel;
use genai_llamacpp::chat::{ChatMessage, ToolSchema};
use genai_llamacpp::output::{OutputSchema, StructuredOutput, StructuredOutputRequest};
use genai_llamacpp::{Error, LlamaCppConfig};
use serde::Deserialize;
use serde_json::{Value, json};
use support::{
	MODEL_PATH, Result, ScriptedSession, delta_event, non_streaming_config, scripted_model, text_response,
	tool_call_response,
};

#[derive(Debug, PartialEq, Deserialize)]
struct Person {
	name: String,
	age: u32,
}

impl ToolSchema for Person {
	fn tool_name() -> String {
		"Person".to_string()
	}

	fn tool_description() -> Option<String> {
		Some("Information about a person".to_string())
	}

	fn parameters() -> Value {
		json!({
			"type": "object",
			"properties": {
				"name": {"type": "string"},
				"age": {"type": "integer"},
			},
			"required": ["name", "age"],
		})
	}
}

fn messages() -> Vec<ChatMessage> {
	vec![ChatMessage::user("Ada Lovelace was 36.")]
}

fn answer_schema() -> Value {
	json!({
		"title": "Answer",
		"description": "An answer with its justification",
		"type": "object",
		"properties": {
			"answer": {"type": "string"},
			"justification": {"type": "string"},
		},
		"required": ["answer"],
	})
}

#[test]
fn test_structured_output_typed_ok() -> Result<()> {
	// -- Setup & Fixtures
	let session = ScriptedSession::with_response(tool_call_response("Person", r#"{"name": "Ada", "age": 36}"#));
	let mut model = scripted_model(non_streaming_config(), &session)?;

	// -- Exec
	let mut runnable = model.with_structured_output::<Person>(StructuredOutputRequest::new(OutputSchema::typed::<Person>()))?;
	let output = runnable.invoke(&messages())?;

	// -- Check
	assert_eq!(runnable.key_name(), "Person");
	assert_eq!(
		output.into_parsed(),
		Some(Person {
			name: "Ada".to_string(),
			age: 36
		})
	);

	let params = session.last_params();
	assert_eq!(params["tool_choice"], json!({"type": "function", "function": {"name": "Person"}}));
	assert_eq!(params["tools"][0]["function"]["description"], json!("Information about a person"));

	Ok(())
}

#[test]
fn test_structured_output_dict_schema_ok() -> Result<()> {
	// -- Setup & Fixtures
	let session = ScriptedSession::with_response(tool_call_response("Answer", r#"{"answer": "42"}"#));
	let mut model = scripted_model(non_streaming_config(), &session)?;

	// -- Exec
	let mut runnable = model.with_structured_output::<Value>(StructuredOutputRequest::new(answer_schema()))?;
	let output = runnable.invoke(&messages())?;

	// -- Check
	assert_eq!(output.parsed(), Some(&json!({"answer": "42"})));
	let tool = &session.last_params()["tools"][0]["function"];
	assert_eq!(tool["name"], json!("Answer"));
	assert!(tool["parameters"].get("title").is_none());

	Ok(())
}

#[test]
fn test_structured_output_streamed() -> Result<()> {
	// -- Setup & Fixtures
	let session = ScriptedSession::with_events(vec![
		delta_event(
			json!({"role": "assistant", "tool_calls": [{
				"index": 0,
				"id": "call_0",
				"function": {"name": "Person", "arguments": "{\"name\": \"Ada\", "},
			}]}),
			None,
		),
		delta_event(json!({"tool_calls": [{"index": 0, "function": {"arguments": "\"age\": 36}"}}]}), None),
		delta_event(json!({}), Some("tool_calls")),
	]);
	let mut model = scripted_model(LlamaCppConfig::new(MODEL_PATH), &session)?;

	// -- Exec
	let mut runnable = model.with_structured_output::<Person>(StructuredOutputRequest::new(OutputSchema::typed::<Person>()))?;
	let output = runnable.invoke(&messages())?;

	// -- Check
	assert_eq!(output.parsed().map(|p| p.age), Some(36));

	Ok(())
}

#[test]
fn test_structured_output_no_tool_call_is_none() -> Result<()> {
	// -- Setup & Fixtures
	let session = ScriptedSession::with_response(text_response("I don't know.", "stop"));
	let mut model = scripted_model(non_streaming_config(), &session)?;

	// -- Exec
	let mut runnable = model.with_structured_output::<Person>(StructuredOutputRequest::new(OutputSchema::typed::<Person>()))?;
	let output = runnable.invoke(&messages())?;

	// -- Check
	assert!(matches!(output, StructuredOutput::Parsed(None)));

	Ok(())
}

#[test]
fn test_structured_output_include_raw_captures_error() -> Result<()> {
	// -- Setup & Fixtures
	let session = ScriptedSession::with_response(tool_call_response("Person", r#"{"name": "Ada", "age": "old"}"#));
	let mut model = scripted_model(non_streaming_config(), &session)?;
	let request = StructuredOutputRequest::new(OutputSchema::typed::<Person>()).with_include_raw(true);

	// -- Exec
	let mut runnable = model.with_structured_output::<Person>(request)?;
	let output = runnable.invoke(&messages())?;

	// -- Check
	let StructuredOutput::WithRaw(result) = output else {
		return Err("should be a raw result".into());
	};
	assert!(result.parsed.is_none());
	assert!(matches!(result.parsing_error, Some(Error::OutputParse(_))));
	assert_eq!(result.raw.tool_calls.len(), 1);
	assert_eq!(result.raw.tool_calls[0].fn_name, "Person");

	Ok(())
}

#[test]
fn test_structured_output_include_raw_invalid_json() -> Result<()> {
	// -- Setup & Fixtures
	let session = ScriptedSession::with_response(tool_call_response("Person", "{name: Ada"));
	let mut model = scripted_model(non_streaming_config(), &session)?;
	let request = StructuredOutputRequest::new(OutputSchema::typed::<Person>()).with_include_raw(true);

	// -- Exec
	let mut runnable = model.with_structured_output::<Person>(request)?;
	let output = runnable.invoke(&messages())?;

	// -- Check
	let StructuredOutput::WithRaw(result) = output else {
		return Err("should be a raw result".into());
	};
	assert!(result.parsed.is_none());
	assert!(result.parsing_error.is_some());
	assert_eq!(result.raw.invalid_tool_calls.len(), 1);

	Ok(())
}

#[test]
fn test_structured_output_parse_error_propagates() -> Result<()> {
	// -- Setup & Fixtures
	let session = ScriptedSession::with_response(tool_call_response("Person", r#"{"name": "Ada", "age": "old"}"#));
	let mut model = scripted_model(non_streaming_config(), &session)?;

	// -- Exec
	let mut runnable = model.with_structured_output::<Person>(StructuredOutputRequest::new(OutputSchema::typed::<Person>()))?;
	let res = runnable.invoke(&messages());

	// -- Check
	assert!(matches!(res, Err(Error::OutputParse(_))));

	Ok(())
}

#[test]
fn test_structured_output_generation_error_propagates_with_raw() -> Result<()> {
	// -- Setup & Fixtures
	let session = ScriptedSession::with_events(vec![Err("out of memory".to_string())]);
	let mut model = scripted_model(LlamaCppConfig::new(MODEL_PATH), &session)?;
	let request = StructuredOutputRequest::new(OutputSchema::typed::<Person>()).with_include_raw(true);

	// -- Exec
	let mut runnable = model.with_structured_output::<Person>(request)?;
	let res = runnable.invoke(&messages());

	// -- Check
	assert!(matches!(res, Err(Error::Session(_))));

	Ok(())
}

#[test]
fn test_structured_output_requires_schema() -> Result<()> {
	// -- Setup & Fixtures
	let session = ScriptedSession::default();
	let mut model = scripted_model(non_streaming_config(), &session)?;

	// -- Exec
	let res = model.with_structured_output::<Value>(StructuredOutputRequest::default());

	// -- Check
	let err = res.err().ok_or("should have failed")?;
	assert!(matches!(err, Error::Schema(_)));
	assert!(err.to_string().contains("schema must be specified"));
	assert!(session.calls().is_empty());

	Ok(())
}

#[test]
fn test_structured_output_rejects_extra_args() -> Result<()> {
	// -- Setup & Fixtures
	let session = ScriptedSession::default();
	let mut model = scripted_model(non_streaming_config(), &session)?;
	let request = StructuredOutputRequest::new(answer_schema()).with_extra_arg("strict", true);

	// -- Exec
	let res = model.with_structured_output::<Value>(request);

	// -- Check
	let err = res.err().ok_or("should have failed")?;
	assert!(matches!(err, Error::UnsupportedArgument(_)));
	assert!(err.to_string().contains("strict"));

	Ok(())
}
