//! Tests against a real GGUF model, with the native llama.cpp session.
//!
//! These tests require the `llamacpp` feature to be enabled, and a model file
//! given by the `LLAMACPP_TEST_MODEL` environment variable.

#![cfg(feature = "llamacpp")]

mod support;

use genai_llamacpp::adapter::ChatModel;
use genai_llamacpp::chat::{ChatMessage, ChatOptions, ToolChoice, ToolSchema, ToolSpec};
use genai_llamacpp::output::{OutputSchema, StructuredOutputRequest};
use genai_llamacpp::{ChatLlamaCpp, Error, LlamaCppConfig};
use serde::Deserialize;
use serde_json::{Value, json};
use support::{Result, init_tracing};

fn test_config() -> Result<LlamaCppConfig> {
	let model_path = std::env::var("LLAMACPP_TEST_MODEL").map_err(|_| "LLAMACPP_TEST_MODEL must be set")?;
	Ok(LlamaCppConfig::new(model_path)
		.with_n_ctx(2048)
		.with_n_batch(512)
		.with_max_tokens(64)
		.with_temperature(0.0)
		.with_verbose(false))
}

#[test]
fn test_new_missing_model_file_fails() -> Result<()> {
	// -- Exec
	let res = ChatLlamaCpp::new(LlamaCppConfig::new("/nonexistent/model.gguf").with_verbose(false));

	// -- Check
	let err = res.err().ok_or("should have failed")?;
	assert!(matches!(err, Error::ModelLoad { .. }), "unexpected error: {err}");
	assert!(err.to_string().contains("/nonexistent/model.gguf"));

	Ok(())
}

#[test]
#[ignore = "Requires actual GGUF model file"]
fn test_llamacpp_chat_basic() -> Result<()> {
	init_tracing();

	// -- Setup & Fixtures
	let mut model = ChatLlamaCpp::new(test_config()?.with_streaming(false))?;
	let messages = vec![
		ChatMessage::system("Answer in one word."),
		ChatMessage::user("What is the capital of France?"),
	];

	// -- Exec
	let result = model.generate(&messages, None, None)?;

	// -- Check
	let text = result.first_text().ok_or("should have text")?;
	assert!(!text.trim().is_empty());
	let usage = &result.llm_output.as_ref().ok_or("should have llm_output")?.token_usage;
	assert!(usage.prompt_tokens.unwrap_or(0) > 0);

	Ok(())
}

#[test]
#[ignore = "Requires actual GGUF model file"]
fn test_llamacpp_stream_matches_max_tokens() -> Result<()> {
	// -- Setup & Fixtures
	let mut model = ChatLlamaCpp::new(test_config()?)?;
	let options = ChatOptions::default().with_max_tokens(8);

	// -- Exec
	let chunks = model
		.stream(&[ChatMessage::user("Count from 1 to 100.")], None, Some(&options))?
		.collect::<genai_llamacpp::Result<Vec<_>>>()?;

	// -- Check
	assert!(chunks.len() > 1);
	let finish_reason = chunks
		.last()
		.and_then(|chunk| chunk.generation_info.as_ref())
		.and_then(|info| info.finish_reason.as_deref());
	assert_eq!(finish_reason, Some("length"));

	Ok(())
}

#[test]
#[ignore = "Requires actual GGUF model file"]
fn test_llamacpp_stop_sequence() -> Result<()> {
	// -- Setup & Fixtures
	let mut model = ChatLlamaCpp::new(test_config()?.with_streaming(false))?;
	let stop = vec!["3".to_string()];

	// -- Exec
	let result = model.generate(&[ChatMessage::user("Count from 1 to 10, separated by commas.")], Some(&stop), None)?;

	// -- Check
	let text = result.first_text().ok_or("should have text")?;
	assert!(!text.contains('3'));
	assert_eq!(result.generations[0].finish_reason(), Some("stop"));

	Ok(())
}

#[test]
#[ignore = "Requires actual GGUF model file"]
fn test_llamacpp_forced_tool_call() -> Result<()> {
	// -- Setup & Fixtures
	let mut model = ChatLlamaCpp::new(test_config()?.with_max_tokens(128))?;
	let tool = ToolSpec::from(json!({
		"name": "get_weather",
		"description": "Get the current weather for a city",
		"parameters": {
			"type": "object",
			"properties": {"city": {"type": "string"}},
			"required": ["city"],
		},
	}));

	// -- Exec
	let mut binding = model.bind_tools(vec![tool], Some(ToolChoice::from(true)))?;
	let message = binding.invoke(&[ChatMessage::user("What is the weather in Paris?")])?;

	// -- Check
	assert_eq!(message.tool_calls.len(), 1);
	assert_eq!(message.tool_calls[0].fn_name, "get_weather");
	assert!(message.tool_calls[0].fn_arguments.get("city").is_some_and(Value::is_string));

	Ok(())
}

#[derive(Debug, Deserialize)]
struct Capital {
	country: String,
	city: String,
}

impl ToolSchema for Capital {
	fn tool_name() -> String {
		"Capital".to_string()
	}

	fn parameters() -> Value {
		json!({
			"type": "object",
			"properties": {"country": {"type": "string"}, "city": {"type": "string"}},
			"required": ["country", "city"],
		})
	}
}

#[test]
#[ignore = "Requires actual GGUF model file"]
fn test_llamacpp_structured_output() -> Result<()> {
	// -- Setup & Fixtures
	let mut model = ChatLlamaCpp::new(test_config()?.with_max_tokens(128).with_streaming(false))?;

	// -- Exec
	let mut runnable =
		model.with_structured_output::<Capital>(StructuredOutputRequest::new(OutputSchema::typed::<Capital>()))?;
	let capital = runnable
		.invoke(&[ChatMessage::user("What is the capital of Italy?")])?
		.into_parsed()
		.ok_or("should have parsed a capital")?;

	// -- Check
	assert!(!capital.country.is_empty());
	assert!(!capital.city.is_empty());

	Ok(())
}
