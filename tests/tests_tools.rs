mod support;

use genai_llamacpp::adapter::ChatModel;
use genai_llamacpp::chat::{ChatMessage, ChatOptions, FunctionParam, FunctionSignature, ToolChoice, ToolSpec};
use genai_llamacpp::{Error, LlamaCppConfig};
use serde_json::{Value, json};
use support::{
	MODEL_PATH, Result, ScriptedSession, delta_event, non_streaming_config, scripted_model, text_response,
	tool_call_response,
};

fn weather_tool() -> ToolSpec {
	ToolSpec::from(json!({
		"type": "function",
		"function": {
			"name": "get_weather",
			"description": "Get the current weather for a city",
			"parameters": {
				"type": "object",
				"properties": {"city": {"type": "string"}},
				"required": ["city"],
			},
		},
	}))
}

fn time_tool() -> ToolSpec {
	FunctionSignature::new("get_time")
		.with_description("Get the current time in a timezone")
		.with_param(FunctionParam::required("timezone", "string"))
		.into()
}

fn forced(name: &str) -> Value {
	json!({"type": "function", "function": {"name": name}})
}

#[test]
fn test_bind_tools_true_with_single_tool() -> Result<()> {
	// -- Setup & Fixtures
	let session = ScriptedSession::default();
	let mut model = scripted_model(non_streaming_config(), &session)?;

	// -- Exec
	let binding = model.bind_tools(vec![weather_tool()], Some(ToolChoice::from(true)))?;

	// -- Check
	assert_eq!(binding.options().tools.len(), 1);
	assert_eq!(binding.options().tool_choice, Some(forced("get_weather")));

	Ok(())
}

#[test]
fn test_bind_tools_true_with_two_tools_fails() -> Result<()> {
	// -- Setup & Fixtures
	let session = ScriptedSession::default();
	let mut model = scripted_model(non_streaming_config(), &session)?;

	// -- Exec
	let res = model.bind_tools(vec![weather_tool(), time_tool()], Some(ToolChoice::from(true)));

	// -- Check
	let err = res.err().ok_or("should have failed")?;
	assert!(matches!(err, Error::ToolChoice(_)));
	assert!(err.to_string().contains("Received 2 tools"));

	Ok(())
}

#[test]
fn test_bind_tools_choice_by_name() -> Result<()> {
	// -- Setup & Fixtures
	let session = ScriptedSession::default();
	let mut model = scripted_model(non_streaming_config(), &session)?;

	// -- Exec
	let binding = model.bind_tools(vec![weather_tool(), time_tool()], Some("get_time".into()))?;

	// -- Check
	assert_eq!(binding.options().tool_choice, Some(forced("get_time")));

	Ok(())
}

#[test]
fn test_bind_tools_unknown_name_fails() -> Result<()> {
	// -- Setup & Fixtures
	let session = ScriptedSession::default();
	let mut model = scripted_model(non_streaming_config(), &session)?;

	// -- Exec
	let res = model.bind_tools(vec![weather_tool()], Some("get_stock_price".into()));

	// -- Check
	let err = res.err().ok_or("should have failed")?;
	assert!(matches!(err, Error::ToolChoice(_)));
	assert!(err.to_string().contains("get_weather"));

	Ok(())
}

#[test]
fn test_bind_tools_dict_choice() -> Result<()> {
	// -- Setup & Fixtures
	let session = ScriptedSession::default();
	let mut model = scripted_model(non_streaming_config(), &session)?;

	// -- Exec
	let binding = model.bind_tools(
		vec![weather_tool(), time_tool()],
		Some(ToolChoice::from(forced("get_weather"))),
	)?;

	// -- Check
	assert_eq!(binding.options().tool_choice, Some(forced("get_weather")));

	Ok(())
}

#[test]
fn test_bind_tools_false_forces_nothing() -> Result<()> {
	// -- Setup & Fixtures
	let session = ScriptedSession::default();
	let mut model = scripted_model(non_streaming_config(), &session)?;

	// -- Exec
	let binding = model.bind_tools(vec![weather_tool(), time_tool()], Some(ToolChoice::from(false)))?;

	// -- Check
	assert_eq!(binding.options().tools.len(), 2);
	assert_eq!(binding.options().tool_choice, None);

	Ok(())
}

#[test]
fn test_bind_tools_unsupported_choice_fails() -> Result<()> {
	// -- Setup & Fixtures
	let session = ScriptedSession::default();
	let mut model = scripted_model(non_streaming_config(), &session)?;

	// -- Exec
	let res = model.bind_tools(vec![weather_tool()], Some(ToolChoice::from(json!(3))));

	// -- Check
	assert!(matches!(res, Err(Error::ToolChoice(_))));

	Ok(())
}

#[test]
fn test_bound_tools_forwarded_to_session() -> Result<()> {
	// -- Setup & Fixtures
	let session = ScriptedSession::with_response(tool_call_response("get_weather", r#"{"city": "Paris"}"#));
	let mut model = scripted_model(non_streaming_config(), &session)?;
	let messages = vec![ChatMessage::user("Weather in Paris?")];

	// -- Exec
	let mut binding = model.bind_tools(vec![weather_tool()], Some("get_weather".into()))?;
	let result = binding.generate(&messages, None, None)?;

	// -- Check
	let params = session.last_params();
	assert_eq!(params["tool_choice"], forced("get_weather"));
	let tools = params["tools"].as_array().ok_or("tools should be an array")?;
	assert_eq!(tools.len(), 1);
	assert_eq!(tools[0]["function"]["name"], json!("get_weather"));
	assert_eq!(tools[0]["function"]["parameters"]["required"], json!(["city"]));

	let tool_calls = result.first_tool_calls().ok_or("should have tool calls")?;
	assert_eq!(tool_calls.len(), 1);
	assert_eq!(tool_calls[0].fn_name, "get_weather");
	assert_eq!(tool_calls[0].fn_arguments, json!({"city": "Paris"}));
	assert_eq!(result.generations[0].finish_reason(), Some("tool_calls"));

	Ok(())
}

#[test]
fn test_bound_tools_streamed_call_aggregated() -> Result<()> {
	// -- Setup & Fixtures
	let session = ScriptedSession::with_events(vec![
		delta_event(
			json!({"role": "assistant", "content": null, "tool_calls": [{
				"index": 0,
				"id": "call_0",
				"type": "function",
				"function": {"name": "get_weather", "arguments": ""},
			}]}),
			None,
		),
		delta_event(json!({"tool_calls": [{"index": 0, "function": {"arguments": "{\"city\": "}}]}), None),
		delta_event(json!({"tool_calls": [{"index": 0, "function": {"arguments": "\"Oslo\"}"}}]}), None),
		delta_event(json!({}), Some("tool_calls")),
	]);
	let mut model = scripted_model(LlamaCppConfig::new(MODEL_PATH), &session)?;

	// -- Exec
	let mut binding = model.bind_tools(vec![weather_tool()], Some(ToolChoice::from(true)))?;
	let message = binding.invoke(&[ChatMessage::user("Weather in Oslo?")])?;

	// -- Check
	assert_eq!(message.tool_calls.len(), 1);
	assert_eq!(message.tool_calls[0].call_id, "call_0");
	assert_eq!(message.tool_calls[0].fn_arguments, json!({"city": "Oslo"}));

	Ok(())
}

#[test]
fn test_binding_options_layered() -> Result<()> {
	// -- Setup & Fixtures
	let session = ScriptedSession::with_response(text_response("ok", "stop"));
	let mut model = scripted_model(non_streaming_config(), &session)?;

	// -- Exec
	let mut binding = model
		.bind_tools(vec![weather_tool()], None)?
		.bind(ChatOptions::default().with_seed(7).with_temperature(0.2));
	binding.generate(
		&[ChatMessage::user("hi")],
		None,
		Some(&ChatOptions::default().with_temperature(0.9)),
	)?;

	// -- Check
	let params = session.last_params();
	assert_eq!(params["seed"], json!(7));
	assert_eq!(params["temperature"], json!(0.9));
	assert!(params.contains_key("tools"));
	assert!(!params.contains_key("tool_choice"));

	Ok(())
}
