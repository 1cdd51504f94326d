//! Some support utilities for the tests
//! Note: Must be imported in each test file

#![allow(unused)] // For test support

use std::path::Path;
use std::sync::{Arc, Mutex};

use genai_llamacpp::adapter::{ChatSession, CompletionRequest, NativeEventStream};
use genai_llamacpp::chat::{ChatCallback, ChatGenerationChunk};
use genai_llamacpp::{ChatLlamaCpp, Error, LlamaCppConfig};
use serde_json::{Map, Value, json};

pub type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>;

pub const MODEL_PATH: &str = "models/test-model.gguf";

// region:    --- Tracing

/// Sends the crate logs to the test output (filtered with `RUST_LOG`).
pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

// endregion: --- Tracing

// region:    --- ScriptedSession

/// One call received by a `ScriptedSession`.
#[derive(Debug, Clone)]
pub struct RecordedCall {
	pub streamed: bool,
	pub request: CompletionRequest,
}

/// A `ChatSession` answering with a scripted response (or stream events),
/// and recording every request it receives.
///
/// Clones share the same recorded calls.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSession {
	response: Value,
	/// `Err` entries become `Error::Session` items of the stream.
	events: Vec<core::result::Result<Value, String>>,
	calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl ScriptedSession {
	pub fn with_response(response: Value) -> Self {
		Self {
			response,
			..Default::default()
		}
	}

	pub fn with_events(events: Vec<core::result::Result<Value, String>>) -> Self {
		Self {
			events,
			..Default::default()
		}
	}

	pub fn calls(&self) -> Vec<RecordedCall> {
		self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
	}

	/// The params of the last recorded request.
	pub fn last_params(&self) -> Map<String, Value> {
		self.calls().pop().map(|call| call.request.params).unwrap_or_default()
	}

	fn record(&self, streamed: bool, request: CompletionRequest) {
		if let Ok(mut calls) = self.calls.lock() {
			calls.push(RecordedCall { streamed, request });
		}
	}
}

impl ChatSession for ScriptedSession {
	fn create_chat_completion(&mut self, request: CompletionRequest) -> genai_llamacpp::Result<Value> {
		self.record(false, request);
		Ok(self.response.clone())
	}

	fn create_chat_completion_stream(
		&mut self,
		request: CompletionRequest,
	) -> genai_llamacpp::Result<NativeEventStream<'_>> {
		self.record(true, request);
		let events = self.events.clone().into_iter().map(|event| event.map_err(Error::Session));
		Ok(Box::new(events))
	}
}

/// A `ChatLlamaCpp` over a clone of `session`.
pub fn scripted_model(config: LlamaCppConfig, session: &ScriptedSession) -> genai_llamacpp::Result<ChatLlamaCpp> {
	let session = session.clone();
	ChatLlamaCpp::with_loader(
		config,
		&move |_path: &Path, _params: &Map<String, Value>| -> genai_llamacpp::Result<ScriptedSession> {
			Ok(session.clone())
		},
	)
}

/// A non-streaming config for the test model.
pub fn non_streaming_config() -> LlamaCppConfig {
	LlamaCppConfig::new(MODEL_PATH).with_streaming(false)
}

// endregion: --- ScriptedSession

// region:    --- Native Fixtures

pub fn text_response(text: &str, finish_reason: &str) -> Value {
	json!({
		"choices": [{"index": 0, "text": text, "finish_reason": finish_reason}],
		"usage": {"prompt_tokens": 5, "completion_tokens": 1, "total_tokens": 6},
	})
}

pub fn message_response(message: Value, finish_reason: &str) -> Value {
	json!({
		"choices": [{"index": 0, "message": message, "finish_reason": finish_reason, "logprobs": null}],
		"usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20},
	})
}

/// An assistant message calling `name` with the raw `arguments` string.
pub fn tool_call_response(name: &str, arguments: &str) -> Value {
	message_response(
		json!({
			"role": "assistant",
			"content": null,
			"tool_calls": [{
				"id": "call_0",
				"type": "function",
				"function": {"name": name, "arguments": arguments},
			}],
		}),
		"tool_calls",
	)
}

pub fn delta_event(delta: Value, finish_reason: Option<&str>) -> core::result::Result<Value, String> {
	Ok(json!({
		"choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason, "logprobs": null}],
	}))
}

/// Role, "Hel", "lo", then the finish event.
pub fn hello_events() -> Vec<core::result::Result<Value, String>> {
	vec![
		delta_event(json!({"role": "assistant"}), None),
		delta_event(json!({"content": "Hel"}), None),
		delta_event(json!({"content": "lo"}), None),
		delta_event(json!({}), Some("stop")),
	]
}

// endregion: --- Native Fixtures

// region:    --- Callbacks

/// Records the token of every notified chunk. Fails on `fail_on`, when set.
#[derive(Debug, Default)]
pub struct RecordingCallback {
	pub tokens: Mutex<Vec<String>>,
	pub fail_on: Option<String>,
}

impl RecordingCallback {
	pub fn failing_on(token: &str) -> Self {
		Self {
			fail_on: Some(token.to_string()),
			..Default::default()
		}
	}

	pub fn tokens(&self) -> Vec<String> {
		self.tokens.lock().map(|tokens| tokens.clone()).unwrap_or_default()
	}
}

impl ChatCallback for RecordingCallback {
	fn on_new_token(
		&self,
		token: &str,
		_chunk: &ChatGenerationChunk,
		_logprobs: Option<&Value>,
	) -> genai_llamacpp::Result<()> {
		if let Ok(mut tokens) = self.tokens.lock() {
			tokens.push(token.to_string());
		}
		if self.fail_on.as_deref() == Some(token) {
			return Err(Error::Callback(format!("callback refused token '{token}'")));
		}
		Ok(())
	}
}

// endregion: --- Callbacks
