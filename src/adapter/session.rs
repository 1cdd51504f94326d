//! The seam to the native inference library.
//!
//! A `ChatSession` speaks the native chat-completion dictionaries:
//! - response: `{"choices": [{"index", "message" | "text", "finish_reason", "logprobs"}], "usage": {..}}`
//! - stream event: `{"choices": [{"index", "delta", "finish_reason", "logprobs"}]}`

use std::path::Path;

use serde_json::{Map, Value};

use crate::Result;

/// A lazy sequence of native streaming events.
pub type NativeEventStream<'a> = Box<dyn Iterator<Item = Result<Value>> + 'a>;

/// One chat-completion call: the message dictionaries and the native parameters
/// (`temperature`, `top_p`, `top_k`, `max_tokens`, `repeat_penalty`, `stop`, `grammar`,
/// `tools`, `tool_choice`, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionRequest {
	pub messages: Vec<Value>,
	pub params: Map<String, Value>,
}

/// An initialized native inference session.
///
/// Calls are not synchronized here. `&mut self` keeps one call in flight per session.
pub trait ChatSession {
	fn create_chat_completion(&mut self, request: CompletionRequest) -> Result<Value>;

	fn create_chat_completion_stream(&mut self, request: CompletionRequest) -> Result<NativeEventStream<'_>>;
}

/// Builds a `ChatSession` from a model file and the native constructor parameters.
pub trait SessionLoader {
	type Session: ChatSession + Send + 'static;

	fn load(&self, model_path: &Path, params: &Map<String, Value>) -> Result<Self::Session>;
}

impl<F, S> SessionLoader for F
where
	F: Fn(&Path, &Map<String, Value>) -> Result<S>,
	S: ChatSession + Send + 'static,
{
	type Session = S;

	fn load(&self, model_path: &Path, params: &Map<String, Value>) -> Result<S> {
		self(model_path, params)
	}
}
