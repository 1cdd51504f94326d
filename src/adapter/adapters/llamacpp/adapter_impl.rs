//! Core LlamaCpp chat-model implementation.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::config::{LlamaCppConfig, ValidatedConfig};
use crate::adapter::{ChatModel, ChatSession, CompletionRequest, RunnableBinding, SessionLoader};
use crate::chat::{
	ChatCallback, ChatGeneration, ChatMessage, ChatOptions, ChatOptionsSet, ChatResult, ChatStream, GenerationInfo,
	LlmOutput, Usage, dict_to_message, generate_from_stream, message_to_dict,
};
use crate::{Error, Result};

/// Chat model over a local llama.cpp model.
///
/// The native session is created once, at construction, and owned by this value.
/// Generation takes `&mut self`: sharing one model across threads needs external locking.
pub struct ChatLlamaCpp {
	config: ValidatedConfig,
	session: Box<dyn ChatSession + Send>,
	callback: Option<Arc<dyn ChatCallback>>,
}

impl std::fmt::Debug for ChatLlamaCpp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ChatLlamaCpp")
			.field("config", &self.config)
			.field("has_callback", &self.callback.is_some())
			.finish_non_exhaustive()
	}
}

/// Constructors
impl ChatLlamaCpp {
	/// Validates the config and loads the model with the llama.cpp session.
	#[cfg(feature = "llamacpp")]
	pub fn new(config: LlamaCppConfig) -> Result<Self> {
		Self::with_loader(config, &super::LlamaCppLoader)
	}

	/// Without the `llamacpp` feature, there is no native session to load. Use `with_loader`.
	#[cfg(not(feature = "llamacpp"))]
	pub fn new(_config: LlamaCppConfig) -> Result<Self> {
		Err(Error::Configuration(
			"Could not import llama-cpp-2: native library not available; enable the `llamacpp` feature".to_string(),
		))
	}

	/// Validates the config and creates the native session with `loader`.
	///
	/// Any loader failure is reported as `Error::ModelLoad` with the model path.
	pub fn with_loader<L: SessionLoader>(config: LlamaCppConfig, loader: &L) -> Result<Self> {
		let config = config.build()?;
		let model_params = config.model_params();

		tracing::debug!(
			"loading llama.cpp model '{}' with {} parameter(s)",
			config.model_path().display(),
			model_params.len()
		);

		let session = loader
			.load(config.model_path(), &model_params)
			.map_err(|err| Error::ModelLoad {
				model_path: config.model_path().to_path_buf(),
				cause: err.to_string(),
			})?;

		Ok(Self {
			config,
			session: Box::new(session),
			callback: None,
		})
	}
}

/// Chainable Setters
impl ChatLlamaCpp {
	/// Registers the observer notified for each streamed chunk.
	#[must_use]
	pub fn with_callback(mut self, callback: Arc<dyn ChatCallback>) -> Self {
		self.callback = Some(callback);
		self
	}
}

/// Getters
impl ChatLlamaCpp {
	pub fn config(&self) -> &ValidatedConfig {
		&self.config
	}

	/// The default chat-completion parameters (see `ValidatedConfig::default_params`).
	pub fn default_params(&self) -> Map<String, Value> {
		self.config.default_params()
	}

	/// The parameters identifying this model: `model_path` and the default parameters.
	pub fn identifying_params(&self) -> Map<String, Value> {
		let mut params = Map::new();
		params.insert(
			"model_path".to_string(),
			Value::String(self.config.model_path().to_string_lossy().to_string()),
		);
		params.extend(self.default_params());
		params
	}
}

impl ChatLlamaCpp {
	/// The native call parameters: default parameters with `stop_sequences` renamed to `stop`.
	///
	/// A given `stop` replaces the configured stop sequences.
	pub fn get_parameters(&self, stop: Option<&[String]>) -> Map<String, Value> {
		let mut params = self.default_params();

		// The native session expects `stop`, not `stop_sequences`.
		params.remove("stop_sequences");
		let stop = stop.unwrap_or(self.config.stop());
		params.insert("stop".to_string(), stop.to_vec().into());

		params
	}

	pub fn create_message_dicts(&self, messages: &[ChatMessage]) -> Vec<Value> {
		messages.iter().map(message_to_dict).collect()
	}

	/// Translates a native chat-completion response, one generation per choice.
	///
	/// A choice carries either a `message` dictionary or a bare `text`.
	pub fn create_chat_result(&self, response: &Value) -> Result<ChatResult> {
		let choices = response
			.get("choices")
			.and_then(Value::as_array)
			.ok_or_else(|| Error::NativeResponse(format!("response has no 'choices' array: {response}")))?;

		let mut generations = Vec::with_capacity(choices.len());
		for choice in choices {
			let native_message = choice
				.get("message")
				.or_else(|| choice.get("text"))
				.ok_or_else(|| Error::NativeResponse(format!("choice has no 'message' nor 'text': {choice}")))?;

			let generation_info = GenerationInfo {
				finish_reason: choice.get("finish_reason").and_then(Value::as_str).map(String::from),
				logprobs: choice.get("logprobs").filter(|l| !l.is_null()).cloned(),
			};

			generations.push(ChatGeneration {
				message: dict_to_message(native_message)?,
				generation_info: Some(generation_info),
			});
		}

		let token_usage: Usage = match response.get("usage") {
			Some(usage) if !usage.is_null() => serde_json::from_value(usage.clone())?,
			_ => Usage::default(),
		};

		Ok(ChatResult {
			generations,
			llm_output: Some(LlmOutput { token_usage }),
		})
	}

	/// Generates with the configured defaults overridden by `options`.
	///
	/// Aggregates a stream when the config has `streaming` on.
	pub fn generate(
		&mut self,
		messages: &[ChatMessage],
		stop: Option<&[String]>,
		options: Option<&ChatOptions>,
	) -> Result<ChatResult> {
		self.chat(messages, stop, ChatOptionsSet::default().with_call_options(options))
	}

	/// Streams with the configured defaults overridden by `options`.
	pub fn stream(
		&mut self,
		messages: &[ChatMessage],
		stop: Option<&[String]>,
		options: Option<&ChatOptions>,
	) -> Result<ChatStream<'_>> {
		self.chat_stream(messages, stop, ChatOptionsSet::default().with_call_options(options))
	}

	/// Binds per-call options (e.g., `seed`, `max_tokens`) to every call made through the binding.
	pub fn bind(&mut self, options: ChatOptions) -> RunnableBinding<'_, Self> {
		RunnableBinding::new(self, options)
	}

	fn completion_request(
		&self,
		messages: &[ChatMessage],
		stop: Option<&[String]>,
		options_set: &ChatOptionsSet<'_, '_>,
	) -> CompletionRequest {
		let mut params = self.get_parameters(stop);
		params.extend(options_set.to_params());

		CompletionRequest {
			messages: self.create_message_dicts(messages),
			params,
		}
	}
}

impl ChatModel for ChatLlamaCpp {
	fn llm_type(&self) -> &'static str {
		"llama-cpp"
	}

	fn chat(
		&mut self,
		messages: &[ChatMessage],
		stop: Option<&[String]>,
		options_set: ChatOptionsSet<'_, '_>,
	) -> Result<ChatResult> {
		if self.config.streaming() {
			let stream = self.chat_stream(messages, stop, options_set)?;
			return generate_from_stream(stream);
		}

		let request = self.completion_request(messages, stop, &options_set);
		tracing::debug!(
			"llama.cpp chat completion: {} message(s), {} parameter(s)",
			request.messages.len(),
			request.params.len()
		);

		let response = self.session.create_chat_completion(request)?;
		self.create_chat_result(&response)
	}

	fn chat_stream(
		&mut self,
		messages: &[ChatMessage],
		stop: Option<&[String]>,
		options_set: ChatOptionsSet<'_, '_>,
	) -> Result<ChatStream<'_>> {
		let request = self.completion_request(messages, stop, &options_set);
		tracing::debug!(
			"llama.cpp chat completion stream: {} message(s), {} parameter(s)",
			request.messages.len(),
			request.params.len()
		);

		let callback = self.callback.clone();
		let events = self.session.create_chat_completion_stream(request)?;

		Ok(ChatStream::new(events, callback))
	}
}

// region:    --- Tests


// endregion: --- Tests
