use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaChatTemplate, LlamaModel};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::super::grammar::Grammar;
use super::super::stop_scanner::StopScanner;
use super::super::tool_format::{CODE_FENCE, TOOL_CALL_OPEN, new_call_id, split_tool_calls, tool_call_value};
use super::backend::backend;
use super::generator::{SamplingParams, TokenGenerator, build_sampler};
use super::prompt::{ToolMode, build_prompt};
use crate::adapter::{ChatSession, CompletionRequest, NativeEventStream, SessionLoader};
use crate::chat::Usage;
use crate::{Error, Result};

/// Constructor parameters accepted but without effect on this session.
const IGNORED_MODEL_PARAMS: &[&str] = &["n_parts", "f16_kv", "logits_all", "vocab_only", "use_mlock", "use_mmap"];

// region:    --- LlamaCppLoader

/// Loads GGUF models into `LlamaCppSession`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct LlamaCppLoader;

impl SessionLoader for LlamaCppLoader {
	type Session = LlamaCppSession;

	fn load(&self, model_path: &Path, params: &Map<String, Value>) -> Result<LlamaCppSession> {
		LlamaCppSession::load(model_path, params)
	}
}

// endregion: --- LlamaCppLoader

// region:    --- Settings

/// The native constructor parameters this session understands.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct SessionSettings {
	n_ctx: u32,
	n_batch: Option<u32>,
	n_threads: Option<i32>,
	n_gpu_layers: Option<i32>,
	seed: i64,
	rope_freq_base: f32,
	rope_freq_scale: f32,
	last_n_tokens_size: Option<i32>,
	lora_path: Option<PathBuf>,
	lora_base: Option<PathBuf>,
	verbose: bool,
}

impl Default for SessionSettings {
	fn default() -> Self {
		Self {
			n_ctx: 512,
			n_batch: Some(8),
			n_threads: None,
			n_gpu_layers: None,
			seed: -1,
			rope_freq_base: 10000.0,
			rope_freq_scale: 1.0,
			last_n_tokens_size: Some(64),
			lora_path: None,
			lora_base: None,
			verbose: true,
		}
	}
}

impl SessionSettings {
	fn from_params(params: &Map<String, Value>) -> Result<Self> {
		let ignored: Vec<&str> = params
			.keys()
			.map(String::as_str)
			.filter(|key| IGNORED_MODEL_PARAMS.contains(key))
			.collect();
		if !ignored.is_empty() {
			tracing::debug!("llama.cpp session ignores parameter(s): {ignored:?}");
		}

		serde_json::from_value(Value::Object(params.clone()))
			.map_err(|err| Error::Session(format!("Invalid llama.cpp model parameters: {err}")))
	}

	/// The layer count for `LlamaModelParams`, where a negative value means all layers.
	fn gpu_layers(&self) -> Option<u32> {
		self.n_gpu_layers.map(|n| u32::try_from(n).unwrap_or(u32::MAX))
	}
}

/// The native call parameters this session understands.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct CallParams {
	temperature: Option<f32>,
	top_p: Option<f32>,
	top_k: Option<i32>,
	max_tokens: Option<i64>,
	repeat_penalty: Option<f32>,
	stop: Option<Value>,
	seed: Option<i64>,
	grammar: Option<String>,
	logprobs: Option<u32>,
	tools: Option<Vec<Value>>,
	tool_choice: Option<Value>,
}

impl CallParams {
	fn from_params(params: &Map<String, Value>) -> Result<Self> {
		let call: Self = serde_json::from_value(Value::Object(params.clone()))
			.map_err(|err| Error::Session(format!("Invalid llama.cpp call parameters: {err}")))?;
		if call.logprobs.is_some() {
			tracing::debug!("llama.cpp session does not return logprobs");
		}
		Ok(call)
	}

	fn stop_sequences(&self) -> Vec<String> {
		match &self.stop {
			Some(Value::String(stop)) => vec![stop.clone()],
			Some(Value::Array(stops)) => stops.iter().filter_map(Value::as_str).map(String::from).collect(),
			_ => Vec::new(),
		}
	}
}

// endregion: --- Settings

// region:    --- LlamaCppSession

/// A loaded GGUF model. Each completion runs in its own llama.cpp context.
pub struct LlamaCppSession {
	backend: &'static LlamaBackend,
	model: LlamaModel,
	chat_template: LlamaChatTemplate,
	settings: SessionSettings,
}

impl LlamaCppSession {
	pub fn load(model_path: &Path, params: &Map<String, Value>) -> Result<Self> {
		let settings = SessionSettings::from_params(params)?;
		let backend = backend(settings.verbose)?;

		if !model_path.exists() {
			return Err(Error::Session(format!("Model file not found: {}", model_path.display())));
		}
		if let Some(lora_path) = &settings.lora_path
			&& !lora_path.exists()
		{
			return Err(Error::Session(format!("LoRA file not found: {}", lora_path.display())));
		}
		if settings.lora_base.is_some() {
			tracing::warn!("lora_base is not supported by llama.cpp anymore and is ignored");
		}

		let mut model_params = LlamaModelParams::default();
		if let Some(n_gpu_layers) = settings.gpu_layers() {
			model_params = model_params.with_n_gpu_layers(n_gpu_layers);
		}

		let model = LlamaModel::load_from_file(backend, model_path, &model_params)
			.map_err(|err| Error::Session(format!("Failed to load model: {err}")))?;

		let chat_template = match model.chat_template(None) {
			Ok(template) => template,
			Err(err) => {
				tracing::warn!("Model has no usable chat template ({err}), falling back to chatml");
				LlamaChatTemplate::new("chatml")
					.map_err(|err| Error::Session(format!("Failed to create fallback chat template: {err}")))?
			}
		};

		tracing::info!("llama.cpp model loaded: {}", model_path.display());

		Ok(Self {
			backend,
			model,
			chat_template,
			settings,
		})
	}

	fn new_context(&self) -> Result<LlamaContext<'_>> {
		let settings = &self.settings;

		let mut params = LlamaContextParams::default()
			.with_n_ctx(NonZeroU32::new(settings.n_ctx))
			.with_n_batch(self.n_batch() as u32)
			.with_rope_freq_base(settings.rope_freq_base)
			.with_rope_freq_scale(settings.rope_freq_scale);
		if let Some(n_threads) = settings.n_threads {
			params = params.with_n_threads(n_threads).with_n_threads_batch(n_threads);
		}

		let ctx = self
			.model
			.new_context(self.backend, params)
			.map_err(|err| Error::Session(format!("Failed to create context: {err}")))?;

		if let Some(lora_path) = &settings.lora_path {
			let mut adapter = self
				.model
				.lora_adapter_init(lora_path)
				.map_err(|err| Error::Session(format!("Failed to load LoRA adapter: {err}")))?;
			ctx.lora_adapter_set(&mut adapter, 1.0)
				.map_err(|err| Error::Session(format!("Failed to apply LoRA adapter: {err}")))?;
		}

		Ok(ctx)
	}

	fn n_batch(&self) -> usize {
		self.settings.n_batch.filter(|n| *n > 0).unwrap_or(512) as usize
	}

	/// Renders the prompt, decodes it, and returns the ready generator.
	fn start_generation(&self, request: CompletionRequest) -> Result<(TokenGenerator<'_>, ToolMode)> {
		let CompletionRequest { messages, params } = request;
		let call = CallParams::from_params(&params)?;

		let mode = ToolMode::new(call.tools.clone().unwrap_or_default(), call.tool_choice.as_ref())?;
		let grammar = match &mode {
			ToolMode::Forced { parameters, .. } => Some(Grammar::from_json_schema(parameters)?.as_str().to_string()),
			_ => call.grammar.clone(),
		};

		let prompt = build_prompt(&self.model, &self.chat_template, &messages, &mode)?;
		let tokens = self
			.model
			.str_to_token(&prompt, AddBos::Never)
			.map_err(|err| Error::Session(format!("Failed to tokenize prompt: {err}")))?;

		let sampling = SamplingParams {
			temperature: call.temperature.unwrap_or(0.8),
			top_p: call.top_p.unwrap_or(0.95),
			top_k: call.top_k.unwrap_or(40),
			repeat_penalty: call.repeat_penalty.unwrap_or(1.1),
			last_n_tokens_size: self.settings.last_n_tokens_size.unwrap_or(64),
			seed: call.seed.unwrap_or(self.settings.seed),
			grammar,
		};
		let sampler = build_sampler(&self.model, &sampling)?;

		tracing::trace!("llama.cpp prompt: {} token(s), {sampling:?}", tokens.len());

		let ctx = self.new_context()?;
		let max_tokens = call.max_tokens.and_then(|max| u32::try_from(max).ok());
		let generator = TokenGenerator::new(
			&self.model,
			ctx,
			tokens,
			self.n_batch(),
			sampler,
			call.stop_sequences(),
			max_tokens,
		)?;

		Ok((generator, mode))
	}
}

impl ChatSession for LlamaCppSession {
	fn create_chat_completion(&mut self, request: CompletionRequest) -> Result<Value> {
		let (mut generator, mode) = self.start_generation(request)?;

		let mut text = String::new();
		for piece in generator.by_ref() {
			text.push_str(&piece?);
		}
		let finish_reason = generator.finish_reason().unwrap_or("stop");

		let (message, finish_reason) = match mode {
			ToolMode::Plain => (json!({"role": "assistant", "content": text}), finish_reason),
			ToolMode::Forced { name, .. } => {
				let tool_call = tool_call_value(0, &new_call_id(0), &name, &text);
				(
					json!({"role": "assistant", "content": null, "tool_calls": [tool_call]}),
					"tool_calls",
				)
			}
			ToolMode::Auto { .. } => {
				let (content, calls) = split_tool_calls(&text);
				if calls.is_empty() {
					(json!({"role": "assistant", "content": content}), finish_reason)
				} else {
					let tool_calls: Vec<Value> = calls
						.iter()
						.enumerate()
						.map(|(i, call)| tool_call_value(i, &new_call_id(i), &call.name, &call.arguments))
						.collect();
					let content = (!content.is_empty()).then_some(content);
					(
						json!({"role": "assistant", "content": content, "tool_calls": tool_calls}),
						"tool_calls",
					)
				}
			}
		};

		let usage = Usage::new(generator.prompt_tokens(), generator.completion_tokens());

		Ok(json!({
			"object": "chat.completion",
			"choices": [{
				"index": 0,
				"message": message,
				"finish_reason": finish_reason,
				"logprobs": null,
			}],
			"usage": serde_json::to_value(usage)?,
		}))
	}

	fn create_chat_completion_stream(&mut self, request: CompletionRequest) -> Result<NativeEventStream<'_>> {
		let (generator, mode) = self.start_generation(request)?;
		Ok(Box::new(EventStream::new(generator, mode)))
	}
}

// endregion: --- LlamaCppSession

// region:    --- EventStream

enum StreamMode {
	Text,
	Forced,
	/// Text is streamed until a tool call (or a code block) starts, then buffered and parsed at the end.
	Auto {
		scanner: StopScanner,
		started: bool,
		buffer: Option<String>,
	},
}

/// Native streaming events over a `TokenGenerator`.
struct EventStream<'a> {
	generator: TokenGenerator<'a>,
	mode: StreamMode,
	queue: VecDeque<Value>,
	finished: bool,
}

impl<'a> EventStream<'a> {
	fn new(generator: TokenGenerator<'a>, mode: ToolMode) -> Self {
		let mut queue = VecDeque::new();

		let mode = match mode {
			ToolMode::Plain => {
				queue.push_back(event(json!({"role": "assistant"}), None));
				StreamMode::Text
			}
			ToolMode::Forced { name, .. } => {
				let header = tool_call_value(0, &new_call_id(0), &name, "");
				queue.push_back(event(
					json!({"role": "assistant", "content": null, "tool_calls": [header]}),
					None,
				));
				StreamMode::Forced
			}
			ToolMode::Auto { .. } => {
				queue.push_back(event(json!({"role": "assistant"}), None));
				StreamMode::Auto {
					scanner: StopScanner::new(vec![TOOL_CALL_OPEN.to_string(), CODE_FENCE.to_string()]),
					started: false,
					buffer: None,
				}
			}
		};

		Self {
			generator,
			mode,
			queue,
			finished: false,
		}
	}

	fn on_piece(&mut self, piece: String) {
		match &mut self.mode {
			StreamMode::Text => self.queue.push_back(content_event(piece)),
			StreamMode::Forced => self.queue.push_back(event(
				json!({"tool_calls": [{"index": 0, "function": {"arguments": piece}}]}),
				None,
			)),
			StreamMode::Auto {
				scanner,
				started,
				buffer,
			} => {
				if let Some(buffer) = buffer {
					buffer.push_str(&piece);
					return;
				}

				let out = scanner.push(&piece);
				let emit = out.emit;
				// A reply opening with a JSON object may be a bare tool call.
				if !*started && !emit.trim().is_empty() {
					*started = true;
					if emit.trim_start().starts_with('{') {
						*buffer = Some(emit + &out.matched.unwrap_or_default());
						return;
					}
				}
				if let Some(matched) = out.matched {
					*buffer = Some(matched);
				}
				if !emit.is_empty() {
					self.queue.push_back(content_event(emit));
				}
			}
		}
	}

	fn on_finish(&mut self) {
		let finish_reason = self.generator.finish_reason().unwrap_or("stop");

		match &mut self.mode {
			StreamMode::Text => self.queue.push_back(event(json!({}), Some(finish_reason))),
			StreamMode::Forced => self.queue.push_back(event(json!({}), Some("tool_calls"))),
			StreamMode::Auto { scanner, buffer, .. } => {
				let rest = scanner.flush();
				let Some(buffer) = buffer.take() else {
					if !rest.is_empty() {
						self.queue.push_back(content_event(rest));
					}
					self.queue.push_back(event(json!({}), Some(finish_reason)));
					return;
				};

				let (content, calls) = split_tool_calls(&(buffer + &rest));
				if !content.is_empty() {
					self.queue.push_back(content_event(content));
				}
				for (i, call) in calls.iter().enumerate() {
					let tool_call = tool_call_value(i, &new_call_id(i), &call.name, &call.arguments);
					self.queue.push_back(event(json!({"tool_calls": [tool_call]}), None));
				}
				let finish_reason = if calls.is_empty() { finish_reason } else { "tool_calls" };
				self.queue.push_back(event(json!({}), Some(finish_reason)));
			}
		}
	}
}

impl Iterator for EventStream<'_> {
	type Item = Result<Value>;

	fn next(&mut self) -> Option<Self::Item> {
		loop {
			if let Some(event) = self.queue.pop_front() {
				return Some(Ok(event));
			}
			if self.finished {
				return None;
			}

			match self.generator.next() {
				Some(Ok(piece)) => self.on_piece(piece),
				Some(Err(err)) => {
					self.finished = true;
					return Some(Err(err));
				}
				None => {
					self.on_finish();
					self.finished = true;
				}
			}
		}
	}
}

fn event(delta: Value, finish_reason: Option<&str>) -> Value {
	json!({
		"object": "chat.completion.chunk",
		"choices": [{
			"index": 0,
			"delta": delta,
			"finish_reason": finish_reason,
			"logprobs": null,
		}],
	})
}

fn content_event(content: String) -> Value {
	event(json!({"content": content}), None)
}

// endregion: --- EventStream

// region:    --- Tests


// endregion: --- Tests
