//! `LlamaCppConfig` is the raw, flat set of model/runtime parameters of a `ChatLlamaCpp`.
//!
//! It is built with chainable setters (or deserialized from JSON), then validated once by
//! `build()` into a `ValidatedConfig`, which resolves the grammar and derives the native
//! constructor and call parameters.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::grammar::Grammar;
use crate::{Error, Result};

/// Native constructor parameters forwarded from the config (besides `n_gpu_layers` and `model_kwargs`).
pub const MODEL_PARAM_NAMES: &[&str] = &[
	"rope_freq_scale",
	"rope_freq_base",
	"lora_path",
	"lora_base",
	"n_ctx",
	"n_parts",
	"seed",
	"f16_kv",
	"logits_all",
	"vocab_only",
	"use_mlock",
	"n_threads",
	"n_batch",
	"use_mmap",
	"last_n_tokens_size",
	"verbose",
];

// region:    --- LlamaCppConfig

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlamaCppConfig {
	/// The path to the GGUF model file (required).
	pub model_path: PathBuf,

	/// The path to the LoRA base model.
	pub lora_base: Option<PathBuf>,

	/// The path to the LoRA adapter. If None, no LoRA is loaded.
	pub lora_path: Option<PathBuf>,

	/// Token context window.
	pub n_ctx: u32,

	/// Number of parts to split the model into. -1 lets the library decide.
	pub n_parts: i32,

	/// Seed. -1 means random.
	pub seed: i64,

	/// Use half-precision for the key/value cache.
	pub f16_kv: bool,

	/// Return logits for all tokens, not just the last token.
	pub logits_all: bool,

	/// Only load the vocabulary, no weights.
	pub vocab_only: bool,

	/// Force the system to keep the model in RAM.
	pub use_mlock: bool,

	/// Number of threads. None lets the library decide.
	pub n_threads: Option<u32>,

	/// Number of tokens to process in parallel. Should be between 1 and `n_ctx`.
	pub n_batch: Option<u32>,

	/// Number of layers to load into GPU memory. Forwarded only when set.
	/// A negative value offloads every layer.
	pub n_gpu_layers: Option<i32>,

	/// Text appended to the generated text. Not used by chat completions.
	pub suffix: Option<String>,

	/// The maximum number of tokens to generate.
	pub max_tokens: Option<u32>,

	pub temperature: Option<f64>,

	pub top_p: Option<f64>,

	/// Number of logprobs to return. None returns no logprobs.
	pub logprobs: Option<u32>,

	/// Echo the prompt. Not used by chat completions.
	pub echo: bool,

	/// Sequences that stop the generation when encountered.
	pub stop: Vec<String>,

	/// The penalty to apply to repeated tokens.
	pub repeat_penalty: Option<f64>,

	pub top_k: Option<i32>,

	/// The number of tokens to look back when applying the repeat penalty.
	pub last_n_tokens_size: Option<i32>,

	/// Memory-map the model file.
	pub use_mmap: Option<bool>,

	/// Scale factor for rope sampling.
	pub rope_freq_scale: f64,

	/// Base frequency for rope sampling.
	pub rope_freq_base: f64,

	/// Any additional native constructor parameters. Merged last, so they override the fields above.
	pub model_kwargs: Map<String, Value>,

	/// Stream the results, token by token. Also makes `generate` aggregate a stream.
	pub streaming: bool,

	/// Inline GBNF grammar constraining the model output. Exclusive with `grammar_path`.
	pub grammar: Option<String>,

	/// Path to a `.gbnf` grammar file. Exclusive with `grammar`.
	pub grammar_path: Option<PathBuf>,

	/// Let the native library log to the `tracing` output.
	pub verbose: bool,
}

impl Default for LlamaCppConfig {
	fn default() -> Self {
		Self {
			model_path: PathBuf::new(),
			lora_base: None,
			lora_path: None,
			n_ctx: 512,
			n_parts: -1,
			seed: -1,
			f16_kv: true,
			logits_all: false,
			vocab_only: false,
			use_mlock: false,
			n_threads: None,
			n_batch: Some(8),
			n_gpu_layers: None,
			suffix: None,
			max_tokens: Some(256),
			temperature: Some(0.8),
			top_p: Some(0.95),
			logprobs: None,
			echo: false,
			stop: Vec::new(),
			repeat_penalty: Some(1.1),
			top_k: Some(40),
			last_n_tokens_size: Some(64),
			use_mmap: Some(true),
			rope_freq_scale: 1.0,
			rope_freq_base: 10000.0,
			model_kwargs: Map::new(),
			streaming: true,
			grammar: None,
			grammar_path: None,
			verbose: true,
		}
	}
}

/// Constructors
impl LlamaCppConfig {
	pub fn new(model_path: impl Into<PathBuf>) -> Self {
		Self {
			model_path: model_path.into(),
			..Default::default()
		}
	}

	pub fn from_json(value: Value) -> Result<Self> {
		Ok(serde_json::from_value(value)?)
	}
}

/// Chainable Setters
impl LlamaCppConfig {
	#[must_use]
	pub fn with_lora(mut self, lora_path: impl Into<PathBuf>, lora_base: Option<PathBuf>) -> Self {
		self.lora_path = Some(lora_path.into());
		self.lora_base = lora_base;
		self
	}

	#[must_use]
	pub const fn with_n_ctx(mut self, value: u32) -> Self {
		self.n_ctx = value;
		self
	}

	#[must_use]
	pub const fn with_n_parts(mut self, value: i32) -> Self {
		self.n_parts = value;
		self
	}

	#[must_use]
	pub const fn with_seed(mut self, value: i64) -> Self {
		self.seed = value;
		self
	}

	#[must_use]
	pub const fn with_f16_kv(mut self, value: bool) -> Self {
		self.f16_kv = value;
		self
	}

	#[must_use]
	pub const fn with_logits_all(mut self, value: bool) -> Self {
		self.logits_all = value;
		self
	}

	#[must_use]
	pub const fn with_vocab_only(mut self, value: bool) -> Self {
		self.vocab_only = value;
		self
	}

	#[must_use]
	pub const fn with_use_mlock(mut self, value: bool) -> Self {
		self.use_mlock = value;
		self
	}

	#[must_use]
	pub const fn with_n_threads(mut self, value: u32) -> Self {
		self.n_threads = Some(value);
		self
	}

	#[must_use]
	pub const fn with_n_batch(mut self, value: u32) -> Self {
		self.n_batch = Some(value);
		self
	}

	#[must_use]
	pub const fn with_n_gpu_layers(mut self, value: i32) -> Self {
		self.n_gpu_layers = Some(value);
		self
	}

	#[must_use]
	pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
		self.suffix = Some(suffix.into());
		self
	}

	#[must_use]
	pub const fn with_max_tokens(mut self, value: u32) -> Self {
		self.max_tokens = Some(value);
		self
	}

	#[must_use]
	pub const fn with_temperature(mut self, value: f64) -> Self {
		self.temperature = Some(value);
		self
	}

	#[must_use]
	pub const fn with_top_p(mut self, value: f64) -> Self {
		self.top_p = Some(value);
		self
	}

	#[must_use]
	pub const fn with_logprobs(mut self, value: u32) -> Self {
		self.logprobs = Some(value);
		self
	}

	#[must_use]
	pub const fn with_echo(mut self, value: bool) -> Self {
		self.echo = value;
		self
	}

	#[must_use]
	pub fn with_stop(mut self, values: Vec<String>) -> Self {
		self.stop = values;
		self
	}

	#[must_use]
	pub const fn with_repeat_penalty(mut self, value: f64) -> Self {
		self.repeat_penalty = Some(value);
		self
	}

	#[must_use]
	pub const fn with_top_k(mut self, value: i32) -> Self {
		self.top_k = Some(value);
		self
	}

	#[must_use]
	pub const fn with_last_n_tokens_size(mut self, value: i32) -> Self {
		self.last_n_tokens_size = Some(value);
		self
	}

	#[must_use]
	pub const fn with_use_mmap(mut self, value: bool) -> Self {
		self.use_mmap = Some(value);
		self
	}

	#[must_use]
	pub const fn with_rope_freq_scale(mut self, value: f64) -> Self {
		self.rope_freq_scale = value;
		self
	}

	#[must_use]
	pub const fn with_rope_freq_base(mut self, value: f64) -> Self {
		self.rope_freq_base = value;
		self
	}

	#[must_use]
	pub fn with_model_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.model_kwargs.insert(key.into(), value.into());
		self
	}

	#[must_use]
	pub const fn with_streaming(mut self, value: bool) -> Self {
		self.streaming = value;
		self
	}

	#[must_use]
	pub fn with_grammar(mut self, grammar: impl Into<String>) -> Self {
		self.grammar = Some(grammar.into());
		self
	}

	#[must_use]
	pub fn with_grammar_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.grammar_path = Some(path.into());
		self
	}

	#[must_use]
	pub const fn with_verbose(mut self, value: bool) -> Self {
		self.verbose = value;
		self
	}
}

impl LlamaCppConfig {
	/// Validates the cross-field constraints and resolves the grammar.
	pub fn build(self) -> Result<ValidatedConfig> {
		if self.model_path.as_os_str().is_empty() {
			return Err(Error::Configuration("model_path is required".to_string()));
		}

		let inline_grammar = self.grammar.as_deref().filter(|g| !g.is_empty());
		let grammar_path = self.grammar_path.as_deref().filter(|p| !p.as_os_str().is_empty());

		let grammar = match (inline_grammar, grammar_path) {
			(Some(grammar), Some(grammar_path)) => {
				return Err(Error::Configuration(format!(
					"Can only pass in one of grammar and grammar_path. Received grammar={grammar:?} and grammar_path={:?}.",
					grammar_path.display().to_string()
				)));
			}
			(Some(grammar), None) => Some(Grammar::from_string(grammar)?),
			(None, Some(grammar_path)) => Some(Grammar::from_file(&expand_path(grammar_path))?),
			(None, None) => None,
		};

		let model_path = expand_path(&self.model_path);

		Ok(ValidatedConfig {
			raw: self,
			model_path,
			grammar,
		})
	}
}

// endregion: --- LlamaCppConfig

// region:    --- ValidatedConfig

/// A validated `LlamaCppConfig` with its grammar resolved. Immutable.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
	raw: LlamaCppConfig,
	model_path: PathBuf,
	grammar: Option<Grammar>,
}

/// Getters
impl ValidatedConfig {
	pub fn raw(&self) -> &LlamaCppConfig {
		&self.raw
	}

	/// The model path with `~` expanded.
	pub fn model_path(&self) -> &Path {
		&self.model_path
	}

	pub fn grammar(&self) -> Option<&Grammar> {
		self.grammar.as_ref()
	}

	pub fn streaming(&self) -> bool {
		self.raw.streaming
	}

	pub fn stop(&self) -> &[String] {
		&self.raw.stop
	}
}

impl ValidatedConfig {
	/// The parameters for the native session constructor.
	pub fn model_params(&self) -> Map<String, Value> {
		let raw = &self.raw;
		let mut params = Map::new();

		for name in MODEL_PARAM_NAMES {
			let value = match *name {
				"rope_freq_scale" => raw.rope_freq_scale.into(),
				"rope_freq_base" => raw.rope_freq_base.into(),
				"lora_path" => path_value(raw.lora_path.as_deref()),
				"lora_base" => path_value(raw.lora_base.as_deref()),
				"n_ctx" => raw.n_ctx.into(),
				"n_parts" => raw.n_parts.into(),
				"seed" => raw.seed.into(),
				"f16_kv" => raw.f16_kv.into(),
				"logits_all" => raw.logits_all.into(),
				"vocab_only" => raw.vocab_only.into(),
				"use_mlock" => raw.use_mlock.into(),
				"n_threads" => raw.n_threads.into(),
				"n_batch" => raw.n_batch.into(),
				"use_mmap" => raw.use_mmap.into(),
				"last_n_tokens_size" => raw.last_n_tokens_size.into(),
				"verbose" => raw.verbose.into(),
				_ => continue,
			};
			params.insert(name.to_string(), value);
		}

		// Only forwarded when set, so the native default applies otherwise.
		if let Some(n_gpu_layers) = raw.n_gpu_layers {
			params.insert("n_gpu_layers".to_string(), n_gpu_layers.into());
		}

		params.extend(raw.model_kwargs.clone());

		params
	}

	/// The default chat-completion parameters.
	///
	/// Stop sequences are reported under `stop_sequences`; the native key is `stop`.
	pub fn default_params(&self) -> Map<String, Value> {
		let raw = &self.raw;
		let mut params = Map::new();

		params.insert("max_tokens".to_string(), raw.max_tokens.into());
		params.insert("temperature".to_string(), raw.temperature.into());
		params.insert("top_p".to_string(), raw.top_p.into());
		params.insert("top_k".to_string(), raw.top_k.into());
		params.insert("logprobs".to_string(), raw.logprobs.into());
		params.insert("stop_sequences".to_string(), raw.stop.clone().into());
		params.insert("repeat_penalty".to_string(), raw.repeat_penalty.into());
		if let Some(grammar) = &self.grammar {
			params.insert("grammar".to_string(), grammar.as_str().into());
		}

		params
	}
}

// endregion: --- ValidatedConfig

// region:    --- Support

/// Expands a leading `~` to the home directory.
pub(super) fn expand_path(path: &Path) -> PathBuf {
	let path_str = path.to_string_lossy();
	PathBuf::from(shellexpand::tilde(&path_str).as_ref())
}

fn path_value(path: Option<&Path>) -> Value {
	path.map(|p| Value::String(expand_path(p).to_string_lossy().to_string()))
		.unwrap_or(Value::Null)
}

// endregion: --- Support

// region:    --- Tests


// endregion: --- Tests
