//! Token-by-token generation over one llama.cpp context.

use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::{LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use llama_cpp_2::token::LlamaToken;

use super::super::piece_decoder::PieceDecoder;
use super::super::stop_scanner::StopScanner;
use crate::{Error, Result};

/// llama.cpp seed meaning "random".
const RANDOM_SEED: u32 = u32::MAX;

// region:    --- Sampler

#[derive(Debug, Clone)]
pub(super) struct SamplingParams {
	pub temperature: f32,
	pub top_p: f32,
	pub top_k: i32,
	pub repeat_penalty: f32,
	pub last_n_tokens_size: i32,
	/// Negative means random.
	pub seed: i64,
	pub grammar: Option<String>,
}

pub(super) fn build_sampler(model: &LlamaModel, params: &SamplingParams) -> Result<LlamaSampler> {
	let mut samplers = Vec::new();

	if let Some(grammar) = &params.grammar {
		let Some(grammar_sampler) = LlamaSampler::grammar(model, grammar, "root") else {
			return Err(Error::Grammar("llama.cpp could not parse the grammar".to_string()));
		};
		samplers.push(grammar_sampler);
	}

	samplers.push(LlamaSampler::penalties(
		params.last_n_tokens_size,
		params.repeat_penalty,
		0.0,
		0.0,
	));

	if params.temperature <= 0.0 {
		samplers.push(LlamaSampler::greedy());
	} else {
		let seed = u32::try_from(params.seed).unwrap_or(RANDOM_SEED);
		samplers.push(LlamaSampler::top_k(params.top_k));
		samplers.push(LlamaSampler::top_p(params.top_p, 1));
		samplers.push(LlamaSampler::temp(params.temperature));
		samplers.push(LlamaSampler::dist(seed));
	}

	Ok(LlamaSampler::chain(samplers, false))
}

// endregion: --- Sampler

// region:    --- TokenGenerator

/// Lazy generation: each `next()` samples and decodes tokens until some text is ready.
///
/// Stop sequences are cut out of the text, and the generation ends on them.
pub(super) struct TokenGenerator<'a> {
	model: &'a LlamaModel,
	ctx: LlamaContext<'a>,
	batch: LlamaBatch,
	sampler: LlamaSampler,
	decoder: PieceDecoder,
	stop: StopScanner,

	max_tokens: Option<u32>,
	n_ctx: i32,
	n_past: i32,
	prompt_tokens: u32,
	completion_tokens: u32,

	// -- Set at the end
	finish_reason: Option<&'static str>,
	done: bool,
}

impl<'a> TokenGenerator<'a> {
	/// Decodes the prompt (in `n_batch` chunks) and prepares the generation.
	pub fn new(
		model: &'a LlamaModel,
		mut ctx: LlamaContext<'a>,
		prompt: Vec<LlamaToken>,
		n_batch: usize,
		sampler: LlamaSampler,
		stop: Vec<String>,
		max_tokens: Option<u32>,
	) -> Result<Self> {
		let n_ctx = ctx.n_ctx() as i32;
		if prompt.is_empty() {
			return Err(Error::Session("prompt is empty".to_string()));
		}
		if prompt.len() as i32 >= n_ctx {
			return Err(Error::Session(format!(
				"Requested tokens ({}) exceed context window of {n_ctx}",
				prompt.len()
			)));
		}

		let n_batch = n_batch.max(1);
		let last_index = prompt.len() - 1;
		let mut batch = LlamaBatch::new(n_batch, 1);

		for (chunk_index, chunk) in prompt.chunks(n_batch).enumerate() {
			batch.clear();
			for (offset, token) in chunk.iter().enumerate() {
				let pos = chunk_index * n_batch + offset;
				batch
					.add(*token, pos as i32, &[0], pos == last_index)
					.map_err(|err| Error::Session(format!("Failed to add token to batch: {err}")))?;
			}
			ctx.decode(&mut batch)
				.map_err(|err| Error::Session(format!("Failed to decode prompt: {err}")))?;
		}

		Ok(Self {
			model,
			ctx,
			batch,
			sampler,
			decoder: PieceDecoder::new(),
			stop: StopScanner::new(stop),
			max_tokens: max_tokens.filter(|max| *max > 0),
			n_ctx,
			n_past: prompt.len() as i32,
			prompt_tokens: prompt.len() as u32,
			completion_tokens: 0,
			finish_reason: None,
			done: false,
		})
	}

	pub fn prompt_tokens(&self) -> u32 {
		self.prompt_tokens
	}

	pub fn completion_tokens(&self) -> u32 {
		self.completion_tokens
	}

	/// `"stop"` (end of generation token or stop sequence) or `"length"`. `None` until finished.
	pub fn finish_reason(&self) -> Option<&'static str> {
		self.finish_reason
	}

	/// Samples one token. Returns its text, or `None` when the generation is over.
	fn step(&mut self) -> Result<Option<String>> {
		if self.max_tokens.is_some_and(|max| self.completion_tokens >= max) || self.n_past >= self.n_ctx {
			self.finish_reason = Some("length");
			return Ok(None);
		}

		let token = self.sampler.sample(&self.ctx, self.batch.n_tokens() - 1);

		if self.model.is_eog_token(token) {
			self.finish_reason = Some("stop");
			return Ok(None);
		}
		self.completion_tokens += 1;

		let bytes = self
			.model
			.token_to_bytes(token, Special::Tokenize)
			.map_err(|err| Error::Session(format!("Failed to convert token to bytes: {err}")))?;
		let piece = self.decoder.decode(&bytes);

		self.batch.clear();
		self.batch
			.add(token, self.n_past, &[0], true)
			.map_err(|err| Error::Session(format!("Failed to add token to batch: {err}")))?;
		self.ctx
			.decode(&mut self.batch)
			.map_err(|err| Error::Session(format!("Failed to decode batch: {err}")))?;
		self.n_past += 1;

		Ok(Some(piece))
	}
}

impl Iterator for TokenGenerator<'_> {
	type Item = Result<String>;

	fn next(&mut self) -> Option<Self::Item> {
		while !self.done {
			match self.step() {
				Ok(Some(piece)) => {
					let out = self.stop.push(&piece);
					if out.matched.is_some() {
						self.finish_reason = Some("stop");
						self.done = true;
					}
					if !out.emit.is_empty() {
						return Some(Ok(out.emit));
					}
				}
				Ok(None) => {
					self.done = true;
					let tail = self.decoder.finish();
					let out = self.stop.push(&tail);
					let mut rest = out.emit;
					if out.matched.is_some() {
						self.finish_reason = Some("stop");
					} else {
						rest.push_str(&self.stop.flush());
					}
					if !rest.is_empty() {
						return Some(Ok(rest));
					}
				}
				Err(err) => {
					tracing::error!("llama.cpp generation error: {err}");
					self.done = true;
					return Some(Err(err));
				}
			}
		}

		None
	}
}

// endregion: --- TokenGenerator
