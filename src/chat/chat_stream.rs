//! Streaming chunks and the lazy `ChatStream` over native streaming events.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::NativeEventStream;
use crate::chat::{
	ChatCallback, ChatGeneration, ChatResult, ChatRole, GenerationInfo, MessageChunk, delta_to_message_chunk,
};
use crate::{Error, Result};

// region:    --- ChatGenerationChunk

/// One incremental piece of a streamed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatGenerationChunk {
	pub message: MessageChunk,
	/// Present only when the chunk carries a finish reason or logprobs.
	pub generation_info: Option<GenerationInfo>,
}

impl ChatGenerationChunk {
	pub fn text(&self) -> &str {
		&self.message.content
	}

	pub fn logprobs(&self) -> Option<&Value> {
		self.generation_info.as_ref().and_then(|info| info.logprobs.as_ref())
	}

	/// Appends a later chunk onto this one.
	pub fn concat(&mut self, later: ChatGenerationChunk) {
		self.message.concat(later.message);
		self.generation_info = match (self.generation_info.take(), later.generation_info) {
			(Some(mut info), Some(later)) => {
				info.merge(later);
				Some(info)
			}
			(info, later) => later.or(info),
		};
	}

	pub fn into_generation(self) -> ChatGeneration {
		ChatGeneration {
			message: self.message.into_message(),
			generation_info: self.generation_info,
		}
	}
}

/// Drives a chunk stream to completion and aggregates it into a single-generation result.
pub fn generate_from_stream(stream: impl Iterator<Item = Result<ChatGenerationChunk>>) -> Result<ChatResult> {
	let mut aggregate: Option<ChatGenerationChunk> = None;

	for chunk in stream {
		let chunk = chunk?;
		match aggregate.as_mut() {
			Some(aggregate) => aggregate.concat(chunk),
			None => aggregate = Some(chunk),
		}
	}

	let aggregate = aggregate.ok_or_else(|| Error::NativeResponse("No generations found in stream.".to_string()))?;

	Ok(ChatResult {
		generations: vec![aggregate.into_generation()],
		llm_output: None,
	})
}

// endregion: --- ChatGenerationChunk

// region:    --- ChatStream

/// Lazy, finite stream of `ChatGenerationChunk` over the native streaming events.
///
/// - Events with no choice, or whose first choice has a null delta, are skipped.
/// - The role of a chunk defaults to the role of the previous chunk.
/// - The optional callback is notified for each emitted chunk, and its error ends the stream.
///
/// Generation advances only when the consumer pulls the next chunk. Dropping the stream stops it.
pub struct ChatStream<'a> {
	events: NativeEventStream<'a>,
	callback: Option<Arc<dyn ChatCallback>>,

	// -- Set by the next
	default_role: ChatRole,
	/// Flag to not pull the native events after an error.
	done: bool,
}

impl<'a> ChatStream<'a> {
	pub fn new(events: NativeEventStream<'a>, callback: Option<Arc<dyn ChatCallback>>) -> Self {
		Self {
			events,
			callback,
			default_role: ChatRole::Assistant,
			done: false,
		}
	}

	/// Converts one native event, or returns `None` when the event carries no delta.
	fn event_to_chunk(&mut self, event: &Value) -> Result<Option<ChatGenerationChunk>> {
		let Some(choice) = event.get("choices").and_then(Value::as_array).and_then(|c| c.first()) else {
			tracing::trace!("skipping stream event without choices");
			return Ok(None);
		};
		let delta = match choice.get("delta") {
			Some(Value::Null) | None => {
				tracing::trace!("skipping stream event with null delta");
				return Ok(None);
			}
			Some(delta) => delta,
		};

		let message = delta_to_message_chunk(delta, &self.default_role)?;
		self.default_role = message.role.clone();

		let info = GenerationInfo {
			finish_reason: choice.get("finish_reason").and_then(Value::as_str).map(String::from),
			logprobs: choice.get("logprobs").filter(|l| !is_empty_value(l)).cloned(),
		};

		Ok(Some(ChatGenerationChunk {
			message,
			generation_info: (!info.is_empty()).then_some(info),
		}))
	}
}

impl Iterator for ChatStream<'_> {
	type Item = Result<ChatGenerationChunk>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.done {
			return None;
		}

		loop {
			let event = match self.events.next()? {
				Ok(event) => event,
				Err(err) => {
					tracing::error!("llama.cpp stream error: {err}");
					self.done = true;
					return Some(Err(err));
				}
			};

			let chunk = match self.event_to_chunk(&event) {
				Ok(Some(chunk)) => chunk,
				Ok(None) => continue,
				Err(err) => {
					self.done = true;
					return Some(Err(err));
				}
			};

			if let Some(callback) = &self.callback
				&& let Err(err) = callback.on_new_token(chunk.text(), &chunk, chunk.logprobs())
			{
				self.done = true;
				return Some(Err(err));
			}

			return Some(Ok(chunk));
		}
	}
}

fn is_empty_value(value: &Value) -> bool {
	match value {
		Value::Null => true,
		Value::Array(items) => items.is_empty(),
		Value::Object(map) => map.is_empty(),
		_ => false,
	}
}

// endregion: --- ChatStream
