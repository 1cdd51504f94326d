use serde_json::Value;

use crate::Result;
use crate::chat::ChatGenerationChunk;

/// Progress observer notified once per emitted stream chunk, in order.
///
/// An error returned here aborts the generation and is surfaced to the stream consumer.
pub trait ChatCallback: Send + Sync {
	fn on_new_token(&self, token: &str, chunk: &ChatGenerationChunk, logprobs: Option<&Value>) -> Result<()>;
}
