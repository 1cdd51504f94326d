//! Incremental UTF-8 decoding of token bytes.
//!
//! A token can end in the middle of a multi-byte character, so the pending bytes
//! are held until the next token (or until `finish`).

use encoding_rs::{CoderResult, Decoder, UTF_8};

pub(super) struct PieceDecoder {
	decoder: Decoder,
}

impl PieceDecoder {
	pub fn new() -> Self {
		Self {
			decoder: UTF_8.new_decoder(),
		}
	}

	/// Decodes the bytes of one token. Returns the characters completed so far.
	pub fn decode(&mut self, bytes: &[u8]) -> String {
		self.decode_to_string(bytes, false)
	}

	/// Ends the input. A truncated trailing sequence becomes U+FFFD.
	/// The decoder must not be used after this call.
	pub fn finish(&mut self) -> String {
		self.decode_to_string(&[], true)
	}

	fn decode_to_string(&mut self, mut bytes: &[u8], last: bool) -> String {
		let capacity = self.decoder.max_utf8_buffer_length(bytes.len()).unwrap_or(bytes.len() * 3 + 4);
		let mut text = String::with_capacity(capacity);
		loop {
			let (result, read, _) = self.decoder.decode_to_string(bytes, &mut text, last);
			bytes = &bytes[read..];
			match result {
				CoderResult::InputEmpty => return text,
				CoderResult::OutputFull => text.reserve(bytes.len() * 3 + 4),
			}
		}
	}
}

// region:    --- Tests


// endregion: --- Tests
