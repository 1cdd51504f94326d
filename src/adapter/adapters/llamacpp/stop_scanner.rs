/// Scans streamed text for markers (e.g., stop sequences) spanning several pieces.
///
/// Text that could be the beginning of a marker is held back until it is resolved,
/// so the emitted text never contains a partial marker.
#[derive(Debug, Clone, Default)]
pub(super) struct StopScanner {
	markers: Vec<String>,
	pending: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ScanOutput {
	/// The text safe to emit.
	pub emit: String,
	/// On a match, the pending text from the start of the marker.
	pub matched: Option<String>,
}

impl StopScanner {
	pub fn new(markers: impl IntoIterator<Item = String>) -> Self {
		Self {
			markers: markers.into_iter().filter(|m| !m.is_empty()).collect(),
			pending: String::new(),
		}
	}

	pub fn push(&mut self, piece: &str) -> ScanOutput {
		self.pending.push_str(piece);

		let first_match = self.markers.iter().filter_map(|m| self.pending.find(m.as_str())).min();
		if let Some(pos) = first_match {
			let matched = self.pending.split_off(pos);
			return ScanOutput {
				emit: std::mem::take(&mut self.pending),
				matched: Some(matched),
			};
		}

		let hold = self
			.markers
			.iter()
			.map(|m| partial_suffix_len(&self.pending, m))
			.max()
			.unwrap_or(0);
		let rest = self.pending.split_off(self.pending.len() - hold);

		ScanOutput {
			emit: std::mem::replace(&mut self.pending, rest),
			matched: None,
		}
	}

	/// Releases the held-back text at the end of the generation.
	pub fn flush(&mut self) -> String {
		std::mem::take(&mut self.pending)
	}
}

/// Length of the longest suffix of `text` that is a strict prefix of `marker`.
fn partial_suffix_len(text: &str, marker: &str) -> usize {
	(1..marker.len())
		.rev()
		.filter(|&k| marker.is_char_boundary(k))
		.find(|&k| text.ends_with(&marker[..k]))
		.unwrap_or(0)
}

// region:    --- Tests


// endregion: --- Tests
