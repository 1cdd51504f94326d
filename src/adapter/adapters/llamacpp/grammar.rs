//! GBNF grammar constraining the model output.

use std::path::Path;

use serde_json::Value;

use super::schema_to_grammar::schema_to_gbnf;
use crate::{Error, Result};

/// A resolved GBNF grammar. Always defines a `root` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grammar {
	source: String,
}

/// Constructors
impl Grammar {
	pub fn from_string(source: impl Into<String>) -> Result<Self> {
		let source = source.into();
		if !defines_root(&source) {
			return Err(Error::Grammar("grammar does not define a `root` rule".to_string()));
		}
		Ok(Self { source })
	}

	pub fn from_file(path: &Path) -> Result<Self> {
		let source = std::fs::read_to_string(path)
			.map_err(|err| Error::Grammar(format!("Failed to read grammar file '{}': {err}", path.display())))?;
		Self::from_string(source)
	}

	/// Grammar accepting the JSON documents described by `schema`.
	pub fn from_json_schema(schema: &Value) -> Result<Self> {
		Self::from_string(schema_to_gbnf(schema)?)
	}
}

/// Getters
impl Grammar {
	pub fn as_str(&self) -> &str {
		&self.source
	}
}

fn defines_root(source: &str) -> bool {
	source.lines().any(|line| {
		line.trim_start()
			.strip_prefix("root")
			.is_some_and(|rest| rest.trim_start().starts_with("::="))
	})
}

// region:    --- Tests


// endregion: --- Tests
