//! Structured output: one forced tool derived from a schema, then its arguments parsed back.

use derive_more::From;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::adapter::{ChatModel, RunnableBinding};
use crate::chat::{ChatMessage, ToolSchema, ToolSpec, TypedSchema};
use crate::output::TypedToolsParser;
use crate::{Error, Result};

// region:    --- OutputSchema

/// The target of a structured output.
#[derive(Debug, Clone, From)]
pub enum OutputSchema {
	/// A dictionary schema (any shape accepted by `convert_to_function_tool`).
	Json(Value),
	/// A typed schema. The arguments are validated by deserializing into the type.
	Typed(TypedSchema),
}

impl OutputSchema {
	pub fn typed<T: ToolSchema>() -> Self {
		Self::Typed(TypedSchema::of::<T>())
	}
}

impl From<OutputSchema> for ToolSpec {
	fn from(schema: OutputSchema) -> Self {
		match schema {
			OutputSchema::Json(value) => ToolSpec::Json(value),
			OutputSchema::Typed(typed) => ToolSpec::Typed(typed),
		}
	}
}

// endregion: --- OutputSchema

// region:    --- StructuredOutputRequest

/// The arguments of `with_structured_output`.
#[derive(Debug, Clone, Default)]
pub struct StructuredOutputRequest {
	/// Required. `None` fails with `Error::Schema`.
	pub schema: Option<OutputSchema>,

	/// Return the raw message and the parsing error along with the parsed value,
	/// instead of failing on parsing errors.
	pub include_raw: bool,

	/// Not supported. Any entry fails with `Error::UnsupportedArgument`.
	pub extra_args: Map<String, Value>,
}

impl StructuredOutputRequest {
	pub fn new(schema: impl Into<OutputSchema>) -> Self {
		Self {
			schema: Some(schema.into()),
			..Default::default()
		}
	}
}

/// Chainable Setters
impl StructuredOutputRequest {
	#[must_use]
	pub const fn with_include_raw(mut self, value: bool) -> Self {
		self.include_raw = value;
		self
	}

	#[must_use]
	pub fn with_extra_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.extra_args.insert(key.into(), value.into());
		self
	}
}

// endregion: --- StructuredOutputRequest

// region:    --- StructuredOutput

/// The `include_raw` record. Parsing errors are captured here, never raised.
#[derive(Debug)]
pub struct StructuredResult<T> {
	pub raw: ChatMessage,
	pub parsed: Option<T>,
	pub parsing_error: Option<Error>,
}

#[derive(Debug)]
pub enum StructuredOutput<T> {
	/// `include_raw = false`. `None` when the model made no matching tool call.
	Parsed(Option<T>),
	/// `include_raw = true`.
	WithRaw(StructuredResult<T>),
}

impl<T> StructuredOutput<T> {
	/// The parsed value, whichever the mode.
	pub fn parsed(&self) -> Option<&T> {
		match self {
			Self::Parsed(parsed) => parsed.as_ref(),
			Self::WithRaw(result) => result.parsed.as_ref(),
		}
	}

	pub fn into_parsed(self) -> Option<T> {
		match self {
			Self::Parsed(parsed) => parsed,
			Self::WithRaw(result) => result.parsed,
		}
	}
}

// endregion: --- StructuredOutput

// region:    --- StructuredOutputRunnable

/// A model bound to one forced tool, with the parser for that tool's arguments.
pub struct StructuredOutputRunnable<'m, M: ChatModel + ?Sized, T> {
	binding: RunnableBinding<'m, M>,
	parser: TypedToolsParser<T>,
	include_raw: bool,
}

impl<'m, M: ChatModel + ?Sized, T: DeserializeOwned> StructuredOutputRunnable<'m, M, T> {
	pub(crate) fn new(binding: RunnableBinding<'m, M>, parser: TypedToolsParser<T>, include_raw: bool) -> Self {
		Self {
			binding,
			parser,
			include_raw,
		}
	}

	pub fn binding(&self) -> &RunnableBinding<'m, M> {
		&self.binding
	}

	/// The name of the forced tool.
	pub fn key_name(&self) -> &str {
		self.parser.key_name()
	}

	/// Generates, then parses the forced tool call.
	///
	/// Generation errors always propagate. Parsing errors propagate only without `include_raw`.
	pub fn invoke(&mut self, messages: &[ChatMessage]) -> Result<StructuredOutput<T>> {
		let raw = self.binding.invoke(messages)?;

		if !self.include_raw {
			return Ok(StructuredOutput::Parsed(self.parser.parse(&raw)?));
		}

		let result = match self.parser.parse(&raw) {
			Ok(parsed) => StructuredResult {
				raw,
				parsed,
				parsing_error: None,
			},
			Err(err) => {
				tracing::debug!("structured output parsing failed: {err}");
				StructuredResult {
					raw,
					parsed: None,
					parsing_error: Some(err),
				}
			}
		};

		Ok(StructuredOutput::WithRaw(result))
	}
}

// endregion: --- StructuredOutputRunnable
