use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::chat::ChatMessage;
use crate::{Error, Result};

// region:    --- JsonOutputKeyToolsParser

/// Extracts the arguments of the tool calls named `key_name` from a message.
///
/// - `first_tool_only`: the arguments of the first matching call (`None` when no call matches).
/// - otherwise: an array with the arguments of every matching call.
///
/// A matching call whose arguments are not valid JSON is an `OutputParse` error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonOutputKeyToolsParser {
	pub key_name: String,
	pub first_tool_only: bool,
}

impl JsonOutputKeyToolsParser {
	pub fn new(key_name: impl Into<String>) -> Self {
		Self {
			key_name: key_name.into(),
			first_tool_only: false,
		}
	}

	#[must_use]
	pub const fn with_first_tool_only(mut self, value: bool) -> Self {
		self.first_tool_only = value;
		self
	}

	pub fn parse(&self, message: &ChatMessage) -> Result<Option<Value>> {
		if let Some(invalid) = message
			.invalid_tool_calls
			.iter()
			.find(|tc| tc.fn_name.as_deref() == Some(self.key_name.as_str()))
		{
			return Err(Error::OutputParse(format!(
				"Tool call '{}' has invalid arguments: {}",
				self.key_name, invalid.error
			)));
		}

		let mut matching = message
			.tool_calls
			.iter()
			.filter(|tc| tc.fn_name == self.key_name)
			.map(|tc| tc.fn_arguments.clone());

		if self.first_tool_only {
			Ok(matching.next())
		} else {
			Ok(Some(Value::Array(matching.collect())))
		}
	}
}

// endregion: --- JsonOutputKeyToolsParser

// region:    --- TypedToolsParser

/// Parses the first tool call named `key_name` into `T`.
///
/// No matching call gives `Ok(None)`. Arguments that do not deserialize into `T`
/// are an `OutputParse` error.
#[derive(Debug, Clone)]
pub struct TypedToolsParser<T> {
	inner: JsonOutputKeyToolsParser,
	_marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> TypedToolsParser<T> {
	pub fn new(key_name: impl Into<String>) -> Self {
		Self {
			inner: JsonOutputKeyToolsParser::new(key_name).with_first_tool_only(true),
			_marker: PhantomData,
		}
	}

	pub fn key_name(&self) -> &str {
		&self.inner.key_name
	}

	pub fn parse(&self, message: &ChatMessage) -> Result<Option<T>> {
		let Some(arguments) = self.inner.parse(message)? else {
			return Ok(None);
		};

		serde_json::from_value(arguments)
			.map(Some)
			.map_err(|err| Error::OutputParse(format!("Failed to parse '{}' arguments: {err}", self.key_name())))
	}
}

// endregion: --- TypedToolsParser

// region:    --- Tests

#[cfg(test)]
mod tests {
	type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>; // For tests.

	use super::*;
	use crate::chat::{InvalidToolCall, ToolCall};
	use serde::Deserialize;
	use serde_json::json;

	#[derive(Debug, Deserialize, PartialEq)]
	struct Weather {
		city: String,
		unit: Option<String>,
	}

	fn call(name: &str, args: Value) -> ToolCall {
		ToolCall {
			call_id: format!("call_{name}"),
			fn_name: name.to_string(),
			fn_arguments: args,
		}
	}

	#[test]
	fn test_key_parser_first_tool_only() -> Result<()> {
		// -- Setup & Fixtures
		let message = ChatMessage::assistant_tool_calls(vec![
			call("other", json!({"x": 1})),
			call("weather", json!({"city": "Paris"})),
			call("weather", json!({"city": "Lyon"})),
		]);
		let parser = JsonOutputKeyToolsParser::new("weather").with_first_tool_only(true);

		// -- Exec
		let parsed = parser.parse(&message)?;

		// -- Check
		assert_eq!(parsed, Some(json!({"city": "Paris"})));

		Ok(())
	}

	#[test]
	fn test_key_parser_all_matching() -> Result<()> {
		let message = ChatMessage::assistant_tool_calls(vec![
			call("weather", json!({"city": "Paris"})),
			call("weather", json!({"city": "Lyon"})),
		]);

		let parsed = JsonOutputKeyToolsParser::new("weather").parse(&message)?;

		assert_eq!(parsed, Some(json!([{"city": "Paris"}, {"city": "Lyon"}])));

		Ok(())
	}

	#[test]
	fn test_key_parser_no_match_is_none() -> Result<()> {
		let message = ChatMessage::assistant("It is sunny.");

		let parsed = JsonOutputKeyToolsParser::new("weather").with_first_tool_only(true).parse(&message)?;

		assert_eq!(parsed, None);

		Ok(())
	}

	#[test]
	fn test_key_parser_invalid_arguments_fail() -> Result<()> {
		let mut message = ChatMessage::assistant("");
		message.invalid_tool_calls.push(InvalidToolCall {
			call_id: Some("call_1".to_string()),
			fn_name: Some("weather".to_string()),
			raw_arguments: Some("{city:".to_string()),
			error: "Function arguments are not valid JSON".to_string(),
		});

		let res = JsonOutputKeyToolsParser::new("weather").parse(&message);

		assert!(matches!(res, Err(Error::OutputParse(_))));

		Ok(())
	}

	#[test]
	fn test_typed_parser_ok_and_mismatch() -> Result<()> {
		let parser = TypedToolsParser::<Weather>::new("weather");

		let ok = ChatMessage::assistant_tool_calls(vec![call("weather", json!({"city": "Paris", "unit": "C"}))]);
		assert_eq!(
			parser.parse(&ok)?,
			Some(Weather {
				city: "Paris".to_string(),
				unit: Some("C".to_string())
			})
		);

		let bad = ChatMessage::assistant_tool_calls(vec![call("weather", json!({"town": "Paris"}))]);
		assert!(matches!(parser.parse(&bad), Err(Error::OutputParse(_))));

		Ok(())
	}
}

// endregion: --- Tests
