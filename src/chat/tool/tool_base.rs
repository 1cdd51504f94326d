use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A function tool in its normalized form.
///
/// Serialized for the native session with `to_function_value()`:
/// `{"type": "function", "function": {"name", "description", "parameters"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
	/// The tool name, which is the function name the model emits in its tool calls.
	pub name: String,

	/// The description of the tool, given to the model to decide when to call it.
	pub description: Option<String>,

	/// JSON schema of the function arguments.
	/// `None` means the function takes no arguments.
	pub schema: Option<Value>,
}

/// Constructors
impl Tool {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			description: None,
			schema: None,
		}
	}
}

/// Chainable setters
impl Tool {
	#[must_use]
	pub fn with_description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}

	#[must_use]
	pub fn with_schema(mut self, parameters: Value) -> Self {
		self.schema = Some(parameters);
		self
	}
}

/// Getters
impl Tool {
	/// The arguments schema, or an empty object schema when the tool has none.
	pub fn parameters(&self) -> Value {
		self.schema
			.clone()
			.unwrap_or_else(|| json!({"type": "object", "properties": {}}))
	}

	/// The function-calling shape expected by the native session.
	pub fn to_function_value(&self) -> Value {
		let mut function = serde_json::Map::new();
		function.insert("name".to_string(), Value::String(self.name.clone()));
		if let Some(description) = &self.description {
			function.insert("description".to_string(), Value::String(description.clone()));
		}
		function.insert("parameters".to_string(), self.parameters());

		json!({
			"type": "function",
			"function": function,
		})
	}

	/// The forced tool-choice dictionary naming this tool.
	pub fn to_forced_choice(&self) -> Value {
		json!({
			"type": "function",
			"function": {"name": self.name},
		})
	}
}

// region:    --- Tests


// endregion: --- Tests
