//! Tool-like inputs and their normalization into a `Tool`.

use derive_more::From;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::chat::Tool;
use crate::{Error, Result};

// region:    --- ToolSchema

/// A typed argument schema: the Rust type the arguments deserialize into,
/// with the name, description, and JSON schema to present to the model.
///
/// Deserializing the arguments into `Self` is what validates them.
pub trait ToolSchema: DeserializeOwned {
	fn tool_name() -> String;

	fn tool_description() -> Option<String> {
		None
	}

	/// JSON schema of the object `Self` deserializes from.
	fn parameters() -> Value;
}

/// The erased description of a `ToolSchema` type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedSchema {
	pub name: String,
	pub description: Option<String>,
	pub parameters: Value,
}

impl TypedSchema {
	pub fn of<T: ToolSchema>() -> Self {
		Self {
			name: T::tool_name(),
			description: T::tool_description(),
			parameters: T::parameters(),
		}
	}
}

// endregion: --- ToolSchema

// region:    --- FunctionSignature

/// The introspected signature of a callable offered as a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
	pub name: String,
	pub description: Option<String>,
	pub params: Vec<FunctionParam>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionParam {
	pub name: String,
	/// JSON schema type name (e.g., "string", "integer", "number", "boolean", "array", "object").
	pub json_type: String,
	pub description: Option<String>,
	pub required: bool,
}

impl FunctionSignature {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			description: None,
			params: Vec::new(),
		}
	}

	#[must_use]
	pub fn with_description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}

	#[must_use]
	pub fn with_param(mut self, param: FunctionParam) -> Self {
		self.params.push(param);
		self
	}
}

impl FunctionParam {
	pub fn required(name: impl Into<String>, json_type: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			json_type: json_type.into(),
			description: None,
			required: true,
		}
	}

	pub fn optional(name: impl Into<String>, json_type: impl Into<String>) -> Self {
		Self {
			required: false,
			..Self::required(name, json_type)
		}
	}

	#[must_use]
	pub fn with_description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}
}

// endregion: --- FunctionSignature

// region:    --- ToolSpec

/// Any tool-like input accepted by `bind_tools`.
#[derive(Debug, Clone, From)]
pub enum ToolSpec {
	/// A dictionary schema: canonical `{type: "function", function: {..}}`,
	/// a bare function object (`name` + `parameters`), or a JSON schema with a `title`.
	Json(Value),
	/// A typed schema (see `ToolSchema`).
	Typed(TypedSchema),
	/// A described callable.
	Function(FunctionSignature),
	/// An already normalized tool.
	Tool(Tool),
}

impl ToolSpec {
	pub fn typed<T: ToolSchema>() -> Self {
		Self::Typed(TypedSchema::of::<T>())
	}
}

/// Normalizes any tool-like input into a `Tool`.
pub fn convert_to_function_tool(spec: &ToolSpec) -> Result<Tool> {
	match spec {
		ToolSpec::Json(value) => json_to_tool(value),
		ToolSpec::Typed(typed) => Ok(Tool {
			name: typed.name.clone(),
			description: typed.description.clone(),
			schema: Some(typed.parameters.clone()),
		}),
		ToolSpec::Function(signature) => Ok(signature_to_tool(signature)),
		ToolSpec::Tool(tool) => Ok(tool.clone()),
	}
}

fn json_to_tool(value: &Value) -> Result<Tool> {
	let Some(obj) = value.as_object() else {
		return Err(Error::ToolConversion(format!("expected an object schema, got: {value}")));
	};

	// -- Canonical form
	if obj.get("type").and_then(Value::as_str) == Some("function")
		&& let Some(function) = obj.get("function").and_then(Value::as_object)
	{
		return function_object_to_tool(function);
	}

	// -- Bare function object
	if obj.contains_key("name") && (obj.contains_key("parameters") || obj.contains_key("description")) {
		return function_object_to_tool(obj);
	}

	// -- JSON schema with a title
	if let Some(title) = obj.get("title").and_then(Value::as_str) {
		let description = obj.get("description").and_then(Value::as_str).map(String::from);
		let mut parameters = obj.clone();
		parameters.remove("title");
		parameters.remove("description");
		return Ok(Tool {
			name: title.to_string(),
			description,
			schema: Some(Value::Object(parameters)),
		});
	}

	Err(Error::ToolConversion(format!(
		"expected a function object or a JSON schema with a 'title', got: {value}"
	)))
}

fn function_object_to_tool(function: &Map<String, Value>) -> Result<Tool> {
	let name = function
		.get("name")
		.and_then(Value::as_str)
		.ok_or_else(|| Error::ToolConversion("function object has no string 'name'".to_string()))?;

	Ok(Tool {
		name: name.to_string(),
		description: function.get("description").and_then(Value::as_str).map(String::from),
		schema: function.get("parameters").cloned(),
	})
}

fn signature_to_tool(signature: &FunctionSignature) -> Tool {
	let mut properties = Map::new();
	let mut required = Vec::new();

	for param in &signature.params {
		let mut prop = Map::new();
		prop.insert("type".to_string(), Value::String(param.json_type.clone()));
		if let Some(description) = &param.description {
			prop.insert("description".to_string(), Value::String(description.clone()));
		}
		properties.insert(param.name.clone(), Value::Object(prop));
		if param.required {
			required.push(Value::String(param.name.clone()));
		}
	}

	Tool {
		name: signature.name.clone(),
		description: signature.description.clone(),
		schema: Some(json!({
			"type": "object",
			"properties": properties,
			"required": required,
		})),
	}
}

// endregion: --- ToolSpec

// region:    --- Tests

#[cfg(test)]
mod tests {
	type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>; // For tests.

	use super::*;
	use serde::Deserialize;

	#[allow(unused)]
	#[derive(Deserialize)]
	struct Answer {
		answer: String,
	}

	impl ToolSchema for Answer {
		fn tool_name() -> String {
			"Answer".to_string()
		}

		fn tool_description() -> Option<String> {
			Some("An answer to the user question".to_string())
		}

		fn parameters() -> Value {
			json!({"type": "object", "properties": {"answer": {"type": "string"}}, "required": ["answer"]})
		}
	}

	#[test]
	fn test_convert_canonical_json() -> Result<()> {
		// -- Setup & Fixtures
		let spec = ToolSpec::from(json!({
			"type": "function",
			"function": {"name": "get_weather", "description": "Weather", "parameters": {"type": "object"}}
		}));

		// -- Exec
		let tool = convert_to_function_tool(&spec)?;

		// -- Check
		assert_eq!(tool.name, "get_weather");
		assert_eq!(tool.description.as_deref(), Some("Weather"));
		assert_eq!(tool.schema, Some(json!({"type": "object"})));

		Ok(())
	}

	#[test]
	fn test_convert_bare_function_object() -> Result<()> {
		let spec = ToolSpec::from(json!({"name": "lookup", "parameters": {"type": "object", "properties": {}}}));

		let tool = convert_to_function_tool(&spec)?;

		assert_eq!(tool.name, "lookup");
		assert!(tool.description.is_none());

		Ok(())
	}

	#[test]
	fn test_convert_titled_json_schema() -> Result<()> {
		let spec = ToolSpec::from(json!({
			"title": "Person",
			"description": "A person record",
			"type": "object",
			"properties": {"name": {"type": "string"}}
		}));

		let tool = convert_to_function_tool(&spec)?;

		assert_eq!(tool.name, "Person");
		assert_eq!(tool.description.as_deref(), Some("A person record"));
		let schema = tool.schema.ok_or("should have schema")?;
		assert!(schema.get("title").is_none());
		assert_eq!(schema["properties"]["name"]["type"], "string");

		Ok(())
	}

	#[test]
	fn test_convert_untitled_json_schema_fails() -> Result<()> {
		let spec = ToolSpec::from(json!({"type": "object", "properties": {}}));

		let res = convert_to_function_tool(&spec);

		assert!(matches!(res, Err(Error::ToolConversion(_))));

		Ok(())
	}

	#[test]
	fn test_convert_typed_schema() -> Result<()> {
		let tool = convert_to_function_tool(&ToolSpec::typed::<Answer>())?;

		assert_eq!(tool.name, "Answer");
		assert_eq!(tool.description.as_deref(), Some("An answer to the user question"));
		assert_eq!(tool.parameters()["required"], json!(["answer"]));

		Ok(())
	}

	#[test]
	fn test_convert_function_signature() -> Result<()> {
		let signature = FunctionSignature::new("add")
			.with_description("Adds two integers")
			.with_param(FunctionParam::required("a", "integer"))
			.with_param(FunctionParam::optional("b", "integer").with_description("Defaults to 0"));

		let tool = convert_to_function_tool(&signature.into())?;

		let params = tool.parameters();
		assert_eq!(params["properties"]["a"]["type"], "integer");
		assert_eq!(params["properties"]["b"]["description"], "Defaults to 0");
		assert_eq!(params["required"], json!(["a"]));

		Ok(())
	}
}

// endregion: --- Tests
