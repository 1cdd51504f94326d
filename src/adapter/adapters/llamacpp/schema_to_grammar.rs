//! JSON Schema to GBNF Grammar Conversion
//!
//! Converts the JSON schema of a tool's arguments (or of a structured output) into a
//! GBNF grammar, for constrained generation with llama.cpp.
//!
//! Supported: `type` object/array/string/number/integer/boolean/null (or a list of them),
//! `properties`, `required`, `items`, `enum`, `const`, `anyOf`, `oneOf`.
//! Anything else accepts any JSON value.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};

use crate::{Error, Result};

const WS: &str = "ws";
const JSON_VALUE: &str = "json-value";
const JSON_STRING: &str = "json-string";

/// Converts a JSON schema to a GBNF grammar whose `root` rule matches the schema.
pub fn schema_to_gbnf(schema: &Value) -> Result<String> {
	let mut converter = GrammarConverter::default();
	let root_ref = converter.convert_value(schema, "root")?;
	if root_ref != "root" {
		converter.rules.insert("root".to_string(), root_ref);
	}
	Ok(converter.build_grammar())
}

#[derive(Default)]
struct GrammarConverter {
	/// rule name -> rule body
	rules: BTreeMap<String, String>,
	/// Rule name prefixes already handed out by `unique_name`.
	reserved: HashSet<String>,
}

impl GrammarConverter {
	/// Returns the rule reference matching `value`, adding the rules it needs.
	fn convert_value(&mut self, value: &Value, rule_name: &str) -> Result<String> {
		match value {
			Value::Bool(true) => Ok(self.json_value_ref()),
			Value::Object(obj) if obj.is_empty() => Ok(self.json_value_ref()),
			Value::Object(obj) => self.convert_object(obj, rule_name),
			other => Err(Error::Grammar(format!("Unsupported schema node: {other}"))),
		}
	}

	fn convert_object(&mut self, obj: &Map<String, Value>, rule_name: &str) -> Result<String> {
		if let Some(Value::Array(values)) = obj.get("enum") {
			let choices: Vec<String> = values.iter().map(json_literal).collect();
			return Ok(self.add_rule(rule_name, choices.join(" | ")));
		}
		if let Some(value) = obj.get("const") {
			return Ok(self.add_rule(rule_name, json_literal(value)));
		}

		if let Some(Value::Array(alternatives)) = obj.get("anyOf").or_else(|| obj.get("oneOf")) {
			return self.convert_alternatives(alternatives.iter().cloned().enumerate(), rule_name);
		}

		let schema_type = match obj.get("type") {
			Some(Value::String(schema_type)) => schema_type.as_str(),
			// e.g. `["string", "null"]`: one alternative per listed type.
			Some(Value::Array(types)) => {
				let mut alternatives = Vec::with_capacity(types.len());
				for schema_type in types {
					let Value::String(name) = schema_type else {
						return Err(Error::Grammar(format!("Unsupported schema type: {schema_type}")));
					};
					let mut alternative = obj.clone();
					alternative.insert("type".to_string(), schema_type.clone());
					alternatives.push((sanitize_name(name), Value::Object(alternative)));
				}
				return self.convert_alternatives(alternatives, rule_name);
			}
			Some(other) => return Err(Error::Grammar(format!("Unsupported schema type: {other}"))),
			None if obj.contains_key("properties") => "object",
			None => return Ok(self.json_value_ref()),
		};

		match schema_type {
			"object" => self.convert_object_type(obj, rule_name),
			"array" => self.convert_array_type(obj, rule_name),
			"string" => Ok(self.json_string_ref()),
			"number" => Ok(self.add_rule(rule_name, number_body(true))),
			"integer" => Ok(self.add_rule(rule_name, number_body(false))),
			"boolean" => Ok(self.add_rule(rule_name, r#""true" | "false""#.to_string())),
			"null" => Ok(self.add_rule(rule_name, r#""null""#.to_string())),
			other => Err(Error::Grammar(format!("Unsupported schema type: {other}"))),
		}
	}

	/// Converts each `(suffix, schema)` alternative and joins the results with `|`.
	fn convert_alternatives<S: std::fmt::Display>(
		&mut self,
		alternatives: impl IntoIterator<Item = (S, Value)>,
		rule_name: &str,
	) -> Result<String> {
		let mut refs: Vec<String> = Vec::new();
		for (suffix, schema) in alternatives {
			let alt_name = self.unique_name(&format!("{rule_name}-{suffix}"));
			let alt_ref = self.convert_value(&schema, &alt_name)?;
			if !refs.contains(&alt_ref) {
				refs.push(alt_ref);
			}
		}
		if refs.is_empty() {
			return Err(Error::Grammar(format!("Empty alternatives for rule '{rule_name}'")));
		}
		Ok(self.add_rule(rule_name, refs.join(" | ")))
	}

	fn convert_object_type(&mut self, obj: &Map<String, Value>, rule_name: &str) -> Result<String> {
		let Some(Value::Object(properties)) = obj.get("properties") else {
			// No declared properties: any JSON object.
			let json_value = self.json_value_ref();
			let body = format!(
				r#""{{" {WS} ( {JSON_STRING} {WS} ":" {WS} {json_value} ( {WS} "," {WS} {JSON_STRING} {WS} ":" {WS} {json_value} )* )? {WS} "}}""#
			);
			return Ok(self.add_rule(rule_name, body));
		};

		let required: Vec<&str> = match obj.get("required") {
			Some(Value::Array(required)) => required.iter().filter_map(Value::as_str).collect(),
			_ => Vec::new(),
		};

		let mut required_props = Vec::new();
		let mut optional_props = Vec::new();

		for (prop_name, prop_schema) in properties {
			let prop_rule_name = self.unique_name(&format!("{rule_name}-{}", sanitize_name(prop_name)));
			let value_ref = self.convert_value(prop_schema, &format!("{prop_rule_name}-value"))?;
			let kv_body = format!(r#"{} {WS} ":" {WS} {value_ref}"#, json_literal(&Value::String(prop_name.clone())));
			let kv_ref = self.add_rule(&format!("{prop_rule_name}-kv"), kv_body);

			if required.contains(&prop_name.as_str()) {
				required_props.push(kv_ref);
			} else {
				optional_props.push(kv_ref);
			}
		}

		let mut body = format!(r#""{{" {WS}"#);
		if !required_props.is_empty() {
			body.push(' ');
			body.push_str(&required_props.join(&format!(r#" {WS} "," {WS} "#)));
			for optional in &optional_props {
				body.push_str(&format!(r#" ( {WS} "," {WS} {optional} )?"#));
			}
		} else if !optional_props.is_empty() {
			let any_optional = optional_props.join(" | ");
			body.push_str(&format!(
				r#" ( ( {any_optional} ) ( {WS} "," {WS} ( {any_optional} ) )* )?"#
			));
		}
		body.push_str(&format!(r#" {WS} "}}""#));

		Ok(self.add_rule(rule_name, body))
	}

	fn convert_array_type(&mut self, obj: &Map<String, Value>, rule_name: &str) -> Result<String> {
		let items_ref = match obj.get("items") {
			Some(items_schema) => self.convert_value(items_schema, &format!("{rule_name}-item"))?,
			None => self.json_value_ref(),
		};

		let body = format!(r#""[" {WS} ( {items_ref} ( {WS} "," {WS} {items_ref} )* )? {WS} "]""#);
		Ok(self.add_rule(rule_name, body))
	}

	/// Reserves `base`, or `base-2`, `base-3`, ... when it is already taken.
	/// Distinct property names can sanitize to the same base (`a_b` and `a-b`).
	fn unique_name(&mut self, base: &str) -> String {
		let mut name = base.to_string();
		let mut counter = 2;
		while self.reserved.contains(&name) || self.rules.contains_key(&name) {
			name = format!("{base}-{counter}");
			counter += 1;
		}
		self.reserved.insert(name.clone());
		name
	}

	fn add_rule(&mut self, rule_name: &str, body: String) -> String {
		self.rules.insert(rule_name.to_string(), body);
		rule_name.to_string()
	}

	fn json_string_ref(&mut self) -> String {
		self.rules.entry(JSON_STRING.to_string()).or_insert_with(|| {
			r#""\"" ( [^"\\] | "\\" ( ["\\/bfnrt] | "u" [0-9a-fA-F] [0-9a-fA-F] [0-9a-fA-F] [0-9a-fA-F] ) )* "\"""#
				.to_string()
		});
		JSON_STRING.to_string()
	}

	fn json_value_ref(&mut self) -> String {
		if !self.rules.contains_key(JSON_VALUE) {
			self.json_string_ref();
			self.rules.insert(
				JSON_VALUE.to_string(),
				format!(r#"json-object | json-array | {JSON_STRING} | json-number | "true" | "false" | "null""#),
			);
			self.rules.insert(
				"json-object".to_string(),
				format!(
					r#""{{" {WS} ( {JSON_STRING} {WS} ":" {WS} {JSON_VALUE} ( {WS} "," {WS} {JSON_STRING} {WS} ":" {WS} {JSON_VALUE} )* )? {WS} "}}""#
				),
			);
			self.rules.insert(
				"json-array".to_string(),
				format!(r#""[" {WS} ( {JSON_VALUE} ( {WS} "," {WS} {JSON_VALUE} )* )? {WS} "]""#),
			);
			self.rules.insert("json-number".to_string(), number_body(true));
		}
		JSON_VALUE.to_string()
	}

	fn build_grammar(&self) -> String {
		let mut grammar = String::new();

		// Root rule first
		if let Some(root_body) = self.rules.get("root") {
			grammar.push_str(&format!("root ::= {root_body}\n"));
		}

		for (name, body) in &self.rules {
			if name != "root" {
				grammar.push_str(&format!("{name} ::= {body}\n"));
			}
		}

		grammar.push_str(&format!("{WS} ::= [ \\t\\n]*\n"));

		grammar
	}
}

fn number_body(fractional: bool) -> String {
	let integer = r#""-"? ( [0-9] | [1-9] [0-9]* )"#;
	if fractional {
		format!(r#"{integer} ( "." [0-9]+ )? ( [eE] [-+]? [0-9]+ )?"#)
	} else {
		integer.to_string()
	}
}

/// A GBNF literal matching the compact JSON text of `value`.
fn json_literal(value: &Value) -> String {
	let json = value.to_string();
	let mut literal = String::with_capacity(json.len() + 2);
	literal.push('"');
	for c in json.chars() {
		match c {
			'"' => literal.push_str("\\\""),
			'\\' => literal.push_str("\\\\"),
			'\n' => literal.push_str("\\n"),
			'\r' => literal.push_str("\\r"),
			'\t' => literal.push_str("\\t"),
			c => literal.push(c),
		}
	}
	literal.push('"');
	literal
}

/// GBNF rule names allow only alphanumerics and dashes.
fn sanitize_name(name: &str) -> String {
	name.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '-' }).collect()
}

// region:    --- Tests


// endregion: --- Tests
