use serde::de::DeserializeOwned;

use crate::adapter::RunnableBinding;
use crate::chat::{
	ChatMessage, ChatOptions, ChatOptionsSet, ChatResult, ChatStream, ToolChoice, ToolSpec, convert_to_function_tool,
};
use crate::output::{StructuredOutputRequest, StructuredOutputRunnable, TypedToolsParser};
use crate::{Error, Result};

/// The chat-model contract: role-tagged messages in, chat results or chunk streams out.
///
/// Implementations take `&mut self` for generation, so at most one generation runs per
/// model at a time.
pub trait ChatModel {
	/// Short identifier of the underlying model family/library.
	fn llm_type(&self) -> &'static str;

	/// Full-response generation.
	///
	/// `stop`, when given, replaces the configured stop sequences for this call.
	fn chat(
		&mut self,
		messages: &[ChatMessage],
		stop: Option<&[String]>,
		options_set: ChatOptionsSet<'_, '_>,
	) -> Result<ChatResult>;

	/// Incremental generation. The returned stream is lazy and not restartable.
	fn chat_stream(
		&mut self,
		messages: &[ChatMessage],
		stop: Option<&[String]>,
		options_set: ChatOptionsSet<'_, '_>,
	) -> Result<ChatStream<'_>>;

	/// Generates and returns the message of the first generation.
	fn invoke(&mut self, messages: &[ChatMessage], options_set: ChatOptionsSet<'_, '_>) -> Result<ChatMessage> {
		self.chat(messages, None, options_set)?
			.into_first_message()
			.ok_or_else(|| Error::NativeResponse("generation returned no choices".to_string()))
	}

	/// Binds tool-like inputs (and an optional tool choice) to every call made through
	/// the returned binding.
	///
	/// The tools are normalized to the function-calling shape, and the tool choice is
	/// validated against them.
	fn bind_tools(
		&mut self,
		tools: Vec<ToolSpec>,
		tool_choice: Option<ToolChoice>,
	) -> Result<RunnableBinding<'_, Self>>
	where
		Self: Sized,
	{
		let formatted_tools = tools.iter().map(convert_to_function_tool).collect::<Result<Vec<_>>>()?;

		let tool_choice = match tool_choice {
			Some(tool_choice) => tool_choice.resolve(&formatted_tools)?,
			None => None,
		};

		tracing::debug!(
			"binding {} tool(s), forced choice: {:?}",
			formatted_tools.len(),
			tool_choice.as_ref().and_then(|c| c.pointer("/function/name"))
		);

		let options = ChatOptions::default()
			.with_tools(formatted_tools)
			.with_tool_choice(tool_choice);

		Ok(RunnableBinding::new(self, options))
	}

	/// Returns a pipeline that forces one tool derived from the request schema and parses
	/// its arguments into `T` (use `serde_json::Value` for dictionary schemas).
	fn with_structured_output<T: DeserializeOwned>(
		&mut self,
		request: StructuredOutputRequest,
	) -> Result<StructuredOutputRunnable<'_, Self, T>>
	where
		Self: Sized,
	{
		let StructuredOutputRequest {
			schema,
			include_raw,
			extra_args,
		} = request;

		if !extra_args.is_empty() {
			return Err(Error::UnsupportedArgument(format!(
				"{:?}",
				extra_args.keys().collect::<Vec<_>>()
			)));
		}

		let schema = schema.ok_or_else(|| {
			Error::Schema("schema must be specified when method is 'function_calling'. Received None.".to_string())
		})?;

		let tool_spec: ToolSpec = schema.into();
		let tool = convert_to_function_tool(&tool_spec)?;
		let parser = TypedToolsParser::new(tool.name.clone());

		let binding = self.bind_tools(vec![ToolSpec::Tool(tool)], Some(ToolChoice::Required(true)))?;

		Ok(StructuredOutputRunnable::new(binding, parser, include_raw))
	}
}
