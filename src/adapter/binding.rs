use crate::Result;
use crate::adapter::ChatModel;
use crate::chat::{ChatMessage, ChatOptions, ChatOptionsSet, ChatResult, ChatStream};

/// A chat model with options bound to every call made through it
/// (e.g., the tools and tool choice set by `bind_tools`).
///
/// Call-level options still win over the bound ones, key by key.
pub struct RunnableBinding<'m, M: ChatModel + ?Sized> {
	model: &'m mut M,
	options: ChatOptions,
}

impl<'m, M: ChatModel + ?Sized> RunnableBinding<'m, M> {
	pub fn new(model: &'m mut M, options: ChatOptions) -> Self {
		Self { model, options }
	}

	/// The bound options.
	pub fn options(&self) -> &ChatOptions {
		&self.options
	}

	/// Layers more options on top of the bound ones.
	#[must_use]
	pub fn bind(mut self, options: ChatOptions) -> Self {
		let ChatOptions {
			temperature,
			max_tokens,
			top_p,
			top_k,
			repeat_penalty,
			logprobs,
			seed,
			tools,
			tool_choice,
			extra,
		} = options;

		let bound = &mut self.options;
		bound.temperature = temperature.or(bound.temperature);
		bound.max_tokens = max_tokens.or(bound.max_tokens);
		bound.top_p = top_p.or(bound.top_p);
		bound.top_k = top_k.or(bound.top_k);
		bound.repeat_penalty = repeat_penalty.or(bound.repeat_penalty);
		bound.logprobs = logprobs.or(bound.logprobs);
		bound.seed = seed.or(bound.seed);
		if !tools.is_empty() {
			bound.tools = tools;
		}
		if tool_choice.is_some() {
			bound.tool_choice = tool_choice;
		}
		bound.extra.extend(extra);

		self
	}

	pub fn generate(
		&mut self,
		messages: &[ChatMessage],
		stop: Option<&[String]>,
		options: Option<&ChatOptions>,
	) -> Result<ChatResult> {
		let options_set = ChatOptionsSet::default()
			.with_bound_options(Some(&self.options))
			.with_call_options(options);
		self.model.chat(messages, stop, options_set)
	}

	pub fn stream(
		&mut self,
		messages: &[ChatMessage],
		stop: Option<&[String]>,
		options: Option<&ChatOptions>,
	) -> Result<ChatStream<'_>> {
		let options_set = ChatOptionsSet::default()
			.with_bound_options(Some(&self.options))
			.with_call_options(options);
		self.model.chat_stream(messages, stop, options_set)
	}

	/// Generates and returns the message of the first generation.
	pub fn invoke(&mut self, messages: &[ChatMessage]) -> Result<ChatMessage> {
		let options_set = ChatOptionsSet::default().with_bound_options(Some(&self.options));
		self.model.invoke(messages, options_set)
	}
}
