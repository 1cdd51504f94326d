use derive_more::{Display, From};
use std::path::PathBuf;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Display, From)]
pub enum Error {
	// -- Construction
	/// Bad or conflicting construction parameters, or the native library is not available.
	#[display("Configuration error: {_0}")]
	Configuration(String),

	#[display("Could not load Llama model from path: {}. Received error {cause}", model_path.display())]
	ModelLoad { model_path: PathBuf, cause: String },

	#[display("Grammar error: {_0}")]
	Grammar(String),

	// -- Tools
	#[display("Tool choice error: {_0}")]
	ToolChoice(String),

	#[display("Cannot convert to a function tool: {_0}")]
	ToolConversion(String),

	// -- Structured output
	#[display("Schema error: {_0}")]
	Schema(String),

	#[display("Received unsupported arguments {_0}")]
	UnsupportedArgument(String),

	#[display("Output parse error: {_0}")]
	OutputParse(String),

	// -- Generation
	#[display("Native session error: {_0}")]
	Session(String),

	#[display("Invalid native response: {_0}")]
	NativeResponse(String),

	#[display("Callback error: {_0}")]
	Callback(String),

	// -- Externals
	#[display("{_0}")]
	#[from]
	SerdeJson(serde_json::Error),

	#[display("{_0}")]
	#[from]
	Io(std::io::Error),
}

// region:    --- Error Boilerplate

impl std::error::Error for Error {}

// endregion: --- Error Boilerplate
