//! The process-wide llama.cpp backend, initialized once and never freed.

use std::sync::{Mutex, OnceLock};

use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::{LogOptions, send_logs_to_tracing};

use crate::{Error, Result};

static BACKEND: OnceLock<LlamaBackend> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Returns the backend, initializing it on first use.
///
/// Native logs are routed to `tracing` when the first initialization is `verbose`.
pub(super) fn backend(verbose: bool) -> Result<&'static LlamaBackend> {
	if let Some(backend) = BACKEND.get() {
		return Ok(backend);
	}

	let _guard = INIT_LOCK
		.lock()
		.map_err(|err| Error::Session(format!("llama backend init lock poisoned: {err}")))?;
	if let Some(backend) = BACKEND.get() {
		return Ok(backend);
	}

	send_logs_to_tracing(LogOptions::default().with_logs_enabled(verbose));

	let backend =
		LlamaBackend::init().map_err(|err| Error::Session(format!("Failed to initialize llama backend: {err}")))?;
	tracing::debug!("llama backend initialized");

	Ok(BACKEND.get_or_init(|| backend))
}
