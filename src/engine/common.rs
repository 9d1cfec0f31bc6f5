// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Provides unified error handling and type aliases.

use crate::error::PostFxError;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// Result type for every fallible engine entry point.
pub type EngineResult<T> = std::result::Result<T, PostFxError>;

/// Run a codec call, converting a panic inside third-party code into
/// `PostFxError::InternalPanic` instead of unwinding through the caller.
pub fn run_with_panic_policy<T, F>(stage: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            error!(target: "postfx::engine", %stage, %message, "codec panicked");
            Err(PostFxError::internal_panic(format!("{stage}: {message}")))
        }
    }
}
