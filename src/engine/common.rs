// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Provides the unified result alias and the codec panic policy.

use crate::error::EngineError;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Unified Result type for every engine module.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Run codec or pixel code, turning a panic into `InternalPanic`.
///
/// Native codec bindings occasionally panic on hostile input; a panic must
/// never take down the caller's thread, only fail the current request.
pub fn run_with_panic_policy<T, F>(label: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(EngineError::internal_panic(format!(
            "{label}: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

/// Best-effort extraction of a panic payload's message.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
