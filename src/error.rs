//! Bridge error types.
//!
//! Only `NativeFault` is terminal. Everything else is local to the call that
//! produced it and leaves the session usable.

use serde::Serialize;
use thiserror::Error;

use crate::handles::HandleError;
use crate::types::{RuntimeInitError, RuntimeViewError};

/// Failure outcome of a boundary operation.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum BridgeError {
    #[error("Native engine fault, recovery is not possible")]
    NativeFault,

    #[error("Runtime initialization failed: {0}")]
    Init(RuntimeInitError),

    #[error("View unavailable: {0}")]
    View(RuntimeViewError),

    #[error("Invalid handle: {0}")]
    InvalidHandle(#[from] HandleError),
}

impl BridgeError {
    /// Returns true if the session can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NativeFault)
    }

    /// Returns true if the error stems from host misuse of handles.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidHandle(_))
    }
}

/// Result of every boundary operation.
pub type BridgeResult<T> = Result<T, BridgeError>;
