//! Runtime initialization and simulation result types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parameters for engine runtime initialization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuntimeInitParams {
    /// DLC version to simulate (0 = none).
    #[serde(default)]
    pub dlc: u32,
    /// Program start address, hex encoded.
    #[serde(default)]
    pub program_start: Option<String>,
    #[serde(default)]
    pub stack_size: Option<u32>,
    #[serde(default)]
    pub heap_free_size: Option<u32>,
}

/// Successful runtime initialization summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeInitOutput {
    pub game_version: String,
}

/// Initialization failures. These never poison the session: the host may
/// retry initialization with different input.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RuntimeInitError {
    #[error("malformed custom image: {0}")]
    BadImage(String),
    #[error("unsupported DLC version: {0}")]
    InvalidDlcVersion(u32),
    #[error("invalid program start: {0}")]
    InvalidProgramStart(String),
    #[error("invalid stack size: {0}")]
    InvalidStackSize(u32),
    #[error("invalid heap free size: {0}")]
    InvalidHeapFreeSize(u32),
    #[error("executor setup failed: {0}")]
    Executor(String),
}

/// Diagnostics produced by the simulator for a script step.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RuntimeError {
    #[error("game crashed")]
    Crash,
    #[error("item not found: {0}")]
    ItemNotFound(String),
    #[error("inventory is full")]
    PouchFull,
    #[error("not on the right screen: {0}")]
    InvalidScreen(String),
    #[error("not implemented: {0}")]
    Unimplemented(String),
}

/// Outcome of an abortable engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum MaybeAborted<T> {
    Ok(T),
    Aborted,
}

impl<T> MaybeAborted<T> {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> MaybeAborted<U> {
        match self {
            Self::Ok(v) => MaybeAborted::Ok(f(v)),
            Self::Aborted => MaybeAborted::Aborted,
        }
    }
}
