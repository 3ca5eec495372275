//! The engine side of the boundary.
//!
//! [`NativeEngine`] is the contract a sandboxed engine implements: one
//! method per entry point, raw integer handles, and an outer `Result` whose
//! `Err` means the call threw. A thrown error is never a recoverable
//! condition; recoverable outcomes (init errors, view errors, diagnostics)
//! travel as data inside `Ok`.
//!
//! Engine obligations beyond the signatures:
//! - await [`ProgressSink::notify`] before continuing a run;
//! - poll its task handle at each checkpoint and return
//!   [`MaybeAborted::Aborted`] once the task was aborted;
//! - call the [`FaultHook`] registered through
//!   [`NativeEngine::register_fault_hook`] when it enters an unrecoverable
//!   state by any path other than an error return.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::guard::FaultHook;
use crate::types::{
    ErrorReport, GdtInventory, ItemSearchResult, MaybeAborted, OverworldItems, ParserError,
    PouchList, RuntimeError, RuntimeInitError, RuntimeInitOutput, RuntimeInitParams,
    RuntimeViewError,
};

/// Engine-side handle. The bits are the engine's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawHandle(pub u32);

impl RawHandle {
    pub const NULL: RawHandle = RawHandle(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// A boundary call threw.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct NativeError {
    pub message: String,
}

impl NativeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

pub type NativeResult<T> = Result<T, NativeError>;

/// Resolves quoted item names while a script is parsed.
#[async_trait]
pub trait ItemResolver: Send + Sync {
    async fn resolve_quoted(&self, query: &str) -> Option<ItemSearchResult>;
}

/// Receives run progress from the engine.
#[async_trait]
pub trait ProgressSink: Send {
    /// `up_to_byte_pos` is the script position simulated so far. `output` is
    /// an intermediate run output that stays valid only until this call
    /// returns.
    async fn notify(&mut self, up_to_byte_pos: u32, output: RawHandle);
}

#[async_trait]
pub trait NativeEngine: Send + Sync {
    /// Register the out-of-band fault edge. Called once, before any other call.
    fn register_fault_hook(&self, hook: FaultHook);

    async fn module_init(&self) -> NativeResult<()>;

    async fn init_runtime(
        &self,
        custom_image: Option<Vec<u8>>,
        params: Option<RuntimeInitParams>,
    ) -> NativeResult<Result<RuntimeInitOutput, RuntimeInitError>>;

    async fn resolve_item_ident(&self, query: &str) -> NativeResult<Vec<ItemSearchResult>>;

    async fn parse_script(
        &self,
        script: &str,
        resolver: Arc<dyn ItemResolver>,
    ) -> NativeResult<RawHandle>;

    async fn parse_script_semantic(
        &self,
        script: &str,
        start: u32,
        end: u32,
    ) -> NativeResult<Vec<u32>>;

    async fn get_parser_errors(
        &self,
        parse: RawHandle,
    ) -> NativeResult<Vec<ErrorReport<ParserError>>>;

    async fn get_step_count(&self, parse: RawHandle) -> NativeResult<u32>;

    async fn get_step_from_pos(&self, parse: RawHandle, byte_pos: u32) -> NativeResult<u32>;

    async fn get_step_byte_positions(&self, parse: RawHandle) -> NativeResult<Vec<u32>>;

    async fn make_task_handle(&self) -> NativeResult<RawHandle>;

    async fn abort_task(&self, task: RawHandle) -> NativeResult<()>;

    async fn run_parsed(
        &self,
        parse: RawHandle,
        task: RawHandle,
        progress: &mut dyn ProgressSink,
    ) -> NativeResult<MaybeAborted<RawHandle>>;

    async fn get_run_errors(&self, run: RawHandle)
        -> NativeResult<Vec<ErrorReport<RuntimeError>>>;

    async fn get_pouch_list(
        &self,
        run: RawHandle,
        parse: RawHandle,
        byte_pos: u32,
    ) -> NativeResult<Result<PouchList, RuntimeViewError>>;

    async fn get_gdt_inventory(
        &self,
        run: RawHandle,
        parse: RawHandle,
        byte_pos: u32,
    ) -> NativeResult<Result<GdtInventory, RuntimeViewError>>;

    async fn get_overworld_items(
        &self,
        run: RawHandle,
        parse: RawHandle,
        byte_pos: u32,
    ) -> NativeResult<Result<OverworldItems, RuntimeViewError>>;

    async fn get_crash_info(
        &self,
        run: RawHandle,
        parse: RawHandle,
        byte_pos: u32,
    ) -> NativeResult<String>;

    async fn get_save_names(
        &self,
        run: RawHandle,
        parse: RawHandle,
        byte_pos: u32,
    ) -> NativeResult<Vec<String>>;

    /// `name` of None selects the manual save.
    async fn get_save_inventory(
        &self,
        run: RawHandle,
        parse: RawHandle,
        byte_pos: u32,
        name: Option<&str>,
    ) -> NativeResult<Result<GdtInventory, RuntimeViewError>>;

    async fn free_task_handle(&self, task: RawHandle) -> NativeResult<()>;

    async fn free_parse_output(&self, parse: RawHandle) -> NativeResult<()>;

    async fn free_run_output(&self, run: RawHandle) -> NativeResult<()>;
}
