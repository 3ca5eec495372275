//! The host-facing bridge.
//!
//! [`Bridge`] owns one engine session. Every operation goes through the
//! [`CallDispatcher`], so each returns a [`BridgeResult`] and none can
//! succeed once the session has faulted. Handles returned to the host are
//! registry tokens; raw engine handles never leave this module.
//!
//! Misusing handles (double free, use after free, a handle from another
//! bridge) is a host programming error. It is reported as
//! [`BridgeError::InvalidHandle`] and has no effect on the session.

use std::future::Future;
use std::sync::Arc;

use crate::config::BridgeConfig;
use crate::dispatch::{CallDispatcher, CallError};
use crate::error::{BridgeError, BridgeResult};
use crate::gate::ExecutionGate;
use crate::guard::{CrashNotifier, LogCrashNotifier, PanicGuard};
use crate::handles::{
    HandleKind, HandleRegistry, Ownership, ParseHandle, RunHandle, TaskHandle, TypedHandle,
};
use crate::native::{ItemResolver, NativeEngine, NativeResult, RawHandle};
use crate::session::SessionId;
use crate::status::{BridgeStatus, StatusReporter};
use crate::task::{ProgressFn, ProgressRelay, RunOutcome, TaskTable};
use crate::telemetry::{log_fault_event, FaultEvent};
use crate::types::{
    ErrorReport, GdtInventory, ItemSearchResult, MaybeAborted, OverworldItems, ParserError,
    PouchList, RuntimeError, RuntimeInitOutput, RuntimeInitParams, RuntimeViewError,
};

struct BridgeInner {
    engine: Arc<dyn NativeEngine>,
    dispatcher: CallDispatcher,
    handles: HandleRegistry,
    tasks: TaskTable,
    status: StatusReporter,
}

/// One session against a sandboxed engine. Cheap to clone; clones share
/// the session.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

impl Bridge {
    /// Create a bridge that reports crashes to the log only.
    pub fn new(engine: Arc<dyn NativeEngine>, config: &BridgeConfig) -> Self {
        Self::with_notifier(engine, config, Arc::new(LogCrashNotifier))
    }

    /// Create a bridge with a host crash notifier. The engine's fault hook is
    /// registered before this returns.
    pub fn with_notifier(
        engine: Arc<dyn NativeEngine>,
        config: &BridgeConfig,
        notifier: Arc<dyn CrashNotifier>,
    ) -> Self {
        let session = SessionId::new();
        let guard = PanicGuard::new(session, notifier);
        engine.register_fault_hook(guard.fault_hook());

        let gate = Arc::new(ExecutionGate::new());
        tracing::info!(session_id = %session, max_handles = config.max_handles, "bridge session created");

        Self {
            inner: Arc::new(BridgeInner {
                engine,
                dispatcher: CallDispatcher::new(gate, guard),
                handles: HandleRegistry::new(config.max_handles),
                tasks: TaskTable::new(),
                status: StatusReporter::new(),
            }),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.inner.dispatcher.guard().session()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.dispatcher.gate().is_ready()
    }

    pub fn is_faulted(&self) -> bool {
        self.inner.dispatcher.guard().is_faulted()
    }

    pub fn status(&self) -> BridgeStatus {
        let inner = &self.inner;
        inner
            .status
            .report(inner.dispatcher.gate(), inner.dispatcher.guard(), &inner.handles)
    }

    /// Suspend until runtime initialization has succeeded.
    pub async fn wait_ready(&self) {
        self.inner.dispatcher.gate().wait_ready().await
    }

    // ---- bootstrap ---------------------------------------------------------

    /// Load the engine module. Bypasses the execution gate.
    pub async fn init_module(&self) -> BridgeResult<()> {
        let inner = &self.inner;
        inner
            .dispatcher
            .dispatch("module_init", true, || async move {
                inner.engine.module_init().await.map_err(CallError::Native)
            })
            .await
    }

    /// Initialize the engine runtime and, on success, open the gate for all
    /// other operations. An init error leaves the gate closed and the
    /// session healthy; the host may try again.
    pub async fn init_runtime(
        &self,
        custom_image: Option<Vec<u8>>,
        params: Option<RuntimeInitParams>,
    ) -> BridgeResult<RuntimeInitOutput> {
        let inner = &self.inner;
        let result = inner
            .dispatcher
            .dispatch("init_runtime", true, || async move {
                inner
                    .engine
                    .init_runtime(custom_image, params)
                    .await
                    .map_err(CallError::Native)
            })
            .await?;

        match result {
            Ok(output) => {
                if inner.dispatcher.gate().open() {
                    tracing::info!(
                        session_id = %self.session_id(),
                        game_version = %output.game_version,
                        "engine runtime ready"
                    );
                }
                Ok(output)
            }
            Err(e) => {
                log_fault_event(
                    FaultEvent::InitFailed,
                    self.session_id(),
                    &e.to_string(),
                    &[("op", "init_runtime")],
                );
                Err(BridgeError::Init(e))
            }
        }
    }

    // ---- parsing -----------------------------------------------------------

    pub async fn resolve_item_ident(&self, query: &str) -> BridgeResult<Vec<ItemSearchResult>> {
        self.call("resolve_item_ident", |engine| engine.resolve_item_ident(query))
            .await
    }

    /// Parse a script. The returned handle must be released with
    /// [`Bridge::free_parse_output`].
    pub async fn parse_script(
        &self,
        script: &str,
        resolver: Arc<dyn ItemResolver>,
    ) -> BridgeResult<ParseHandle> {
        let inner = &self.inner;
        inner
            .dispatcher
            .dispatch("parse_script", false, || async move {
                let raw = inner
                    .engine
                    .parse_script(script, resolver)
                    .await
                    .map_err(CallError::Native)?;
                inner.adopt(raw).await
            })
            .await
    }

    /// Semantic tokens for `script[start..end]`, flattened as the engine
    /// reports them.
    pub async fn parse_script_semantic(
        &self,
        script: &str,
        start: u32,
        end: u32,
    ) -> BridgeResult<Vec<u32>> {
        self.call("parse_script_semantic", |engine| {
            engine.parse_script_semantic(script, start, end)
        })
        .await
    }

    pub async fn get_parser_errors(
        &self,
        parse: ParseHandle,
    ) -> BridgeResult<Vec<ErrorReport<ParserError>>> {
        self.call_with("get_parser_errors", parse, |engine, raw| {
            engine.get_parser_errors(raw)
        })
        .await
    }

    pub async fn get_step_count(&self, parse: ParseHandle) -> BridgeResult<u32> {
        self.call_with("get_step_count", parse, |engine, raw| engine.get_step_count(raw))
            .await
    }

    pub async fn get_step_from_pos(&self, parse: ParseHandle, byte_pos: u32) -> BridgeResult<u32> {
        self.call_with("get_step_from_pos", parse, |engine, raw| {
            engine.get_step_from_pos(raw, byte_pos)
        })
        .await
    }

    pub async fn get_step_byte_positions(&self, parse: ParseHandle) -> BridgeResult<Vec<u32>> {
        self.call_with("get_step_byte_positions", parse, |engine, raw| {
            engine.get_step_byte_positions(raw)
        })
        .await
    }

    // ---- runs --------------------------------------------------------------

    /// Create a cancellation handle for one run. Release it with
    /// [`Bridge::free_task_handle`] once the run has concluded.
    pub async fn create_task_handle(&self) -> BridgeResult<TaskHandle> {
        let inner = &self.inner;
        let task: TaskHandle = inner
            .dispatcher
            .dispatch("make_task_handle", false, || async move {
                let raw = inner.engine.make_task_handle().await.map_err(CallError::Native)?;
                inner.adopt(raw).await
            })
            .await?;
        inner.tasks.register(task);
        Ok(task)
    }

    /// Request that the run using `task` stop at its next checkpoint.
    ///
    /// Fire-and-forget: progress delivery stops immediately and the task
    /// handle is spent, so any later run with it reports
    /// [`RunOutcome::Aborted`]. The request reaches the engine on a task
    /// spawned onto the current Tokio runtime; called from outside a
    /// runtime, the abort stays host-side only.
    pub fn abort_task(&self, task: TaskHandle) {
        if !self.inner.tasks.abort(task) {
            tracing::debug!(?task, "abort requested for unknown task handle");
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::warn!(?task, "no Tokio runtime, abort not forwarded to engine");
                return;
            }
        };
        let shared = Arc::clone(&self.inner);
        runtime.spawn(async move {
            let inner: &BridgeInner = &shared;
            let result = inner
                .dispatcher
                .dispatch("abort_task", false, || async move {
                    let raw = inner.handles.resolve(task)?;
                    inner.engine.abort_task(raw).await.map_err(CallError::Native)
                })
                .await;
            if let Err(e) = result {
                tracing::debug!(?task, error = %e, "abort not delivered to engine");
            }
        });
    }

    /// Simulate a parsed script.
    ///
    /// `progress` is awaited for each notification before the run
    /// continues. Returns [`RunOutcome::Aborted`] if the task was aborted
    /// before the engine finished, and without calling the engine at all if
    /// it was aborted before the run started. The task handle stays live
    /// either way.
    pub async fn run(
        &self,
        parse: ParseHandle,
        task: TaskHandle,
        progress: ProgressFn,
    ) -> BridgeResult<RunOutcome> {
        let inner = &self.inner;
        let session = self.session_id();
        inner
            .dispatcher
            .dispatch("run_parsed", false, || async move {
                let parse_raw = inner.handles.resolve(parse)?;
                let task_raw = inner.handles.resolve(task)?;
                let cancel = inner.tasks.token(task).unwrap_or_default();
                if cancel.is_cancelled() {
                    tracing::debug!(?task, "run skipped, task already aborted");
                    return Ok(RunOutcome::Aborted);
                }

                let mut relay = ProgressRelay::new(&inner.handles, session, cancel, progress);
                let outcome = inner
                    .engine
                    .run_parsed(parse_raw, task_raw, &mut relay)
                    .await
                    .map_err(CallError::Native)?;
                tracing::debug!(
                    notifications = relay.delivered(),
                    aborted = outcome.is_aborted(),
                    "run finished"
                );

                let outcome = match outcome {
                    MaybeAborted::Ok(raw) => RunOutcome::Completed(inner.adopt(raw).await?),
                    MaybeAborted::Aborted => RunOutcome::Aborted,
                };
                Ok::<_, CallError>(outcome)
            })
            .await
    }

    pub async fn get_run_errors(
        &self,
        run: RunHandle,
    ) -> BridgeResult<Vec<ErrorReport<RuntimeError>>> {
        self.call_with("get_run_errors", run, |engine, raw| engine.get_run_errors(raw))
            .await
    }

    // ---- state inspection --------------------------------------------------

    pub async fn get_pouch_list(
        &self,
        run: RunHandle,
        parse: ParseHandle,
        byte_pos: u32,
    ) -> BridgeResult<PouchList> {
        self.view("get_pouch_list", run, parse, |engine, r, p| {
            engine.get_pouch_list(r, p, byte_pos)
        })
        .await
    }

    pub async fn get_gdt_inventory(
        &self,
        run: RunHandle,
        parse: ParseHandle,
        byte_pos: u32,
    ) -> BridgeResult<GdtInventory> {
        self.view("get_gdt_inventory", run, parse, |engine, r, p| {
            engine.get_gdt_inventory(r, p, byte_pos)
        })
        .await
    }

    pub async fn get_overworld_items(
        &self,
        run: RunHandle,
        parse: ParseHandle,
        byte_pos: u32,
    ) -> BridgeResult<OverworldItems> {
        self.view("get_overworld_items", run, parse, |engine, r, p| {
            engine.get_overworld_items(r, p, byte_pos)
        })
        .await
    }

    /// Crash diagnostic text at a step; empty if the game did not crash.
    pub async fn get_crash_info(
        &self,
        run: RunHandle,
        parse: ParseHandle,
        byte_pos: u32,
    ) -> BridgeResult<String> {
        self.inspect("get_crash_info", run, parse, |engine, r, p| {
            engine.get_crash_info(r, p, byte_pos)
        })
        .await
    }

    pub async fn get_save_names(
        &self,
        run: RunHandle,
        parse: ParseHandle,
        byte_pos: u32,
    ) -> BridgeResult<Vec<String>> {
        self.inspect("get_save_names", run, parse, |engine, r, p| {
            engine.get_save_names(r, p, byte_pos)
        })
        .await
    }

    /// Inventory stored in a save. `name` of None selects the manual save.
    pub async fn get_save_inventory(
        &self,
        run: RunHandle,
        parse: ParseHandle,
        byte_pos: u32,
        name: Option<&str>,
    ) -> BridgeResult<GdtInventory> {
        self.view("get_save_inventory", run, parse, |engine, r, p| {
            engine.get_save_inventory(r, p, byte_pos, name)
        })
        .await
    }

    // ---- release -----------------------------------------------------------

    pub async fn free_task_handle(&self, task: TaskHandle) -> BridgeResult<()> {
        self.inner.tasks.remove(task);
        self.release("free_task_handle", task, |engine, raw| engine.free_task_handle(raw))
            .await
    }

    pub async fn free_parse_output(&self, parse: ParseHandle) -> BridgeResult<()> {
        self.release("free_parse_output", parse, |engine, raw| {
            engine.free_parse_output(raw)
        })
        .await
    }

    pub async fn free_run_output(&self, run: RunHandle) -> BridgeResult<()> {
        self.release("free_run_output", run, |engine, raw| engine.free_run_output(raw))
            .await
    }

    // ---- plumbing ----------------------------------------------------------

    /// Dispatch a call that takes no handles.
    async fn call<'a, T, F, Fut>(&'a self, op: &'static str, f: F) -> BridgeResult<T>
    where
        F: FnOnce(&'a dyn NativeEngine) -> Fut,
        Fut: Future<Output = NativeResult<T>>,
    {
        let engine: &'a dyn NativeEngine = self.inner.engine.as_ref();
        self.inner
            .dispatcher
            .dispatch(op, false, || async move { f(engine).await.map_err(CallError::Native) })
            .await
    }

    /// Dispatch a call on one live handle. The handle is resolved only after
    /// the guard check, so a faulted session never looks at it.
    async fn call_with<'a, H, T, F, Fut>(&'a self, op: &'static str, handle: H, f: F) -> BridgeResult<T>
    where
        H: TypedHandle,
        F: FnOnce(&'a dyn NativeEngine, RawHandle) -> Fut,
        Fut: Future<Output = NativeResult<T>>,
    {
        let inner: &'a BridgeInner = &self.inner;
        inner
            .dispatcher
            .dispatch(op, false, || async move {
                let raw = inner.handles.resolve(handle)?;
                f(inner.engine.as_ref(), raw).await.map_err(CallError::Native)
            })
            .await
    }

    /// Dispatch a state query on a (run, parse) pair.
    async fn inspect<'a, T, F, Fut>(
        &'a self,
        op: &'static str,
        run: RunHandle,
        parse: ParseHandle,
        f: F,
    ) -> BridgeResult<T>
    where
        F: FnOnce(&'a dyn NativeEngine, RawHandle, RawHandle) -> Fut,
        Fut: Future<Output = NativeResult<T>>,
    {
        let inner: &'a BridgeInner = &self.inner;
        inner
            .dispatcher
            .dispatch(op, false, || async move {
                let run_raw = inner.handles.resolve(run)?;
                let parse_raw = inner.handles.resolve(parse)?;
                f(inner.engine.as_ref(), run_raw, parse_raw)
                    .await
                    .map_err(CallError::Native)
            })
            .await
    }

    /// A state query whose data may be missing; a view error stays local.
    async fn view<'a, V, F, Fut>(
        &'a self,
        op: &'static str,
        run: RunHandle,
        parse: ParseHandle,
        f: F,
    ) -> BridgeResult<V>
    where
        F: FnOnce(&'a dyn NativeEngine, RawHandle, RawHandle) -> Fut,
        Fut: Future<Output = NativeResult<Result<V, RuntimeViewError>>>,
    {
        self.inspect(op, run, parse, f)
            .await?
            .map_err(BridgeError::View)
    }

    /// Retire a handle and free it in the engine.
    ///
    /// Once the session is faulted the engine state is presumed gone: the
    /// host-side slot is still retired but nothing is sent to the engine and
    /// the release reports success.
    async fn release<'a, H, F, Fut>(&'a self, op: &'static str, handle: H, f: F) -> BridgeResult<()>
    where
        H: TypedHandle,
        F: FnOnce(&'a dyn NativeEngine, RawHandle) -> Fut,
        Fut: Future<Output = NativeResult<()>>,
    {
        let inner: &'a BridgeInner = &self.inner;
        if inner.dispatcher.guard().is_faulted() {
            let detail = match inner.handles.release(handle) {
                Ok(_) => "retired".to_string(),
                Err(e) => e.to_string(),
            };
            log_fault_event(
                FaultEvent::ReleaseSkipped,
                self.session_id(),
                "release not forwarded, session is faulted",
                &[("op", op), ("handle", detail.as_str())],
            );
            return Ok(());
        }

        inner
            .dispatcher
            .dispatch(op, false, || async move {
                let raw = inner.handles.release(handle)?;
                f(inner.engine.as_ref(), raw).await.map_err(CallError::Native)
            })
            .await
    }
}

impl BridgeInner {
    /// Register a raw handle the engine just created for the host.
    ///
    /// When the table is full no host token can exist for `raw`, so the
    /// engine resource is freed here before the error is returned.
    async fn adopt<H: TypedHandle>(&self, raw: RawHandle) -> Result<H, CallError> {
        let err = match self.handles.insert(raw, Ownership::Owned) {
            Ok(handle) => return Ok(handle),
            Err(e) => e,
        };
        tracing::warn!(kind = H::KIND.as_str(), error = %err, "freeing unadopted engine handle");
        let freed = match H::KIND {
            HandleKind::Task => self.engine.free_task_handle(raw).await,
            HandleKind::ParseOutput => self.engine.free_parse_output(raw).await,
            HandleKind::RunOutput => self.engine.free_run_output(raw).await,
        };
        freed.map_err(CallError::Native)?;
        Err(err.into())
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("session", &self.session_id())
            .field("ready", &self.is_ready())
            .field("faulted", &self.is_faulted())
            .finish()
    }
}
