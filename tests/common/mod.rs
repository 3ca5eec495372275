//! Scripted in-process engine shared by the integration tests.
//!
//! Scripts are line based: each non-empty line is one step, and a step's
//! byte position is the end of its line. A line wrapped in double quotes is
//! resolved through the host item resolver; a line starting with `!` is a
//! parse error. Faults can be injected per operation.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use engine_bridge::guard::FaultHook;
use engine_bridge::types::{
    Category, ErrorReport, GdtInventory, GdtItem, ItemSearchResult, MaybeAborted,
    OverworldItems, ParserError, PouchList, RuntimeError, RuntimeInitError, RuntimeInitOutput,
    RuntimeInitParams, RuntimeViewError,
};
use engine_bridge::{
    Bridge, BridgeConfig, CrashNotifier, FaultReport, ItemResolver, NativeEngine, NativeError,
    NativeResult, ProgressSink, RawHandle,
};

pub const GAME_VERSION: &str = "1.5.0";

/// How an injected fault manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The call returns an error.
    Throw,
    /// The call panics.
    Panic,
    /// The engine raises its fault hook, then returns normally.
    Hook,
}

struct Parsed {
    steps: Vec<u32>,
    errors: Vec<ErrorReport<ParserError>>,
}

#[derive(Default)]
struct State {
    calls: Vec<&'static str>,
    faults: HashMap<&'static str, Fault>,
    init_error: Option<RuntimeInitError>,
    parses: HashMap<u32, Parsed>,
    tasks: HashMap<u32, bool>,
    runs: HashMap<u32, u32>,
    freed: Vec<(&'static str, u32)>,
    progress_override: Option<Vec<u32>>,
}

pub struct ScriptedEngine {
    state: Mutex<State>,
    hook: Mutex<Option<FaultHook>>,
    next_handle: AtomicU32,
}

impl ScriptedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            hook: Mutex::new(None),
            next_handle: AtomicU32::new(1),
        })
    }

    pub fn inject(&self, op: &'static str, fault: Fault) {
        self.state.lock().faults.insert(op, fault);
    }

    pub fn fail_init_with(&self, error: Option<RuntimeInitError>) {
        self.state.lock().init_error = error;
    }

    /// Report these cursors from every run instead of the script's steps.
    pub fn override_progress(&self, positions: Vec<u32>) {
        self.state.lock().progress_override = Some(positions);
    }

    /// Raise the fault hook from outside any call.
    pub fn raise_hook(&self, message: &str) {
        if let Some(hook) = self.hook.lock().clone() {
            hook.raise(message);
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| **c == op).count()
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn freed(&self) -> Vec<(&'static str, u32)> {
        self.state.lock().freed.clone()
    }

    pub fn task_aborted(&self, raw: u32) -> bool {
        self.state.lock().tasks.get(&raw).copied().unwrap_or(false)
    }

    pub fn live_parses(&self) -> usize {
        self.state.lock().parses.len()
    }

    pub fn live_tasks(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub fn live_runs(&self) -> usize {
        self.state.lock().runs.len()
    }

    fn alloc(&self) -> u32 {
        self.next_handle.fetch_add(1, Ordering::SeqCst)
    }

    /// Record the call and apply any injected fault for it.
    fn enter(&self, op: &'static str) -> NativeResult<()> {
        let fault = {
            let mut state = self.state.lock();
            state.calls.push(op);
            state.faults.get(op).copied()
        };
        match fault {
            Some(Fault::Throw) => Err(NativeError::new(format!("{}: unreachable executed", op))),
            Some(Fault::Panic) => panic!("{}: engine panicked", op),
            Some(Fault::Hook) => {
                self.raise_hook(op);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn steps(&self, parse: RawHandle) -> NativeResult<Vec<u32>> {
        self.state
            .lock()
            .parses
            .get(&parse.0)
            .map(|p| p.steps.clone())
            .ok_or_else(|| NativeError::new("memory access out of bounds"))
    }

    fn step_at(
        &self,
        run: RawHandle,
        parse: RawHandle,
        byte_pos: u32,
    ) -> NativeResult<Result<u32, RuntimeViewError>> {
        let steps = self.steps(parse)?;
        if !self.state.lock().runs.contains_key(&run.0) {
            return Err(NativeError::new("memory access out of bounds"));
        }
        match steps.last() {
            Some(last) if byte_pos <= *last => {
                Ok(Ok(steps.iter().filter(|end| **end <= byte_pos).count() as u32))
            }
            _ => Ok(Err(RuntimeViewError::OutOfRange(byte_pos))),
        }
    }

    fn free(&self, kind: &'static str, raw: RawHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        let removed = match kind {
            "task" => state.tasks.remove(&raw.0).is_some(),
            "parse" => state.parses.remove(&raw.0).is_some(),
            _ => state.runs.remove(&raw.0).is_some(),
        };
        if !removed {
            return Err(NativeError::new(format!("double free of {} {}", kind, raw.0)));
        }
        state.freed.push((kind, raw.0));
        Ok(())
    }
}

fn step_ends(script: &str) -> Vec<u32> {
    let mut ends = Vec::new();
    let mut offset = 0u32;
    for line in script.split_inclusive('\n') {
        let end = offset + line.trim_end_matches('\n').len() as u32;
        if !line.trim().is_empty() {
            ends.push(end);
        }
        offset += line.len() as u32;
    }
    ends
}

#[async_trait]
impl NativeEngine for ScriptedEngine {
    fn register_fault_hook(&self, hook: FaultHook) {
        *self.hook.lock() = Some(hook);
    }

    async fn module_init(&self) -> NativeResult<()> {
        self.enter("module_init")
    }

    async fn init_runtime(
        &self,
        _custom_image: Option<Vec<u8>>,
        _params: Option<RuntimeInitParams>,
    ) -> NativeResult<Result<RuntimeInitOutput, RuntimeInitError>> {
        self.enter("init_runtime")?;
        match self.state.lock().init_error.clone() {
            Some(e) => Ok(Err(e)),
            None => Ok(Ok(RuntimeInitOutput { game_version: GAME_VERSION.to_string() })),
        }
    }

    async fn resolve_item_ident(&self, query: &str) -> NativeResult<Vec<ItemSearchResult>> {
        self.enter("resolve_item_ident")?;
        if query.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![ItemSearchResult {
            actor: format!("Item_{}", query),
            category: Category::Material,
            cook_effect: 0,
            score: 1.0,
        }])
    }

    async fn parse_script(
        &self,
        script: &str,
        resolver: Arc<dyn ItemResolver>,
    ) -> NativeResult<RawHandle> {
        self.enter("parse_script")?;
        let mut errors = Vec::new();
        let mut offset = 0u32;
        for line in script.split_inclusive('\n') {
            let text = line.trim();
            let span = (offset, offset + line.trim_end_matches('\n').len() as u32);
            if let Some(name) = text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
                if resolver.resolve_quoted(name).await.is_none() {
                    errors.push(ErrorReport::error(span, ParserError::InvalidItem(name.to_string())));
                }
            } else if text.starts_with('!') {
                errors.push(ErrorReport::error(span, ParserError::SyntaxUnexpected));
            }
            offset += line.len() as u32;
        }

        let raw = self.alloc();
        self.state.lock().parses.insert(raw, Parsed { steps: step_ends(script), errors });
        Ok(RawHandle(raw))
    }

    async fn parse_script_semantic(
        &self,
        script: &str,
        start: u32,
        end: u32,
    ) -> NativeResult<Vec<u32>> {
        self.enter("parse_script_semantic")?;
        let end = end.min(script.len() as u32);
        if start >= end {
            return Ok(Vec::new());
        }
        Ok(vec![start, end - start, 0])
    }

    async fn get_parser_errors(
        &self,
        parse: RawHandle,
    ) -> NativeResult<Vec<ErrorReport<ParserError>>> {
        self.enter("get_parser_errors")?;
        self.state
            .lock()
            .parses
            .get(&parse.0)
            .map(|p| p.errors.clone())
            .ok_or_else(|| NativeError::new("memory access out of bounds"))
    }

    async fn get_step_count(&self, parse: RawHandle) -> NativeResult<u32> {
        self.enter("get_step_count")?;
        Ok(self.steps(parse)?.len() as u32)
    }

    async fn get_step_from_pos(&self, parse: RawHandle, byte_pos: u32) -> NativeResult<u32> {
        self.enter("get_step_from_pos")?;
        let steps = self.steps(parse)?;
        Ok(steps.iter().filter(|end| **end < byte_pos).count() as u32)
    }

    async fn get_step_byte_positions(&self, parse: RawHandle) -> NativeResult<Vec<u32>> {
        self.enter("get_step_byte_positions")?;
        self.steps(parse)
    }

    async fn make_task_handle(&self) -> NativeResult<RawHandle> {
        self.enter("make_task_handle")?;
        let raw = self.alloc();
        self.state.lock().tasks.insert(raw, false);
        Ok(RawHandle(raw))
    }

    async fn abort_task(&self, task: RawHandle) -> NativeResult<()> {
        self.enter("abort_task")?;
        if let Some(aborted) = self.state.lock().tasks.get_mut(&task.0) {
            *aborted = true;
        }
        Ok(())
    }

    async fn run_parsed(
        &self,
        parse: RawHandle,
        task: RawHandle,
        progress: &mut dyn ProgressSink,
    ) -> NativeResult<MaybeAborted<RawHandle>> {
        self.enter("run_parsed")?;
        let steps = self.steps(parse)?;
        let positions = self.state.lock().progress_override.clone().unwrap_or_else(|| steps.clone());

        for pos in positions {
            // Checkpoint: give a concurrent abort the chance to land.
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
            if self.task_aborted(task.0) {
                return Ok(MaybeAborted::Aborted);
            }
            let intermediate = self.alloc();
            self.state.lock().runs.insert(intermediate, parse.0);
            progress.notify(pos, RawHandle(intermediate)).await;
            self.state.lock().runs.remove(&intermediate);
        }

        let raw = self.alloc();
        self.state.lock().runs.insert(raw, parse.0);
        Ok(MaybeAborted::Ok(RawHandle(raw)))
    }

    async fn get_run_errors(
        &self,
        run: RawHandle,
    ) -> NativeResult<Vec<ErrorReport<RuntimeError>>> {
        self.enter("get_run_errors")?;
        if !self.state.lock().runs.contains_key(&run.0) {
            return Err(NativeError::new("memory access out of bounds"));
        }
        Ok(Vec::new())
    }

    async fn get_pouch_list(
        &self,
        run: RawHandle,
        parse: RawHandle,
        byte_pos: u32,
    ) -> NativeResult<Result<PouchList, RuntimeViewError>> {
        self.enter("get_pouch_list")?;
        Ok(self.step_at(run, parse, byte_pos)?.map(|step| PouchList {
            count: step as i32,
            items: Vec::new(),
            are_tabs_valid: true,
        }))
    }

    async fn get_gdt_inventory(
        &self,
        run: RawHandle,
        parse: RawHandle,
        byte_pos: u32,
    ) -> NativeResult<Result<GdtInventory, RuntimeViewError>> {
        self.enter("get_gdt_inventory")?;
        Ok(self.step_at(run, parse, byte_pos)?.map(|step| GdtInventory {
            rupees: step as i32,
            max_hearts: 12,
            max_stamina: 1000,
            ..GdtInventory::default()
        }))
    }

    async fn get_overworld_items(
        &self,
        run: RawHandle,
        parse: RawHandle,
        byte_pos: u32,
    ) -> NativeResult<Result<OverworldItems, RuntimeViewError>> {
        self.enter("get_overworld_items")?;
        Ok(self.step_at(run, parse, byte_pos)?.map(|_| OverworldItems::default()))
    }

    async fn get_crash_info(
        &self,
        run: RawHandle,
        parse: RawHandle,
        byte_pos: u32,
    ) -> NativeResult<String> {
        self.enter("get_crash_info")?;
        let _ = self.step_at(run, parse, byte_pos)?;
        Ok(String::new())
    }

    async fn get_save_names(
        &self,
        run: RawHandle,
        parse: RawHandle,
        byte_pos: u32,
    ) -> NativeResult<Vec<String>> {
        self.enter("get_save_names")?;
        let _ = self.step_at(run, parse, byte_pos)?;
        Ok(vec!["shrine".to_string()])
    }

    async fn get_save_inventory(
        &self,
        run: RawHandle,
        parse: RawHandle,
        byte_pos: u32,
        name: Option<&str>,
    ) -> NativeResult<Result<GdtInventory, RuntimeViewError>> {
        self.enter("get_save_inventory")?;
        let step = match self.step_at(run, parse, byte_pos)? {
            Ok(step) => step,
            Err(e) => return Ok(Err(e)),
        };
        match name {
            None | Some("shrine") => Ok(Ok(GdtInventory {
                items: vec![GdtItem {
                    actor_name: "Weapon_Sword_070".to_string(),
                    value: 4000,
                    is_equipped: true,
                }],
                rupees: step as i32,
                ..GdtInventory::default()
            })),
            Some(other) => Ok(Err(RuntimeViewError::SaveNotFound(other.to_string()))),
        }
    }

    async fn free_task_handle(&self, task: RawHandle) -> NativeResult<()> {
        self.enter("free_task_handle")?;
        self.free("task", task)
    }

    async fn free_parse_output(&self, parse: RawHandle) -> NativeResult<()> {
        self.enter("free_parse_output")?;
        self.free("parse", parse)
    }

    async fn free_run_output(&self, run: RawHandle) -> NativeResult<()> {
        self.enter("free_run_output")?;
        self.free("run", run)
    }
}

/// Resolver that knows every item.
pub struct AnyItem;

#[async_trait]
impl ItemResolver for AnyItem {
    async fn resolve_quoted(&self, query: &str) -> Option<ItemSearchResult> {
        Some(ItemSearchResult {
            actor: format!("Item_{}", query),
            category: Category::Material,
            cook_effect: 0,
            score: 1.0,
        })
    }
}

/// Resolver that knows no items.
pub struct NoItems;

#[async_trait]
impl ItemResolver for NoItems {
    async fn resolve_quoted(&self, _query: &str) -> Option<ItemSearchResult> {
        None
    }
}

pub fn any_item() -> Arc<dyn ItemResolver> {
    Arc::new(AnyItem)
}

/// Crash notifier that counts and keeps the last report.
#[derive(Default)]
pub struct CrashCounter {
    count: AtomicUsize,
    last: Mutex<Option<FaultReport>>,
}

impl CrashCounter {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn last(&self) -> Option<FaultReport> {
        self.last.lock().clone()
    }
}

impl CrashNotifier for CrashCounter {
    fn crash(&self, report: &FaultReport) {
        self.count.fetch_add(1, Ordering::SeqCst);
        *self.last.lock() = Some(report.clone());
    }
}

pub struct Harness {
    pub bridge: Bridge,
    pub engine: Arc<ScriptedEngine>,
    pub crashes: Arc<CrashCounter>,
}

/// Bridge over a fresh engine, not yet initialized.
pub fn harness() -> Harness {
    let engine = ScriptedEngine::new();
    let crashes = Arc::new(CrashCounter::default());
    let bridge = Bridge::with_notifier(engine.clone(), &BridgeConfig::default(), crashes.clone());
    Harness { bridge, engine, crashes }
}

/// Bridge with module and runtime initialized.
pub async fn ready_harness() -> Harness {
    let h = harness();
    h.bridge.init_module().await.expect("module init");
    h.bridge.init_runtime(None, None).await.expect("runtime init");
    h
}

pub const SCRIPT: &str = "get 1 apple\n\"royal claymore\"\n\nsave as shrine\nhold 2 apple\n";
