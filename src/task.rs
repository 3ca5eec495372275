//! Cancellable run protocol.
//!
//! A run is tied to a [`TaskHandle`]. The host can abort the task at any
//! time; the request is recorded host-side immediately (so no further
//! progress reaches the host) and forwarded to the engine, which stops at its
//! next checkpoint and reports [`RunOutcome::Aborted`].

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::handles::{HandleRegistry, Ownership, RunHandle, TaskHandle};
use crate::native::{ProgressSink, RawHandle};
use crate::session::SessionId;
use crate::telemetry::{log_fault_event, FaultEvent};

/// One progress notification delivered to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunProgress {
    /// Script byte position simulated so far. Never decreases within a run.
    pub up_to_byte_pos: u32,
    /// Intermediate output, valid until the callback's future completes.
    pub output: RunHandle,
}

/// Host progress callback. The run does not continue until the returned
/// future completes.
pub type ProgressFn = Box<dyn FnMut(RunProgress) -> BoxFuture<'static, ()> + Send>;

/// Wrap an async closure as a [`ProgressFn`].
pub fn progress_fn<F, Fut>(mut f: F) -> ProgressFn
where
    F: FnMut(RunProgress) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    Box::new(move |progress| Box::pin(f(progress)))
}

/// A progress callback that ignores every notification.
pub fn ignore_progress() -> ProgressFn {
    progress_fn(|_| async {})
}

/// How a run ended, when it did not fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    Completed(RunHandle),
    Aborted,
}

impl RunOutcome {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    pub fn completed(self) -> Option<RunHandle> {
        match self {
            Self::Completed(h) => Some(h),
            Self::Aborted => None,
        }
    }
}

/// Host-side abort state for live task handles.
#[derive(Debug, Default)]
pub struct TaskTable {
    tokens: DashMap<TaskHandle, CancellationToken>,
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, task: TaskHandle) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.insert(task, token.clone());
        token
    }

    /// Token for a live task, if the handle is known.
    pub fn token(&self, task: TaskHandle) -> Option<CancellationToken> {
        self.tokens.get(&task).map(|t| t.value().clone())
    }

    /// Mark a task aborted. Returns false for unknown handles.
    pub fn abort(&self, task: TaskHandle) -> bool {
        match self.tokens.get(&task) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_aborted(&self, task: TaskHandle) -> bool {
        self.tokens
            .get(&task)
            .map(|t| t.is_cancelled())
            .unwrap_or(false)
    }

    pub fn remove(&self, task: TaskHandle) {
        self.tokens.remove(&task);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Adapts engine progress notifications to the host callback.
///
/// Each intermediate output is parked as a borrowed [`RunHandle`] for the
/// duration of the callback and expired afterwards. Notifications arriving
/// after an abort request, or with a cursor behind the last delivered one,
/// are dropped.
pub(crate) struct ProgressRelay<'a> {
    handles: &'a HandleRegistry,
    session: SessionId,
    cancel: CancellationToken,
    callback: ProgressFn,
    last_pos: Option<u32>,
    delivered: usize,
}

impl<'a> ProgressRelay<'a> {
    pub(crate) fn new(
        handles: &'a HandleRegistry,
        session: SessionId,
        cancel: CancellationToken,
        callback: ProgressFn,
    ) -> Self {
        Self {
            handles,
            session,
            cancel,
            callback,
            last_pos: None,
            delivered: 0,
        }
    }

    pub(crate) fn delivered(&self) -> usize {
        self.delivered
    }
}

#[async_trait]
impl<'a> ProgressSink for ProgressRelay<'a> {
    async fn notify(&mut self, up_to_byte_pos: u32, output: RawHandle) {
        if self.cancel.is_cancelled() {
            tracing::trace!(up_to_byte_pos, "progress dropped, task aborted");
            return;
        }
        if let Some(last) = self.last_pos {
            if up_to_byte_pos < last {
                let detail = format!("{} < {}", up_to_byte_pos, last);
                log_fault_event(
                    FaultEvent::ProgressRegression,
                    self.session,
                    "engine reported progress out of order",
                    &[("cursor", detail.as_str())],
                );
                return;
            }
        }

        let handle: RunHandle = match self.handles.insert(output, Ownership::Borrowed) {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(error = %e, "cannot register intermediate output");
                return;
            }
        };
        self.last_pos = Some(up_to_byte_pos);
        self.delivered += 1;

        (self.callback)(RunProgress { up_to_byte_pos, output: handle }).await;

        if let Err(e) = self.handles.expire(handle) {
            tracing::warn!(error = %e, "intermediate output already expired");
        }
    }
}
