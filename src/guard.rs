//! Session fault latch.
//!
//! The guard has two input edges that converge on one atomic transition:
//! the call dispatcher reporting an error or panic from a boundary call, and
//! the engine raising its [`FaultHook`] out of band (a fault that never
//! unwinds through the calling frame). The first report wins; it records a
//! [`FaultReport`] and notifies the host exactly once through its
//! [`CrashNotifier`]. The latch never resets.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::session::SessionId;
use crate::telemetry::{log_fault_event, record_fault, FaultEvent};

/// Which edge reported the fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "op")]
pub enum FaultSource {
    /// A dispatched call errored or panicked.
    Call(&'static str),
    /// The engine invoked its fault hook.
    Hook,
}

impl FaultSource {
    fn metric_label(&self) -> &'static str {
        match self {
            Self::Call(_) => "call",
            Self::Hook => "hook",
        }
    }
}

/// The first fault observed in a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaultReport {
    pub session_id: SessionId,
    pub source: FaultSource,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Host-side port notified when the session becomes unrecoverable.
pub trait CrashNotifier: Send + Sync {
    fn crash(&self, report: &FaultReport);
}

impl<F> CrashNotifier for F
where
    F: Fn(&FaultReport) + Send + Sync,
{
    fn crash(&self, report: &FaultReport) {
        self(report)
    }
}

/// Default notifier: logs the crash and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCrashNotifier;

impl CrashNotifier for LogCrashNotifier {
    fn crash(&self, report: &FaultReport) {
        tracing::error!(
            session_id = %report.session_id,
            message = %report.message,
            "Engine fault, recovery is NOT possible"
        );
    }
}

struct GuardInner {
    /// Set exactly once; a set report is the faulted state.
    report: OnceLock<FaultReport>,
    notifier: Arc<dyn CrashNotifier>,
    session: SessionId,
}

/// Process-wide (per bridge) fault latch. Cheap to clone.
#[derive(Clone)]
pub struct PanicGuard {
    inner: Arc<GuardInner>,
}

impl PanicGuard {
    pub fn new(session: SessionId, notifier: Arc<dyn CrashNotifier>) -> Self {
        Self {
            inner: Arc::new(GuardInner {
                report: OnceLock::new(),
                notifier,
                session,
            }),
        }
    }

    pub fn is_faulted(&self) -> bool {
        self.inner.report.get().is_some()
    }

    /// Trip the latch. Returns true only for the call that performed the
    /// transition; later reports are logged at debug level and dropped.
    pub fn mark_faulted(&self, source: FaultSource, message: impl Into<String>) -> bool {
        let report = FaultReport {
            session_id: self.inner.session,
            source,
            message: message.into(),
            at: Utc::now(),
        };
        if let Err(late) = self.inner.report.set(report) {
            tracing::debug!(
                session_id = %self.inner.session,
                ?source,
                message = %late.message,
                "fault reported after session already faulted"
            );
            return false;
        }

        let event = match source {
            FaultSource::Call(_) => FaultEvent::CallFault,
            FaultSource::Hook => FaultEvent::HookFault,
        };
        let op = match source {
            FaultSource::Call(op) => op,
            FaultSource::Hook => "-",
        };
        if let Some(report) = self.inner.report.get() {
            log_fault_event(event, self.inner.session, &report.message, &[("op", op)]);
            record_fault(source.metric_label());
            self.inner.notifier.crash(report);
        }
        true
    }

    /// The first fault, once the latch has tripped.
    pub fn report(&self) -> Option<&FaultReport> {
        self.inner.report.get()
    }

    pub fn session(&self) -> SessionId {
        self.inner.session
    }

    /// Out-of-band edge handed to the engine.
    pub fn fault_hook(&self) -> FaultHook {
        FaultHook { guard: self.clone() }
    }
}

impl std::fmt::Debug for PanicGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanicGuard")
            .field("session", &self.inner.session)
            .field("faulted", &self.is_faulted())
            .finish()
    }
}

/// Handle the engine uses to report an unrecoverable state that does not
/// return through a normal call (an abort inside the engine, a fault on an
/// engine-owned thread).
#[derive(Clone, Debug)]
pub struct FaultHook {
    guard: PanicGuard,
}

impl FaultHook {
    pub fn raise(&self, message: impl Into<String>) {
        self.guard.mark_faulted(FaultSource::Hook, message);
    }

    pub fn is_faulted(&self) -> bool {
        self.guard.is_faulted()
    }
}
