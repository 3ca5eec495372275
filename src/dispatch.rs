//! Call dispatcher: the single path every boundary call takes.
//!
//! 1. wait on the execution gate (unless the call is a bootstrap call or the
//!    session has already faulted);
//! 2. refuse with `NativeFault` if the session is already faulted;
//! 3. run the call, catching panics that unwind out of it;
//! 4. classify: an error or panic trips the guard, and so does a guard that
//!    was tripped while the call was in flight. Anything else is success.
//!
//! Step 4 re-reads the guard after the await because the engine's fault hook
//! can fire during a call that still returns normally.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::Instrument;

use crate::error::{BridgeError, BridgeResult};
use crate::gate::ExecutionGate;
use crate::guard::{FaultSource, PanicGuard};
use crate::handles::HandleError;
use crate::native::NativeError;
use crate::telemetry::{
    log_fault_event, record_call, record_handle_violation, CallSpan, FaultEvent, SpanExt,
};

/// How a dispatched call failed.
#[derive(Debug)]
pub enum CallError {
    /// The engine threw. Fatal for the session.
    Native(NativeError),
    /// The host side refused the call before or after reaching the engine.
    Rejected(BridgeError),
}

impl From<NativeError> for CallError {
    fn from(e: NativeError) -> Self {
        Self::Native(e)
    }
}

impl From<HandleError> for CallError {
    fn from(e: HandleError) -> Self {
        Self::Rejected(BridgeError::InvalidHandle(e))
    }
}

impl From<BridgeError> for CallError {
    fn from(e: BridgeError) -> Self {
        Self::Rejected(e)
    }
}

pub struct CallDispatcher {
    gate: Arc<ExecutionGate>,
    guard: PanicGuard,
}

impl CallDispatcher {
    pub fn new(gate: Arc<ExecutionGate>, guard: PanicGuard) -> Self {
        Self { gate, guard }
    }

    pub fn gate(&self) -> &ExecutionGate {
        &self.gate
    }

    pub fn guard(&self) -> &PanicGuard {
        &self.guard
    }

    /// Run `call` under the dispatch discipline.
    ///
    /// `call` is only invoked once the gate is open and the guard is clear;
    /// a refused call never touches the engine.
    pub async fn dispatch<T, F, Fut>(
        &self,
        op: &'static str,
        skip_ready_wait: bool,
        call: F,
    ) -> BridgeResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        // A faulted session refuses immediately, even if the gate never opened.
        if !skip_ready_wait && !self.guard.is_faulted() {
            self.gate.wait_ready().await;
        }

        let span = CallSpan::new(op, self.guard.session());
        let started = Instant::now();
        let result = self.invoke(op, call).instrument(span.clone()).await;
        span.record_result(&result);
        span.record_latency(started);
        result
    }

    async fn invoke<T, F, Fut>(&self, op: &'static str, call: F) -> BridgeResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        if self.guard.is_faulted() {
            log_fault_event(
                FaultEvent::CallRejected,
                self.guard.session(),
                "call refused, session is faulted",
                &[("op", op)],
            );
            return Err(BridgeError::NativeFault);
        }

        record_call(op);
        let outcome = AssertUnwindSafe(async move { call().await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(_) if self.guard.is_faulted() => {
                tracing::error!(op, "engine faulted while the call was in flight");
                self.guard
                    .mark_faulted(FaultSource::Call(op), "fault signalled during call");
                Err(BridgeError::NativeFault)
            }
            Ok(Ok(value)) => Ok(value),
            Ok(Err(CallError::Rejected(e))) => {
                if let BridgeError::InvalidHandle(handle_err) = &e {
                    record_handle_violation();
                    log_fault_event(
                        FaultEvent::HandleViolation,
                        self.guard.session(),
                        &handle_err.to_string(),
                        &[("op", op)],
                    );
                }
                Err(e)
            }
            Ok(Err(CallError::Native(e))) => {
                tracing::error!(op, error = %e, "boundary call threw");
                self.guard.mark_faulted(FaultSource::Call(op), e.message);
                Err(BridgeError::NativeFault)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(op, panic = %message, "boundary call panicked");
                self.guard.mark_faulted(FaultSource::Call(op), message);
                Err(BridgeError::NativeFault)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
