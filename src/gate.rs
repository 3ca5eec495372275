//! Execution gate: a one-shot readiness latch.
//!
//! Every non-bootstrap call waits here until runtime initialization has
//! succeeded. A failed initialization leaves the gate closed, so waiting
//! callers stay suspended until a later attempt succeeds or the host drops
//! them.

use tokio::sync::watch;

pub struct ExecutionGate {
    ready: watch::Sender<bool>,
}

impl ExecutionGate {
    pub fn new() -> Self {
        let (ready, _) = watch::channel(false);
        Self { ready }
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Open the gate. Returns true only for the call that opened it.
    pub fn open(&self) -> bool {
        self.ready.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        })
    }

    /// Suspend until the gate is open. Returns immediately if it already is.
    pub async fn wait_ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

impl Default for ExecutionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExecutionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionGate")
            .field("ready", &self.is_ready())
            .finish()
    }
}
