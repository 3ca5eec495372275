//! Session status reporting.
//!
//! Aggregates the gate, guard and handle registry into one serializable
//! snapshot the host can poll or log.

use std::time::Instant;

use serde::Serialize;

use crate::gate::ExecutionGate;
use crate::guard::{FaultReport, PanicGuard};
use crate::handles::{HandleKind, HandleRegistry};
use crate::session::SessionId;

/// Lifecycle phase of a bridge session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BridgePhase {
    /// Runtime initialization has not succeeded yet.
    Initializing,
    Ready,
    /// Terminal. Takes precedence over the gate state.
    Faulted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HandleCounts {
    pub tasks: usize,
    pub parse_outputs: usize,
    pub run_outputs: usize,
}

impl HandleCounts {
    pub fn total(&self) -> usize {
        self.tasks + self.parse_outputs + self.run_outputs
    }
}

/// Snapshot of a bridge session.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatus {
    pub session_id: SessionId,
    pub phase: BridgePhase,
    pub live_handles: HandleCounts,
    pub uptime_secs: u64,
    pub fault: Option<FaultReport>,
}

impl BridgeStatus {
    pub fn is_usable(&self) -> bool {
        self.phase == BridgePhase::Ready
    }
}

/// Builds status snapshots for one session.
pub struct StatusReporter {
    start_time: Instant,
}

impl StatusReporter {
    pub fn new() -> Self {
        Self { start_time: Instant::now() }
    }

    pub fn phase(ready: bool, faulted: bool) -> BridgePhase {
        if faulted {
            return BridgePhase::Faulted;
        }
        if !ready {
            return BridgePhase::Initializing;
        }
        BridgePhase::Ready
    }

    pub fn report(
        &self,
        gate: &ExecutionGate,
        guard: &PanicGuard,
        handles: &HandleRegistry,
    ) -> BridgeStatus {
        BridgeStatus {
            session_id: guard.session(),
            phase: Self::phase(gate.is_ready(), guard.is_faulted()),
            live_handles: HandleCounts {
                tasks: handles.live_count(HandleKind::Task),
                parse_outputs: handles.live_count(HandleKind::ParseOutput),
                run_outputs: handles.live_count(HandleKind::RunOutput),
            },
            uptime_secs: self.start_time.elapsed().as_secs(),
            fault: guard.report().cloned(),
        }
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}
