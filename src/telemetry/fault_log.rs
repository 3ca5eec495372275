//! Fault event logging for the engine bridge.
//!
//! Every event that bears on session health (engine faults, lockout,
//! initialization failures, handle contract violations) goes through here so
//! it can be filtered and audited as one stream.

use crate::session::SessionId;

/// Fault-related event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultEvent {
    /// A boundary call errored or panicked.
    CallFault,
    /// The engine raised its out-of-band fault hook.
    HookFault,
    /// A call was refused because the session is already faulted.
    CallRejected,
    /// Runtime initialization returned an error.
    InitFailed,
    /// A release was not forwarded because the session is faulted.
    ReleaseSkipped,
    /// The host used a stale, unknown or mistyped handle.
    HandleViolation,
    /// The engine reported progress out of order.
    ProgressRegression,
}

impl FaultEvent {
    pub fn severity(&self) -> FaultSeverity {
        match self {
            Self::CallFault => FaultSeverity::Critical,
            Self::HookFault => FaultSeverity::Critical,
            Self::CallRejected => FaultSeverity::Debug,
            Self::InitFailed => FaultSeverity::Warning,
            Self::ReleaseSkipped => FaultSeverity::Debug,
            Self::HandleViolation => FaultSeverity::Error,
            Self::ProgressRegression => FaultSeverity::Warning,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CallFault => "call_fault",
            Self::HookFault => "hook_fault",
            Self::CallRejected => "call_rejected",
            Self::InitFailed => "init_failed",
            Self::ReleaseSkipped => "release_skipped",
            Self::HandleViolation => "handle_violation",
            Self::ProgressRegression => "progress_regression",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FaultSeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl FaultSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Log a fault event with structured data.
///
/// # Example
/// ```
/// use engine_bridge::session::SessionId;
/// use engine_bridge::telemetry::{log_fault_event, FaultEvent};
///
/// log_fault_event(
///     FaultEvent::HandleViolation,
///     SessionId::new(),
///     "stale parse output handle",
///     &[("op", "get_step_count")],
/// );
/// ```
pub fn log_fault_event(
    event: FaultEvent,
    session: SessionId,
    message: &str,
    details: &[(&str, &str)],
) {
    let event_type = event.as_str();
    let severity = event.severity().as_str();
    let details_str = details
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ");

    match event.severity() {
        FaultSeverity::Debug => tracing::debug!(
            target: "engine_bridge::fault", event = event_type, severity,
            session_id = %session, details = %details_str, "{}", message
        ),
        FaultSeverity::Info => tracing::info!(
            target: "engine_bridge::fault", event = event_type, severity,
            session_id = %session, details = %details_str, "{}", message
        ),
        FaultSeverity::Warning => tracing::warn!(
            target: "engine_bridge::fault", event = event_type, severity,
            session_id = %session, details = %details_str, "{}", message
        ),
        FaultSeverity::Error | FaultSeverity::Critical => tracing::error!(
            target: "engine_bridge::fault", event = event_type, severity,
            session_id = %session, details = %details_str, "{}", message
        ),
    }
}
