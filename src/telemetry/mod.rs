//! Telemetry module for the engine bridge.
//!
//! Provides structured logging, per-call tracing spans, fault event logging
//! and metrics counters. Nothing here talks to the network.

pub mod fault_log;
mod logging;
mod metrics;
mod spans;

pub use fault_log::{log_fault_event, FaultEvent, FaultSeverity};
pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{record_call, record_fault, record_handle_violation};
pub use spans::{CallSpan, SpanExt};
