//! Telemetry module tests for the engine bridge.

use engine_bridge::session::SessionId;
use engine_bridge::telemetry::{
    init_logging, log_fault_event, record_call, record_fault, record_handle_violation, CallSpan,
    FaultEvent, FaultSeverity, LogConfig, LogError, LogFormat, SpanExt,
};
use engine_bridge::BridgeError;
use std::path::PathBuf;

// =============================================================================
// LogConfig Tests
// =============================================================================

#[test]
fn log_config_default_is_json() {
    let config = LogConfig::default();
    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, "info");
    assert!(config.output_path.is_none());
}

#[test]
fn log_config_with_output_path() {
    let config = LogConfig {
        format: LogFormat::Json,
        level: "engine_bridge=trace".to_string(),
        output_path: Some(PathBuf::from("/tmp/bridge.log")),
    };
    assert_eq!(config.output_path, Some(PathBuf::from("/tmp/bridge.log")));
}

#[test]
fn log_format_names_round_trip() {
    for format in [LogFormat::Json, LogFormat::Pretty] {
        assert_eq!(LogFormat::parse(format.as_str()), Some(format));
    }
}

// =============================================================================
// LogError Tests
// =============================================================================

#[test]
fn log_error_display() {
    let error = LogError::InvalidFilter("bad filter".to_string());
    assert!(error.to_string().contains("Invalid log filter"));

    let error = LogError::FileOpen("permission denied".to_string());
    assert!(error.to_string().contains("permission denied"));
}

#[test]
fn init_logging_writes_json_to_file_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bridge.log");
    let config = LogConfig {
        format: LogFormat::Json,
        level: "debug".to_string(),
        output_path: Some(path.clone()),
    };

    init_logging(&config).unwrap();
    assert!(path.exists());
    assert!(matches!(init_logging(&config), Err(LogError::AlreadyInitialized)));
}

// =============================================================================
// Fault Events
// =============================================================================

#[test]
fn fatal_events_are_critical() {
    assert_eq!(FaultEvent::CallFault.severity(), FaultSeverity::Critical);
    assert_eq!(FaultEvent::HookFault.severity(), FaultSeverity::Critical);
    assert!(FaultEvent::HandleViolation.severity() > FaultEvent::InitFailed.severity());
}

#[test]
fn fault_events_log_without_subscriber() {
    log_fault_event(
        FaultEvent::ProgressRegression,
        SessionId::new(),
        "engine reported progress out of order",
        &[("cursor", "10 < 20")],
    );
}

// =============================================================================
// Spans and Metrics
// =============================================================================

#[test]
fn call_span_records_outcomes() {
    let span = CallSpan::new("get_step_count", SessionId::new());
    let started = std::time::Instant::now();
    let ok: Result<u32, BridgeError> = Ok(3);
    span.record_result(&ok);

    let err: Result<u32, BridgeError> = Err(BridgeError::NativeFault);
    span.record_result(&err);
    span.record_latency(started);
}

#[test]
fn metrics_without_recorder_are_noops() {
    record_call("parse_script");
    record_fault("hook");
    record_handle_violation();
}
