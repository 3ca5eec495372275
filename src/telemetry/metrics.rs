//! Counters published through the `metrics` facade.
//!
//! Without an installed recorder these are no-ops.

use ::metrics::counter;

/// Count one boundary call that reached the engine.
pub fn record_call(op: &'static str) {
    counter!("bridge_calls_total", "op" => op).increment(1);
}

/// Count a fault report. `source` is "call" or "hook".
pub fn record_fault(source: &'static str) {
    counter!("bridge_faults_total", "source" => source).increment(1);
}

/// Count a rejected handle (stale, unknown, wrong kind).
pub fn record_handle_violation() {
    counter!("bridge_handle_violations_total").increment(1);
}
