//! The `bridge_call` span wrapped around every dispatched call.

use std::time::Instant;

use tracing::{info_span, Span};

use crate::error::BridgeResult;
use crate::session::SessionId;

pub trait SpanExt {
    /// Record `status` (`ok`, `fault` or `error`) and, on failure,
    /// `error.message`.
    fn record_result<T>(&self, result: &BridgeResult<T>);

    /// Record `latency_us` measured from `started`.
    fn record_latency(&self, started: Instant);
}

impl SpanExt for Span {
    fn record_result<T>(&self, result: &BridgeResult<T>) {
        let status = match result {
            Ok(_) => "ok",
            Err(e) if e.is_fatal() => "fault",
            Err(_) => "error",
        };
        self.record("status", status);
        if let Err(e) = result {
            self.record("error.message", tracing::field::display(e));
        }
    }

    fn record_latency(&self, started: Instant) {
        let micros = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.record("latency_us", micros);
    }
}

pub struct CallSpan;

impl CallSpan {
    /// `status`, `error.message` and `latency_us` start empty and are filled
    /// in through [`SpanExt`] once the call returns.
    pub fn new(op: &'static str, session: SessionId) -> Span {
        info_span!(
            "bridge_call",
            op = op,
            session_id = %session,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            latency_us = tracing::field::Empty,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::handles::{HandleError, HandleKind};

    #[test]
    fn test_records_every_outcome_kind() {
        let span = CallSpan::new("get_step_count", SessionId::new());
        let started = Instant::now();
        span.record_result(&Ok::<u32, BridgeError>(4));
        span.record_result::<u32>(&Err(BridgeError::NativeFault));
        span.record_result::<u32>(&Err(BridgeError::InvalidHandle(HandleError::Stale {
            kind: HandleKind::ParseOutput,
        })));
        span.record_latency(started);
    }
}
