//! Engine Bridge
//!
//! A fault-contained bridge between a host application and a sandboxed
//! script engine. The engine parses and simulates scripts; the bridge makes
//! sure the host can never observe a half-dead engine.
//!
//! # Guarantees
//!
//! - **Gated**: no call reaches the engine before runtime init succeeds,
//!   except the bootstrap calls themselves.
//! - **Latched**: the first unrecoverable fault (a thrown call, a panic, or
//!   the engine's own fault hook) poisons the session for good. Every later
//!   call returns [`BridgeError::NativeFault`] without touching the engine.
//! - **Notified once**: the host crash notifier fires exactly once per
//!   session, whichever edge tripped the latch.
//! - **Owned handles**: engine outputs reach the host as typed registry
//!   handles. Misuse is a host error, never an engine fault.
//!
//! # Usage
//!
//! ```ignore
//! let bridge = Bridge::new(engine, &engine_bridge::config::load());
//! bridge.init_module().await?;
//! bridge.init_runtime(None, None).await?;
//!
//! let parse = bridge.parse_script(script, resolver).await?;
//! let task = bridge.create_task_handle().await?;
//! let outcome = bridge.run(parse, task, ignore_progress()).await?;
//! ```

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod guard;
pub mod handles;
pub mod native;
pub mod session;
pub mod status;
pub mod task;
pub mod telemetry;
pub mod types;

pub use bridge::Bridge;
pub use config::{BridgeConfig, ConfigError};
pub use error::{BridgeError, BridgeResult};
pub use guard::{CrashNotifier, FaultReport, FaultSource};
pub use handles::{HandleError, HandleKind, ParseHandle, RunHandle, TaskHandle};
pub use native::{ItemResolver, NativeEngine, NativeError, NativeResult, ProgressSink, RawHandle};
pub use session::SessionId;
pub use status::{BridgePhase, BridgeStatus};
pub use task::{ignore_progress, progress_fn, ProgressFn, RunOutcome, RunProgress};
