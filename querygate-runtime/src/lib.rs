//! QueryGate Runtime - Lifecycle and Background Jobs
//!
//! Wires the response cache and the conversation store into a single
//! [`QueryGate`] handle, runs the session reaper on the Tokio runtime, and
//! installs the tracing subscriber.
//!
//! ```ignore
//! init_tracing(&TelemetryConfig::default())?;
//! let gate = QueryGate::start(QueryGateConfig::from_env())?;
//!
//! let context = gate.conversations().build_context(&session_id);
//! if let Some(answer) = gate.cache().get(&tenant, "ask", &params) { /* ... */ }
//!
//! let reaper = gate.shutdown().await?;
//! ```

pub mod gate;
pub mod jobs;
pub mod telemetry;

pub use gate::{GatewayOverview, GatewayStats, QueryGate};
pub use jobs::{session_reaper_task, ReaperConfig, ReaperMetrics, ReaperSnapshot, SessionSweeper};
pub use telemetry::{init_tracing, TelemetryConfig};
