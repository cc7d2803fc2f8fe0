//! Background Jobs for QueryGate
//!
//! - `session_reaper`: Evicts conversation sessions idle beyond the
//!   staleness threshold
//!
//! # Usage
//!
//! [`QueryGate::start`](crate::QueryGate::start) spawns the reaper for you.
//! To run it by hand:
//!
//! ```ignore
//! use querygate_runtime::jobs::{session_reaper_task, ReaperConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(session_reaper_task(Arc::clone(&store), ReaperConfig::default(), shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod session_reaper;

pub use session_reaper::{
    run_session_reaper, run_sweep, session_reaper_task, ReaperConfig, ReaperMetrics,
    ReaperSnapshot, SessionSweeper,
};
