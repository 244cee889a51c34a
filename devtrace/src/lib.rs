//! # devtrace - DevTools tracing-session collector
//!
//! devtrace attaches to a running application through its remote
//! debugging endpoint, records a streaming trace for a bounded
//! duration, and writes the collected chunks out as one Chrome-trace
//! compatible JSON document per run.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │              Remote runtime (DevTools endpoint)           │
//! └───────────────────────┬──────────────────────────────────┘
//!                         │ WebSocket, JSON frames
//!                         ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                  devtrace (This Crate)                    │
//! │                                                          │
//! │  ┌───────────┐   ┌──────────┐   ┌──────────────────┐    │
//! │  │ Transport │──▶│ Session  │──▶│ Trace controller │    │
//! │  │  (demux)  │   │  binder  │   │  + aggregator    │    │
//! │  └───────────┘   └──────────┘   └────────┬─────────┘    │
//! │                                          ▼              │
//! │                                  ┌──────────────┐       │
//! │                                  │    Export    │       │
//! │                                  │ (trace.json) │       │
//! │                                  └──────────────┘       │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`transport`]: WebSocket message channel with command/response
//!   correlation and event fan-out
//! - [`session`]: Target discovery, page selection, attach/detach
//! - [`trace`]: Tracing lifecycle state machine and the concurrent
//!   event listeners scoped to one run
//! - [`export`]: Document assembly and the legacy normalization shim
//! - [`orchestrator`]: Sequential runs with a per-run failure boundary
//! - [`cli`]: Command-line argument parsing
//! - [`config`]: Immutable collector configuration
//! - [`domain`]: Core domain types and errors
//!
//! ## Typical Usage
//!
//! ```bash
//! # Record three 6-second traces from a page endpoint
//! devtrace ws://localhost:9222/devtools/page/<ID> --output trace_{run}.json
//!
//! # One long capture without the sampling profiler
//! devtrace ws://localhost:9222/devtools/page/<ID> --runs 1 --duration 30 --no-sampling
//! ```

// Expose modules for testing
pub mod cli;
pub mod config;
pub mod domain;
pub mod export;
pub mod orchestrator;
pub mod session;
pub mod trace;
pub mod transport;
