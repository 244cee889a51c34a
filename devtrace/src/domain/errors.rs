//! Structured error types for devtrace
//!
//! Using thiserror for automatic Display implementation and error
//! chaining. Every variant here is fatal to the current run, never to
//! the batch; the orchestrator catches them at its per-run boundary.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::types::{RunState, TargetId};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to connect to {uri}: {source}")]
    Connect {
        uri: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("connection dropped while {method} was in flight: {detail}")]
    Closed { method: String, detail: String },

    #[error("no response to {method} within {timeout:?}")]
    ResponseTimeout { method: String, timeout: Duration },

    #[error("{method} failed: {message}")]
    Protocol { method: String, message: String },
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no page target among {0} discovered targets")]
    NoPageTarget(usize),

    #[error("failed to attach to {target}: {source}")]
    Attach {
        target: TargetId,
        #[source]
        source: TransportError,
    },

    #[error("attach response carried no session id")]
    MissingSessionId,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Error, Debug)]
pub enum TraceError {
    /// Distinguished from other start failures: another client already
    /// has tracing on, so this run aborts cleanly instead of fighting.
    #[error("tracing is already active in the target")]
    AlreadyTracing,

    #[error("failed to start tracing: {0}")]
    Start(#[source] TransportError),

    #[error("failed to stop tracing: {0}")]
    Stop(#[source] TransportError),

    #[error("no completion event within {0:?} of the stop request")]
    CompletionTimeout(Duration),

    #[error("cannot {op} while the run is {state}")]
    InvalidTransition { op: &'static str, state: RunState },

    #[error("listener task failed: {0}")]
    ListenerFailed(String),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write trace document to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Anything that can end a run early. Caught and logged by the
/// orchestrator; the batch keeps going.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error(transparent)]
    Export(#[from] ExportError),
}
