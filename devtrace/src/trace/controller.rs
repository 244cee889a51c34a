//! Tracing lifecycle state machine.
//!
//! `Idle -> Started -> Stopping -> Completed`, with `Failed` reachable
//! from any state. Stop merely requests cessation; the transition to
//! `Completed` is driven by the aggregator observing the completion
//! event, not by the success of the stop command.

use std::time::Duration;

use log::info;
use serde_json::json;

use crate::config::TraceConfig;
use crate::domain::{RunState, Session, TraceError, TransportError};
use crate::transport::Transport;

pub struct TraceController {
    state: RunState,
}

impl Default for TraceController {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceController {
    pub fn new() -> Self {
        Self { state: RunState::Idle }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Issue the start-trace command. `Idle -> Started`.
    ///
    /// A rejection because tracing is already active maps to the
    /// distinguished [`TraceError::AlreadyTracing`] so the run aborts
    /// cleanly instead of crashing the batch.
    pub async fn start(
        &mut self,
        transport: &Transport,
        session: &Session,
        config: &TraceConfig,
        buffer_usage_interval: Duration,
    ) -> Result<(), TraceError> {
        if self.state != RunState::Idle {
            return Err(TraceError::InvalidTransition { op: "start", state: self.state });
        }

        let params = json!({
            "traceConfig": config,
            "bufferUsageReportingInterval": buffer_usage_interval.as_millis() as u64,
        });
        match transport.execute("Tracing.start", params, Some(&session.id)).await {
            Ok(_) => {
                self.state = RunState::Started;
                info!("tracing started on {}", session.target_id);
                Ok(())
            }
            Err(err) => {
                self.state = RunState::Failed;
                Err(start_error(err))
            }
        }
    }

    /// Issue the stop-trace command. `Started -> Stopping`.
    ///
    /// Actual completion is asynchronous: the runtime keeps flushing
    /// data events until it emits the completion event.
    pub async fn stop(&mut self, transport: &Transport, session: &Session) -> Result<(), TraceError> {
        if self.state != RunState::Started {
            return Err(TraceError::InvalidTransition { op: "stop", state: self.state });
        }

        match transport.execute("Tracing.end", json!({}), Some(&session.id)).await {
            Ok(_) => {
                self.state = RunState::Stopping;
                info!("stop requested, waiting for the runtime to flush");
                Ok(())
            }
            Err(err) => {
                self.state = RunState::Failed;
                Err(TraceError::Stop(err))
            }
        }
    }

    /// Driven by the aggregator observing the completion event.
    pub fn complete(&mut self) {
        self.state = RunState::Completed;
    }

    pub fn fail(&mut self) {
        self.state = RunState::Failed;
    }
}

fn start_error(err: TransportError) -> TraceError {
    if let TransportError::Protocol { message, .. } = &err {
        if message.to_lowercase().contains("already started") {
            return TraceError::AlreadyTracing;
        }
    }
    TraceError::Start(err)
}
