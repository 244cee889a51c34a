//! Drives sequential tracing runs against one endpoint.
//!
//! Each run gets a fresh connection and session. A run's failure is
//! logged with its index and elapsed time, then the batch moves on:
//! partial results are preferable to none.

use std::time::Instant;

use log::{info, warn};

use crate::config::CollectorConfig;
use crate::domain::{RunError, Session};
use crate::export::DocumentWriter;
use crate::session;
use crate::trace::{EventAggregator, TraceController};
use crate::transport::Transport;

/// How one batch of runs went.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub completed: usize,
    pub failed: usize,
}

pub struct Orchestrator {
    config: CollectorConfig,
}

impl Orchestrator {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// Run the configured number of tracing runs.
    pub async fn run_batch(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for run_index in 0..self.config.runs {
            if run_index > 0 {
                // Let the target settle between runs.
                tokio::time::sleep(self.config.inter_run_delay).await;
            }

            let started = Instant::now();
            info!("run {}/{} starting", run_index + 1, self.config.runs);
            match self.run_once(run_index).await {
                Ok(record_count) => {
                    info!(
                        "run {}/{} finished in {:.1}s ({record_count} records)",
                        run_index + 1,
                        self.config.runs,
                        started.elapsed().as_secs_f64(),
                    );
                    summary.completed += 1;
                }
                Err(err) => {
                    warn!(
                        "run {}/{} failed after {:.1}s: {err}",
                        run_index + 1,
                        self.config.runs,
                        started.elapsed().as_secs_f64(),
                    );
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    /// One full run on a fresh connection.
    async fn run_once(&self, run_index: usize) -> Result<usize, RunError> {
        let transport = Transport::connect(&self.config.endpoint).await?;
        let result = self.run_session(&transport, run_index).await;
        transport.close().await;
        result
    }

    async fn run_session(&self, transport: &Transport, run_index: usize) -> Result<usize, RunError> {
        let targets = session::discover_targets(transport).await?;
        let target = session::select_page_target(&targets)?;
        let bound = session::open_session(transport, target).await?;

        let result = self.record(transport, &bound, run_index).await;
        // Detach on every exit path; failures are logged, never raised.
        session::close_session(transport, &bound).await;
        result
    }

    async fn record(
        &self,
        transport: &Transport,
        bound: &Session,
        run_index: usize,
    ) -> Result<usize, RunError> {
        let mut controller = TraceController::new();
        // Listeners must be live before the start command goes out.
        let aggregator = EventAggregator::subscribe(transport, bound).await;

        controller
            .start(transport, bound, &self.config.trace, self.config.buffer_usage_interval)
            .await?;
        let outcome = aggregator
            .collect(transport, &mut controller, self.config.duration, self.config.stop_grace)
            .await?;

        let record_count = outcome.fragments.iter().map(|f| f.records.len()).sum();
        let path = self.config.output_path_for_run(run_index);
        DocumentWriter::new(self.config.legacy_fixups).write_to_path(&outcome.fragments, &path)?;
        Ok(record_count)
    }
}
