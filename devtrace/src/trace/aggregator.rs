//! Concurrent event listeners for one trace run.
//!
//! Three listeners share one cancellation token with the duration
//! wait: data chunks, the completion notice, and buffer-usage
//! telemetry. The completion listener is the sole termination trigger
//! for the listening phase; the configured duration only bounds how
//! long tracing stays on. Every listener is joined before the run is
//! considered over, so nothing can leak into the next run.
//!
//! The transport stamps event frames with an arrival sequence number.
//! When the completion notice cancels the scope, the data listener
//! keeps exactly the chunks the endpoint delivered before that notice
//! and drops anything later, for every interleaving of deliveries and
//! task wakeups.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::domain::{Fragment, Session, TraceError, TraceOutcome};
use crate::trace::TraceController;
use crate::transport::{EventFrame, Transport};

pub struct EventAggregator {
    session: Session,
    data_rx: mpsc::UnboundedReceiver<EventFrame>,
    complete_rx: mpsc::UnboundedReceiver<EventFrame>,
    buffer_rx: mpsc::UnboundedReceiver<EventFrame>,
}

impl EventAggregator {
    /// Subscribe to all three event kinds.
    ///
    /// Must run before the start command is issued so no early event
    /// is missed.
    pub async fn subscribe(transport: &Transport, session: &Session) -> Self {
        Self {
            session: session.clone(),
            data_rx: transport.subscribe("Tracing.dataCollected").await,
            complete_rx: transport.subscribe("Tracing.tracingComplete").await,
            buffer_rx: transport.subscribe("Tracing.bufferUsage").await,
        }
    }

    /// Drain events until the completion notice ends the run.
    ///
    /// `duration` is an upper bound on how long tracing stays on:
    /// completion may arrive earlier, and if it has not arrived within
    /// `stop_grace` of the stop request the run fails with a timeout
    /// instead of hanging.
    pub async fn collect(
        self,
        transport: &Transport,
        controller: &mut TraceController,
        duration: Duration,
        stop_grace: Duration,
    ) -> Result<TraceOutcome, TraceError> {
        let EventAggregator { session, data_rx, complete_rx, buffer_rx } = self;

        let cancel = CancellationToken::new();
        // Sequence number of the completion notice; data past it is
        // not part of this run.
        let cutoff = Arc::new(AtomicU64::new(u64::MAX));

        let data_task = tokio::spawn(drain_data(
            data_rx,
            session.clone(),
            cancel.clone(),
            Arc::clone(&cutoff),
        ));
        let complete_task = tokio::spawn(await_completion(
            complete_rx,
            session.clone(),
            cancel.clone(),
            Arc::clone(&cutoff),
        ));
        let buffer_task = tokio::spawn(report_buffer_usage(buffer_rx, session.clone(), cancel.clone()));

        let phase: Result<(), TraceError> = async {
            tokio::select! {
                () = cancel.cancelled() => {
                    // Completion landed before the duration elapsed;
                    // the runtime already flushed, nothing to stop.
                    info!("completion observed before the duration elapsed");
                    Ok(())
                }
                () = tokio::time::sleep(duration) => {
                    controller.stop(transport, &session).await?;
                    match tokio::time::timeout(stop_grace, cancel.cancelled()).await {
                        Ok(()) => Ok(()),
                        Err(_) => Err(TraceError::CompletionTimeout(stop_grace)),
                    }
                }
            }
        }
        .await;

        // Tear the whole scope down before returning, success or not.
        // A listener outliving the run could feed fragments into the
        // next one.
        cancel.cancel();
        let fragments = data_task.await.map_err(listener_failed)?;
        let completion = complete_task.await.map_err(listener_failed)?;
        buffer_task.await.map_err(listener_failed)?;

        if let Err(err) = phase {
            controller.fail();
            return Err(err);
        }
        // The phase only succeeds once the token is cancelled, and the
        // completion listener is the only canceller inside it.
        let Some(data_loss) = completion else {
            controller.fail();
            return Err(TraceError::CompletionTimeout(stop_grace));
        };

        controller.complete();
        Ok(TraceOutcome { fragments, data_loss })
    }
}

fn listener_failed(err: JoinError) -> TraceError {
    TraceError::ListenerFailed(err.to_string())
}

/// Data listener: normalizes each data-collected payload into a
/// fragment, in arrival order.
async fn drain_data(
    mut rx: mpsc::UnboundedReceiver<EventFrame>,
    session: Session,
    cancel: CancellationToken,
    cutoff: Arc<AtomicU64>,
) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                // Chunks delivered before the completion notice may
                // still sit in the channel; keep exactly those. The
                // channel is FIFO, so the first frame at or past the
                // cutoff ends the drain.
                let cutoff = cutoff.load(Ordering::Acquire);
                while let Ok(frame) = rx.try_recv() {
                    if frame.seq >= cutoff {
                        break;
                    }
                    append_fragment(&mut fragments, &frame, &session);
                }
                break;
            }
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                // FIFO channel: once one frame is past the cutoff,
                // everything after it is too.
                if frame.seq >= cutoff.load(Ordering::Acquire) {
                    break;
                }
                append_fragment(&mut fragments, &frame, &session);
            }
        }
    }
    fragments
}

fn append_fragment(fragments: &mut Vec<Fragment>, frame: &EventFrame, session: &Session) {
    if !frame.is_for(&session.id) {
        return;
    }
    if let Some(fragment) = fragment_from_event(&frame.params) {
        debug!("data chunk with {} records", fragment.records.len());
        fragments.push(fragment);
    }
}

/// Re-encode each record of the event payload canonically.
///
/// Records arrive as already-decoded JSON, so serializing them back
/// out always yields valid text; no string patching is involved.
fn fragment_from_event(params: &Value) -> Option<Fragment> {
    let records = params.get("value")?.as_array()?;
    Some(Fragment { records: records.iter().map(Value::to_string).collect() })
}

/// Completion listener: the sole termination trigger for the
/// listening phase.
async fn await_completion(
    mut rx: mpsc::UnboundedReceiver<EventFrame>,
    session: Session,
    cancel: CancellationToken,
    cutoff: Arc<AtomicU64>,
) -> Option<bool> {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            frame = rx.recv() => {
                let Some(frame) = frame else { return None };
                if !frame.is_for(&session.id) {
                    continue;
                }
                let data_loss = frame
                    .params
                    .get("dataLossOccurred")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if data_loss {
                    warn!("runtime reported data loss while flushing the trace");
                } else {
                    info!("tracing complete");
                }
                cutoff.store(frame.seq, Ordering::Release);
                cancel.cancel();
                return Some(data_loss);
            }
        }
    }
}

/// Buffer-usage listener: telemetry only, rarely emitted in practice,
/// never drives control flow.
async fn report_buffer_usage(
    mut rx: mpsc::UnboundedReceiver<EventFrame>,
    session: Session,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            frame = rx.recv() => {
                let Some(frame) = frame else { return };
                if !frame.is_for(&session.id) {
                    continue;
                }
                let percent_full =
                    frame.params.get("percentFull").and_then(Value::as_f64).unwrap_or(0.0);
                let event_count =
                    frame.params.get("eventCount").and_then(Value::as_f64).unwrap_or(0.0);
                let value = frame.params.get("value").and_then(Value::as_f64).unwrap_or(0.0);
                info!(
                    "buffer usage: {:.1}% full, {event_count} events, value {:.1}%",
                    percent_full * 100.0,
                    value * 100.0
                );
            }
        }
    }
}
