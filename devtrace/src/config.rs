//! Immutable collector configuration.
//!
//! Built once from the CLI and handed to the orchestrator; nothing in
//! here changes while a batch is running.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

/// Category filters traced when none are given on the command line.
/// The DevTools timeline set used by the trace viewer tooling.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "disabled-by-default-devtools.timeline",
    "disabled-by-default-devtools.timeline.frame",
    "disabled-by-default-v8",
    "disabled-by-default-v8.cpu_profiler",
    "devtools.timeline",
    "devtools",
    "ServiceWorker",
    "v8.execute",
    "blink.user_timing",
    "benchmark",
];

/// What the runtime does once its trace buffer fills up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum RecordMode {
    /// Keep recording, evicting the oldest events.
    #[serde(rename = "recordContinuously")]
    Continuously,
    /// Stop recording when the buffer is full.
    #[serde(rename = "recordUntilFull")]
    UntilFull,
}

impl fmt::Display for RecordMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordMode::Continuously => "continuously",
            RecordMode::UntilFull => "until-full",
        };
        f.write_str(name)
    }
}

/// Parameters controlling what the runtime records during a trace.
///
/// Immutable once a trace starts. Serializes to the protocol's
/// `TraceConfig` shape.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceConfig {
    pub record_mode: RecordMode,
    pub enable_sampling: bool,
    /// Passed to the runtime verbatim: order and duplicates are
    /// preserved exactly as configured, never deduplicated.
    pub included_categories: Vec<String>,
}

/// Everything one batch of tracing runs needs.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// WebSocket URI of the page's debugging endpoint.
    pub endpoint: String,
    /// Output path template; `{run}` expands to the 1-based run index.
    pub output: String,
    pub trace: TraceConfig,
    /// Number of sequential runs in the batch.
    pub runs: usize,
    /// How long each run traces before stop is requested.
    pub duration: Duration,
    /// Settle time between runs.
    pub inter_run_delay: Duration,
    /// Requested cadence of buffer-usage telemetry events.
    pub buffer_usage_interval: Duration,
    /// How long to wait for the completion event after stop.
    pub stop_grace: Duration,
    /// Run the legacy token/quote fixups over records before writing.
    pub legacy_fixups: bool,
}

impl CollectorConfig {
    /// Resolve the output path for one run.
    ///
    /// A `{run}` placeholder is substituted with the 1-based index.
    /// Without a placeholder, multi-run batches get the index appended
    /// to the file stem so runs never clobber each other.
    pub fn output_path_for_run(&self, run_index: usize) -> PathBuf {
        let display_index = run_index + 1;
        if self.output.contains("{run}") {
            return PathBuf::from(self.output.replace("{run}", &display_index.to_string()));
        }
        if self.runs <= 1 {
            return PathBuf::from(&self.output);
        }

        let path = Path::new(&self.output);
        let stem = path.file_stem().and_then(OsStr::to_str).unwrap_or("trace");
        let name = match path.extension().and_then(OsStr::to_str) {
            Some(ext) => format!("{stem}_{display_index}.{ext}"),
            None => format!("{stem}_{display_index}"),
        };
        path.with_file_name(name)
    }
}
