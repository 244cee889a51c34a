//! CLI argument definitions

use std::time::Duration;

use clap::Parser;

use crate::config::{CollectorConfig, RecordMode, TraceConfig, DEFAULT_CATEGORIES};

#[derive(Parser)]
#[command(
    name = "devtrace",
    about = "Record tracing sessions from a remote DevTools endpoint",
    after_help = "\
EXAMPLES:
    devtrace ws://localhost:9222/devtools/page/<ID>
    devtrace ws://localhost:9222/devtools/page/<ID> --runs 5 --output trace_{run}.json
    devtrace ws://localhost:9222/devtools/page/<ID> --duration 30 --no-sampling"
)]
pub struct Args {
    /// WebSocket URI of the page's debugging endpoint
    /// (ws://<host>:<port>/devtools/page/<id>)
    #[arg(value_name = "ENDPOINT")]
    pub endpoint: String,

    /// Output path; `{run}` expands to the 1-based run index
    #[arg(short, long, default_value = "trace.json", value_name = "FILE")]
    pub output: String,

    /// Trace category filter, repeatable; passed to the runtime
    /// verbatim (defaults to the DevTools timeline set)
    #[arg(short = 'c', long = "category", value_name = "CATEGORY")]
    pub categories: Vec<String>,

    /// Buffer handling once the trace buffer fills up
    #[arg(long, value_enum, default_value_t = RecordMode::Continuously)]
    pub record_mode: RecordMode,

    /// Disable the runtime's sampling profiler during the trace
    #[arg(long)]
    pub no_sampling: bool,

    /// Number of tracing runs to perform
    #[arg(short, long, default_value_t = 3)]
    pub runs: usize,

    /// Seconds to trace per run
    #[arg(short, long, default_value_t = 6.0)]
    pub duration: f64,

    /// Seconds to wait between runs so the target can settle
    #[arg(long, default_value_t = 5.0)]
    pub delay: f64,

    /// Apply the legacy token/quote fixups to records before writing
    #[arg(long)]
    pub legacy_fixups: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Build the immutable configuration record the orchestrator runs on.
    pub fn into_config(self) -> CollectorConfig {
        let included_categories = if self.categories.is_empty() {
            DEFAULT_CATEGORIES.iter().map(ToString::to_string).collect()
        } else {
            self.categories
        };

        CollectorConfig {
            endpoint: self.endpoint,
            output: self.output,
            trace: TraceConfig {
                record_mode: self.record_mode,
                enable_sampling: !self.no_sampling,
                included_categories,
            },
            runs: self.runs,
            duration: Duration::from_secs_f64(self.duration),
            inter_run_delay: Duration::from_secs_f64(self.delay),
            buffer_usage_interval: Duration::from_millis(500),
            stop_grace: Duration::from_secs(10),
            legacy_fixups: self.legacy_fixups,
        }
    }
}
