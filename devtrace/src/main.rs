//! # devtrace - Main Entry Point
//!
//! Connects to a remote DevTools endpoint, records one or more
//! bounded tracing sessions, and writes each out as a trace-viewer
//! compatible JSON document.

use anyhow::Result;
use clap::Parser;

use devtrace::cli::Args;
use devtrace::orchestrator::Orchestrator;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_ERROR
        }
    });
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;
    let config = args.into_config();

    if !quiet {
        println!("devtrace v{}", env!("CARGO_PKG_VERSION"));
        println!("endpoint: {}", config.endpoint);
        println!(
            "runs: {} x {:.1}s ({} categories)",
            config.runs,
            config.duration.as_secs_f64(),
            config.trace.included_categories.len()
        );
    }

    let summary = Orchestrator::new(config).run_batch().await;

    if !quiet {
        println!("completed: {}, failed: {}", summary.completed, summary.failed);
    }

    // Partial results count as success; a batch with nothing to show
    // for itself does not.
    if summary.completed == 0 && summary.failed > 0 {
        anyhow::bail!("all {} runs failed", summary.failed);
    }
    Ok(())
}
