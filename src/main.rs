//! Enrolment Insights CLI entrypoint
//!
//! Parses arguments, runs the analytics pipeline and prints the summary.
//! Any error, including a run where no input source loads, exits non-zero.

use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use enrolment_insights::{print_summary, run_pipeline, Args};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_target(false)
        .init();

    let verbose = args.verbose;
    let config = args.into_config()?;

    let start = Instant::now();
    let report = run_pipeline(&config)?;
    print_summary(&report, verbose);

    info!(elapsed_s = start.elapsed().as_secs_f64(), "pipeline complete");
    Ok(())
}
