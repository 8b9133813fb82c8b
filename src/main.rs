//! IOU ledger CLI
//!
//! Reads agreement requests from a CSV file, runs each as a two-party flow on a
//! simulated ledger network and prints every party's unconsumed obligations.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- requests.csv > obligations.csv
//! cargo run -- --strategy sync requests.csv > obligations.csv
//! cargo run -- --strategy async --batch-size 2000 --max-concurrent 8 requests.csv
//! RUST_LOG=iou_ledger=debug cargo run -- --max-value 1000 requests.csv
//! ```
//!
//! Logs go to stderr so stdout carries only the CSV report.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (missing arguments, file not found, file not readable, etc.)

use iou_ledger::cli;
use iou_ledger::strategy;
use std::process;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = cli::parse_args();

    let strategy = {
        let config = if args.strategy == cli::StrategyType::Async {
            Some(args.to_batch_config())
        } else {
            None
        };
        strategy::create_strategy(args.strategy, config, args.to_protocol_config())
    };

    let mut output = std::io::stdout();
    if let Err(e) = strategy.process(&args.input_file, &mut output) {
        error!(error = %e, "Processing failed");
        process::exit(1);
    }
}
