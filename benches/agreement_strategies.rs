//! Benchmark suite comparing processing strategies
//!
//! Each iteration runs every request in the fixture as a full agreement flow on a
//! fresh simulated network: signing, notarisation and recording at both parties.
//!
//! # Running Benchmarks
//!
//! ```bash
//! cargo bench
//! ```
//!
//! # Benchmark Fixtures
//!
//! - `benchmark_small.csv` - 100 requests over 20 parties
//! - `benchmark_medium.csv` - 1,000 requests over 20 parties
//!
//! Both mix issuances with settlements of earlier issuances.

use iou_ledger::cli::StrategyType;
use iou_ledger::strategy::{create_strategy, BatchConfig};
use iou_ledger::ProtocolConfig;
use std::path::Path;

fn main() {
    divan::main();
}

fn run(strategy_type: StrategyType, fixture: &str) {
    let config = match strategy_type {
        StrategyType::Sync => None,
        StrategyType::Async => Some(BatchConfig::default()),
    };
    let strategy = create_strategy(strategy_type, config, ProtocolConfig::default());
    let path = Path::new("benches/fixtures").join(fixture);
    let mut output = Vec::new();

    strategy
        .process(&path, &mut output)
        .expect("Processing failed");
}

#[divan::bench(args = [StrategyType::Sync, StrategyType::Async])]
fn small(strategy_type: StrategyType) {
    run(strategy_type, "benchmark_small.csv");
}

#[divan::bench(args = [StrategyType::Sync, StrategyType::Async], sample_count = 10)]
fn medium(strategy_type: StrategyType) {
    run(strategy_type, "benchmark_medium.csv");
}
