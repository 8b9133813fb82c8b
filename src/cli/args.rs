use crate::core::config::ProtocolConfig;
use crate::strategy::BatchConfig;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Drive IOU agreements between simulated ledger nodes
#[derive(Parser, Debug)]
#[command(name = "iou-ledger")]
#[command(
    about = "Issue and settle IOUs between simulated ledger nodes and report every vault",
    long_about = None
)]
pub struct CliArgs {
    /// Input CSV file path containing agreement requests
    #[arg(value_name = "INPUT", help = "Path to the input CSV file")]
    pub input_file: PathBuf,

    /// Processing strategy
    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "async",
        help = "Processing strategy: 'sync' for sequential or 'async' for concurrent batches"
    )]
    pub strategy: StrategyType,

    /// Number of requests per batch (async mode only)
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of requests per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Number of worker threads (async mode only)
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Number of worker threads (default: CPU cores)"
    )]
    pub max_concurrent_batches: Option<usize>,

    /// How long a flow waits for a peer before giving up
    #[arg(
        long = "response-timeout-ms",
        value_name = "MILLIS",
        default_value_t = 5000,
        help = "Milliseconds a flow waits for a counterparty message"
    )]
    pub response_timeout_ms: u64,

    /// Attempts to record a committed transaction at each participant
    #[arg(
        long = "record-attempts",
        value_name = "COUNT",
        default_value_t = 3,
        help = "Attempts to record a committed transaction at each participant"
    )]
    pub record_attempts: u32,

    /// Largest value an acceptor will sign
    #[arg(
        long = "max-value",
        value_name = "VALUE",
        help = "Acceptors refuse obligations above this value (default: no limit)"
    )]
    pub max_value: Option<i64>,
}

/// Available processing strategies
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

impl CliArgs {
    /// Create a BatchConfig from CLI arguments
    ///
    /// Missing values fall back to defaults; zero values are replaced with
    /// defaults by `BatchConfig::new`, with a warning.
    pub fn to_batch_config(&self) -> BatchConfig {
        if self.batch_size.is_some() || self.max_concurrent_batches.is_some() {
            let default = BatchConfig::default();
            BatchConfig::new(
                self.batch_size.unwrap_or(default.batch_size),
                self.max_concurrent_batches
                    .unwrap_or(default.max_concurrent_batches),
            )
        } else {
            BatchConfig::default()
        }
    }

    pub fn to_protocol_config(&self) -> ProtocolConfig {
        ProtocolConfig::new(
            Duration::from_millis(self.response_timeout_ms),
            self.record_attempts,
            self.max_value,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::default_strategy(&["program", "input.csv"], StrategyType::Async)]
    #[case::explicit_sync(&["program", "--strategy", "sync", "input.csv"], StrategyType::Sync)]
    #[case::explicit_async(&["program", "--strategy", "async", "input.csv"], StrategyType::Async)]
    fn test_strategy_parsing(#[case] args: &[&str], #[case] expected: StrategyType) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.strategy, expected);
    }

    #[rstest]
    #[case::all_defaults(&["program", "input.csv"], 1000, num_cpus::get())]
    #[case::custom_batch_size(&["program", "--batch-size", "2000", "input.csv"], 2000, num_cpus::get())]
    #[case::custom_max_concurrent(&["program", "--max-concurrent", "8", "input.csv"], 1000, 8)]
    #[case::zero_batch_size(&["program", "--batch-size", "0", "input.csv"], 1000, num_cpus::get())]
    #[case::zero_max_concurrent(&["program", "--max-concurrent", "0", "input.csv"], 1000, num_cpus::get())]
    fn test_batch_config_conversion(
        #[case] args: &[&str],
        #[case] expected_batch_size: usize,
        #[case] expected_max_concurrent: usize,
    ) {
        let config = CliArgs::try_parse_from(args).unwrap().to_batch_config();

        assert_eq!(config.batch_size, expected_batch_size);
        assert_eq!(config.max_concurrent_batches, expected_max_concurrent);
    }

    #[rstest]
    #[case::defaults(&["program", "input.csv"], 5000, 3, None)]
    #[case::custom(
        &["program", "--response-timeout-ms", "250", "--record-attempts", "5", "--max-value", "100", "input.csv"],
        250,
        5,
        Some(100)
    )]
    #[case::zero_values_fall_back(
        &["program", "--response-timeout-ms", "0", "--record-attempts", "0", "input.csv"],
        5000,
        3,
        None
    )]
    fn test_protocol_config_conversion(
        #[case] args: &[&str],
        #[case] expected_timeout_ms: u64,
        #[case] expected_attempts: u32,
        #[case] expected_max_value: Option<i64>,
    ) {
        let config = CliArgs::try_parse_from(args).unwrap().to_protocol_config();

        assert_eq!(config.response_timeout, Duration::from_millis(expected_timeout_ms));
        assert_eq!(config.record_attempts, expected_attempts);
        assert_eq!(config.acceptor_max_value, expected_max_value);
    }

    #[rstest]
    #[case::missing_input(&["program"])]
    #[case::invalid_strategy(&["program", "--strategy", "invalid", "input.csv"])]
    #[case::negative_timeout(&["program", "--response-timeout-ms", "-1", "input.csv"])]
    fn test_parsing_errors(#[case] args: &[&str]) {
        assert!(CliArgs::try_parse_from(args).is_err());
    }
}
