//! Processing strategy module
//!
//! This module defines the Strategy pattern for complete request processing
//! pipelines, from CSV parsing through agreement flows to the obligation report.
//! Implementations (sequential, concurrent batch) are selected at runtime.

use crate::cli::StrategyType;
use crate::core::config::ProtocolConfig;
use std::io::Write;
use std::path::Path;

pub mod r#async;
pub mod sync;

pub use self::r#async::{AsyncProcessingStrategy, BatchConfig};
pub use sync::SyncProcessingStrategy;

/// Processing strategy trait for complete request processing pipelines
pub trait ProcessingStrategy: Send + Sync {
    /// Process agreement requests from input file and write results to output
    ///
    /// # Arguments
    ///
    /// * `input_path` - Path to the input CSV file of agreement requests
    /// * `output` - Mutable reference to a writer for the obligation report
    ///
    /// # Returns
    ///
    /// * `Ok(())` if processing completed (individual agreements may have failed)
    /// * `Err(String)` if a fatal error occurred (file not found, I/O error, etc.)
    ///
    /// Individual request failures are logged and do not cause this method to
    /// return an error.
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String>;
}

/// Create a processing strategy based on the specified strategy type
///
/// # Arguments
///
/// * `strategy_type` - The type of processing strategy to create (Sync or Async)
/// * `config` - Optional configuration for async batch processing (ignored for sync)
/// * `protocol` - Flow timeouts, retries and acceptor policy for the network
pub fn create_strategy(
    strategy_type: StrategyType,
    config: Option<BatchConfig>,
    protocol: ProtocolConfig,
) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncProcessingStrategy::new(protocol)),
        StrategyType::Async => {
            let config = config.unwrap_or_default();
            Box::new(AsyncProcessingStrategy::new(config, protocol))
        }
    }
}
