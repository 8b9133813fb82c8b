//! Asynchronous batch processing strategy
//!
//! This module provides a multi-threaded implementation of the
//! ProcessingStrategy trait. Requests are read in batches; within a batch they
//! are partitioned by (lender, borrower) and the partitions run in parallel.
//!
//! # Architecture
//!
//! ```text
//! AsyncProcessingStrategy
//!     ├── BatchConfig (batch_size, max_concurrent_batches)
//!     ├── ProtocolConfig (timeouts, record retries, acceptor policy)
//!     ├── AsyncReader (batch CSV reading)
//!     └── BatchProcessor (pair partitioning + tokio tasks)
//!         └── AgreementEngine → SimNetwork (nodes, notary)
//! ```
//!
//! # Ordering
//!
//! Batches are processed one after another, so requests for the same pair
//! keep their file order even when they span batches. Requests for different
//! pairs may finish in any order; the report is sorted, so output does not
//! depend on it.

use crate::core::batch_processor::BatchProcessor;
use crate::core::config::ProtocolConfig;
use crate::core::engine::AgreementEngine;
use crate::io::async_reader::AsyncReader;
use crate::io::csv_format::write_obligations_csv;
use crate::strategy::ProcessingStrategy;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Configuration for batch processing
///
/// Controls how requests are batched and the number of worker threads.
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Number of requests per batch
    pub batch_size: usize,
    /// Number of runtime worker threads
    pub max_concurrent_batches: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent_batches: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a new BatchConfig, replacing zero values with defaults
    pub fn new(batch_size: usize, max_concurrent_batches: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(
                default = default.batch_size,
                "Invalid batch_size (0), using default"
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent_batches = if max_concurrent_batches == 0 {
            warn!(
                default = default.max_concurrent_batches,
                "Invalid max_concurrent_batches (0), using default"
            );
            default.max_concurrent_batches
        } else {
            max_concurrent_batches
        };

        Self {
            batch_size,
            max_concurrent_batches,
        }
    }
}

/// Concurrent batch processing strategy
#[derive(Debug, Clone)]
pub struct AsyncProcessingStrategy {
    config: BatchConfig,
    protocol: ProtocolConfig,
}

impl AsyncProcessingStrategy {
    pub fn new(config: BatchConfig, protocol: ProtocolConfig) -> Self {
        Self { config, protocol }
    }
}

impl ProcessingStrategy for AsyncProcessingStrategy {
    /// Process requests from input file and write every party's obligations
    ///
    /// 1. Creates a multi-threaded runtime with the configured worker count
    /// 2. Reads requests in batches using AsyncReader
    /// 3. Processes each batch to completion before reading the next
    /// 4. Writes the obligation report using csv_format
    ///
    /// Fatal errors (file not found, runtime errors) are returned immediately.
    /// Malformed rows and failed agreements are logged and skipped.
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.max_concurrent_batches)
            .enable_all()
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        runtime.block_on(async {
            let engine = AgreementEngine::new(self.protocol.clone());
            let processor = BatchProcessor::new(engine.clone());

            let file = tokio::fs::File::open(input_path)
                .await
                .map_err(|e| format!("Failed to open file '{}': {}", input_path.display(), e))?;

            // csv-async reads futures::io, tokio files need the compat layer
            let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
            let mut reader = AsyncReader::new(compat_file);

            loop {
                let batch = reader.read_batch(self.config.batch_size).await;
                if batch.is_empty() {
                    break;
                }

                let requested = batch.len();
                let results = processor.process_batch(batch).await;
                let committed = results.iter().filter(|r| r.result.is_ok()).count();
                debug!(requested, committed, "Batch processed");
            }

            let holdings = engine.holdings().map_err(|e| e.to_string())?;
            write_obligations_csv(&holdings, output)?;

            Ok(())
        })
    }
}
