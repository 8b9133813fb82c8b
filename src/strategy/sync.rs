//! Synchronous processing strategy
//!
//! Processes agreement requests one at a time, in file order. Each request runs
//! to completion (both parties recorded, or failed) before the next is read.
//!
//! # Design
//!
//! The SyncProcessingStrategy focuses on orchestration, delegating:
//! - CSV parsing to `SyncReader` (iterator interface)
//! - Agreement flows to `AgreementEngine`
//! - CSV output to `csv_format::write_obligations_csv`
//!
//! Flows are asynchronous by nature (parties exchange messages), so the
//! strategy drives them on a single-threaded tokio runtime.

use crate::core::config::ProtocolConfig;
use crate::core::engine::AgreementEngine;
use crate::io::csv_format::write_obligations_csv;
use crate::io::sync_reader::SyncReader;
use crate::strategy::ProcessingStrategy;
use std::io::Write;
use std::path::Path;
use tracing::warn;

/// Sequential processing strategy
#[derive(Debug, Clone, Default)]
pub struct SyncProcessingStrategy {
    protocol: ProtocolConfig,
}

impl SyncProcessingStrategy {
    pub fn new(protocol: ProtocolConfig) -> Self {
        Self { protocol }
    }
}

impl ProcessingStrategy for SyncProcessingStrategy {
    /// Process requests from input file and write every party's obligations
    ///
    /// Fatal errors (file not found, runtime or output errors) are returned
    /// immediately. Malformed rows and failed agreements are logged as warnings
    /// and processing continues.
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        let engine = AgreementEngine::new(self.protocol.clone());
        let reader = SyncReader::new(input_path)?;

        for result in reader {
            match result {
                Ok(request) => {
                    if let Err(failure) = runtime.block_on(engine.process(&request)) {
                        warn!(
                            action = ?request.action,
                            lender = %request.lender,
                            borrower = %request.borrower,
                            value = request.value,
                            %failure,
                            "Agreement failed"
                        );
                    }
                }
                Err(e) => warn!(error = %e, "CSV parsing error"),
            }
        }

        let holdings = engine.holdings().map_err(|e| e.to_string())?;
        write_obligations_csv(&holdings, output)?;

        Ok(())
    }
}
