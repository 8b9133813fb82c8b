//! Batch processing with party-pair partitioning
//!
//! This module provides the `BatchProcessor`, which runs agreement requests
//! concurrently while keeping the input order for requests between the same
//! lender and borrower.
//!
//! # Design
//!
//! Obligations belong to exactly one (lender, borrower) pair, so requests for
//! different pairs never touch the same states. Each pair's requests run
//! sequentially in their own tokio task; different pairs run in parallel.
//! Cross-pair safety does not depend on this partitioning: the notary still
//! serializes any two transactions consuming the same input.

use std::collections::HashMap;

use tracing::warn;

use crate::core::engine::AgreementEngine;
use crate::types::{AgreementRequest, CommittedTransaction, FlowFailure};

/// Result of processing a single request
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    /// The request that was processed
    pub request: AgreementRequest,

    /// The committed transaction, or the stage and reason the agreement failed
    pub result: Result<CommittedTransaction, FlowFailure>,
}

/// Batch processor partitioning by party pair
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    engine: AgreementEngine,
}

impl BatchProcessor {
    pub fn new(engine: AgreementEngine) -> Self {
        Self { engine }
    }

    /// Partition a batch by (lender, borrower), keeping input order per pair
    ///
    /// Every request appears in exactly one partition.
    pub fn partition_by_pair(
        &self,
        batch: Vec<AgreementRequest>,
    ) -> HashMap<(String, String), Vec<AgreementRequest>> {
        let mut pair_batches: HashMap<(String, String), Vec<AgreementRequest>> = HashMap::new();

        for request in batch {
            pair_batches.entry(request.pair()).or_default().push(request);
        }

        pair_batches
    }

    /// Process one pair's requests sequentially, in order
    ///
    /// A failed request does not stop the ones after it.
    pub async fn process_pair_requests(
        &self,
        requests: Vec<AgreementRequest>,
    ) -> Vec<ProcessingResult> {
        let mut results = Vec::with_capacity(requests.len());

        for request in requests {
            let result = self.engine.process(&request).await;
            if let Err(failure) = &result {
                warn!(
                    lender = %request.lender,
                    borrower = %request.borrower,
                    value = request.value,
                    %failure,
                    "Agreement failed"
                );
            }
            results.push(ProcessingResult { request, result });
        }

        results
    }

    /// Process a batch, one task per party pair
    ///
    /// Results are grouped by pair; the order across pairs is unspecified.
    pub async fn process_batch(&self, batch: Vec<AgreementRequest>) -> Vec<ProcessingResult> {
        let pair_batches = self.partition_by_pair(batch);

        let mut tasks = Vec::new();
        for (_pair, requests) in pair_batches {
            let processor = self.clone();
            let task =
                tokio::spawn(async move { processor.process_pair_requests(requests).await });
            tasks.push(task);
        }

        let mut results = Vec::new();
        for task in tasks {
            match task.await {
                Ok(pair_results) => results.extend(pair_results),
                Err(e) => warn!(error = %e, "Pair task panicked"),
            }
        }

        results
    }
}
