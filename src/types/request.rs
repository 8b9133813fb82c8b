//! Agreement requests read from batch input
//!
//! A request names the parties by their network names; the engine resolves
//! them to nodes before starting a flow.

use serde::{Deserialize, Serialize};

/// What a request asks the network to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestAction {
    /// Issue a new obligation from lender to borrower
    Issue,

    /// Settle an outstanding obligation with the same parties and value
    Settle,
}

/// One agreement to drive through the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgreementRequest {
    pub action: RequestAction,

    /// Name of the lender; its node initiates issuance
    pub lender: String,

    /// Name of the borrower; its node initiates settlement
    pub borrower: String,

    /// Obligation value. Not range-checked here: the contract rejects bad values.
    pub value: i64,
}

impl AgreementRequest {
    /// Ordering key: requests sharing it must be processed in input order
    pub fn pair(&self) -> (String, String) {
        (self.lender.clone(), self.borrower.clone())
    }
}
