//! Validation rules for obligation transitions
//!
//! This module provides the `ObligationContract` and the registry that maps a
//! proposal's contract reference to its rules. Validation is a pure function of
//! the proposal, so the initiator and the acceptor reach the same verdict
//! independently.
//!
//! # Rules
//!
//! Issuance (`Command::Issue`):
//! - `no_inputs`: nothing is consumed
//! - `single_output`: exactly one obligation is produced
//! - `distinct_parties`: lender and borrower differ
//! - `participants_sign`: lender and borrower are required signers
//! - `positive_value`: the value is strictly positive
//!
//! Settlement (`Command::Settle`):
//! - `single_input`: exactly one obligation is consumed
//! - `no_outputs`: nothing is produced
//! - `participants_sign`: the consumed obligation's parties are required signers
//!
//! Both commands first check `contract_matches`: every state is of the type the
//! referenced contract governs.

use crate::core::traits::Contract;
use crate::types::{Command, ContractId, LedgerError, ObligationState, Proposal, StateType};

fn require(condition: bool, rule_name: &str, message: &str) -> Result<(), LedgerError> {
    if condition {
        Ok(())
    } else {
        Err(LedgerError::rule_violation(rule_name, message))
    }
}

/// Rules governing `ObligationState` transitions
#[derive(Debug, Clone, Copy, Default)]
pub struct ObligationContract;

impl ObligationContract {
    fn verify_issue(&self, proposal: &Proposal) -> Result<(), LedgerError> {
        require(
            proposal.inputs.is_empty(),
            "no_inputs",
            "No inputs should be consumed when issuing an obligation",
        )?;
        require(
            proposal.outputs.len() == 1,
            "single_output",
            "Only one output state should be created",
        )?;

        let output = &proposal.outputs[0];
        require(
            output.lender.key != output.borrower.key,
            "distinct_parties",
            "The lender and the borrower cannot be the same entity",
        )?;
        self.require_participants_sign(proposal, output)?;
        require(
            output.value > 0,
            "positive_value",
            "The obligation's value must be strictly positive",
        )
    }

    fn verify_settle(&self, proposal: &Proposal) -> Result<(), LedgerError> {
        require(
            proposal.inputs.len() == 1,
            "single_input",
            "Exactly one obligation must be consumed when settling",
        )?;
        require(
            proposal.outputs.is_empty(),
            "no_outputs",
            "No output states should be created when settling",
        )?;
        self.require_participants_sign(proposal, &proposal.inputs[0].state)
    }

    fn require_participants_sign(
        &self,
        proposal: &Proposal,
        state: &ObligationState,
    ) -> Result<(), LedgerError> {
        require(
            state
                .participants()
                .iter()
                .all(|party| proposal.required_signers.contains(&party.key)),
            "participants_sign",
            "All of the participants must be signers",
        )
    }
}

impl Contract for ObligationContract {
    fn id(&self) -> ContractId {
        ContractId::Obligation
    }

    fn verify(&self, proposal: &Proposal) -> Result<(), LedgerError> {
        let governed = self.id().state_type();
        require(
            proposal
                .inputs
                .iter()
                .map(|input| input.state.state_type())
                .chain(proposal.outputs.iter().map(ObligationState::state_type))
                .all(|state_type| state_type == governed),
            "contract_matches",
            "Every state must be governed by the referenced contract",
        )?;

        match proposal.command {
            Command::Issue => self.verify_issue(proposal),
            Command::Settle => self.verify_settle(proposal),
        }
    }
}

/// Explicit registry from state type to validation rules
pub struct ContractRegistry;

impl ContractRegistry {
    /// Rules for transitions of `state_type`
    pub fn for_state(state_type: StateType) -> &'static dyn Contract {
        match state_type {
            StateType::Obligation => &ObligationContract,
        }
    }

    /// Rules a proposal refers to by `id`
    pub fn lookup(id: ContractId) -> &'static dyn Contract {
        Self::for_state(id.state_type())
    }
}

/// Run the rules referenced by `proposal`
pub fn validate(proposal: &Proposal) -> Result<(), LedgerError> {
    ContractRegistry::lookup(proposal.contract).verify(proposal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builder::{build, build_settlement, TransactionBuilder};
    use crate::crypto::{KeyPair, TxHash};
    use crate::types::{Party, StateAndRef, StateRef};
    use rstest::rstest;

    fn party(name: &str) -> Party {
        let keys = KeyPair::from_seed(blake3::hash(name.as_bytes()).as_bytes());
        Party::new(name, keys.public_key())
    }

    fn outstanding(value: i64) -> StateAndRef {
        StateAndRef {
            state: ObligationState::new(value, party("PartyA"), party("PartyB")),
            state_ref: StateRef {
                tx_id: TxHash([4; 32]),
                index: 0,
            },
        }
    }

    fn rule_of(result: Result<(), LedgerError>) -> Option<String> {
        result.err().and_then(|e| e.rule_name().map(str::to_string))
    }

    #[rstest]
    #[case::one(1)]
    #[case::large(i64::MAX)]
    fn test_valid_issuance(#[case] value: i64) {
        let proposal = build(value, party("PartyA"), party("PartyB"), party("Notary"));
        assert!(validate(&proposal).is_ok());
    }

    #[rstest]
    #[case::zero(0)]
    #[case::negative(-1)]
    #[case::minimum(i64::MIN)]
    fn test_non_positive_value_rejected(#[case] value: i64) {
        let proposal = build(value, party("PartyA"), party("PartyB"), party("Notary"));
        assert_eq!(rule_of(validate(&proposal)), Some("positive_value".to_string()));
    }

    #[test]
    fn test_same_party_rejected() {
        let a = party("PartyA");
        let proposal = build(1, a.clone(), a, party("Notary"));
        assert_eq!(rule_of(validate(&proposal)), Some("distinct_parties".to_string()));
    }

    #[test]
    fn test_missing_signer_rejected() {
        let borrower = party("PartyB");
        let mut proposal = build(1, party("PartyA"), borrower.clone(), party("Notary"));
        proposal.required_signers.remove(&borrower.key);
        assert_eq!(rule_of(validate(&proposal)), Some("participants_sign".to_string()));
    }

    #[test]
    fn test_issuance_with_input_rejected() {
        let mut proposal = build(1, party("PartyA"), party("PartyB"), party("Notary"));
        proposal.inputs.push(outstanding(1));
        assert_eq!(rule_of(validate(&proposal)), Some("no_inputs".to_string()));
    }

    #[test]
    fn test_issuance_with_two_outputs_rejected() {
        let proposal = TransactionBuilder::new(Command::Issue, party("Notary"))
            .add_output(ObligationState::new(1, party("PartyA"), party("PartyB")))
            .add_output(ObligationState::new(2, party("PartyA"), party("PartyB")))
            .build();
        assert_eq!(rule_of(validate(&proposal)), Some("single_output".to_string()));
    }

    #[test]
    fn test_issuance_with_no_outputs_rejected() {
        let proposal = TransactionBuilder::new(Command::Issue, party("Notary")).build();
        assert_eq!(rule_of(validate(&proposal)), Some("single_output".to_string()));
    }

    #[test]
    fn test_negative_value_checked_after_party_rules() {
        let a = party("PartyA");
        let proposal = build(-5, a.clone(), a, party("Notary"));
        assert_eq!(rule_of(validate(&proposal)), Some("distinct_parties".to_string()));
    }

    #[test]
    fn test_valid_settlement() {
        let proposal = build_settlement(outstanding(10), party("Notary"));
        assert!(validate(&proposal).is_ok());
    }

    #[test]
    fn test_settlement_with_output_rejected() {
        let proposal = TransactionBuilder::new(Command::Settle, party("Notary"))
            .add_input(outstanding(10))
            .add_output(ObligationState::new(5, party("PartyA"), party("PartyB")))
            .build();
        assert_eq!(rule_of(validate(&proposal)), Some("no_outputs".to_string()));
    }

    #[test]
    fn test_settlement_without_input_rejected() {
        let proposal = TransactionBuilder::new(Command::Settle, party("Notary")).build();
        assert_eq!(rule_of(validate(&proposal)), Some("single_input".to_string()));
    }

    #[test]
    fn test_settlement_missing_signer_rejected() {
        let mut proposal = build_settlement(outstanding(10), party("Notary"));
        proposal.required_signers.remove(&party("PartyB").key);
        assert_eq!(rule_of(validate(&proposal)), Some("participants_sign".to_string()));
    }

    #[test]
    fn test_validation_is_deterministic() {
        let proposal = build(-1, party("PartyA"), party("PartyB"), party("Notary"));
        assert_eq!(validate(&proposal), validate(&proposal.clone()));
    }

    #[test]
    fn test_registry_lookup() {
        assert_eq!(
            ContractRegistry::lookup(ContractId::Obligation).id(),
            ContractId::Obligation
        );
        assert_eq!(
            ContractRegistry::for_state(StateType::Obligation).id(),
            ContractId::Obligation
        );
    }
}
