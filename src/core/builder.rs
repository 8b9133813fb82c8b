//! Transaction builder
//!
//! Assembles unsigned proposals. The builder never judges the values it is
//! given: a zero or negative obligation is built just like a valid one, and it
//! is the contract, run independently by every party, that refuses it.

use crate::types::{Command, ContractId, ObligationState, Party, Proposal, StateAndRef};

/// Incremental proposal construction
///
/// Required signers are derived from every participant of every input and
/// output when [`TransactionBuilder::build`] is called.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    command: Command,
    notary: Party,
    inputs: Vec<StateAndRef>,
    outputs: Vec<ObligationState>,
    salt: Option<[u8; 16]>,
}

impl TransactionBuilder {
    pub fn new(command: Command, notary: Party) -> Self {
        TransactionBuilder {
            command,
            notary,
            inputs: Vec::new(),
            outputs: Vec::new(),
            salt: None,
        }
    }

    pub fn add_input(mut self, input: StateAndRef) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn add_output(mut self, state: ObligationState) -> Self {
        self.outputs.push(state);
        self
    }

    /// Fix the privacy salt instead of drawing a random one
    pub fn with_salt(mut self, salt: [u8; 16]) -> Self {
        self.salt = Some(salt);
        self
    }

    pub fn build(self) -> Proposal {
        let required_signers = self
            .inputs
            .iter()
            .map(|input| &input.state)
            .chain(self.outputs.iter())
            .flat_map(|state| state.participants())
            .map(|party| party.key)
            .collect();

        Proposal {
            inputs: self.inputs,
            outputs: self.outputs,
            command: self.command,
            contract: ContractId::Obligation,
            required_signers,
            notary: self.notary,
            salt: self.salt.unwrap_or_else(rand::random),
        }
    }
}

/// Build an issuance proposal for `value` owed by `borrower` to `lender`
pub fn build(value: i64, lender: Party, borrower: Party, notary: Party) -> Proposal {
    TransactionBuilder::new(Command::Issue, notary)
        .add_output(ObligationState::new(value, lender, borrower))
        .build()
}

/// Build a proposal consuming `input` and producing nothing
pub fn build_settlement(input: StateAndRef, notary: Party) -> Proposal {
    TransactionBuilder::new(Command::Settle, notary)
        .add_input(input)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{KeyPair, TxHash};
    use crate::types::StateRef;

    fn party(name: &str) -> Party {
        let keys = KeyPair::from_seed(blake3::hash(name.as_bytes()).as_bytes());
        Party::new(name, keys.public_key())
    }

    #[test]
    fn test_build_issuance_shape() {
        let lender = party("PartyA");
        let borrower = party("PartyB");
        let proposal = build(1, lender.clone(), borrower.clone(), party("Notary"));

        assert!(proposal.inputs.is_empty());
        assert_eq!(proposal.outputs.len(), 1);
        assert_eq!(proposal.outputs[0].value, 1);
        assert_eq!(proposal.outputs[0].lender, lender);
        assert_eq!(proposal.outputs[0].borrower, borrower);
        assert_eq!(proposal.command, Command::Issue);
        assert_eq!(proposal.contract, ContractId::Obligation);
        assert_eq!(
            proposal.required_signers,
            [lender.key, borrower.key].into_iter().collect()
        );
    }

    #[test]
    fn test_builder_accepts_non_positive_values() {
        for value in [0, -1, i64::MIN] {
            let proposal = build(value, party("PartyA"), party("PartyB"), party("Notary"));
            assert_eq!(proposal.outputs[0].value, value);
        }
    }

    #[test]
    fn test_builder_accepts_same_party_twice() {
        let a = party("PartyA");
        let proposal = build(5, a.clone(), a.clone(), party("Notary"));
        assert_eq!(proposal.required_signers.len(), 1);
    }

    #[test]
    fn test_settlement_signers_come_from_input() {
        let lender = party("PartyA");
        let borrower = party("PartyB");
        let input = StateAndRef {
            state: ObligationState::new(10, lender.clone(), borrower.clone()),
            state_ref: StateRef {
                tx_id: TxHash([9; 32]),
                index: 0,
            },
        };
        let proposal = build_settlement(input.clone(), party("Notary"));

        assert_eq!(proposal.inputs, vec![input]);
        assert!(proposal.outputs.is_empty());
        assert_eq!(proposal.command, Command::Settle);
        assert!(proposal.required_signers.contains(&lender.key));
        assert!(proposal.required_signers.contains(&borrower.key));
    }

    #[test]
    fn test_salt_distinguishes_identical_intents() {
        let a = TransactionBuilder::new(Command::Issue, party("Notary"))
            .add_output(ObligationState::new(1, party("PartyA"), party("PartyB")));
        let first = a.clone().with_salt([1; 16]).build();
        let second = a.clone().with_salt([2; 16]).build();
        let again = a.with_salt([1; 16]).build();

        assert_ne!(first.id().unwrap(), second.id().unwrap());
        assert_eq!(first.id().unwrap(), again.id().unwrap());
    }
}
