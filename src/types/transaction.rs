//! Transaction-related types for the IOU ledger
//!
//! This module defines the three shapes an agreement takes on its way to the
//! ledger: the unsigned [`Proposal`], the [`SignedArtifact`] collecting
//! signatures over the proposal's canonical hash, and the notarised
//! [`CommittedTransaction`] that participants record.

use crate::crypto::{verify, KeyPair, PublicKey, SignatureBytes, TxHash};
use crate::types::error::LedgerError;
use crate::types::party::Party;
use crate::types::state::{ObligationState, StateAndRef, StateRef, StateType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Reference to the validation rules governing a transition
///
/// A closed set: adding a rule set means adding a variant and a registry arm,
/// never loading code by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractId {
    Obligation,
}

impl ContractId {
    /// State type whose transitions this contract governs
    pub fn state_type(self) -> StateType {
        match self {
            ContractId::Obligation => StateType::Obligation,
        }
    }
}

/// Intent of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Create a new obligation from nothing
    Issue,

    /// Extinguish an existing obligation
    Settle,
}

/// An unsigned transaction
///
/// Field order is part of the canonical encoding: every party hashes the
/// bincode bytes of this struct, so changing the layout changes every id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Consumed states, in order (empty for issuance)
    pub inputs: Vec<StateAndRef>,

    /// Produced states, in order
    pub outputs: Vec<ObligationState>,

    /// What the transaction is meant to do
    pub command: Command,

    /// Rules that must accept the transition
    pub contract: ContractId,

    /// Identities that must sign before the proposal is finalizable
    pub required_signers: BTreeSet<PublicKey>,

    /// Uniqueness authority that will order this transaction
    pub notary: Party,

    /// Random bytes fixed at build time so identical intents hash differently
    pub salt: [u8; 16],
}

impl Proposal {
    /// Canonical bytes every party hashes and signs over
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        Ok(bincode::serialize(self)?)
    }

    /// Canonical hash of the proposal
    pub fn id(&self) -> Result<TxHash, LedgerError> {
        Ok(TxHash::of_proposal_bytes(&self.canonical_bytes()?))
    }

    /// References of every consumed input, in order
    pub fn input_refs(&self) -> Vec<StateRef> {
        self.inputs.iter().map(|input| input.state_ref).collect()
    }

    /// Every party named in an input or output, deduplicated
    pub fn participants(&self) -> BTreeSet<&Party> {
        self.inputs
            .iter()
            .map(|input| &input.state)
            .chain(self.outputs.iter())
            .flat_map(|state| state.participants())
            .collect()
    }
}

/// A proposal plus the signatures collected so far
///
/// Signature order is irrelevant; completeness is decided by membership of the
/// required signer set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedArtifact {
    pub proposal: Proposal,
    pub signatures: BTreeMap<PublicKey, SignatureBytes>,
}

impl SignedArtifact {
    /// Wrap a proposal with no signatures yet
    pub fn new(proposal: Proposal) -> Self {
        SignedArtifact {
            proposal,
            signatures: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> Result<TxHash, LedgerError> {
        self.proposal.id()
    }

    /// Add `keys`' signature over the proposal hash
    pub fn sign_with(&mut self, keys: &KeyPair) -> Result<TxHash, LedgerError> {
        let id = self.id()?;
        self.signatures.insert(keys.public_key(), keys.sign(&id));
        Ok(id)
    }

    pub fn is_signed_by(&self, key: &PublicKey) -> bool {
        self.signatures.contains_key(key)
    }

    /// Required signers that have not signed yet
    pub fn missing_signers(&self) -> Vec<PublicKey> {
        self.proposal
            .required_signers
            .iter()
            .filter(|key| !self.signatures.contains_key(key))
            .copied()
            .collect()
    }

    /// Fold another party's contribution into this artifact
    ///
    /// Both artifacts must carry byte-identical proposals. A signer present in
    /// both must have produced the same signature.
    pub fn merge(&mut self, other: &SignedArtifact) -> Result<(), LedgerError> {
        if other.proposal != self.proposal {
            return Err(LedgerError::verification(
                "counterparty returned a different proposal",
            ));
        }
        for (key, signature) in &other.signatures {
            match self.signatures.get(key) {
                Some(existing) if existing != signature => {
                    return Err(LedgerError::verification(format!(
                        "conflicting signatures from {}",
                        key
                    )));
                }
                Some(_) => {}
                None => {
                    self.signatures.insert(*key, *signature);
                }
            }
        }
        Ok(())
    }

    /// Check every present signature and return the proposal hash
    ///
    /// A signature from a key outside the required signer set is rejected, as
    /// is any signature that does not verify over the recomputed hash.
    pub fn verify_signatures(&self) -> Result<TxHash, LedgerError> {
        let id = self.id()?;
        for (key, signature) in &self.signatures {
            if !self.proposal.required_signers.contains(key) {
                return Err(LedgerError::verification(format!(
                    "signature from {} who is not a required signer",
                    key
                )));
            }
            if !verify(signature, &id, key) {
                return Err(LedgerError::verification(format!(
                    "signature from {} does not match transaction {}",
                    key, id
                )));
            }
        }
        Ok(id)
    }

    /// Verify present signatures and require all signers except `allowed_missing`
    pub fn verify_signatures_except(
        &self,
        allowed_missing: &[PublicKey],
    ) -> Result<TxHash, LedgerError> {
        let id = self.verify_signatures()?;
        let missing: Vec<PublicKey> = self
            .missing_signers()
            .into_iter()
            .filter(|key| !allowed_missing.contains(key))
            .collect();
        if !missing.is_empty() {
            let names: Vec<String> = missing.iter().map(|key| key.to_hex()).collect();
            return Err(LedgerError::verification(format!(
                "missing signatures from {}",
                names.join(", ")
            )));
        }
        Ok(id)
    }

    /// Verify present signatures and require every required signer
    pub fn verify_complete(&self) -> Result<TxHash, LedgerError> {
        self.verify_signatures_except(&[])
    }
}

/// A fully signed, notarised transaction
///
/// Only values of this type are ever recorded. Construction checks
/// completeness, so a partially signed artifact cannot become one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedTransaction {
    pub id: TxHash,
    pub artifact: SignedArtifact,
    pub notary_signature: SignatureBytes,
}

impl CommittedTransaction {
    /// Seal a complete artifact with the notary's signature
    pub fn new(
        artifact: SignedArtifact,
        notary_signature: SignatureBytes,
    ) -> Result<Self, LedgerError> {
        let id = artifact.verify_complete()?;
        let committed = CommittedTransaction {
            id,
            artifact,
            notary_signature,
        };
        committed.verify_notary_signature()?;
        Ok(committed)
    }

    /// Re-check everything a recipient must not take on trust
    pub fn verify(&self) -> Result<(), LedgerError> {
        let id = self.artifact.verify_complete()?;
        if id != self.id {
            return Err(LedgerError::verification(format!(
                "transaction id {} does not match its contents ({})",
                self.id, id
            )));
        }
        self.verify_notary_signature()
    }

    fn verify_notary_signature(&self) -> Result<(), LedgerError> {
        let notary = &self.artifact.proposal.notary;
        if verify(&self.notary_signature, &self.id, &notary.key) {
            Ok(())
        } else {
            Err(LedgerError::verification(format!(
                "notary signature from {} does not match transaction {}",
                notary, self.id
            )))
        }
    }

    pub fn proposal(&self) -> &Proposal {
        &self.artifact.proposal
    }

    /// Outputs paired with the references they are recorded under
    pub fn outputs(&self) -> Vec<StateAndRef> {
        self.proposal()
            .outputs
            .iter()
            .enumerate()
            .map(|(index, state)| StateAndRef {
                state: state.clone(),
                state_ref: StateRef {
                    tx_id: self.id,
                    index: index as u32,
                },
            })
            .collect()
    }
}
