//! Protocol stages of the signature-collection state machine
//!
//! An agreement advances strictly through its role's path of stages. The
//! initiator walks
//!
//! ```text
//! BUILT → LOCALLY_VALIDATED → INITIATOR_SIGNED → SENT → COUNTERPARTY_SIGNED
//!       → MERGED → FINALIZING → RECORDED
//! ```
//!
//! while the acceptor, whose flow starts when a proposal arrives, walks
//!
//! ```text
//! SENT → COUNTERPARTY_VALIDATED → COUNTERPARTY_SIGNED → FINALIZING → RECORDED
//! ```
//!
//! Either role may end in `REJECTED` from any non-terminal stage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A step of the agreement protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolStage {
    Built,
    LocallyValidated,
    InitiatorSigned,
    Sent,
    CounterpartyValidated,
    CounterpartySigned,
    Merged,
    Finalizing,
    Recorded,
}

impl fmt::Display for ProtocolStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolStage::Built => "BUILT",
            ProtocolStage::LocallyValidated => "LOCALLY_VALIDATED",
            ProtocolStage::InitiatorSigned => "INITIATOR_SIGNED",
            ProtocolStage::Sent => "SENT",
            ProtocolStage::CounterpartyValidated => "COUNTERPARTY_VALIDATED",
            ProtocolStage::CounterpartySigned => "COUNTERPARTY_SIGNED",
            ProtocolStage::Merged => "MERGED",
            ProtocolStage::Finalizing => "FINALIZING",
            ProtocolStage::Recorded => "RECORDED",
        };
        f.write_str(name)
    }
}

/// Which side of the agreement a flow plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowRole {
    Initiator,
    Acceptor,
}

impl FlowRole {
    /// Ordered stages this role passes through
    pub fn path(self) -> &'static [ProtocolStage] {
        use ProtocolStage::*;
        match self {
            FlowRole::Initiator => &[
                Built,
                LocallyValidated,
                InitiatorSigned,
                Sent,
                CounterpartySigned,
                Merged,
                Finalizing,
                Recorded,
            ],
            FlowRole::Acceptor => &[
                Sent,
                CounterpartyValidated,
                CounterpartySigned,
                Finalizing,
                Recorded,
            ],
        }
    }

    /// First stage of this role
    pub fn entry(self) -> ProtocolStage {
        self.path()[0]
    }

    /// Stage that must follow `stage`, if any
    pub fn successor(self, stage: ProtocolStage) -> Option<ProtocolStage> {
        let path = self.path();
        path.iter()
            .position(|s| *s == stage)
            .and_then(|i| path.get(i + 1).copied())
    }
}

/// Current state of a flow: an active stage or a terminal rejection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolState {
    Active(ProtocolStage),
    Rejected {
        /// Stage at which the flow was rejected
        stage: ProtocolStage,
        /// Why the flow stopped
        reason: String,
    },
}

impl ProtocolState {
    /// Stage the flow is in, or was in when rejected
    pub fn stage(&self) -> ProtocolStage {
        match self {
            ProtocolState::Active(stage) => *stage,
            ProtocolState::Rejected { stage, .. } => *stage,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProtocolState::Active(ProtocolStage::Recorded) | ProtocolState::Rejected { .. }
        )
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, ProtocolState::Rejected { .. })
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolState::Active(stage) => write!(f, "{}", stage),
            ProtocolState::Rejected { stage, reason } => {
                write!(f, "REJECTED at {}: {}", stage, reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::initiator_start(FlowRole::Initiator, ProtocolStage::Built, Some(ProtocolStage::LocallyValidated))]
    #[case::initiator_after_send(FlowRole::Initiator, ProtocolStage::Sent, Some(ProtocolStage::CounterpartySigned))]
    #[case::initiator_end(FlowRole::Initiator, ProtocolStage::Recorded, None)]
    #[case::acceptor_start(FlowRole::Acceptor, ProtocolStage::Sent, Some(ProtocolStage::CounterpartyValidated))]
    #[case::acceptor_after_sign(FlowRole::Acceptor, ProtocolStage::CounterpartySigned, Some(ProtocolStage::Finalizing))]
    #[case::acceptor_foreign_stage(FlowRole::Acceptor, ProtocolStage::Built, None)]
    fn test_successor(
        #[case] role: FlowRole,
        #[case] stage: ProtocolStage,
        #[case] expected: Option<ProtocolStage>,
    ) {
        assert_eq!(role.successor(stage), expected);
    }

    #[test]
    fn test_entry_stages() {
        assert_eq!(FlowRole::Initiator.entry(), ProtocolStage::Built);
        assert_eq!(FlowRole::Acceptor.entry(), ProtocolStage::Sent);
    }

    #[test]
    fn test_terminal_states() {
        assert!(ProtocolState::Active(ProtocolStage::Recorded).is_terminal());
        assert!(ProtocolState::Rejected {
            stage: ProtocolStage::Built,
            reason: "x".to_string()
        }
        .is_terminal());
        assert!(!ProtocolState::Active(ProtocolStage::Sent).is_terminal());
    }

    #[test]
    fn test_display() {
        let state = ProtocolState::Rejected {
            stage: ProtocolStage::LocallyValidated,
            reason: "bad".to_string(),
        };
        assert_eq!(state.to_string(), "REJECTED at LOCALLY_VALIDATED: bad");
    }
}
