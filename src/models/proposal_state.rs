use serde::{Deserialize, Serialize};
use std::fmt;

/// Local lifecycle of a proposal - tracked by this crate, never by the chain
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalState {
    Unsubmitted,
    Simulated,
    Submitted,
}

impl ProposalState {
    /// Check if transition to another state is valid
    pub fn can_transition_to(&self, to: &ProposalState) -> bool {
        match (self, to) {
            // UNSUBMITTED -> SIMULATED or SUBMITTED
            (ProposalState::Unsubmitted, ProposalState::Simulated) => true,
            (ProposalState::Unsubmitted, ProposalState::Submitted) => true,
            // SIMULATED -> SUBMITTED
            (ProposalState::Simulated, ProposalState::Submitted) => true,
            // Forced re-simulation
            (ProposalState::Simulated, ProposalState::Simulated) => true,
            _ => false,
        }
    }

    /// Get all valid next states from current state
    pub fn valid_next_states(&self) -> Vec<ProposalState> {
        match self {
            ProposalState::Unsubmitted => {
                vec![ProposalState::Simulated, ProposalState::Submitted]
            }
            ProposalState::Simulated => vec![ProposalState::Simulated, ProposalState::Submitted],
            ProposalState::Submitted => vec![], // Terminal state
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProposalState::Submitted)
    }
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProposalState::Unsubmitted => write!(f, "UNSUBMITTED"),
            ProposalState::Simulated => write!(f, "SIMULATED"),
            ProposalState::Submitted => write!(f, "SUBMITTED"),
        }
    }
}

/// Proposal state as reported by the governor contract's `state(uint256)`.
///
/// Polled, never cached: the chain is the only authority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteProposalState {
    Pending,
    Active,
    Canceled,
    Defeated,
    Succeeded,
    Queued,
    Expired,
    Executed,
}

impl RemoteProposalState {
    pub fn is_active(&self) -> bool {
        matches!(self, RemoteProposalState::Active)
    }

    pub fn is_final(&self) -> bool {
        matches!(
            self,
            RemoteProposalState::Canceled
                | RemoteProposalState::Defeated
                | RemoteProposalState::Expired
                | RemoteProposalState::Executed
        )
    }
}

impl TryFrom<u8> for RemoteProposalState {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let state = match value {
            0 => RemoteProposalState::Pending,
            1 => RemoteProposalState::Active,
            2 => RemoteProposalState::Canceled,
            3 => RemoteProposalState::Defeated,
            4 => RemoteProposalState::Succeeded,
            5 => RemoteProposalState::Queued,
            6 => RemoteProposalState::Expired,
            7 => RemoteProposalState::Executed,
            other => return Err(other),
        };
        Ok(state)
    }
}

impl From<RemoteProposalState> for u8 {
    fn from(state: RemoteProposalState) -> Self {
        state as u8
    }
}

impl fmt::Display for RemoteProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteProposalState::Pending => write!(f, "PENDING"),
            RemoteProposalState::Active => write!(f, "ACTIVE"),
            RemoteProposalState::Canceled => write!(f, "CANCELED"),
            RemoteProposalState::Defeated => write!(f, "DEFEATED"),
            RemoteProposalState::Succeeded => write!(f, "SUCCEEDED"),
            RemoteProposalState::Queued => write!(f, "QUEUED"),
            RemoteProposalState::Expired => write!(f, "EXPIRED"),
            RemoteProposalState::Executed => write!(f, "EXECUTED"),
        }
    }
}
