use alloy_primitives::{Address, B256, U256};
use std::fmt;
use thiserror::Error;

use crate::models::RemoteProposalState;
use crate::service::rpc::ChainError;

pub type Result<T, E = ProposalError> = std::result::Result<T, E>;

/// Coarse classification of [`ProposalError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigurationMissing,
    LifecycleViolation,
    ArityMismatch,
    CapacityExceeded,
    Codec,
    RemoteRevert,
    Transport,
    QuorumInsufficient,
    ExecutionDiagnosisFailure,
    ExecutionFailed,
}

#[derive(Debug, Error)]
pub enum ProposalError {
    #[error("Proposal has no governor")]
    NoGovernor,

    #[error("Proposal has no voting token")]
    NoVotingToken,

    #[error("Proposal has no proposer")]
    NoProposer,

    #[error("Proposal has no signer")]
    NoSigner,

    #[error("Proposal has not been submitted yet, cannot {operation}")]
    NotSubmitted { operation: &'static str },

    #[error("Proposal has already been submitted with id {id}")]
    AlreadySubmitted { id: U256 },

    #[error("Proposal has already been simulated")]
    AlreadySimulated,

    #[error("Governor has no proposal with id {id}")]
    ProposalNotFound { id: U256 },

    #[error("Proposal is not in an active state, received {state}")]
    ProposalNotActive { state: RemoteProposalState },

    #[error("Proposal has too many actions (max {max})")]
    TooManyActions { max: usize },

    #[error("Arguments length do not match signature: {method} expects {expected}, received {actual}")]
    ArityMismatch {
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown method: {method}")]
    UnknownMethod { method: String },

    #[error("Ambiguous method {method}, use one of: {}", .candidates.join(", "))]
    AmbiguousMethod {
        method: String,
        candidates: Vec<String>,
    },

    #[error("Invalid function signature {signature}: {reason}")]
    InvalidSignature { signature: String, reason: String },

    #[error("ABI codec error: {0}")]
    Codec(#[from] alloy_dyn_abi::Error),

    #[error("Decoded arguments for {signature} do not match the supplied arguments")]
    RoundTripMismatch { signature: String },

    #[error("Proposer holds {votes} votes, below the quorum of {quorum}")]
    NotEnoughVotes { votes: U256, quorum: U256 },

    #[error(transparent)]
    Remote(#[from] ChainError),

    #[error("Transaction {hash} was mined with a failed status")]
    TransactionFailed { hash: B256 },

    #[error("Proposal {id} was sent in transaction {hash} but is not confirmed yet: {source}")]
    SubmissionUnconfirmed {
        id: U256,
        hash: B256,
        source: ChainError,
    },

    #[error("{0}")]
    ActionReverted(Box<ActionDiagnosis>),

    #[error("Action {index} failed (transaction {hash})")]
    ActionFailed { index: usize, hash: B256 },
}

impl ProposalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProposalError::NoGovernor
            | ProposalError::NoVotingToken
            | ProposalError::NoProposer
            | ProposalError::NoSigner => ErrorKind::ConfigurationMissing,
            ProposalError::NotSubmitted { .. }
            | ProposalError::AlreadySubmitted { .. }
            | ProposalError::AlreadySimulated
            | ProposalError::ProposalNotFound { .. }
            | ProposalError::ProposalNotActive { .. } => ErrorKind::LifecycleViolation,
            ProposalError::TooManyActions { .. } => ErrorKind::CapacityExceeded,
            ProposalError::ArityMismatch { .. } => ErrorKind::ArityMismatch,
            ProposalError::UnknownMethod { .. }
            | ProposalError::AmbiguousMethod { .. }
            | ProposalError::InvalidSignature { .. }
            | ProposalError::Codec(_)
            | ProposalError::RoundTripMismatch { .. } => ErrorKind::Codec,
            ProposalError::NotEnoughVotes { .. } => ErrorKind::QuorumInsufficient,
            ProposalError::Remote(err) if err.is_revert() => ErrorKind::RemoteRevert,
            ProposalError::Remote(_) | ProposalError::SubmissionUnconfirmed { .. } => {
                ErrorKind::Transport
            }
            ProposalError::TransactionFailed { .. } | ProposalError::ActionFailed { .. } => {
                ErrorKind::ExecutionFailed
            }
            ProposalError::ActionReverted(_) => ErrorKind::ExecutionDiagnosisFailure,
        }
    }

    pub fn is_revert(&self) -> bool {
        matches!(self, ProposalError::Remote(err) if err.is_revert())
    }

    /// Revert reason carried by a remote revert, if any.
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            ProposalError::Remote(err) => err.revert_reason(),
            _ => None,
        }
    }
}

/// Composite report for an action that reverted while executing through the timelock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDiagnosis {
    pub index: usize,
    pub target: Address,
    pub signature: String,
    pub args: Vec<String>,
    /// Reason reported by the timelock's `executeTransaction`.
    pub timelock_reason: Option<String>,
    /// Reason reported by the target when called directly with the timelock as sender.
    pub target_reason: Option<String>,
}

impl fmt::Display for ActionDiagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Proposal action {} failed.", self.index)?;
        writeln!(f, "  Target: {}", self.target)?;
        writeln!(f, "  Signature: {}", self.signature)?;
        writeln!(f, "  Args: [{}]", self.args.join(", "))?;
        writeln!(
            f,
            "  Timelock revert message: {}",
            self.timelock_reason.as_deref().unwrap_or("<none>")
        )?;
        write!(
            f,
            "  Contract revert message: {}",
            self.target_reason.as_deref().unwrap_or("<none>")
        )
    }
}
