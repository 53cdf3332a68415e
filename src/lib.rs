//! Build, rehearse and submit GovernorAlpha proposals.
//!
//! Proposals are assembled with [`ProposalBuilder`], rehearsed on a local
//! Hardhat-compatible chain with [`Proposal::simulate`] and then submitted and
//! driven through voting, queueing and execution.

pub mod codec;
pub mod config;
pub mod error;
pub mod models;
pub mod service;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing;

pub use codec::ContractHandle;
pub use error::{ErrorKind, ProposalError, Result};
pub use models::{Action, ProposalReport, ProposalState, RawAction, RemoteProposalState};
pub use service::{
    ContractRef, GovernanceClient, GovernorAlphaClient, HardhatChain, Proposal, ProposalBuilder,
    SimulationOutcome, SimulationSettings,
};
