use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ProposalState, RemoteProposalState};

/// Voting token metadata used to scale vote counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub name: String,
    pub decimals: u8,
}

/// Proposal record as stored by the governor's `proposals(uint256)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalDetails {
    pub id: U256,
    pub proposer: Address,
    pub eta: U256,
    pub start_block: U256,
    pub end_block: U256,
    pub for_votes: U256,
    pub against_votes: U256,
    pub canceled: bool,
    pub executed: bool,
}

/// Structured view of a proposal, ready for any renderer
#[derive(Debug, Clone, Serialize)]
pub struct ProposalReport {
    pub id: U256,
    pub description: String,
    pub state: ProposalState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteSummary>,
    pub actions: Vec<ActionReport>,
}

/// On-chain status of a submitted proposal
#[derive(Debug, Clone, Serialize)]
pub struct RemoteSummary {
    pub state: RemoteProposalState,
    pub for_votes: U256,
    pub against_votes: U256,
    pub end_block: U256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionReport {
    pub index: usize,
    pub target: Address,
    /// Result of calling `name()` on the target, when it has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    pub value: U256,
    pub signature: String,
    pub args: Vec<String>,
}
