//! Proposal Lifecycle
//!
//! A proposal is an ordered batch of actions plus the metadata needed to submit it
//! to a GovernorAlpha-style governor.
//!
//! # Features
//! - Local lifecycle tracking (`UNSUBMITTED -> SIMULATED -> SUBMITTED`)
//! - Dry-run before submission so reverts surface before local state changes
//! - Vote / queue / execute against the submitted proposal
//! - Fast and full simulation on a local chain
//! - Loading an existing proposal from the governor and producing a report

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::chain::{confirm, ChainControl};
use super::governance::{contract_name, GovernanceClient};
use super::simulation::{SimulationEngine, SimulationOutcome, SimulationSettings};
use crate::codec;
use crate::error::{ProposalError, Result};
use crate::models::{
    Action, ActionReport, ProposalReport, ProposalState, RemoteProposalState, RemoteSummary,
};

pub const DEFAULT_MAX_ACTIONS: usize = 10;

/// GovernorAlpha only emits the description in `ProposalCreated` and never stores it,
/// so loaded proposals carry this placeholder.
pub const UNLOADED_DESCRIPTION: &str = "<description not loaded>";

pub struct Proposal {
    id: U256,
    proposer: Option<Address>,
    description: String,
    actions: Vec<Action>,
    state: ProposalState,
    max_actions: usize,
    governor: Arc<dyn GovernanceClient>,
    chain: Arc<dyn ChainControl>,
    settings: SimulationSettings,
    last_simulation: Option<SimulationOutcome>,
}

impl std::fmt::Debug for Proposal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proposal")
            .field("id", &self.id)
            .field("proposer", &self.proposer)
            .field("description", &self.description)
            .field("actions", &self.actions.len())
            .field("state", &self.state)
            .field("governor", &self.governor.address())
            .finish()
    }
}

impl Proposal {
    pub(crate) fn new(
        governor: Arc<dyn GovernanceClient>,
        chain: Arc<dyn ChainControl>,
        settings: SimulationSettings,
        max_actions: usize,
    ) -> Self {
        Self {
            id: U256::ZERO,
            proposer: None,
            description: String::new(),
            actions: Vec::new(),
            state: ProposalState::Unsubmitted,
            max_actions,
            governor,
            chain,
            settings,
            last_simulation: None,
        }
    }

    /// Fetch an existing proposal from the governor.
    ///
    /// # Arguments
    /// * `governor` - Governor the proposal was submitted to
    /// * `chain` - Chain used for confirmations and report lookups
    /// * `settings` - Simulation settings carried by the returned proposal
    /// * `id` - Remote proposal id
    pub async fn load(
        governor: Arc<dyn GovernanceClient>,
        chain: Arc<dyn ChainControl>,
        settings: SimulationSettings,
        id: U256,
    ) -> Result<Self> {
        if id.is_zero() {
            return Err(ProposalError::ProposalNotFound { id });
        }

        let details = governor.proposal_details(id).await?;
        if details.id != id {
            return Err(ProposalError::ProposalNotFound { id });
        }

        let actions = governor
            .proposal_actions(id)
            .await?
            .into_iter()
            .map(codec::decode_raw_action)
            .collect::<Result<Vec<_>>>()?;

        info!(
            proposal_id = %id,
            proposer = %details.proposer,
            actions = actions.len(),
            "Loaded proposal"
        );

        Ok(Self {
            id,
            proposer: Some(details.proposer),
            description: UNLOADED_DESCRIPTION.to_string(),
            max_actions: actions.len().max(DEFAULT_MAX_ACTIONS),
            actions,
            state: ProposalState::Submitted,
            governor,
            chain,
            settings,
            last_simulation: None,
        })
    }

    /// Remote id, zero until the proposal is submitted
    pub fn id(&self) -> U256 {
        self.id
    }

    pub fn proposer(&self) -> Option<Address> {
        self.proposer
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn state(&self) -> ProposalState {
        self.state
    }

    pub fn max_actions(&self) -> usize {
        self.max_actions
    }

    pub fn governor(&self) -> &Arc<dyn GovernanceClient> {
        &self.governor
    }

    pub fn last_simulation(&self) -> Option<&SimulationOutcome> {
        self.last_simulation.as_ref()
    }

    pub fn set_proposer(&mut self, proposer: Address) {
        self.proposer = Some(proposer);
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> Result<()> {
        self.ensure_mutable()?;
        self.description = description.into();
        Ok(())
    }

    /// Append an action; it runs after every action already present.
    pub fn add_action(&mut self, action: Action) -> Result<()> {
        self.ensure_mutable()?;
        if self.actions.len() >= self.max_actions {
            return Err(ProposalError::TooManyActions {
                max: self.max_actions,
            });
        }

        debug!(
            index = self.actions.len(),
            target = %action.target(),
            signature = action.signature(),
            "Action added to proposal"
        );
        self.actions.push(action);
        Ok(())
    }

    /// Submit the proposal to the governor.
    ///
    /// The submission is dry-run first; only a successful dry-run is followed by
    /// the real transaction. Once the node accepts that transaction the proposal
    /// holds its id and is SUBMITTED, even if the receipt does not arrive in time:
    /// the governor may already have created it. Only a receipt with a failed
    /// status returns the proposal to its earlier state.
    ///
    /// # Arguments
    /// * `proposer` - Sender of the proposal, defaults to the stored proposer
    ///
    /// # Returns
    /// The id assigned by the governor
    pub async fn propose(&mut self, proposer: Option<Address>) -> Result<U256> {
        self.ensure_mutable()?;
        let proposer = proposer.or(self.proposer).ok_or(ProposalError::NoProposer)?;

        let id = self
            .governor
            .propose_call(proposer, &self.actions, &self.description)
            .await?;
        let hash = self
            .governor
            .propose(proposer, &self.actions, &self.description)
            .await?;

        let previous = self.state;
        self.id = id;
        self.advance(ProposalState::Submitted);

        match confirm(self.chain.as_ref(), hash).await {
            Ok(_) => {}
            Err(ProposalError::TransactionFailed { hash }) => {
                // Reverted on-chain, so the governor holds no proposal under this id
                self.id = U256::ZERO;
                self.state = previous;
                warn!(proposal_id = %id, tx_hash = %hash, "Proposal transaction failed");
                return Err(ProposalError::TransactionFailed { hash });
            }
            Err(ProposalError::Remote(source)) => {
                warn!(
                    proposal_id = %id,
                    tx_hash = %hash,
                    error = %source,
                    "Proposal sent but not confirmed"
                );
                return Err(ProposalError::SubmissionUnconfirmed { id, hash, source });
            }
            Err(e) => return Err(e),
        }

        info!(
            proposal_id = %id,
            proposer = %proposer,
            tx_hash = %hash,
            actions = self.actions.len(),
            "Proposal submitted"
        );
        Ok(id)
    }

    /// Cast a vote; the remote proposal must be active.
    pub async fn vote(&self, signer: Address, support: bool) -> Result<()> {
        self.ensure_submitted("vote")?;

        let state = self.governor.state(self.id).await?;
        if !state.is_active() {
            return Err(ProposalError::ProposalNotActive { state });
        }

        let hash = self.governor.cast_vote(signer, self.id, support).await?;
        confirm(self.chain.as_ref(), hash).await?;

        info!(
            proposal_id = %self.id,
            voter = %signer,
            support = support,
            "Vote cast"
        );
        Ok(())
    }

    pub async fn queue(&self, signer: Option<Address>) -> Result<()> {
        self.ensure_submitted("queue")?;
        let signer = self.signer(signer)?;

        let hash = self.governor.queue(signer, self.id).await?;
        confirm(self.chain.as_ref(), hash).await?;

        info!(proposal_id = %self.id, signer = %signer, "Proposal queued");
        Ok(())
    }

    pub async fn execute(&self, signer: Option<Address>) -> Result<()> {
        self.ensure_submitted("execute")?;
        let signer = self.signer(signer)?;

        let hash = self.governor.execute(signer, self.id).await?;
        confirm(self.chain.as_ref(), hash).await?;

        info!(proposal_id = %self.id, signer = %signer, "Proposal executed");
        Ok(())
    }

    /// Current state of the proposal on the governor
    pub async fn remote_state(&self) -> Result<RemoteProposalState> {
        self.ensure_submitted("read remote state")?;
        self.governor.state(self.id).await
    }

    /// Rehearse the proposal on the local chain.
    ///
    /// # Arguments
    /// * `full` - Replay propose/vote/queue/execute instead of driving the timelock directly
    /// * `force` - Run again even if the proposal was already simulated
    pub async fn simulate(&mut self, full: bool, force: bool) -> Result<SimulationOutcome> {
        match self.state {
            ProposalState::Submitted => {
                return Err(ProposalError::AlreadySubmitted { id: self.id })
            }
            ProposalState::Simulated if !force => return Err(ProposalError::AlreadySimulated),
            _ => {}
        }

        let engine = SimulationEngine::new(
            self.chain.clone(),
            self.governor.clone(),
            self.settings.clone(),
        );

        let outcome = if full {
            let proposer = self.proposer.ok_or(ProposalError::NoProposer)?;
            engine
                .full_simulate(&self.actions, proposer, &self.description)
                .await?
        } else {
            engine.simulate(&self.actions).await?
        };

        self.advance(ProposalState::Simulated);
        self.last_simulation = Some(outcome.clone());
        Ok(outcome)
    }

    /// Structured description of the proposal and, once submitted, its on-chain status
    pub async fn info(&self) -> Result<ProposalReport> {
        let remote = if self.state == ProposalState::Submitted {
            let details = self.governor.proposal_details(self.id).await?;
            let state = self.governor.state(self.id).await?;
            let token = match self.governor.voting_token() {
                Some(_) => Some(self.governor.token_info().await?),
                None => None,
            };

            Some(RemoteSummary {
                state,
                for_votes: details.for_votes,
                against_votes: details.against_votes,
                end_block: details.end_block,
                eta: eta_datetime(details.eta),
                token,
            })
        } else {
            None
        };

        let mut actions = Vec::with_capacity(self.actions.len());
        for (index, action) in self.actions.iter().enumerate() {
            actions.push(ActionReport {
                index,
                target: action.target(),
                target_name: contract_name(self.chain.as_ref(), action.target()).await,
                value: action.value(),
                signature: action.signature().to_string(),
                args: action.display_args(),
            });
        }

        Ok(ProposalReport {
            id: self.id,
            description: self.description.clone(),
            state: self.state,
            remote,
            actions,
        })
    }

    fn advance(&mut self, next: ProposalState) {
        debug_assert!(self.state.can_transition_to(&next));
        debug!(from = %self.state, to = %next, "Proposal state transition");
        self.state = next;
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(ProposalError::AlreadySubmitted { id: self.id });
        }
        Ok(())
    }

    fn ensure_submitted(&self, operation: &'static str) -> Result<()> {
        if self.state != ProposalState::Submitted {
            return Err(ProposalError::NotSubmitted { operation });
        }
        Ok(())
    }

    fn signer(&self, signer: Option<Address>) -> Result<Address> {
        signer.or(self.proposer).ok_or(ProposalError::NoSigner)
    }
}

fn eta_datetime(eta: U256) -> Option<DateTime<Utc>> {
    if eta.is_zero() {
        return None;
    }
    let secs = i64::try_from(eta).ok()?;
    DateTime::from_timestamp(secs, 0)
}
