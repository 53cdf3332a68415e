//! Simulation Engine
//!
//! Runs a proposal's actions against a local development chain before submission.
//!
//! # Features
//! - Fast path: impersonates the governor, queues every action on the timelock,
//!   jumps the clock past the timelock delay and executes each action
//! - Full path: walks the real lifecycle (propose, vote, queue, execute) and mines
//!   through the voting delay and voting period
//! - Failed executions are diagnosed by replaying the call against the target
//!   with the timelock as sender
//! - Chain state changes (impersonation, automine) are undone on every exit path

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use validator::Validate;

use super::chain::{confirm, CallRequest, ChainControl};
use super::governance::GovernanceClient;
use super::rpc::ChainError;
use crate::codec;
use crate::error::{ActionDiagnosis, ProposalError, Result};
use crate::models::{Action, RemoteProposalState};

/// Default buffer added on top of the timelock delay, in seconds
pub const DEFAULT_ETA_MARGIN_SECS: u64 = 50;

/// Balance given to impersonated contracts so they can pay for gas
pub const DEFAULT_IMPERSONATION_BALANCE: U256 = U256::from_limbs([u64::MAX, 0, 0, 0]);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct SimulationSettings {
    #[validate(range(min = 1))]
    pub eta_margin_secs: u64,
    pub impersonation_balance: U256,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            eta_margin_secs: DEFAULT_ETA_MARGIN_SECS,
            impersonation_balance: DEFAULT_IMPERSONATION_BALANCE,
        }
    }
}

/// What a successful simulation did on the local chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationOutcome {
    /// Timestamp the actions were executed against
    pub eta: u64,
    /// Hashes of the transactions that carried out the actions
    pub transactions: Vec<B256>,
}

/// Chain state to undo once a simulation finishes
#[derive(Debug, Default)]
struct ChainSession {
    impersonated: Vec<Address>,
    automine_disabled: bool,
}

impl ChainSession {
    async fn impersonate(
        &mut self,
        chain: &dyn ChainControl,
        account: Address,
        balance: U256,
    ) -> Result<(), ChainError> {
        chain.impersonate(account).await?;
        self.impersonated.push(account);
        chain.set_balance(account, balance).await
    }

    async fn disable_automine(&mut self, chain: &dyn ChainControl) -> Result<(), ChainError> {
        chain.set_automine(false).await?;
        self.automine_disabled = true;
        Ok(())
    }

    /// Restore automine and release impersonated accounts. Every step is attempted;
    /// the first failure is returned.
    async fn release(self, chain: &dyn ChainControl) -> Result<(), ChainError> {
        let mut first_error = None;

        if self.automine_disabled {
            if let Err(e) = chain.set_automine(true).await {
                first_error.get_or_insert(e);
            }
        }

        for account in self.impersonated {
            if let Err(e) = chain.stop_impersonating(account).await {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

pub struct SimulationEngine {
    chain: Arc<dyn ChainControl>,
    governor: Arc<dyn GovernanceClient>,
    settings: SimulationSettings,
}

impl SimulationEngine {
    pub fn new(
        chain: Arc<dyn ChainControl>,
        governor: Arc<dyn GovernanceClient>,
        settings: SimulationSettings,
    ) -> Self {
        Self {
            chain,
            governor,
            settings,
        }
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    /// Execute `actions` through the timelock as if the governor had queued them.
    ///
    /// # Arguments
    /// * `actions` - Actions in proposal order
    ///
    /// # Returns
    /// The eta used and the hashes of the execution transactions. A reverting action
    /// yields [`ProposalError::ActionReverted`] with both revert reasons.
    pub async fn simulate(&self, actions: &[Action]) -> Result<SimulationOutcome> {
        let mut session = ChainSession::default();
        let result = self.run_fast(actions, &mut session).await;
        let cleanup = session.release(self.chain.as_ref()).await;

        match (result, cleanup) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup_error)) => {
                warn!(
                    error = %cleanup_error,
                    "Failed to restore chain state after simulation error"
                );
                Err(e)
            }
        }
    }

    async fn run_fast(
        &self,
        actions: &[Action],
        session: &mut ChainSession,
    ) -> Result<SimulationOutcome> {
        let chain = self.chain.as_ref();
        let governor = self.governor.address();
        let balance = self.settings.impersonation_balance;

        session.impersonate(chain, governor, balance).await?;
        let timelock = self.governor.timelock_address().await?;
        session.impersonate(chain, timelock, balance).await?;

        let block = chain.latest_block().await?;
        let delay = self.governor.delay().await?;
        let eta = self.eta_after(block.timestamp, delay)?;
        let eta_word = U256::from(eta);

        info!(
            governor = %governor,
            timelock = %timelock,
            actions = actions.len(),
            eta = eta,
            "Starting fast simulation"
        );

        session.disable_automine(chain).await?;

        for action in actions {
            self.governor
                .queue_transaction(governor, action, eta_word)
                .await?;
        }

        // Queued transactions must be mined before the clock reaches eta
        chain.mine_blocks(1).await?;
        chain.mine_block(Some(eta)).await?;

        let mut transactions = Vec::with_capacity(actions.len());
        for (index, action) in actions.iter().enumerate() {
            match self
                .governor
                .execute_transaction(governor, action, eta_word)
                .await
            {
                Ok(hash) => transactions.push(hash),
                Err(e) if e.is_revert() => {
                    return Err(self.diagnose(index, action, timelock, &e).await);
                }
                Err(e) => return Err(e),
            }
        }

        chain.mine_block(None).await?;

        for (index, hash) in transactions.iter().enumerate() {
            match chain.transaction_receipt(*hash).await? {
                Some(receipt) if receipt.success => {}
                _ => {
                    return Err(ProposalError::ActionFailed {
                        index,
                        hash: *hash,
                    })
                }
            }
        }

        info!(eta = eta, executed = transactions.len(), "Fast simulation passed");
        Ok(SimulationOutcome { eta, transactions })
    }

    /// Build the report for an action whose timelock execution reverted
    async fn diagnose(
        &self,
        index: usize,
        action: &Action,
        timelock: Address,
        error: &ProposalError,
    ) -> ProposalError {
        let timelock_reason = error.revert_reason().map(str::to_string);

        let target_reason = match codec::target_call_data(action) {
            Ok(data) => {
                let request = CallRequest::new(timelock, action.target(), data)
                    .with_value(action.value());
                match self.chain.call(&request).await {
                    Err(e) => e.revert_reason().map(str::to_string),
                    Ok(_) => None,
                }
            }
            Err(e) => {
                debug!(index = index, error = %e, "Could not re-encode action for diagnosis");
                None
            }
        };

        warn!(
            index = index,
            target = %action.target(),
            signature = action.signature(),
            timelock_reason = ?timelock_reason,
            target_reason = ?target_reason,
            "Proposal action reverted during simulation"
        );

        ProposalError::ActionReverted(Box::new(ActionDiagnosis {
            index,
            target: action.target(),
            signature: action.signature().to_string(),
            args: action.display_args(),
            timelock_reason,
            target_reason,
        }))
    }

    /// Run the complete governance lifecycle for `actions` on the local chain.
    ///
    /// The proposer must hold at least the quorum in votes, since it is the only voter.
    pub async fn full_simulate(
        &self,
        actions: &[Action],
        proposer: Address,
        description: &str,
    ) -> Result<SimulationOutcome> {
        if self.governor.voting_token().is_none() {
            return Err(ProposalError::NoVotingToken);
        }

        let chain = self.chain.as_ref();

        let quorum = self.governor.quorum_votes().await?;
        let votes = self.governor.current_votes(proposer).await?;
        if votes < quorum {
            return Err(ProposalError::NotEnoughVotes { votes, quorum });
        }

        let id = self
            .governor
            .propose_call(proposer, actions, description)
            .await?;
        let hash = self.governor.propose(proposer, actions, description).await?;
        confirm(chain, hash).await?;
        info!(proposal_id = %id, proposer = %proposer, "Full simulation: proposal created");

        let voting_delay = self.governor.voting_delay().await?;
        chain.mine_blocks(block_count(voting_delay)? + 1).await?;

        let state = self.governor.state(id).await?;
        if state != RemoteProposalState::Active {
            return Err(ProposalError::ProposalNotActive { state });
        }
        let hash = self.governor.cast_vote(proposer, id, true).await?;
        confirm(chain, hash).await?;

        let voting_period = self.governor.voting_period().await?;
        chain.mine_blocks(block_count(voting_period)?).await?;

        let hash = self.governor.queue(proposer, id).await?;
        confirm(chain, hash).await?;

        let block = chain.latest_block().await?;
        let delay = self.governor.delay().await?;
        let eta = self.eta_after(block.timestamp, delay)?;
        chain.mine_block(Some(eta)).await?;

        let hash = self.governor.execute(proposer, id).await?;
        confirm(chain, hash).await?;

        info!(proposal_id = %id, eta = eta, "Full simulation passed");
        Ok(SimulationOutcome {
            eta,
            transactions: vec![hash],
        })
    }

    fn eta_after(&self, timestamp: u64, delay: U256) -> Result<u64> {
        u64::try_from(delay)
            .ok()
            .and_then(|delay| timestamp.checked_add(delay))
            .and_then(|eta| eta.checked_add(self.settings.eta_margin_secs))
            .ok_or_else(|| {
                ChainError::InvalidResponse(format!("timelock delay {delay} is out of range")).into()
            })
    }
}

fn block_count(blocks: U256) -> Result<u64> {
    u64::try_from(blocks).map_err(|_| {
        ChainError::InvalidResponse(format!("block count {blocks} is out of range")).into()
    })
}
