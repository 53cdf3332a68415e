//! Governance Client
//!
//! Call surface for a GovernorAlpha deployment, its Timelock and its voting token.
//! Every method is a single remote round trip and failures are returned verbatim;
//! nothing here retries.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

use super::chain::{CallRequest, ChainControl};
use super::rpc::ChainError;
use crate::error::{ProposalError, Result};
use crate::models::{Action, ProposalDetails, RawAction, RemoteProposalState, TokenInfo};

sol! {
    interface IGovernorAlpha {
        function propose(address[] targets, uint256[] values, string[] signatures, bytes[] calldatas, string description) external returns (uint256);
        function castVote(uint256 proposalId, bool support) external;
        function queue(uint256 proposalId) external;
        function execute(uint256 proposalId) external payable;
        function state(uint256 proposalId) external view returns (uint8);
        function timelock() external view returns (address);
        function votingDelay() external pure returns (uint256);
        function votingPeriod() external pure returns (uint256);
        function quorumVotes() external pure returns (uint256);
        function proposals(uint256 proposalId) external view returns (uint256 id, address proposer, uint256 eta, uint256 startBlock, uint256 endBlock, uint256 forVotes, uint256 againstVotes, bool canceled, bool executed);
        function getActions(uint256 proposalId) external view returns (address[] targets, uint256[] values, string[] signatures, bytes[] calldatas);
    }

    interface ITimelock {
        function delay() external view returns (uint256);
        function queueTransaction(address target, uint256 value, string signature, bytes data, uint256 eta) external returns (bytes32);
        function executeTransaction(address target, uint256 value, string signature, bytes data, uint256 eta) external payable returns (bytes);
    }

    interface IVotingToken {
        function getCurrentVotes(address account) external view returns (uint96);
        function name() external view returns (string);
        function decimals() external view returns (uint8);
    }
}

#[async_trait]
pub trait GovernanceClient: Send + Sync {
    /// Address of the governor contract
    fn address(&self) -> Address;

    fn voting_token(&self) -> Option<Address>;

    /// Dry-run `propose` and return the id the governor would assign
    async fn propose_call(&self, from: Address, actions: &[Action], description: &str) -> Result<U256>;

    async fn propose(&self, from: Address, actions: &[Action], description: &str) -> Result<B256>;

    async fn cast_vote(&self, from: Address, id: U256, support: bool) -> Result<B256>;

    async fn queue(&self, from: Address, id: U256) -> Result<B256>;

    async fn execute(&self, from: Address, id: U256) -> Result<B256>;

    async fn state(&self, id: U256) -> Result<RemoteProposalState>;

    async fn proposal_details(&self, id: U256) -> Result<ProposalDetails>;

    async fn proposal_actions(&self, id: U256) -> Result<Vec<RawAction>>;

    async fn timelock_address(&self) -> Result<Address>;

    /// Minimum delay enforced by the timelock, in seconds
    async fn delay(&self) -> Result<U256>;

    /// Blocks between proposal creation and the start of voting
    async fn voting_delay(&self) -> Result<U256>;

    /// Length of the voting window in blocks
    async fn voting_period(&self) -> Result<U256>;

    async fn quorum_votes(&self) -> Result<U256>;

    async fn current_votes(&self, account: Address) -> Result<U256>;

    async fn token_info(&self) -> Result<TokenInfo>;

    /// Timelock `queueTransaction`, sent by `from`
    async fn queue_transaction(&self, from: Address, action: &Action, eta: U256) -> Result<B256>;

    /// Timelock `executeTransaction`, sent by `from`
    async fn execute_transaction(&self, from: Address, action: &Action, eta: U256) -> Result<B256>;
}

/// Read `name()` from an arbitrary contract; `None` when it has no such method.
pub async fn contract_name(chain: &dyn ChainControl, target: Address) -> Option<String> {
    let data = IVotingToken::nameCall {}.abi_encode();
    let request = CallRequest::new(Address::ZERO, target, data.into());
    let output = chain.call(&request).await.ok()?;
    IVotingToken::nameCall::abi_decode_returns(&output, true)
        .ok()
        .map(|ret| ret._0)
        .filter(|name| !name.is_empty())
}

/// [`GovernanceClient`] for Compound's GovernorAlpha / Timelock / Comp contracts
#[derive(Clone)]
pub struct GovernorAlphaClient {
    chain: Arc<dyn ChainControl>,
    governor: Address,
    voting_token: Option<Address>,
    timelock: Arc<OnceCell<Address>>,
}

impl GovernorAlphaClient {
    pub fn new(chain: Arc<dyn ChainControl>, governor: Address, voting_token: Option<Address>) -> Self {
        Self {
            chain,
            governor,
            voting_token,
            timelock: Arc::new(OnceCell::new()),
        }
    }

    fn token(&self) -> Result<Address> {
        self.voting_token.ok_or(ProposalError::NoVotingToken)
    }

    async fn view<C>(&self, to: Address, from: Address, call: C) -> Result<C::Return>
    where
        C: SolCall + Send,
    {
        let request = CallRequest::new(from, to, call.abi_encode().into());
        let output = self.chain.call(&request).await?;
        C::abi_decode_returns(&output, true)
            .map_err(ChainError::from)
            .map_err(ProposalError::from)
    }

    async fn send<C>(&self, to: Address, from: Address, value: U256, call: C) -> Result<B256>
    where
        C: SolCall + Send,
    {
        debug!(to = %to, from = %from, function = C::SIGNATURE, "Sending governance transaction");
        let request = CallRequest::new(from, to, call.abi_encode().into()).with_value(value);
        Ok(self.chain.send_transaction(&request).await?)
    }

    fn propose_args(actions: &[Action], description: &str) -> IGovernorAlpha::proposeCall {
        IGovernorAlpha::proposeCall {
            targets: actions.iter().map(Action::target).collect(),
            values: actions.iter().map(Action::value).collect(),
            signatures: actions.iter().map(|a| a.signature().to_string()).collect(),
            calldatas: actions.iter().map(|a| a.calldata().clone()).collect(),
            description: description.to_string(),
        }
    }

    fn timelock_args(action: &Action, eta: U256) -> (Address, U256, String, Bytes, U256) {
        (
            action.target(),
            action.value(),
            action.signature().to_string(),
            action.calldata().clone(),
            eta,
        )
    }
}

#[async_trait]
impl GovernanceClient for GovernorAlphaClient {
    fn address(&self) -> Address {
        self.governor
    }

    fn voting_token(&self) -> Option<Address> {
        self.voting_token
    }

    async fn propose_call(&self, from: Address, actions: &[Action], description: &str) -> Result<U256> {
        let ret = self
            .view(self.governor, from, Self::propose_args(actions, description))
            .await?;
        Ok(ret._0)
    }

    async fn propose(&self, from: Address, actions: &[Action], description: &str) -> Result<B256> {
        self.send(
            self.governor,
            from,
            U256::ZERO,
            Self::propose_args(actions, description),
        )
        .await
    }

    async fn cast_vote(&self, from: Address, id: U256, support: bool) -> Result<B256> {
        let call = IGovernorAlpha::castVoteCall {
            proposalId: id,
            support,
        };
        self.send(self.governor, from, U256::ZERO, call).await
    }

    async fn queue(&self, from: Address, id: U256) -> Result<B256> {
        let call = IGovernorAlpha::queueCall { proposalId: id };
        self.send(self.governor, from, U256::ZERO, call).await
    }

    async fn execute(&self, from: Address, id: U256) -> Result<B256> {
        // `execute` is payable and hands each action its value out of msg.value
        let value = self
            .proposal_actions(id)
            .await?
            .iter()
            .try_fold(U256::ZERO, |total, action| total.checked_add(action.value))
            .ok_or_else(|| {
                ChainError::InvalidResponse(format!("action values of proposal {id} overflow"))
            })?;

        let call = IGovernorAlpha::executeCall { proposalId: id };
        self.send(self.governor, from, value, call).await
    }

    async fn state(&self, id: U256) -> Result<RemoteProposalState> {
        let ret = self
            .view(self.governor, Address::ZERO, IGovernorAlpha::stateCall { proposalId: id })
            .await?;
        RemoteProposalState::try_from(ret._0).map_err(|code| {
            ChainError::InvalidResponse(format!("unknown proposal state {code}")).into()
        })
    }

    async fn proposal_details(&self, id: U256) -> Result<ProposalDetails> {
        let ret = self
            .view(
                self.governor,
                Address::ZERO,
                IGovernorAlpha::proposalsCall { proposalId: id },
            )
            .await?;

        Ok(ProposalDetails {
            id: ret.id,
            proposer: ret.proposer,
            eta: ret.eta,
            start_block: ret.startBlock,
            end_block: ret.endBlock,
            for_votes: ret.forVotes,
            against_votes: ret.againstVotes,
            canceled: ret.canceled,
            executed: ret.executed,
        })
    }

    async fn proposal_actions(&self, id: U256) -> Result<Vec<RawAction>> {
        let ret = self
            .view(
                self.governor,
                Address::ZERO,
                IGovernorAlpha::getActionsCall { proposalId: id },
            )
            .await?;

        let count = ret.targets.len();
        if ret.values.len() != count || ret.signatures.len() != count || ret.calldatas.len() != count {
            return Err(ChainError::InvalidResponse(format!(
                "getActions({id}) returned arrays of different lengths"
            ))
            .into());
        }

        Ok(ret
            .targets
            .into_iter()
            .zip(ret.values)
            .zip(ret.signatures)
            .zip(ret.calldatas)
            .map(|(((target, value), signature), calldata)| RawAction {
                target,
                value,
                signature,
                calldata,
            })
            .collect())
    }

    async fn timelock_address(&self) -> Result<Address> {
        // GovernorAlpha has no setter for its timelock, so the first answer holds
        let timelock = self
            .timelock
            .get_or_try_init(|| async {
                let ret = self
                    .view(self.governor, Address::ZERO, IGovernorAlpha::timelockCall {})
                    .await?;
                Ok::<_, ProposalError>(ret._0)
            })
            .await?;
        Ok(*timelock)
    }

    async fn delay(&self) -> Result<U256> {
        let timelock = self.timelock_address().await?;
        let ret = self
            .view(timelock, Address::ZERO, ITimelock::delayCall {})
            .await?;
        Ok(ret._0)
    }

    async fn voting_delay(&self) -> Result<U256> {
        let ret = self
            .view(self.governor, Address::ZERO, IGovernorAlpha::votingDelayCall {})
            .await?;
        Ok(ret._0)
    }

    async fn voting_period(&self) -> Result<U256> {
        let ret = self
            .view(self.governor, Address::ZERO, IGovernorAlpha::votingPeriodCall {})
            .await?;
        Ok(ret._0)
    }

    async fn quorum_votes(&self) -> Result<U256> {
        let ret = self
            .view(self.governor, Address::ZERO, IGovernorAlpha::quorumVotesCall {})
            .await?;
        Ok(ret._0)
    }

    async fn current_votes(&self, account: Address) -> Result<U256> {
        let token = self.token()?;
        let ret = self
            .view(token, Address::ZERO, IVotingToken::getCurrentVotesCall { account })
            .await?;
        Ok(U256::from(ret._0))
    }

    async fn token_info(&self) -> Result<TokenInfo> {
        let token = self.token()?;
        let name = self
            .view(token, Address::ZERO, IVotingToken::nameCall {})
            .await?
            ._0;
        let decimals = self
            .view(token, Address::ZERO, IVotingToken::decimalsCall {})
            .await?
            ._0;
        Ok(TokenInfo { name, decimals })
    }

    async fn queue_transaction(&self, from: Address, action: &Action, eta: U256) -> Result<B256> {
        let timelock = self.timelock_address().await?;
        let (target, value, signature, data, eta) = Self::timelock_args(action, eta);
        let call = ITimelock::queueTransactionCall {
            target,
            value,
            signature,
            data,
            eta,
        };
        self.send(timelock, from, U256::ZERO, call).await
    }

    async fn execute_transaction(&self, from: Address, action: &Action, eta: U256) -> Result<B256> {
        let timelock = self.timelock_address().await?;
        let (target, value, signature, data, eta) = Self::timelock_args(action, eta);
        let call = ITimelock::executeTransactionCall {
            target,
            value,
            signature,
            data,
            eta,
        };
        // The timelock forwards `value` to the target, so it has to arrive with the call
        self.send(timelock, from, value, call).await
    }
}
