//! In-memory chain for tests.
//!
//! `FakeChain` plays both remote roles: the privileged test chain and a
//! GovernorAlpha / Timelock / voting token deployment, with a `SimpleStorage`
//! contract as the usual action target. Contract behaviour follows Compound's
//! contracts closely enough for lifecycle checks, including their revert strings.

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{Revert, SolError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::codec::{self, ContractHandle};
use crate::error::{ProposalError, Result};
use crate::models::{Action, ProposalDetails, RawAction, RemoteProposalState, TokenInfo};
use crate::service::chain::{BlockInfo, CallRequest, ChainControl, TxReceipt};
use crate::service::governance::GovernanceClient;
use crate::service::rpc::ChainError;

pub const GOVERNOR: Address = Address::repeat_byte(0x10);
pub const TIMELOCK: Address = Address::repeat_byte(0x20);
pub const TOKEN: Address = Address::repeat_byte(0x30);
pub const STORAGE: Address = Address::repeat_byte(0x40);
pub const PROPOSER: Address = Address::repeat_byte(0x50);
pub const VOTER: Address = Address::repeat_byte(0x60);

pub const TIMELOCK_DELAY: u64 = 2 * 24 * 60 * 60;
pub const GRACE_PERIOD: u64 = 14 * 24 * 60 * 60;
pub const VOTING_DELAY: u64 = 1;
pub const VOTING_PERIOD: u64 = 5;

const STORAGE_SIGNATURES: [&str; 5] = [
    "set(uint256)",
    "setGuarded(uint256)",
    "fail()",
    "name()",
    "value()",
];

/// Interface of the `SimpleStorage` target contract
pub fn storage_contract() -> ContractHandle {
    ContractHandle::from_signatures(STORAGE, STORAGE_SIGNATURES).unwrap()
}

/// Action calling `method` on `SimpleStorage` with a single uint argument, or none
pub fn storage_action(method: &str, arg: Option<u64>) -> Action {
    let args: Vec<DynSolValue> = arg
        .map(|v| DynSolValue::from(U256::from(v)))
        .into_iter()
        .collect();
    codec::encode_contract_call(&storage_contract(), method, &args, U256::ZERO).unwrap()
}

fn revert(reason: &str) -> ChainError {
    ChainError::reverted(
        Revert {
            reason: reason.to_string(),
        }
        .abi_encode()
        .into(),
    )
}

type TimelockKey = (Address, U256, String, Bytes, u64);

fn timelock_key(call: &RawAction, eta: u64) -> TimelockKey {
    (
        call.target,
        call.value,
        call.signature.clone(),
        call.calldata.clone(),
        eta,
    )
}

#[derive(Debug, Clone)]
struct FakeProposal {
    proposer: Address,
    actions: Vec<RawAction>,
    start_block: u64,
    end_block: u64,
    for_votes: U256,
    against_votes: U256,
    eta: u64,
    canceled: bool,
    executed: bool,
    voters: HashSet<Address>,
}

#[derive(Debug)]
struct State {
    block_number: u64,
    timestamp: u64,
    automine: bool,
    unlocked: HashSet<Address>,
    impersonated: HashSet<Address>,
    balances: HashMap<Address, U256>,
    pending: Vec<B256>,
    unmined: HashMap<B256, bool>,
    receipts: HashMap<B256, TxReceipt>,
    tx_count: u64,
    calls: Vec<String>,
    queued: HashSet<TimelockKey>,
    proposals: Vec<FakeProposal>,
    votes: HashMap<Address, U256>,
    quorum: U256,
    proposal_threshold: U256,
    voting_token: Option<Address>,
    storage_value: U256,
    failing_commits: HashSet<String>,
}

impl State {
    fn new() -> Self {
        Self {
            block_number: 100,
            timestamp: 1_700_000_000,
            automine: true,
            unlocked: HashSet::from([PROPOSER, VOTER]),
            impersonated: HashSet::new(),
            balances: HashMap::new(),
            pending: Vec::new(),
            unmined: HashMap::new(),
            receipts: HashMap::new(),
            tx_count: 0,
            calls: Vec::new(),
            queued: HashSet::new(),
            proposals: Vec::new(),
            votes: HashMap::from([(PROPOSER, U256::from(1_000)), (VOTER, U256::from(50))]),
            quorum: U256::from(400),
            proposal_threshold: U256::from(100),
            voting_token: Some(TOKEN),
            storage_value: U256::ZERO,
            failing_commits: HashSet::new(),
        }
    }

    fn log(&mut self, entry: impl Into<String>) {
        self.calls.push(entry.into());
    }

    /// Context of the block the next transaction lands in
    fn pending_block(&self) -> (u64, u64) {
        (self.block_number + 1, self.timestamp + 1)
    }

    fn ensure_sender(&self, from: Address) -> Result<(), ChainError> {
        if self.unlocked.contains(&from) || self.impersonated.contains(&from) {
            return Ok(());
        }
        Err(ChainError::RpcError {
            code: -32000,
            message: format!("unknown account {from}"),
        })
    }

    fn mine(&mut self, timestamp: Option<u64>) {
        self.block_number += 1;
        self.timestamp = timestamp.unwrap_or(self.timestamp + 1);
        for hash in std::mem::take(&mut self.pending) {
            let success = self.unmined.remove(&hash).unwrap_or(true);
            self.receipts.insert(
                hash,
                TxReceipt {
                    transaction_hash: hash,
                    block_number: Some(self.block_number),
                    success,
                },
            );
        }
    }

    fn submit(&mut self, success: bool) -> B256 {
        self.tx_count += 1;
        let hash = B256::left_padding_from(&self.tx_count.to_be_bytes());
        self.pending.push(hash);
        self.unmined.insert(hash, success);
        if self.automine {
            self.mine(None);
        }
        hash
    }

    fn run_target(&mut self, call: &RawAction, sender: Address, commit: bool) -> Result<Bytes, String> {
        if call.target != STORAGE {
            return Ok(Bytes::new());
        }

        let args = codec::decode_calldata(&call.signature, &call.calldata).map_err(|e| e.to_string())?;
        let first_uint = args
            .first()
            .and_then(DynSolValue::as_uint)
            .map(|(value, _)| value)
            .unwrap_or_default();

        match call.signature.as_str() {
            "set(uint256)" => {
                if commit {
                    self.storage_value = first_uint;
                }
                Ok(Bytes::new())
            }
            "setGuarded(uint256)" => {
                if sender != TIMELOCK {
                    return Err("SimpleStorage: caller is not the timelock".to_string());
                }
                if commit {
                    self.storage_value = first_uint;
                }
                Ok(Bytes::new())
            }
            "fail()" => Err("SimpleStorage: always reverts".to_string()),
            "name()" => Ok(DynSolValue::Tuple(vec![DynSolValue::String("SimpleStorage".to_string())])
                .abi_encode_params()
                .into()),
            "value()" => Ok(DynSolValue::from(self.storage_value).abi_encode().into()),
            other => Err(format!("SimpleStorage: unknown method {other}")),
        }
    }

    fn queue_in_timelock(&mut self, from: Address, call: &RawAction, eta: u64) -> Result<(), ChainError> {
        if from != GOVERNOR {
            return Err(revert("Timelock::queueTransaction: Call must come from admin."));
        }
        let (_, now) = self.pending_block();
        if eta < now + TIMELOCK_DELAY {
            return Err(revert(
                "Timelock::queueTransaction: Estimated execution block must satisfy delay.",
            ));
        }
        self.queued.insert(timelock_key(call, eta));
        Ok(())
    }

    fn execute_in_timelock(&mut self, from: Address, call: &RawAction, eta: u64) -> Result<(), ChainError> {
        if from != GOVERNOR {
            return Err(revert("Timelock::executeTransaction: Call must come from admin."));
        }
        let key = timelock_key(call, eta);
        if !self.queued.contains(&key) {
            return Err(revert(
                "Timelock::executeTransaction: Transaction hasn't been queued.",
            ));
        }
        let (_, now) = self.pending_block();
        if now < eta {
            return Err(revert(
                "Timelock::executeTransaction: Transaction hasn't surpassed time lock.",
            ));
        }
        if now > eta + GRACE_PERIOD {
            return Err(revert("Timelock::executeTransaction: Transaction is stale."));
        }
        if self.run_target(call, TIMELOCK, true).is_err() {
            return Err(revert(
                "Timelock::executeTransaction: Transaction execution reverted.",
            ));
        }
        self.queued.remove(&key);
        Ok(())
    }

    fn proposal(&self, id: U256) -> Result<&FakeProposal, ChainError> {
        usize::try_from(id)
            .ok()
            .and_then(|id| id.checked_sub(1))
            .and_then(|index| self.proposals.get(index))
            .ok_or_else(|| revert("GovernorAlpha::state: invalid proposal id"))
    }

    fn proposal_mut(&mut self, id: U256) -> Result<&mut FakeProposal, ChainError> {
        usize::try_from(id)
            .ok()
            .and_then(|id| id.checked_sub(1))
            .and_then(|index| self.proposals.get_mut(index))
            .ok_or_else(|| revert("GovernorAlpha::state: invalid proposal id"))
    }

    fn proposal_state(&self, proposal: &FakeProposal, block: u64, timestamp: u64) -> RemoteProposalState {
        if proposal.canceled {
            RemoteProposalState::Canceled
        } else if block <= proposal.start_block {
            RemoteProposalState::Pending
        } else if block <= proposal.end_block {
            RemoteProposalState::Active
        } else if proposal.for_votes <= proposal.against_votes || proposal.for_votes < self.quorum {
            RemoteProposalState::Defeated
        } else if proposal.eta == 0 {
            RemoteProposalState::Succeeded
        } else if proposal.executed {
            RemoteProposalState::Executed
        } else if timestamp >= proposal.eta + GRACE_PERIOD {
            RemoteProposalState::Expired
        } else {
            RemoteProposalState::Queued
        }
    }

    fn state_at_pending(&self, id: U256) -> Result<RemoteProposalState, ChainError> {
        let (block, timestamp) = self.pending_block();
        let proposal = self.proposal(id)?;
        Ok(self.proposal_state(proposal, block, timestamp))
    }

    fn check_propose(&self, from: Address, actions: &[Action]) -> Result<(), ChainError> {
        self.ensure_sender(from)?;
        let votes = self.votes.get(&from).copied().unwrap_or_default();
        if votes <= self.proposal_threshold {
            return Err(revert(
                "GovernorAlpha::propose: proposer votes below proposal threshold",
            ));
        }
        if actions.is_empty() {
            return Err(revert("GovernorAlpha::propose: must provide actions"));
        }
        if actions.len() > 10 {
            return Err(revert("GovernorAlpha::propose: too many actions"));
        }
        Ok(())
    }
}

/// Shared handle to the in-memory chain; clones observe the same state.
#[derive(Clone)]
pub struct FakeChain {
    state: Arc<Mutex<State>>,
}

impl Default for FakeChain {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeChain {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn chain(&self) -> Arc<dyn ChainControl> {
        Arc::new(self.clone())
    }

    pub fn governance(&self) -> Arc<dyn GovernanceClient> {
        Arc::new(self.clone())
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn storage_value(&self) -> U256 {
        self.lock().storage_value
    }

    pub fn automine(&self) -> bool {
        self.lock().automine
    }

    pub fn impersonated(&self) -> Vec<Address> {
        self.lock().impersonated.iter().copied().collect()
    }

    pub fn balance(&self, account: Address) -> U256 {
        self.lock().balances.get(&account).copied().unwrap_or_default()
    }

    pub fn timestamp(&self) -> u64 {
        self.lock().timestamp
    }

    pub fn proposal_count(&self) -> usize {
        self.lock().proposals.len()
    }

    pub fn set_votes(&self, account: Address, votes: u64) {
        self.lock().votes.insert(account, U256::from(votes));
    }

    pub fn without_voting_token(self) -> Self {
        self.lock().voting_token = None;
        self
    }

    /// Transactions for `signature` (or `"propose"`) pass estimation but are mined
    /// with a failed status
    pub fn fail_on_commit(&self, signature: &str) {
        self.lock().failing_commits.insert(signature.to_string());
    }
}

#[async_trait]
impl ChainControl for FakeChain {
    async fn impersonate(&self, account: Address) -> Result<(), ChainError> {
        let mut state = self.lock();
        state.log(format!("impersonate {account}"));
        state.impersonated.insert(account);
        Ok(())
    }

    async fn stop_impersonating(&self, account: Address) -> Result<(), ChainError> {
        let mut state = self.lock();
        state.log(format!("stop_impersonating {account}"));
        state.impersonated.remove(&account);
        Ok(())
    }

    async fn set_balance(&self, account: Address, amount: U256) -> Result<(), ChainError> {
        let mut state = self.lock();
        state.log(format!("set_balance {account}"));
        state.balances.insert(account, amount);
        Ok(())
    }

    async fn mine_block(&self, timestamp: Option<u64>) -> Result<(), ChainError> {
        let mut state = self.lock();
        state.log("mine");
        state.mine(timestamp);
        Ok(())
    }

    async fn set_automine(&self, enabled: bool) -> Result<(), ChainError> {
        let mut state = self.lock();
        state.log(format!("set_automine {enabled}"));
        state.automine = enabled;
        Ok(())
    }

    async fn latest_block(&self) -> Result<BlockInfo, ChainError> {
        let state = self.lock();
        Ok(BlockInfo {
            number: state.block_number,
            timestamp: state.timestamp,
        })
    }

    async fn call(&self, request: &CallRequest) -> Result<Bytes, ChainError> {
        let mut state = self.lock();
        state.log(format!("call {}", request.to));

        if request.to != STORAGE {
            return Ok(Bytes::new());
        }
        if request.data.len() < 4 {
            return Err(revert("SimpleStorage: missing selector"));
        }

        let signature = STORAGE_SIGNATURES
            .iter()
            .find(|sig| {
                codec::parse_signature(sig)
                    .map(|f| f.selector().as_slice() == &request.data[..4])
                    .unwrap_or(false)
            })
            .ok_or_else(|| revert("SimpleStorage: unknown selector"))?;

        let call = RawAction {
            target: request.to,
            value: request.value,
            signature: signature.to_string(),
            calldata: Bytes::copy_from_slice(&request.data[4..]),
        };
        state
            .run_target(&call, request.from, false)
            .map_err(|reason| revert(&reason))
    }

    async fn send_transaction(&self, request: &CallRequest) -> Result<B256, ChainError> {
        let mut state = self.lock();
        state.ensure_sender(request.from)?;
        state.log(format!("send_transaction {}", request.to));
        Ok(state.submit(true))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, ChainError> {
        Ok(self.lock().receipts.get(&hash).copied())
    }

    async fn wait_for_receipt(&self, hash: B256) -> Result<TxReceipt, ChainError> {
        self.lock()
            .receipts
            .get(&hash)
            .copied()
            .ok_or(ChainError::RetryLimitExceeded)
    }
}

#[async_trait]
impl GovernanceClient for FakeChain {
    fn address(&self) -> Address {
        GOVERNOR
    }

    fn voting_token(&self) -> Option<Address> {
        self.lock().voting_token
    }

    async fn propose_call(&self, from: Address, actions: &[Action], _description: &str) -> Result<U256> {
        let mut state = self.lock();
        state.log("propose_call");
        state.check_propose(from, actions)?;
        Ok(U256::from(state.proposals.len() + 1))
    }

    async fn propose(&self, from: Address, actions: &[Action], _description: &str) -> Result<B256> {
        let mut state = self.lock();
        state.log("propose");
        state.check_propose(from, actions)?;

        let (block, _) = state.pending_block();
        let start_block = block + VOTING_DELAY;
        state.proposals.push(FakeProposal {
            proposer: from,
            actions: actions.iter().map(Action::to_raw).collect(),
            start_block,
            end_block: start_block + VOTING_PERIOD,
            for_votes: U256::ZERO,
            against_votes: U256::ZERO,
            eta: 0,
            canceled: false,
            executed: false,
            voters: HashSet::new(),
        });
        let success = !state.failing_commits.contains("propose");
        Ok(state.submit(success))
    }

    async fn cast_vote(&self, from: Address, id: U256, support: bool) -> Result<B256> {
        let mut state = self.lock();
        state.log("cast_vote");
        state.ensure_sender(from)?;
        if state.state_at_pending(id)? != RemoteProposalState::Active {
            return Err(revert("GovernorAlpha::_castVote: voting is closed").into());
        }

        let votes = state.votes.get(&from).copied().unwrap_or_default();
        let proposal = state.proposal_mut(id)?;
        if !proposal.voters.insert(from) {
            return Err(revert("GovernorAlpha::_castVote: voter already voted").into());
        }
        if support {
            proposal.for_votes += votes;
        } else {
            proposal.against_votes += votes;
        }
        Ok(state.submit(true))
    }

    async fn queue(&self, from: Address, id: U256) -> Result<B256> {
        let mut state = self.lock();
        state.log("queue");
        state.ensure_sender(from)?;
        if state.state_at_pending(id)? != RemoteProposalState::Succeeded {
            return Err(revert(
                "GovernorAlpha::queue: proposal can only be queued if it is succeeded",
            )
            .into());
        }

        let (_, now) = state.pending_block();
        let eta = now + TIMELOCK_DELAY;
        let actions = state.proposal(id)?.actions.clone();
        for action in &actions {
            let key = timelock_key(action, eta);
            if state.queued.contains(&key) {
                return Err(revert(
                    "GovernorAlpha::_queueOrRevert: proposal action already queued at eta",
                )
                .into());
            }
            state.queue_in_timelock(GOVERNOR, action, eta)?;
        }
        state.proposal_mut(id)?.eta = eta;
        Ok(state.submit(true))
    }

    async fn execute(&self, from: Address, id: U256) -> Result<B256> {
        let mut state = self.lock();
        state.log("execute");
        state.ensure_sender(from)?;
        if state.state_at_pending(id)? != RemoteProposalState::Queued {
            return Err(revert(
                "GovernorAlpha::execute: proposal can only be executed if it is queued",
            )
            .into());
        }

        let proposal = state.proposal(id)?.clone();
        for action in &proposal.actions {
            state.execute_in_timelock(GOVERNOR, action, proposal.eta)?;
        }
        state.proposal_mut(id)?.executed = true;
        Ok(state.submit(true))
    }

    async fn state(&self, id: U256) -> Result<RemoteProposalState> {
        let mut state = self.lock();
        state.log("state");
        let proposal = state.proposal(id)?;
        Ok(state.proposal_state(proposal, state.block_number, state.timestamp))
    }

    async fn proposal_details(&self, id: U256) -> Result<ProposalDetails> {
        let state = self.lock();
        let details = match state.proposal(id) {
            Ok(proposal) => ProposalDetails {
                id,
                proposer: proposal.proposer,
                eta: U256::from(proposal.eta),
                start_block: U256::from(proposal.start_block),
                end_block: U256::from(proposal.end_block),
                for_votes: proposal.for_votes,
                against_votes: proposal.against_votes,
                canceled: proposal.canceled,
                executed: proposal.executed,
            },
            // Unset mapping entries read as zero
            Err(_) => ProposalDetails {
                id: U256::ZERO,
                proposer: Address::ZERO,
                eta: U256::ZERO,
                start_block: U256::ZERO,
                end_block: U256::ZERO,
                for_votes: U256::ZERO,
                against_votes: U256::ZERO,
                canceled: false,
                executed: false,
            },
        };
        Ok(details)
    }

    async fn proposal_actions(&self, id: U256) -> Result<Vec<RawAction>> {
        let state = self.lock();
        Ok(state
            .proposal(id)
            .map(|proposal| proposal.actions.clone())
            .unwrap_or_default())
    }

    async fn timelock_address(&self) -> Result<Address> {
        Ok(TIMELOCK)
    }

    async fn delay(&self) -> Result<U256> {
        Ok(U256::from(TIMELOCK_DELAY))
    }

    async fn voting_delay(&self) -> Result<U256> {
        Ok(U256::from(VOTING_DELAY))
    }

    async fn voting_period(&self) -> Result<U256> {
        Ok(U256::from(VOTING_PERIOD))
    }

    async fn quorum_votes(&self) -> Result<U256> {
        let mut state = self.lock();
        state.log("quorum_votes");
        Ok(state.quorum)
    }

    async fn current_votes(&self, account: Address) -> Result<U256> {
        let mut state = self.lock();
        state.log("current_votes");
        if state.voting_token.is_none() {
            return Err(ProposalError::NoVotingToken);
        }
        Ok(state.votes.get(&account).copied().unwrap_or_default())
    }

    async fn token_info(&self) -> Result<TokenInfo> {
        Ok(TokenInfo {
            name: "Governance Token".to_string(),
            decimals: 18,
        })
    }

    async fn queue_transaction(&self, from: Address, action: &Action, eta: U256) -> Result<B256> {
        let mut state = self.lock();
        state.log(format!("queue_transaction {}", action.signature()));
        state.ensure_sender(from)?;
        let eta = u64::try_from(eta).unwrap();
        state.queue_in_timelock(from, &action.to_raw(), eta)?;
        Ok(state.submit(true))
    }

    async fn execute_transaction(&self, from: Address, action: &Action, eta: U256) -> Result<B256> {
        let mut state = self.lock();
        state.log(format!("execute_transaction {}", action.signature()));
        state.ensure_sender(from)?;
        let eta = u64::try_from(eta).unwrap();
        state.execute_in_timelock(from, &action.to_raw(), eta)?;
        let success = !state.failing_commits.contains(action.signature());
        Ok(state.submit(success))
    }
}
