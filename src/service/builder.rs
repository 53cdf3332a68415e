//! Proposal Builder
//!
//! Fluent accumulator for proposal actions. The builder only offers `build` once a
//! governor has been bound, so an unbound proposal cannot be constructed.

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, Bytes, U256};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::chain::ChainControl;
use super::governance::{GovernanceClient, GovernorAlphaClient};
use super::proposal::{Proposal, DEFAULT_MAX_ACTIONS};
use super::simulation::SimulationSettings;
use crate::codec::{self, ContractHandle};
use crate::config::ProposalsConfig;
use crate::error::{ProposalError, Result};
use crate::models::{Action, RawAction};

/// A governor given either as a ready client or as a bare address
#[derive(Clone)]
pub enum ContractRef {
    Bound(Arc<dyn GovernanceClient>),
    Address(Address),
}

impl ContractRef {
    /// Governor address, whichever way it was given
    pub fn address(&self) -> Address {
        match self {
            ContractRef::Bound(client) => client.address(),
            ContractRef::Address(address) => *address,
        }
    }
}

impl fmt::Debug for ContractRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractRef::Bound(client) => f.debug_tuple("Bound").field(&client.address()).finish(),
            ContractRef::Address(address) => f.debug_tuple("Address").field(address).finish(),
        }
    }
}

impl From<Address> for ContractRef {
    fn from(address: Address) -> Self {
        ContractRef::Address(address)
    }
}

impl From<Arc<dyn GovernanceClient>> for ContractRef {
    fn from(client: Arc<dyn GovernanceClient>) -> Self {
        ContractRef::Bound(client)
    }
}

/// Builder state before a governor is bound
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Builder state once a governor is bound
#[derive(Debug, Clone)]
pub struct Ready {
    governor: ContractRef,
}

pub struct ProposalBuilder<S = Unbound> {
    chain: Arc<dyn ChainControl>,
    state: S,
    voting_token: Option<Address>,
    proposer: Option<Address>,
    description: String,
    actions: Vec<Action>,
    max_actions: usize,
    settings: SimulationSettings,
}

impl<S: fmt::Debug> fmt::Debug for ProposalBuilder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProposalBuilder")
            .field("state", &self.state)
            .field("voting_token", &self.voting_token)
            .field("proposer", &self.proposer)
            .field("description", &self.description)
            .field("actions", &self.actions.len())
            .field("max_actions", &self.max_actions)
            .finish()
    }
}

impl ProposalBuilder<Unbound> {
    pub fn new(chain: Arc<dyn ChainControl>) -> Self {
        Self {
            chain,
            state: Unbound,
            voting_token: None,
            proposer: None,
            description: String::new(),
            actions: Vec::new(),
            max_actions: DEFAULT_MAX_ACTIONS,
            settings: SimulationSettings::default(),
        }
    }

    /// Start from environment-derived settings. Fails with `NoGovernor` when no
    /// governor address is configured.
    pub fn from_config(config: &ProposalsConfig, chain: Arc<dyn ChainControl>) -> Result<ProposalBuilder<Ready>> {
        let governor = config.governor.ok_or(ProposalError::NoGovernor)?;

        let mut builder = ProposalBuilder::new(chain)
            .max_actions(config.max_actions)
            .simulation_settings(config.simulation.clone());
        if let Some(token) = config.voting_token {
            builder = builder.voting_token(token);
        }
        if let Some(proposer) = config.proposer {
            builder = builder.proposer(proposer);
        }

        Ok(builder.governor(governor))
    }

    pub fn governor(self, governor: impl Into<ContractRef>) -> ProposalBuilder<Ready> {
        self.with_state(Ready {
            governor: governor.into(),
        })
    }
}

impl ProposalBuilder<Ready> {
    /// Rebind to a different governor
    pub fn governor(self, governor: impl Into<ContractRef>) -> Self {
        self.with_state(Ready {
            governor: governor.into(),
        })
    }

    /// Resolve the governor and produce the proposal.
    ///
    /// Capacity is checked again here, since `max_actions` may have been lowered
    /// after actions were added.
    pub fn build(self) -> Result<Proposal> {
        let governor: Arc<dyn GovernanceClient> = match self.state.governor {
            ContractRef::Bound(client) => client,
            ContractRef::Address(address) => Arc::new(GovernorAlphaClient::new(
                self.chain.clone(),
                address,
                self.voting_token,
            )),
        };

        let mut proposal = Proposal::new(governor, self.chain, self.settings, self.max_actions);
        if let Some(proposer) = self.proposer {
            proposal.set_proposer(proposer);
        }
        proposal.set_description(self.description)?;
        for action in self.actions {
            proposal.add_action(action)?;
        }

        Ok(proposal)
    }
}

impl<S> ProposalBuilder<S> {
    fn with_state<T>(self, state: T) -> ProposalBuilder<T> {
        ProposalBuilder {
            chain: self.chain,
            state,
            voting_token: self.voting_token,
            proposer: self.proposer,
            description: self.description,
            actions: self.actions,
            max_actions: self.max_actions,
            settings: self.settings,
        }
    }

    /// Voting token for an address-bound governor; a bound client keeps its own.
    pub fn voting_token(mut self, token: Address) -> Self {
        self.voting_token = Some(token);
        self
    }

    pub fn proposer(mut self, proposer: Address) -> Self {
        self.proposer = Some(proposer);
        self
    }

    /// Some governance UIs split the title from the body at the first newline.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn max_actions(mut self, max_actions: usize) -> Self {
        self.max_actions = max_actions;
        self
    }

    pub fn simulation_settings(mut self, settings: SimulationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Add a raw `(target, value, signature, calldata)` action.
    ///
    /// `calldata` must not include the selector; arguments are decoded from it for
    /// diagnostics.
    pub fn add_action(
        self,
        target: Address,
        value: U256,
        signature: &str,
        calldata: impl Into<Bytes>,
    ) -> Result<Self> {
        self.ensure_capacity()?;
        let action = codec::decode_raw_action(RawAction {
            target,
            value,
            signature: signature.to_string(),
            calldata: calldata.into(),
        })?;
        Ok(self.push(action))
    }

    /// Add a call against a contract interface. `method` may be a bare name or a
    /// full signature when the name is overloaded.
    pub fn add_contract_action(
        self,
        contract: &ContractHandle,
        method: &str,
        args: &[DynSolValue],
        value: U256,
    ) -> Result<Self> {
        self.ensure_capacity()?;
        let action = codec::encode_contract_call(contract, method, args, value)?;
        Ok(self.push(action))
    }

    fn ensure_capacity(&self) -> Result<()> {
        if self.actions.len() >= self.max_actions {
            return Err(ProposalError::TooManyActions {
                max: self.max_actions,
            });
        }
        Ok(())
    }

    fn push(mut self, action: Action) -> Self {
        debug!(
            index = self.actions.len(),
            target = %action.target(),
            signature = action.signature(),
            "Builder action added"
        );
        self.actions.push(action);
        self
    }
}
