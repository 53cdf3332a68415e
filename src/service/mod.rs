// Service layer: chain access, governance calls and the proposal lifecycle
pub mod builder;
pub mod chain;
pub mod governance;
pub mod proposal;
pub mod rpc;
pub mod simulation;


pub use builder::{ContractRef, ProposalBuilder, Ready, Unbound};
pub use chain::{confirm, BlockInfo, CallRequest, ChainControl, HardhatChain, TxReceipt};
pub use governance::{contract_name, GovernanceClient, GovernorAlphaClient};
pub use proposal::{Proposal, DEFAULT_MAX_ACTIONS, UNLOADED_DESCRIPTION};
pub use rpc::{ChainError, JsonRpcClient, NetworkConfig, RetryConfig, RpcTransport};
pub use simulation::{SimulationEngine, SimulationOutcome, SimulationSettings};
