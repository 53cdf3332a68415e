use alloy_primitives::{Address, U256};
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use validator::Validate;

use crate::service::proposal::DEFAULT_MAX_ACTIONS;
use crate::service::rpc::{NetworkConfig, RetryConfig};
use crate::service::simulation::{SimulationSettings, DEFAULT_ETA_MARGIN_SECS};

const DEFAULT_LOG_FILTER: &str = "governor_proposals=info";

#[derive(Debug, Clone)]
pub struct Config {
    pub network: NetworkConfig,
    pub proposals: ProposalsConfig,
    pub retry: RetryConfig,
    pub telemetry: TelemetryConfig,
}

/// Contracts and defaults used when building proposals
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct ProposalsConfig {
    pub governor: Option<Address>,
    pub voting_token: Option<Address>,
    pub proposer: Option<Address>,
    #[validate(range(min = 1))]
    pub max_actions: usize,
    #[validate(nested)]
    pub simulation: SimulationSettings,
}

impl Default for ProposalsConfig {
    fn default() -> Self {
        Self {
            governor: None,
            voting_token: None,
            proposer: None,
            max_actions: DEFAULT_MAX_ACTIONS,
            simulation: SimulationSettings::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rpc_url = lookup("RPC_URL").unwrap_or_else(|| NetworkConfig::localhost().rpc_url);

        let governor = optional::<Address>(&lookup, "GOVERNOR_ADDRESS")?;
        let voting_token = optional::<Address>(&lookup, "VOTING_TOKEN_ADDRESS")?;
        let proposer = optional::<Address>(&lookup, "PROPOSER_ADDRESS")?;
        let max_actions = optional(&lookup, "PROPOSAL_MAX_ACTIONS")?.unwrap_or(DEFAULT_MAX_ACTIONS);
        let eta_margin_secs =
            optional(&lookup, "ETA_MARGIN_SECS")?.unwrap_or(DEFAULT_ETA_MARGIN_SECS);
        let impersonation_balance = optional::<U256>(&lookup, "IMPERSONATION_BALANCE_WEI")?
            .unwrap_or(SimulationSettings::default().impersonation_balance);

        let retry_defaults = RetryConfig::default();
        let retry = RetryConfig {
            max_retries: optional(&lookup, "RECEIPT_MAX_RETRIES")?
                .unwrap_or(retry_defaults.max_retries),
            initial_delay_ms: optional(&lookup, "RECEIPT_INITIAL_DELAY_MS")?
                .unwrap_or(retry_defaults.initial_delay_ms),
            max_delay_ms: optional(&lookup, "RECEIPT_MAX_DELAY_MS")?
                .unwrap_or(retry_defaults.max_delay_ms),
            ..retry_defaults
        };

        let rust_log = lookup("RUST_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let proposals = ProposalsConfig {
            governor,
            voting_token,
            proposer,
            max_actions,
            simulation: SimulationSettings {
                eta_margin_secs,
                impersonation_balance,
            },
        };
        proposals
            .validate()
            .context("Invalid proposal configuration")?;

        Ok(Config {
            network: NetworkConfig::custom(rpc_url),
            proposals,
            retry,
            telemetry: TelemetryConfig { rust_log },
        })
    }
}

fn optional<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, anyhow::Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value for {key}: {e}")),
        _ => Ok(None),
    }
}
