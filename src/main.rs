use alloy_primitives::{Address, U256};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use governor_proposals::config::Config;
use governor_proposals::service::{ChainControl, GovernorAlphaClient, HardhatChain, Proposal};
use governor_proposals::telemetry::init_telemetry;
use governor_proposals::ProposalError;

mod render;

/// Inspect GovernorAlpha proposals on a Hardhat-compatible node.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a submitted proposal, its votes and its actions.
    Info {
        /// Proposal id on the governor.
        id: U256,

        /// Governor address. Falls back to GOVERNOR_ADDRESS.
        #[arg(long)]
        governor: Option<Address>,

        /// Voting token address. Falls back to VOTING_TOKEN_ADDRESS.
        #[arg(long)]
        voting_token: Option<Address>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize telemetry
    init_telemetry(&config.telemetry);

    let chain: Arc<dyn ChainControl> = Arc::new(HardhatChain::with_retry_config(
        config.network.clone(),
        config.retry.clone(),
    ));

    match cli.command {
        Command::Info {
            id,
            governor,
            voting_token,
        } => {
            let governor = governor
                .or(config.proposals.governor)
                .ok_or(ProposalError::NoGovernor)?;
            let voting_token = voting_token.or(config.proposals.voting_token);

            tracing::info!(
                proposal_id = %id,
                governor = %governor,
                rpc_url = %config.network.rpc_url,
                "Loading proposal"
            );

            let client = Arc::new(GovernorAlphaClient::new(chain.clone(), governor, voting_token));
            let proposal =
                Proposal::load(client, chain, config.proposals.simulation.clone(), id).await?;
            let report = proposal.info().await?;

            print!("{}", render::render_report(&report));
        }
    }

    Ok(())
}
