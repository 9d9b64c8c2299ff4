use crate::{
    chain::{ConfirmationPolicy, DEFAULT_CONFIRMATIONS},
    deploy::Deployable,
    directory::ContractRole,
    scenarios::ScenarioSet,
};
use clap::{Parser, Subcommand, ValueEnum};
use contender_core::alloy::{
    primitives::Address, signers::local::PrivateKeySigner, transports::http::reqwest::Url,
};
use std::{path::PathBuf, time::Duration};

/// Deploys the CCIP USDC transfer contracts and sends test transfers through them.
#[derive(Debug, Parser)]
#[command(name = "ccip-usdc-harness", version, about, long_about = None)]
pub struct Args {
    /// Network the command acts on, as named in the network table.
    #[arg(long, short, env = "CCIP_NETWORK")]
    pub network: String,

    /// Deployment directory, created on first write.
    #[arg(long, env = "CCIP_DEPLOYMENTS", default_value = "generatedData.json")]
    pub deployments: PathBuf,

    /// Replaces the built-in network table.
    #[arg(long, env = "CCIP_NETWORKS")]
    pub networks: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy contracts on `--network`, verify them and record their addresses.
    Deploy(DeployArgs),
    /// Record an address deployed elsewhere, e.g. a receiver on a destination chain.
    Record {
        #[arg(long, value_enum)]
        role: ContractRole,
        #[arg(long)]
        address: Address,
    },
    /// Send every scenario to every destination from `--network`'s sender.
    Send(SendArgs),
}

/// Connection to the chain a command submits transactions on.
#[derive(Debug, clap::Args)]
pub struct ChainArgs {
    #[arg(long, env = "CCIP_RPC_URL")]
    pub rpc_url: Url,

    #[arg(long, env = "CCIP_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: PrivateKeySigner,

    /// Blocks to wait on top of each transaction.
    #[arg(long, env = "CCIP_CONFIRMATIONS", default_value_t = DEFAULT_CONFIRMATIONS)]
    pub confirmations: u64,

    /// Seconds before a confirmation wait gives up.
    #[arg(
        long,
        env = "CCIP_CONFIRMATION_TIMEOUT",
        value_parser = parse_duration_secs,
        default_value = "600"
    )]
    pub confirmation_timeout: Duration,
}

impl ChainArgs {
    pub fn policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            confirmations: self.confirmations,
            timeout: self.confirmation_timeout,
        }
    }
}

#[derive(Debug, clap::Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub chain: ChainArgs,

    /// Contracts to deploy, in order.
    #[arg(long = "contract", value_enum, required = true)]
    pub contracts: Vec<Deployable>,

    /// Hardhat artifacts directory.
    #[arg(long, env = "CCIP_ARTIFACTS", default_value = "artifacts")]
    pub artifacts: PathBuf,

    /// Verification is skipped without a key.
    #[arg(long, env = "ETHERSCAN_API_KEY", hide_env_values = true)]
    pub etherscan_api_key: Option<String>,

    #[arg(long, env = "CCIP_VERIFIER_URL", default_value = "https://api.etherscan.io/v2/api")]
    pub verifier_url: reqwest::Url,

    /// Seconds before a verification request gives up.
    #[arg(
        long,
        env = "CCIP_VERIFICATION_TIMEOUT",
        value_parser = parse_duration_secs,
        default_value = "60"
    )]
    pub verification_timeout: Duration,
}

#[derive(Debug, clap::Args)]
pub struct SendArgs {
    #[command(flatten)]
    pub chain: ChainArgs,

    #[arg(long, value_enum, default_value_t = Preset::Prod)]
    pub preset: Preset,

    /// Scenario file; takes precedence over `--preset`.
    #[arg(long)]
    pub scenarios: Option<PathBuf>,

    /// Don't approve the sender for LINK fees before sending.
    #[arg(long)]
    pub skip_fee_approval: bool,

    /// Also write the message report as JSON.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    /// One transfer gas-limited for production.
    Prod,
    /// Minimum, average and maximum receiver workloads.
    Calibration,
}

impl Preset {
    pub fn scenarios(self) -> ScenarioSet {
        match self {
            Self::Prod => ScenarioSet::prod(),
            Self::Calibration => ScenarioSet::calibration(),
        }
    }
}

fn parse_duration_secs(arg: &str) -> Result<Duration, std::num::ParseIntError> {
    let seconds = arg.parse()?;
    Ok(Duration::from_secs(seconds))
}
