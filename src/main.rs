mod args;
mod cancel;
mod chain;
mod contracts;
mod deploy;
mod directory;
mod dispatch;
mod error;
mod networks;
mod report;
mod scenarios;
mod verify;

use args::{Args, Command, DeployArgs, SendArgs};
use cancel::{CancelHandle, cancel_pair};
use chain::RpcChainClient;
use clap::Parser;
use deploy::{DeploymentOutcome, Orchestrator};
use directory::{DeploymentStore, JsonFileStore};
use dispatch::Dispatcher;
use error::DispatchError;
use networks::NetworkRegistry;
use scenarios::ScenarioSet;
use std::{process::ExitCode, sync::Arc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use verify::EtherscanVerifier;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = Args::parse();
    let (handle, cancel) = cancel_pair();
    tokio::spawn(cancel_on_ctrl_c(handle));

    let network = args.network.clone();
    let registry = match args.networks.as_deref() {
        Some(path) => NetworkRegistry::from_file(path),
        None => NetworkRegistry::embedded(),
    };
    let registry = match registry {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    debug!(networks = ?registry.names().collect::<Vec<_>>(), "network table loaded");
    let store = JsonFileStore::new(&args.deployments);
    info!(path = %store.path().display(), "using deployment directory");
    let store: Arc<dyn DeploymentStore> = Arc::new(store);

    let result = match args.command {
        Command::Deploy(deploy) => run_deploy(network, registry, store, deploy, cancel).await,
        Command::Record { role, address } => {
            run_record(&network, &registry, store.as_ref(), role, address).await
        }
        Command::Send(send) => run_send(network, registry, store, send, cancel).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_deploy(
    network: String,
    registry: Arc<NetworkRegistry>,
    store: Arc<dyn DeploymentStore>,
    args: DeployArgs,
    cancel: cancel::CancelSignal,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = Arc::new(RpcChainClient::new(
        &args.chain.rpc_url,
        args.chain.private_key.clone(),
    ));
    let mut orchestrator = Orchestrator::new(network, registry, store, client, &args.artifacts)
        .with_policy(args.chain.policy())
        .with_cancel(cancel);
    match args.etherscan_api_key {
        Some(key) => {
            let verifier =
                EtherscanVerifier::new(args.verifier_url, key, args.verification_timeout)?;
            orchestrator = orchestrator.with_verifier(Arc::new(verifier));
        }
        None => warn!("ETHERSCAN_API_KEY not set, skipping source verification"),
    }

    for outcome in orchestrator.deploy_all(&args.contracts).await? {
        match outcome {
            DeploymentOutcome::Deployed {
                address,
                tx_hash,
                verified,
            } => info!(%address, %tx_hash, verified, "deployed"),
            DeploymentOutcome::Untracked(tx_hash) => {
                warn!(%tx_hash, "deployment has no receipt and was not recorded")
            }
        }
    }
    Ok(())
}

async fn run_record(
    network: &str,
    registry: &NetworkRegistry,
    store: &dyn DeploymentStore,
    role: directory::ContractRole,
    address: contender_core::alloy::primitives::Address,
) -> Result<(), Box<dyn std::error::Error>> {
    registry.resolve(network)?;
    store.record_address(network, role, address).await?;
    info!(network, %role, %address, "recorded");
    Ok(())
}

async fn run_send(
    network: String,
    registry: Arc<NetworkRegistry>,
    store: Arc<dyn DeploymentStore>,
    args: SendArgs,
    cancel: cancel::CancelSignal,
) -> Result<(), Box<dyn std::error::Error>> {
    let scenarios = match args.scenarios.as_deref() {
        Some(path) => ScenarioSet::from_file(path)?,
        None => args.preset.scenarios(),
    };
    let client = Arc::new(RpcChainClient::new(
        &args.chain.rpc_url,
        args.chain.private_key.clone(),
    ));
    let report = Dispatcher::new(network, registry, store, client, scenarios)
        .with_policy(args.chain.policy())
        .with_fee_approval(!args.skip_fee_approval)
        .with_cancel(cancel)
        .run()
        .await?;

    print!("{report}");
    if let Some(path) = args.report {
        report
            .write_json(&path)
            .map_err(|e| DispatchError::Report(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), records = report.len(), "wrote message report");
    }
    Ok(())
}

async fn cancel_on_ctrl_c(handle: CancelHandle) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("interrupted, no further transactions will be sent");
            handle.cancel();
        }
        Err(e) => warn!("failed to listen for ctrl-c: {e}"),
    }
}

fn init_tracing() {
    // fallback if RUST_LOG is unset
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .init();
}
