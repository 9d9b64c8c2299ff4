use crate::{
    cancel::CancelSignal,
    chain::{ChainClient, Confirmation, ConfirmationPolicy, confirm},
    contracts::{SwapTestnetUSDC, TransferUSDC, artifact::ContractArtifact},
    directory::{ContractRole, DeploymentStore},
    error::{DeployError, SubmissionError},
    networks::{NetworkConfig, NetworkRegistry},
    verify::{VerificationRequest, Verifier},
};
use contender_core::alloy::{
    primitives::{Address, Bytes, TxHash},
    sol_types::SolConstructor,
};
use std::{fmt, path::PathBuf, sync::Arc};
use tracing::{error, info, warn};

/// Contracts this harness compiles and deploys itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Deployable {
    Sender,
    Swapper,
}

impl Deployable {
    pub fn role(self) -> ContractRole {
        match self {
            Self::Sender => ContractRole::Sender,
            Self::Swapper => ContractRole::Swapper,
        }
    }

    pub fn artifact_name(self) -> &'static str {
        match self {
            Self::Sender => "TransferUSDC",
            Self::Swapper => "SwapTestnetUSDC",
        }
    }

    /// ABI-encoded constructor arguments taken from the network table.
    pub fn constructor_args(
        self,
        network: &str,
        cfg: &NetworkConfig,
    ) -> Result<Bytes, DeployError> {
        let encoded = match self {
            Self::Sender => TransferUSDC::constructorCall {
                _router: cfg.router,
                _link: cfg.link_token,
                _usdcToken: cfg.usdc_token,
            }
            .abi_encode(),
            Self::Swapper => SwapTestnetUSDC::constructorCall {
                _usdcToken: cfg.usdc_token,
                _compoundUsdcToken: NetworkConfig::require(
                    cfg.compound_usdc_token,
                    network,
                    "compoundUsdcToken",
                )?,
                _fauceteer: NetworkConfig::require(cfg.fauceteer, network, "fauceteer")?,
            }
            .abi_encode(),
        };
        Ok(encoded.into())
    }
}

impl fmt::Display for Deployable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.artifact_name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeploymentOutcome {
    Deployed {
        address: Address,
        tx_hash: TxHash,
        verified: bool,
    },
    /// No receipt came back for the creation transaction; nothing was recorded.
    Untracked(TxHash),
}

/// Deploys, verifies and records contracts on one network.
pub struct Orchestrator {
    network: String,
    registry: Arc<NetworkRegistry>,
    store: Arc<dyn DeploymentStore>,
    client: Arc<dyn ChainClient>,
    verifier: Option<Arc<dyn Verifier>>,
    artifacts: PathBuf,
    policy: ConfirmationPolicy,
    cancel: CancelSignal,
}

impl Orchestrator {
    pub fn new(
        network: impl Into<String>,
        registry: Arc<NetworkRegistry>,
        store: Arc<dyn DeploymentStore>,
        client: Arc<dyn ChainClient>,
        artifacts: impl Into<PathBuf>,
    ) -> Self {
        Self {
            network: network.into(),
            registry,
            store,
            client,
            verifier: None,
            artifacts: artifacts.into(),
            policy: ConfirmationPolicy::default(),
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_policy(mut self, policy: ConfirmationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Deploys `contracts` one after another. The first fatal error stops the batch.
    pub async fn deploy_all(
        &self,
        contracts: &[Deployable],
    ) -> Result<Vec<DeploymentOutcome>, DeployError> {
        let mut outcomes = Vec::with_capacity(contracts.len());
        for contract in contracts {
            outcomes.push(self.deploy(*contract).await?);
        }
        Ok(outcomes)
    }

    pub async fn deploy(&self, contract: Deployable) -> Result<DeploymentOutcome, DeployError> {
        let network = self.network.as_str();
        let cfg = self.registry.resolve(network)?;
        let constructor_args = contract.constructor_args(network, cfg)?;
        let artifact = ContractArtifact::load(&self.artifacts, contract.artifact_name())
            .map_err(|source| DeployError::Artifact {
                role: contract.role(),
                source,
            })?;

        if self.cancel.is_cancelled() {
            warn!(network, %contract, "cancelled, not deploying");
            return Err(DeployError::Interrupted);
        }
        info!(network, %contract, "deploying");
        let mut code = artifact.bytecode.to_vec();
        code.extend_from_slice(&constructor_args);
        let tx_hash = self
            .client
            .send_deploy(code.into())
            .await
            .map_err(SubmissionError::from)?;

        info!(
            network,
            %contract,
            %tx_hash,
            confirmations = self.policy.confirmations,
            "waiting for confirmations"
        );
        let confirmation = confirm(self.client.as_ref(), tx_hash, self.policy, &self.cancel).await?;
        let receipt = match confirmation {
            Confirmation::Mined(receipt) => receipt,
            Confirmation::Missing => {
                warn!(
                    network,
                    %contract,
                    %tx_hash,
                    "no receipt for creation transaction, skipping verification and recording"
                );
                return Ok(DeploymentOutcome::Untracked(tx_hash));
            }
            Confirmation::Cancelled => {
                warn!(
                    network,
                    %contract,
                    %tx_hash,
                    "cancelled, creation transaction remains in flight"
                );
                return Err(DeployError::Cancelled(tx_hash));
            }
        };
        if !receipt.success {
            return Err(SubmissionError::Reverted(tx_hash).into());
        }
        let address = receipt
            .contract_address
            .ok_or(DeployError::NoContractAddress(tx_hash))?;
        info!(network, %contract, %address, "deployed");

        let verified = self.verify(contract, address, &artifact, constructor_args).await;

        self.store
            .record_address(network, contract.role(), address)
            .await?;

        Ok(DeploymentOutcome::Deployed {
            address,
            tx_hash,
            verified,
        })
    }

    /// Best-effort; failures are logged and reported as `false`.
    async fn verify(
        &self,
        contract: Deployable,
        address: Address,
        artifact: &ContractArtifact,
        constructor_args: Bytes,
    ) -> bool {
        let network = self.network.as_str();
        let Some(verifier) = &self.verifier else {
            warn!(network, %contract, "no verifier configured, skipping verification");
            return false;
        };
        let chain_id = match self.client.chain_id().await {
            Ok(chain_id) => chain_id,
            Err(e) => {
                error!(
                    network,
                    %contract,
                    error = %e,
                    "failed to read chain id, skipping verification"
                );
                return false;
            }
        };
        info!(network, %contract, %address, chain_id, "verifying");
        let request = VerificationRequest {
            chain_id,
            address,
            artifact,
            constructor_args,
        };
        match verifier.verify(&request).await {
            Ok(guid) => {
                info!(network, %contract, guid = %guid, "verification submitted");
                true
            }
            Err(e) => {
                error!(network, %contract, error = %e, "error verifying contract");
                false
            }
        }
    }
}
