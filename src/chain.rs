use crate::{cancel::CancelSignal, contracts::IERC20, error::ChainError};
use async_trait::async_trait;
use contender_core::alloy::{
    network::{AnyNetwork, AnyTransactionReceipt, EthereumWallet, ReceiptResponse},
    primitives::{Address, Bytes, TxHash, TxKind, U256},
    providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder},
    rpc::types::{Log, TransactionInput, TransactionRequest},
    signers::local::PrivateKeySigner,
    sol_types::{SolCall, SolValue},
    transports::http::reqwest::Url,
};
use std::time::Duration;
use tracing::{debug, warn};

/// Confirmations observed before a transaction counts as final.
pub const DEFAULT_CONFIRMATIONS: u64 = 5;
/// Upper bound for a single confirmation wait.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(600);

/// The parts of a mined receipt the harness looks at.
#[derive(Clone, Debug, Default)]
pub struct ConfirmedReceipt {
    pub tx_hash: TxHash,
    pub success: bool,
    pub contract_address: Option<Address>,
    /// In emission order.
    pub logs: Vec<Log>,
}

impl From<AnyTransactionReceipt> for ConfirmedReceipt {
    fn from(receipt: AnyTransactionReceipt) -> Self {
        Self {
            tx_hash: receipt.transaction_hash(),
            success: receipt.status(),
            contract_address: receipt.contract_address(),
            logs: receipt.inner.inner.logs().to_vec(),
        }
    }
}

/// Everything the harness needs from a chain, bound to one signer.
///
/// Submission returns as soon as the node accepted the transaction; waiting
/// is a separate step so callers can put their own timeout around it.
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn signer_address(&self) -> Address;

    async fn chain_id(&self) -> Result<u64, ChainError>;

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, ChainError>;

    async fn send_call(&self, to: Address, input: Bytes) -> Result<TxHash, ChainError>;

    async fn send_deploy(&self, code: Bytes) -> Result<TxHash, ChainError>;

    /// Blocks until `tx_hash` has `confirmations` blocks on top of it.
    /// `None` if the node has no receipt for it afterwards.
    async fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
        confirmations: u64,
    ) -> Result<Option<ConfirmedReceipt>, ChainError>;
}

/// JSON-RPC backed [`ChainClient`]. Nonce, gas and chain id are filled by the provider.
pub struct RpcChainClient {
    provider: DynProvider<AnyNetwork>,
    signer: Address,
}

impl RpcChainClient {
    pub fn new(rpc_url: &Url, signer: PrivateKeySigner) -> Self {
        let address = signer.address();
        let provider = DynProvider::new(
            ProviderBuilder::new()
                .network::<AnyNetwork>()
                .wallet(EthereumWallet::new(signer))
                .connect_http(rpc_url.to_owned()),
        );
        Self {
            provider,
            signer: address,
        }
    }

    async fn send(&self, tx: TransactionRequest) -> Result<TxHash, ChainError> {
        let pending = self
            .provider
            .send_transaction(tx.into())
            .await
            .map_err(rpc_error)?;
        Ok(*pending.tx_hash())
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    fn signer_address(&self) -> Address {
        self.signer
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.provider.get_chain_id().await.map_err(rpc_error)
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, ChainError> {
        let calldata = IERC20::balanceOfCall { account: owner }.abi_encode();
        let tx = TransactionRequest::default()
            .to(token)
            .input(Bytes::from(calldata).into());
        let output = self.provider.call(tx.into()).await.map_err(rpc_error)?;
        Ok(U256::abi_decode(&output)?)
    }

    async fn send_call(&self, to: Address, input: Bytes) -> Result<TxHash, ChainError> {
        let tx = TransactionRequest::default()
            .from(self.signer)
            .to(to)
            .input(input.into());
        self.send(tx).await
    }

    async fn send_deploy(&self, code: Bytes) -> Result<TxHash, ChainError> {
        let tx = TransactionRequest {
            from: Some(self.signer),
            to: Some(TxKind::Create),
            input: TransactionInput::both(code),
            ..Default::default()
        };
        self.send(tx).await
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
        confirmations: u64,
    ) -> Result<Option<ConfirmedReceipt>, ChainError> {
        let tx_hash = PendingTransactionBuilder::new(self.provider.root().clone(), tx_hash)
            .with_required_confirmations(confirmations.max(1))
            .watch()
            .await
            .map_err(|e| ChainError::Watch {
                tx_hash,
                reason: e.to_string(),
            })?;
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(rpc_error)?;
        Ok(receipt.map(ConfirmedReceipt::from))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub confirmations: u64,
    pub timeout: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            confirmations: DEFAULT_CONFIRMATIONS,
            timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        }
    }
}

#[derive(Debug)]
pub enum Confirmation {
    Mined(ConfirmedReceipt),
    /// The wait finished, or timed out, without a receipt.
    Missing,
    /// The transaction is still in flight on-chain.
    Cancelled,
}

/// Waits for `tx_hash` under `policy`, giving up early if `cancel` fires.
pub async fn confirm(
    client: &dyn ChainClient,
    tx_hash: TxHash,
    policy: ConfirmationPolicy,
    cancel: &CancelSignal,
) -> Result<Confirmation, ChainError> {
    debug!(%tx_hash, confirmations = policy.confirmations, "waiting for confirmations");
    let wait = tokio::time::timeout(
        policy.timeout,
        client.wait_for_receipt(tx_hash, policy.confirmations),
    );
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(Confirmation::Cancelled),
        waited = wait => match waited {
            Ok(Ok(Some(receipt))) => Ok(Confirmation::Mined(receipt)),
            Ok(Ok(None)) => Ok(Confirmation::Missing),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(%tx_hash, timeout = ?policy.timeout, "gave up waiting for confirmations");
                Ok(Confirmation::Missing)
            }
        },
    }
}

fn rpc_error(e: impl std::fmt::Display) -> ChainError {
    ChainError::Rpc(e.to_string())
}
