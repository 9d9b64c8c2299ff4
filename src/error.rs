use crate::{contracts::artifact::ArtifactError, directory::ContractRole};
use contender_core::alloy::primitives::TxHash;
use std::path::PathBuf;
use thiserror::Error;

/// Static configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no network configuration found for `{0}`")]
    NetworkNotFound(String),
    #[error("network `{0}` has a receiver but no chain selector configured")]
    MissingChainSelector(String),
    #[error("network `{network}` has no `{field}` configured")]
    MissingField {
        network: String,
        field: &'static str,
    },
    #[error("no sender deployed on source network `{0}`")]
    MissingSender(String),
    #[error("invalid transfer scenario: {0}")]
    InvalidScenario(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Errors returned by a [`crate::directory::DeploymentStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("deployment directory io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed deployment directory {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Failures reported by the RPC client itself.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("failed to watch transaction {tx_hash}: {reason}")]
    Watch { tx_hash: TxHash, reason: String },
    #[error("abi error: {0}")]
    Abi(#[from] contender_core::alloy::sol_types::Error),
}

/// A transaction was rejected or reverted. Never retried.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("transaction rejected: {0}")]
    Rejected(#[from] ChainError),
    #[error("transaction {0} reverted")]
    Reverted(TxHash),
}

/// Source verification failed. Advisory only.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("failed to load verification input: {0}")]
    Input(#[from] ArtifactError),
    #[error("verifier request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("verifier rejected submission: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error("failed to load artifact for {role}: {source}")]
    Artifact {
        role: ContractRole,
        source: ArtifactError,
    },
    #[error("creation transaction {0} has no contract address")]
    NoContractAddress(TxHash),
    #[error("cancelled while waiting for transaction {0}")]
    Cancelled(TxHash),
    #[error("cancelled before the next transaction was sent")]
    Interrupted,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error("cancelled while waiting for transaction {0}")]
    Cancelled(TxHash),
    #[error("cancelled before the next transaction was sent")]
    Interrupted,
    #[error("failed to write report: {0}")]
    Report(String),
}

impl From<ChainError> for DeployError {
    fn from(e: ChainError) -> Self {
        Self::Submission(e.into())
    }
}

impl From<ChainError> for DispatchError {
    fn from(e: ChainError) -> Self {
        Self::Submission(e.into())
    }
}
