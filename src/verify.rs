//! Source verification on Etherscan-compatible explorers.

use crate::{contracts::artifact::ContractArtifact, error::VerificationError};
use async_trait::async_trait;
use contender_core::alloy::{
    hex,
    primitives::{Address, Bytes},
};
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Upper bound for one submission to the explorer.
pub const DEFAULT_VERIFICATION_TIMEOUT: Duration = Duration::from_secs(60);

pub struct VerificationRequest<'a> {
    /// Chain the contract lives on; multi-chain explorer APIs route on it.
    pub chain_id: u64,
    pub address: Address,
    pub artifact: &'a ContractArtifact,
    /// ABI-encoded constructor arguments, without the bytecode.
    pub constructor_args: Bytes,
}

#[async_trait]
pub trait Verifier: Send + Sync {
    /// Submits a verification job and returns the explorer's job id.
    async fn verify(&self, request: &VerificationRequest<'_>) -> Result<String, VerificationError>;
}

pub struct EtherscanVerifier {
    client: reqwest::Client,
    api_url: Url,
    api_key: String,
}

#[derive(Deserialize)]
struct EtherscanResponse {
    status: String,
    message: String,
    result: String,
}

impl EtherscanVerifier {
    pub fn new(
        api_url: Url,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self, VerificationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url,
            api_key,
        })
    }
}

#[async_trait]
impl Verifier for EtherscanVerifier {
    async fn verify(&self, request: &VerificationRequest<'_>) -> Result<String, VerificationError> {
        let input = request.artifact.verification_input()?;
        let chain_id = request.chain_id.to_string();
        let address = request.address.to_string();
        let contract_name = request.artifact.qualified_name();
        let constructor_args = hex::encode(&request.constructor_args);
        let params = [
            ("apikey", self.api_key.as_str()),
            ("chainid", chain_id.as_str()),
            ("module", "contract"),
            ("action", "verifysourcecode"),
            ("contractaddress", address.as_str()),
            ("sourceCode", input.standard_json.as_str()),
            ("codeformat", "solidity-standard-json-input"),
            ("contractname", contract_name.as_str()),
            ("compilerversion", input.compiler_version.as_str()),
            // sic, the explorer API spells it this way
            ("constructorArguements", constructor_args.as_str()),
        ];
        debug!(%chain_id, %address, %contract_name, "submitting source verification");

        let response: EtherscanResponse = self
            .client
            .post(self.api_url.clone())
            .form(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.status != "1" {
            return Err(VerificationError::Rejected(format!(
                "{}: {}",
                response.message, response.result
            )));
        }
        Ok(response.result)
    }
}
