//! Transfer scenarios sent to each destination.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};

/// One transfer to execute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferParams {
    /// Loop iterations the receiver runs, simulating payload processing cost.
    pub iterations: u64,
    /// USDC base units.
    pub amount: u64,
    /// Gas available to the receiver on the destination chain.
    pub gas_limit: u64,
}

impl TransferParams {
    pub const fn new(iterations: u64, amount: u64, gas_limit: u64) -> Self {
        Self {
            iterations,
            amount,
            gas_limit,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.amount == 0 {
            return Err(ConfigError::InvalidScenario(format!(
                "amount must be positive: {self:?}"
            )));
        }
        if self.gas_limit == 0 {
            return Err(ConfigError::InvalidScenario(format!(
                "gas limit must be positive: {self:?}"
            )));
        }
        Ok(())
    }
}

/// gasUsed * 1.10 as measured on testnet.
pub const PROD: &[TransferParams] = &[TransferParams::new(0, 1_000_000, 180_970)];

/// Minimum, average and maximum receiver iterations.
pub const CALIBRATION: &[TransferParams] = &[
    TransferParams::new(0, 1_000_000, 5_685),
    TransferParams::new(50, 1_000_000, 16_190),
    TransferParams::new(99, 1_000_000, 26_485),
];

/// Scenarios shared by all destinations, optionally replaced per destination
/// where that chain needs its own gas calibration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioSet {
    pub default: Vec<TransferParams>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, Vec<TransferParams>>,
}

impl ScenarioSet {
    pub fn uniform(params: &[TransferParams]) -> Self {
        Self {
            default: params.to_vec(),
            overrides: BTreeMap::new(),
        }
    }

    pub fn prod() -> Self {
        Self::uniform(PROD)
    }

    pub fn calibration() -> Self {
        Self::uniform(CALIBRATION)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let set: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        set.validate()?;
        Ok(set)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.default
            .iter()
            .chain(self.overrides.values().flatten())
            .try_for_each(TransferParams::validate)
    }

    /// Scenarios for `destination`, in the order they are sent.
    pub fn for_destination(&self, destination: &str) -> &[TransferParams] {
        self.overrides
            .get(destination)
            .map(Vec::as_slice)
            .unwrap_or(self.default.as_slice())
    }
}
