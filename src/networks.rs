use crate::error::ConfigError;
use contender_core::alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};

static EMBEDDED_NETWORKS: &str = include_str!("./networks.json");

/// Static per-network CCIP parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub router: Address,
    /// Token the CCIP fee is paid in.
    pub link_token: Address,
    pub usdc_token: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compound_usdc_token: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fauceteer: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_selector: Option<u64>,
}

impl NetworkConfig {
    /// Destinations must have a selector; a transfer is never sent without one.
    pub fn destination_selector(&self, network: &str) -> Result<u64, ConfigError> {
        self.chain_selector
            .ok_or_else(|| ConfigError::MissingChainSelector(network.to_owned()))
    }

    pub fn require<T: Copy>(
        value: Option<T>,
        network: &str,
        field: &'static str,
    ) -> Result<T, ConfigError> {
        value.ok_or_else(|| ConfigError::MissingField {
            network: network.to_owned(),
            field,
        })
    }
}

/// Read-only lookup table, network name -> [`NetworkConfig`].
#[derive(Clone, Debug, Default)]
pub struct NetworkRegistry {
    networks: BTreeMap<String, NetworkConfig>,
}

impl NetworkRegistry {
    /// The table compiled into the binary.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_json(EMBEDDED_NETWORKS, Path::new("networks.json"))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json(&raw, path)
    }

    fn from_json(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        let networks = serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_owned(),
            source,
        })?;
        Ok(Self { networks })
    }

    pub fn resolve(&self, network: &str) -> Result<&NetworkConfig, ConfigError> {
        self.networks
            .get(network)
            .ok_or_else(|| ConfigError::NetworkNotFound(network.to_owned()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.networks.keys().map(String::as_str)
    }
}

impl FromIterator<(String, NetworkConfig)> for NetworkRegistry {
    fn from_iter<I: IntoIterator<Item = (String, NetworkConfig)>>(iter: I) -> Self {
        Self {
            networks: iter.into_iter().collect(),
        }
    }
}
