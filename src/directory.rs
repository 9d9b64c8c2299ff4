use crate::error::StoreError;
use async_trait::async_trait;
use contender_core::alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ContractRole {
    Sender,
    Receiver,
    Swapper,
}

impl fmt::Display for ContractRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sender => "sender",
            Self::Receiver => "receiver",
            Self::Swapper => "swapper",
        })
    }
}

/// Addresses deployed on a single network.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkContracts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swapper: Option<Address>,
}

impl NetworkContracts {
    pub fn get(&self, role: ContractRole) -> Option<Address> {
        match role {
            ContractRole::Sender => self.sender,
            ContractRole::Receiver => self.receiver,
            ContractRole::Swapper => self.swapper,
        }
    }

    /// Returns the address previously stored for `role`.
    pub fn set(&mut self, role: ContractRole, address: Address) -> Option<Address> {
        let slot = match role {
            ContractRole::Sender => &mut self.sender,
            ContractRole::Receiver => &mut self.receiver,
            ContractRole::Swapper => &mut self.swapper,
        };
        slot.replace(address)
    }
}

/// network name -> deployed contracts. Iterates in key order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeployedContracts {
    networks: BTreeMap<String, NetworkContracts>,
}

impl DeployedContracts {
    pub fn network(&self, network: &str) -> Option<&NetworkContracts> {
        self.networks.get(network)
    }

    pub fn address_of(&self, network: &str, role: ContractRole) -> Option<Address> {
        self.network(network).and_then(|c| c.get(role))
    }

    pub fn sender_of(&self, network: &str) -> Option<Address> {
        self.address_of(network, ContractRole::Sender)
    }

    /// `None` means the network is not a destination.
    pub fn receiver_of(&self, network: &str) -> Option<Address> {
        self.address_of(network, ContractRole::Receiver)
    }

    /// Networks with a registered receiver, in directory order.
    pub fn receivers(&self) -> impl Iterator<Item = (&str, Address)> {
        self.networks
            .iter()
            .filter_map(|(name, c)| c.receiver.map(|r| (name.as_str(), r)))
    }

    pub fn record(
        &mut self,
        network: &str,
        role: ContractRole,
        address: Address,
    ) -> Option<Address> {
        self.networks
            .entry(network.to_owned())
            .or_default()
            .set(role, address)
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

/// Persisted deployment directory.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Reads the whole directory; a store that was never written is empty.
    async fn load(&self) -> Result<DeployedContracts, StoreError>;

    /// Sets one address and persists it before returning.
    async fn record_address(
        &self,
        network: &str,
        role: ContractRole,
        address: Address,
    ) -> Result<(), StoreError>;
}

/// JSON document on disk, rewritten in full on every record.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    // serializes read-modify-write cycles within this process
    lock: RwLock<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<DeployedContracts, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no deployment directory yet");
                return Ok(DeployedContracts::default());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if raw.trim().is_empty() {
            return Ok(DeployedContracts::default());
        }
        serde_json::from_str(&raw).map_err(|source| StoreError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    async fn write(&self, contracts: &DeployedContracts) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_string_pretty(contracts).map_err(|source| {
            StoreError::Malformed {
                path: self.path.clone(),
                source,
            }
        })?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)
    }
}

#[async_trait]
impl DeploymentStore for JsonFileStore {
    async fn load(&self) -> Result<DeployedContracts, StoreError> {
        let _guard = self.lock.read().await;
        self.read().await
    }

    async fn record_address(
        &self,
        network: &str,
        role: ContractRole,
        address: Address,
    ) -> Result<(), StoreError> {
        let _guard = self.lock.write().await;
        let mut contracts = self.read().await?;
        if let Some(previous) = contracts.record(network, role, address) {
            warn!(network, %role, %previous, %address, "overwriting recorded address");
        }
        self.write(&contracts).await?;
        debug!(network, %role, %address, path = %self.path.display(), "recorded address");
        Ok(())
    }
}

/// In-memory store. For testing only.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    contracts: RwLock<DeployedContracts>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new(contracts: DeployedContracts) -> Self {
        Self {
            contracts: RwLock::new(contracts),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn load(&self) -> Result<DeployedContracts, StoreError> {
        Ok(self.contracts.read().await.clone())
    }

    async fn record_address(
        &self,
        network: &str,
        role: ContractRole,
        address: Address,
    ) -> Result<(), StoreError> {
        self.contracts.write().await.record(network, role, address);
        Ok(())
    }
}
