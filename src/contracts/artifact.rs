//! Hardhat compilation artifacts.
//!
//! Layout under the artifacts root:
//! - `contracts/<Name>.sol/<Name>.json` holds the creation bytecode
//! - `contracts/<Name>.sol/<Name>.dbg.json` points at the build-info file
//! - `build-info/<hash>.json` holds the compiler version and standard-json input

use contender_core::alloy::primitives::Bytes;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactError {
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
    #[error("{0} has no creation bytecode (abstract contract or interface?)")]
    EmptyBytecode(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HardhatArtifact {
    contract_name: String,
    source_name: String,
    bytecode: Bytes,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugFile {
    build_info: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildInfo {
    solc_long_version: String,
    input: serde_json::Value,
}

#[derive(Clone, Debug)]
pub struct ContractArtifact {
    pub name: String,
    pub source_name: String,
    pub bytecode: Bytes,
    dir: PathBuf,
}

/// What a source verifier needs besides the address and constructor args.
#[derive(Clone, Debug)]
pub struct VerificationInput {
    /// e.g. `v0.8.24+commit.e11b9ed9`
    pub compiler_version: String,
    pub standard_json: String,
}

impl ContractArtifact {
    pub fn load(root: &Path, name: &str) -> Result<Self, ArtifactError> {
        let dir = root.join("contracts").join(format!("{name}.sol"));
        let artifact: HardhatArtifact = read_json(&dir.join(format!("{name}.json")))?;
        if artifact.bytecode.is_empty() {
            return Err(ArtifactError::EmptyBytecode(artifact.contract_name));
        }
        Ok(Self {
            name: artifact.contract_name,
            source_name: artifact.source_name,
            bytecode: artifact.bytecode,
            dir,
        })
    }

    /// `<sourceName>:<contractName>`, the form explorers expect.
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.name)
    }

    pub fn verification_input(&self) -> Result<VerificationInput, ArtifactError> {
        let dbg: DebugFile = read_json(&self.dir.join(format!("{}.dbg.json", self.name)))?;
        let info: BuildInfo = read_json(&self.dir.join(dbg.build_info))?;
        let standard_json =
            serde_json::to_string(&info.input).map_err(|source| ArtifactError::Parse {
                path: self.dir.clone(),
                source,
            })?;
        Ok(VerificationInput {
            compiler_version: format!("v{}", info.solc_long_version),
            standard_json,
        })
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ArtifactError::Parse {
        path: path.to_owned(),
        source,
    })
}
