//! Compiled contract artifacts (Hardhat and Foundry layouts).

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use alloy_core::primitives::Bytes;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{DeployError, Result};

/// Creation bytecode and source metadata for one contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub contract_name: String,
    /// Source path, e.g. `contracts/DigiPass.sol`.
    pub source_name: Option<String>,
    pub bytecode: Bytes,
}

impl Artifact {
    pub fn new(contract_name: impl Into<String>, bytecode: impl Into<Bytes>) -> Self {
        Self {
            contract_name: contract_name.into(),
            source_name: None,
            bytecode: bytecode.into(),
        }
    }

    /// Fully qualified name as explorers expect it (`path:Name`).
    pub fn qualified_name(&self) -> String {
        match &self.source_name {
            Some(source) => format!("{}:{}", source, self.contract_name),
            None => self.contract_name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactFile {
    #[serde(default)]
    contract_name: Option<String>,
    #[serde(default)]
    source_name: Option<String>,
    bytecode: Value,
}

/// Looks up artifacts by contract name.
///
/// Artifacts are read from a build output directory (`artifacts/` for Hardhat, `out/` for
/// Foundry) on first use and cached. Entries can also be registered directly.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    root: Option<PathBuf>,
    cache: HashMap<String, Artifact>,
}

impl ArtifactStore {
    /// Store reading from `root`.
    pub fn from_dir(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            cache: HashMap::new(),
        }
    }

    /// Store holding only the given artifacts.
    pub fn from_artifacts(artifacts: impl IntoIterator<Item = Artifact>) -> Self {
        Self {
            root: None,
            cache: artifacts
                .into_iter()
                .map(|a| (a.contract_name.clone(), a))
                .collect(),
        }
    }

    pub fn insert(&mut self, artifact: Artifact) {
        self.cache.insert(artifact.contract_name.clone(), artifact);
    }

    /// Artifact for `contract_name`.
    pub fn get(&mut self, contract_name: &str) -> Result<Artifact> {
        if let Some(artifact) = self.cache.get(contract_name) {
            return Ok(artifact.clone());
        }

        let root = self.root.as_ref().ok_or_else(|| DeployError::Artifact {
            contract: contract_name.to_string(),
            reason: "no artifact registered and no artifact directory configured".to_string(),
        })?;

        let path = find_artifact(root, contract_name)?.ok_or_else(|| DeployError::Artifact {
            contract: contract_name.to_string(),
            reason: format!("not found under {}", root.display()),
        })?;

        let artifact = load_artifact(&path, contract_name)?;
        tracing::debug!(
            contract = contract_name,
            path = %path.display(),
            bytecode_len = artifact.bytecode.len(),
            "Artifact loaded"
        );
        self.cache.insert(contract_name.to_string(), artifact.clone());
        Ok(artifact)
    }
}

/// Depth-first search for `<Name>.json` below `root`, skipping debug and build-info files.
fn find_artifact(root: &Path, contract_name: &str) -> Result<Option<PathBuf>> {
    let file_name = format!("{contract_name}.json");
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| DeployError::Artifact {
            contract: contract_name.to_string(),
            reason: format!("failed to read {}: {e}", dir.display()),
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if path.file_name().is_some_and(|n| n != "build-info") {
                    stack.push(path);
                }
            } else if path.file_name().is_some_and(|n| n == file_name.as_str()) {
                return Ok(Some(path));
            }
        }
    }

    Ok(None)
}

fn load_artifact(path: &Path, contract_name: &str) -> Result<Artifact> {
    let artifact_err = |reason: String| DeployError::Artifact {
        contract: contract_name.to_string(),
        reason,
    };

    let content = std::fs::read_to_string(path)
        .map_err(|e| artifact_err(format!("failed to read {}: {e}", path.display())))?;
    let file: ArtifactFile = serde_json::from_str(&content)
        .map_err(|e| artifact_err(format!("failed to parse {}: {e}", path.display())))?;

    // Hardhat stores a hex string, Foundry an object with an `object` field.
    let hex_code = match &file.bytecode {
        Value::String(code) => code.as_str(),
        Value::Object(obj) => obj
            .get("object")
            .and_then(Value::as_str)
            .ok_or_else(|| artifact_err("bytecode object missing".to_string()))?,
        _ => return Err(artifact_err("unexpected bytecode format".to_string())),
    };

    let bytecode = hex::decode(hex_code.trim_start_matches("0x"))
        .map_err(|e| artifact_err(format!("invalid bytecode hex: {e}")))?;
    if bytecode.is_empty() {
        return Err(artifact_err(
            "empty bytecode (abstract contract or interface?)".to_string(),
        ));
    }

    Ok(Artifact {
        contract_name: file.contract_name.unwrap_or_else(|| contract_name.to_string()),
        source_name: file.source_name,
        bytecode: bytecode.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loads_hardhat_and_foundry_layouts() {
        let dir = tempdir::TempDir::new("digipass-artifacts").unwrap();
        let hardhat = dir.path().join("contracts/DigiPass.sol");
        let foundry = dir.path().join("out/SourceTicketPurchase.sol");
        std::fs::create_dir_all(&hardhat).unwrap();
        std::fs::create_dir_all(&foundry).unwrap();

        std::fs::write(
            hardhat.join("DigiPass.json"),
            r#"{"contractName":"DigiPass","sourceName":"contracts/DigiPass.sol","bytecode":"0x6080"}"#,
        )
        .unwrap();
        std::fs::write(
            foundry.join("SourceTicketPurchase.json"),
            r#"{"bytecode":{"object":"0x6001"}}"#,
        )
        .unwrap();

        let mut store = ArtifactStore::from_dir(dir.path());

        let digipass = store.get("DigiPass").unwrap();
        assert_eq!(digipass.bytecode.as_ref(), &[0x60, 0x80]);
        assert_eq!(digipass.qualified_name(), "contracts/DigiPass.sol:DigiPass");

        let source = store.get("SourceTicketPurchase").unwrap();
        assert_eq!(source.bytecode.as_ref(), &[0x60, 0x01]);
        assert_eq!(source.qualified_name(), "SourceTicketPurchase");
    }

    #[test]
    fn test_missing_and_empty_artifacts() {
        let dir = tempdir::TempDir::new("digipass-artifacts").unwrap();
        std::fs::write(
            dir.path().join("IRouter.json"),
            r#"{"contractName":"IRouter","bytecode":"0x"}"#,
        )
        .unwrap();

        let mut store = ArtifactStore::from_dir(dir.path());
        assert!(matches!(
            store.get("Missing").unwrap_err(),
            DeployError::Artifact { .. }
        ));
        assert!(matches!(
            store.get("IRouter").unwrap_err(),
            DeployError::Artifact { .. }
        ));
    }

    #[test]
    fn test_registered_artifacts_need_no_directory() {
        let mut store = ArtifactStore::from_artifacts([Artifact::new("DigiPass", vec![0x60])]);
        assert!(store.get("DigiPass").is_ok());
        assert!(store.get("Other").is_err());
    }
}
