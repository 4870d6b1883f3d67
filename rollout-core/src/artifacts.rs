//! Compiled-artifact store: code and interface descriptors supplied by the
//! compiler toolchain.
//!
//! Reads Hardhat-format JSON (`contractName`, `abi`, `bytecode`) found
//! anywhere under the artifacts directory. Debug sidecars (`*.dbg.json`) and
//! interface-only artifacts (empty bytecode) are skipped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ArtifactError;
use crate::interface::Interface;
use crate::types::{hex_bytes, Fingerprint};

/// Deployable code plus its interface descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompiledArtifact {
    #[serde(rename = "contractName")]
    pub contract_name: String,
    pub abi: Interface,
    #[serde(with = "hex_bytes")]
    pub bytecode: Vec<u8>,
}

impl CompiledArtifact {
    pub fn new(contract_name: impl Into<String>, abi: Interface, bytecode: Vec<u8>) -> Self {
        Self {
            contract_name: contract_name.into(),
            abi,
            bytecode,
        }
    }

    /// Fingerprint over the creation code and the interface descriptor.
    pub fn code_fingerprint(&self) -> Fingerprint {
        let mut buf = self.bytecode.clone();
        buf.extend_from_slice(self.abi.fingerprint().0.as_bytes());
        Fingerprint::of(&buf)
    }
}

/// Compiled artifacts indexed by contract name.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    artifacts: BTreeMap<String, CompiledArtifact>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recursively index every artifact under `dir`.
    ///
    /// A missing directory yields an empty store. When two files declare the
    /// same contract name, the one with the lexicographically first path wins.
    pub fn load_dir(dir: &Path) -> Result<Self, ArtifactError> {
        let mut store = Self::new();
        if !dir.exists() {
            return Ok(store);
        }
        let mut files = Vec::new();
        collect_json(dir, &mut files)?;
        files.sort();

        for path in files {
            let contents = std::fs::read_to_string(&path).map_err(|source| ArtifactError::Io {
                path: path.clone(),
                source,
            })?;
            let value: serde_json::Value =
                serde_json::from_str(&contents).map_err(|e| ArtifactError::Parse {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            // Build-info and cache files share the directory; only objects
            // carrying both fields are artifacts.
            if value.get("contractName").is_none() || value.get("bytecode").is_none() {
                continue;
            }
            let artifact: CompiledArtifact =
                serde_json::from_value(value).map_err(|e| ArtifactError::Parse {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            if artifact.bytecode.is_empty() {
                tracing::debug!(
                    contract = %artifact.contract_name,
                    "skipping interface-only artifact"
                );
                continue;
            }
            store
                .artifacts
                .entry(artifact.contract_name.clone())
                .or_insert(artifact);
        }
        tracing::debug!(
            count = store.artifacts.len(),
            dir = %dir.display(),
            "indexed compiled artifacts"
        );
        Ok(store)
    }

    pub fn insert(&mut self, artifact: CompiledArtifact) {
        self.artifacts.insert(artifact.contract_name.clone(), artifact);
    }

    pub fn get(&self, contract: &str) -> Result<&CompiledArtifact, ArtifactError> {
        self.artifacts
            .get(contract)
            .ok_or_else(|| ArtifactError::NotFound(contract.to_owned()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

fn collect_json(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), ArtifactError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ArtifactError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            collect_json(&path, out)?;
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".json") && !name.ends_with(".dbg.json") {
            out.push(path);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
