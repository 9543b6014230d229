//! Loading of compiled contract artifacts (ABI and creation bytecode)

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use alloy::{
    json_abi::{ContractObject, JsonAbi},
    primitives::Bytes,
};

use crate::{constants::ARTIFACT_EXTENSION, errors::ScriptError};

/// The parts of a compiled contract the scripts need
#[derive(Clone, Debug, PartialEq)]
pub struct ContractArtifact {
    /// The contract ABI
    pub abi: JsonAbi,
    /// The creation bytecode, absent for interfaces and abstract contracts
    pub bytecode: Option<Bytes>,
}

impl ContractArtifact {
    /// An artifact from an ABI and creation bytecode
    pub fn new(abi: JsonAbi, bytecode: Option<Bytes>) -> Self {
        Self { abi, bytecode }
    }

    /// Parse a Hardhat or Foundry artifact file's contents
    pub fn parse(json: &str) -> Result<Self, ScriptError> {
        let object: ContractObject =
            serde_json::from_str(json).map_err(|e| ScriptError::ArtifactLoading(e.to_string()))?;

        let abi = object
            .abi
            .ok_or_else(|| ScriptError::ArtifactLoading("artifact has no ABI".to_string()))?;
        let bytecode = object.bytecode.filter(|code| !code.is_empty());

        Ok(Self { abi, bytecode })
    }

    /// The creation bytecode, or an error naming the contract if there is none
    pub fn creation_code(&self, contract: &str) -> Result<&Bytes, ScriptError> {
        self.bytecode.as_ref().ok_or_else(|| {
            ScriptError::ArtifactLoading(format!("artifact `{contract}` has no creation bytecode"))
        })
    }
}

/// A lazily populated set of artifacts, keyed by contract name
#[derive(Debug, Default)]
pub struct ArtifactStore {
    /// The directory searched for artifact files
    root: Option<PathBuf>,
    /// The artifacts loaded so far
    cache: HashMap<String, Arc<ContractArtifact>>,
}

impl ArtifactStore {
    /// A store searching the given directory, recursively
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            cache: HashMap::new(),
        }
    }

    /// A store holding only the artifacts inserted into it
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Register an artifact under the given contract name
    pub fn insert(&mut self, contract: &str, artifact: ContractArtifact) {
        self.cache.insert(contract.to_string(), Arc::new(artifact));
    }

    /// Get the artifact for the given contract, reading it from disk on first use
    pub fn load(&mut self, contract: &str) -> Result<Arc<ContractArtifact>, ScriptError> {
        if let Some(artifact) = self.cache.get(contract) {
            return Ok(artifact.clone());
        }

        let root = self.root.as_ref().ok_or_else(|| {
            ScriptError::ArtifactLoading(format!("no artifact registered for `{contract}`"))
        })?;
        let path = find_artifact(root, contract)?.ok_or_else(|| {
            ScriptError::ArtifactLoading(format!(
                "no artifact for `{contract}` under {}",
                root.display()
            ))
        })?;

        let contents =
            fs::read_to_string(&path).map_err(|e| ScriptError::ArtifactLoading(e.to_string()))?;
        let artifact = Arc::new(ContractArtifact::parse(&contents)?);
        self.cache.insert(contract.to_string(), artifact.clone());

        Ok(artifact)
    }
}

/// Search `dir` depth-first for `<contract>.json`
fn find_artifact(dir: &Path, contract: &str) -> Result<Option<PathBuf>, ScriptError> {
    let file_name = format!("{contract}.{ARTIFACT_EXTENSION}");
    let entries = fs::read_dir(dir).map_err(|e| {
        ScriptError::ArtifactLoading(format!("reading {}: {}", dir.display(), e))
    })?;

    let mut subdirs = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| ScriptError::ArtifactLoading(e.to_string()))?
            .path();

        if path.is_dir() {
            subdirs.push(path);
            continue;
        }

        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name == file_name);
        if matches {
            return Ok(Some(path));
        }
    }

    subdirs.sort();
    for subdir in subdirs {
        if let Some(path) = find_artifact(&subdir, contract)? {
            return Ok(Some(path));
        }
    }

    Ok(None)
}
