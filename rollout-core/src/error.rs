//! Error types for rollout-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::EnvironmentId;

/// Failure to parse a hex-encoded chain value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseHexError {
    #[error("invalid hex '{input}': {reason}")]
    Invalid { input: String, reason: String },

    #[error("hex value '{input}' has {actual} bytes, expected {expected}")]
    Length {
        input: String,
        expected: usize,
        actual: usize,
    },
}

/// All errors that can arise from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// I/O failure, with the path that was being accessed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (write/flush path).
    #[error("registry JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A persisted record failed its integrity check on load.
    #[error("registry record at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// The registry directory belongs to a different chain.
    #[error(
        "registry for '{environment}' was written for chain {stored}, \
         environment is chain {expected}"
    )]
    ChainIdMismatch {
        environment: EnvironmentId,
        stored: u64,
        expected: u64,
    },

    /// Artifact names become file names; path-like names are refused.
    #[error("invalid artifact name '{0}'")]
    InvalidName(String),

    /// Another run holds the environment lock.
    #[error("environment '{environment}' is locked by run {holder} ({path})")]
    Locked {
        environment: EnvironmentId,
        holder: String,
        path: PathBuf,
    },
}

/// Convenience constructor for [`RegistryError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RegistryError {
    RegistryError::Io {
        path: path.into(),
        source,
    }
}

/// Errors from loading `rollout.yaml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error; includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unknown environment '{0}'")]
    UnknownEnvironment(String),

    #[error("no environment selected and no default_environment configured")]
    NoEnvironment,

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors from encoding arguments against interface descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("unsupported ABI type '{0}'")]
    UnsupportedType(String),

    #[error("{context}: expected {expected} arguments, got {actual}")]
    Arity {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("{context}: argument {index} expected {expected}, got {actual}")]
    TypeMismatch {
        context: String,
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("value {value} does not fit in {ty}")]
    Overflow { value: String, ty: String },

    #[error("no method '{method}' in interface of '{contract}'")]
    UnknownMethod { contract: String, method: String },

    #[error("method '{method}' is overloaded in '{contract}'; use the full signature")]
    AmbiguousMethod { contract: String, method: String },

    #[error("no event '{event}' in interface of '{contract}'")]
    UnknownEvent { contract: String, event: String },

    #[error("event '{event}' has no field '{field}' of type address")]
    UnknownEventField { event: String, field: String },

    #[error("malformed interface descriptor: {0}")]
    Descriptor(String),
}

/// Errors from the named account resolver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("no account mapped for role '{role}' in environment '{environment}'")]
    UnknownRole {
        role: String,
        environment: EnvironmentId,
    },

    #[error(
        "role '{role}' maps to signer #{index}, \
         but environment '{environment}' has {available} signers"
    )]
    AccountUnavailable {
        role: String,
        environment: EnvironmentId,
        index: usize,
        available: usize,
    },
}

/// Errors from the compiled-artifact store.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse compiled artifact {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("no compiled artifact named '{0}'")]
    NotFound(String),
}
