//! Rollout core library: domain types, ABI codec, registry persistence,
//! configuration, and account resolution.
//!
//! Public API surface:
//! - [`types`]: newtypes, chain values, fingerprints
//! - [`abi`] / [`interface`]: argument encoding and interface descriptors
//! - [`artifacts`]: compiled code + interfaces from the toolchain
//! - [`registry`]: per-environment artifact registry and run lock
//! - [`config`] / [`accounts`]: `rollout.yaml` and named accounts
//! - [`error`]: error enums for all of the above

pub mod abi;
pub mod accounts;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod interface;
pub mod registry;
pub mod types;

pub use abi::{ParamType, Token};
pub use accounts::{AccountEntry, NamedAccounts};
pub use artifacts::{ArtifactStore, CompiledArtifact};
pub use config::{
    ConfirmationConfig, EnvironmentConfig, RetryPolicy, RolloutConfig, TransportConfig,
};
pub use error::{AbiError, AccountError, ArtifactError, ConfigError, RegistryError};
pub use interface::{EventRule, FieldLocation, Interface, Method};
pub use registry::{ArtifactRecord, Registry, RegistryExport, RunLock};
pub use types::{Address, ArtifactName, EnvironmentId, Fingerprint, UnitName, H256};
