//! Error types for rollout-engine.

use thiserror::Error;

use rollout_chain::ChainError;
use rollout_core::error::{AbiError, AccountError, ArtifactError, ConfigError, RegistryError};
use rollout_core::{ArtifactName, UnitName};

/// Errors from declaring units and resolving the execution plan.
///
/// All of these are raised before any transaction is issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("cyclic dependency among units: {}", join(.units))]
    CyclicDependency { units: Vec<UnitName> },

    /// A requested selector or a dependency entry matches no unit name or tag.
    #[error("no unit or tag named '{name}'")]
    UnknownUnit { name: String },

    #[error("unit '{name}' is declared twice")]
    DuplicateUnit { name: UnitName },

    #[error("unit '{name}' declares no {missing}")]
    IncompleteUnit { name: UnitName, missing: &'static str },
}

fn join(units: &[UnitName]) -> String {
    units.iter().map(|u| u.0.as_str()).collect::<Vec<_>>().join(" -> ")
}

/// Why a unit failed.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Abi(#[from] AbiError),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The unit referenced an artifact that is neither staged nor recorded.
    #[error("artifact '{name}' has not been deployed")]
    MissingArtifact { name: ArtifactName },

    /// The unit finished without deploying its primary artifact.
    #[error("unit '{unit}' completed without deploying its primary artifact '{artifact}'")]
    MissingPrimary { unit: UnitName, artifact: ArtifactName },

    /// A chain query was attempted without a connected chain.
    #[error("no chain connection for query of '{artifact}'")]
    Offline { artifact: String },

    /// Failure raised by the unit's own logic.
    #[error("{0}")]
    Failed(String),
}

/// Errors that stop an environment run before the first unit.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),
}
