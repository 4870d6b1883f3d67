//! Deployment status of each unit against the registry.
//!
//! Offline: constructor arguments are resolved without a chain connection, so
//! a unit whose arguments need a chain query reports [`UnitStatus::Unknown`].

use std::collections::BTreeSet;

use rollout_core::{Address, Registry, UnitName};

use crate::context::{Context, Environment, Identity};
use crate::graph::ExecutionPlan;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    /// Registry record matches the current fingerprint; a run would skip it.
    Current { address: Address },
    /// A record exists but code or arguments changed since.
    Changed { address: Address },
    NotDeployed,
    /// The fingerprint could not be computed.
    Unknown { reason: String },
}

impl UnitStatus {
    pub fn label(&self) -> &'static str {
        match self {
            UnitStatus::Current { .. } => "current",
            UnitStatus::Changed { .. } => "changed",
            UnitStatus::NotDeployed => "not deployed",
            UnitStatus::Unknown { .. } => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitStatusReport {
    pub unit: UnitName,
    pub artifact: String,
    pub status: UnitStatus,
}

/// Classify every unit of `plan`.
///
/// A unit depending on one that is not current is never reported current: its
/// dependency would be redeployed first, so its own fingerprint would move.
pub fn check(
    plan: &ExecutionPlan<'_>,
    env: &Environment,
    registry: &Registry,
) -> Vec<UnitStatusReport> {
    let ctx = Context::new(env, registry, None);
    let mut pending = BTreeSet::new();
    let mut unknown = BTreeSet::new();
    let mut reports = Vec::with_capacity(plan.len());

    for unit in plan.units() {
        let primary = unit.primary();
        let record = registry.get(&primary.artifact);
        let status = if let Some(dependency) = plan.dependency_in(unit, &pending) {
            match record {
                None => UnitStatus::NotDeployed,
                Some(r) => {
                    tracing::debug!(
                        unit = %unit.name(),
                        dependency = %dependency,
                        "dependency pending"
                    );
                    UnitStatus::Changed { address: r.address }
                }
            }
        } else if let Some(dependency) = plan.dependency_in(unit, &unknown) {
            match record {
                None => UnitStatus::NotDeployed,
                Some(_) => UnitStatus::Unknown {
                    reason: format!("depends on '{dependency}', whose status is unknown"),
                },
            }
        } else {
            let identity = ctx
                .artifact(&primary.contract)
                .and_then(|artifact| Identity::of(artifact, &primary.args(&ctx)?));
            match (identity, record) {
                (_, None) => UnitStatus::NotDeployed,
                (Err(e), Some(_)) => UnitStatus::Unknown {
                    reason: e.to_string(),
                },
                (Ok(id), Some(r)) if id.combined == r.fingerprint => UnitStatus::Current {
                    address: r.address,
                },
                (Ok(_), Some(r)) => UnitStatus::Changed { address: r.address },
            }
        };
        match status {
            UnitStatus::Current { .. } => {}
            UnitStatus::Unknown { .. } => {
                unknown.insert(unit.name().clone());
            }
            UnitStatus::Changed { .. } | UnitStatus::NotDeployed => {
                pending.insert(unit.name().clone());
            }
        }
        reports.push(UnitStatusReport {
            unit: unit.name().clone(),
            artifact: primary.artifact.0.clone(),
            status,
        });
    }
    reports
}
