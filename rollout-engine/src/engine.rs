//! Execution engine.
//!
//! ## Per-unit protocol
//!
//! 1. Stop if cancellation was requested.
//! 2. Resolve the primary artifact's constructor arguments and fingerprint.
//! 3. Compare with the registry record → skip if identical.
//! 4. Dry run stops here. A unit depending on one that would run is reported
//!    as would-run without resolving its arguments, since its dependency's
//!    record is about to change.
//! 5. Run the unit against a fresh [`Deployer`].
//! 6. Check the primary was staged, `put` every staged record, flush.
//!
//! A failing unit discards its staged records and ends the run; units already
//! flushed stay in the registry and are skipped by the next run.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rollout_chain::Sequencer;
use rollout_core::{ArtifactName, EnvironmentId, Registry, UnitName};

use crate::context::{Context, Deployer, Environment, Identity};
use crate::error::UnitError;
use crate::graph::ExecutionPlan;
use crate::unit::Unit;

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative cancellation, checked between units.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// What happened to one planned unit.
#[derive(Debug)]
pub enum UnitOutcome {
    /// Registry already holds the primary artifact with the same fingerprint.
    Skipped,
    Succeeded {
        artifacts: Vec<ArtifactName>,
        transactions: usize,
    },
    /// Dry run: the unit would have been executed.
    WouldRun,
    Failed(UnitError),
    /// An earlier unit failed or the run was cancelled.
    NotRun,
}

impl UnitOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            UnitOutcome::Skipped => "skipped",
            UnitOutcome::Succeeded { .. } => "deployed",
            UnitOutcome::WouldRun => "would run",
            UnitOutcome::Failed(_) => "failed",
            UnitOutcome::NotRun => "not run",
        }
    }
}

#[derive(Debug)]
pub struct UnitReport {
    pub unit: UnitName,
    pub outcome: UnitOutcome,
}

/// Outcome of one environment run, one entry per planned unit.
#[derive(Debug)]
pub struct RunReport {
    pub environment: EnvironmentId,
    pub units: Vec<UnitReport>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn failed_unit(&self) -> Option<(&UnitName, &UnitError)> {
        self.units.iter().find_map(|r| match &r.outcome {
            UnitOutcome::Failed(e) => Some((&r.unit, e)),
            _ => None,
        })
    }

    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failed_unit().is_none()
    }

    /// Transactions sent by successful units.
    pub fn transactions(&self) -> usize {
        self.units
            .iter()
            .map(|r| match r.outcome {
                UnitOutcome::Succeeded { transactions, .. } => transactions,
                _ => 0,
            })
            .sum()
    }

    pub fn outcome(&self, unit: &str) -> Option<&UnitOutcome> {
        self.units.iter().find(|r| r.unit.0 == unit).map(|r| &r.outcome)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine<'a> {
    env: &'a Environment,
    sequencer: &'a mut Sequencer,
    dry_run: bool,
    cancel: CancelToken,
}

impl<'a> Engine<'a> {
    pub fn new(env: &'a Environment, sequencer: &'a mut Sequencer) -> Self {
        Self {
            env,
            sequencer,
            dry_run: false,
            cancel: CancelToken::new(),
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Execute `plan` in order against `registry`.
    pub fn run(&mut self, plan: &ExecutionPlan<'_>, registry: &mut Registry) -> RunReport {
        let mut report = RunReport {
            environment: self.env.id.clone(),
            units: Vec::with_capacity(plan.len()),
            cancelled: false,
        };
        let mut halted = false;
        // Dry run only: units reported as would-run.
        let mut pending = BTreeSet::new();

        for unit in plan.units() {
            if !halted && self.cancel.is_cancelled() {
                tracing::warn!(environment = %self.env.id, unit = %unit.name(), "run cancelled");
                report.cancelled = true;
                halted = true;
            }
            if halted {
                report.units.push(UnitReport {
                    unit: unit.name().clone(),
                    outcome: UnitOutcome::NotRun,
                });
                continue;
            }

            let outcome = match plan.dependency_in(unit, &pending) {
                Some(dependency) if self.dry_run => {
                    tracing::info!(
                        unit = %unit.name(),
                        dependency = %dependency,
                        "[dry-run] would run after its dependency"
                    );
                    UnitOutcome::WouldRun
                }
                _ => self.run_unit(unit, registry),
            };
            if let UnitOutcome::WouldRun = outcome {
                pending.insert(unit.name().clone());
            }
            if let UnitOutcome::Failed(e) = &outcome {
                tracing::error!(
                    environment = %self.env.id,
                    unit = %unit.name(),
                    error = %e,
                    "unit failed"
                );
                halted = true;
            }
            report.units.push(UnitReport {
                unit: unit.name().clone(),
                outcome,
            });
        }
        report
    }

    fn run_unit(&mut self, unit: &Unit, registry: &mut Registry) -> UnitOutcome {
        let primary = unit.primary();
        let ctx = Context::new(self.env, registry, Some(&*self.sequencer));
        let resolved = ctx.artifact(&primary.contract).and_then(|artifact| {
            let args = primary.args(&ctx)?;
            Ok((Identity::of(artifact, &args)?, args))
        });
        let (identity, args) = match resolved {
            Ok(resolved) => resolved,
            Err(e) => return UnitOutcome::Failed(e),
        };

        if let Some(record) = registry
            .get(&primary.artifact)
            .filter(|r| r.fingerprint == identity.combined)
        {
            tracing::debug!(
                unit = %unit.name(),
                artifact = %record.name,
                fingerprint = record.fingerprint.short(),
                "unchanged, skipping"
            );
            return UnitOutcome::Skipped;
        }

        if self.dry_run {
            tracing::info!(unit = %unit.name(), "[dry-run] would run");
            return UnitOutcome::WouldRun;
        }

        tracing::info!(environment = %self.env.id, unit = %unit.name(), "running unit");
        let staged = {
            let mut deployer = Deployer::new(self.env, registry, &mut *self.sequencer, unit, args);
            if let Err(e) = unit.invoke(&mut deployer) {
                return UnitOutcome::Failed(e);
            }
            deployer.finish()
        };

        let primary_ok = staged
            .records
            .get(&primary.artifact)
            .is_some_and(|r| r.fingerprint == identity.combined);
        if !primary_ok {
            return UnitOutcome::Failed(UnitError::MissingPrimary {
                unit: unit.name().clone(),
                artifact: primary.artifact.clone(),
            });
        }

        let artifacts: Vec<ArtifactName> = staged.records.keys().cloned().collect();
        for record in staged.records.into_values() {
            if let Err(e) = registry.put(record) {
                return UnitOutcome::Failed(e.into());
            }
        }
        if let Err(e) = registry.flush() {
            return UnitOutcome::Failed(e.into());
        }
        tracing::info!(
            unit = %unit.name(),
            artifacts = artifacts.len(),
            transactions = staged.transactions,
            "unit complete"
        );
        UnitOutcome::Succeeded {
            artifacts,
            transactions: staged.transactions,
        }
    }
}
