//! `rollout deploy`: run the selected units against one or more environments.
//!
//! Each environment runs on its own blocking task with its own transport,
//! registry, and lock. Ctrl-C cancels every run between units.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use rollout_core::RolloutConfig;
use rollout_engine::pipeline::{self, RunOptions};
use rollout_engine::{CancelToken, PipelineError, RunReport, UnitOutcome, UnitSet};

use crate::commands::load_config;
use crate::units;

/// Arguments for `rollout deploy`.
#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Target environments (default: `default_environment`).
    #[arg(long = "env", value_delimiter = ',')]
    pub envs: Vec<String>,

    /// Unit names or tags to select (dependencies are always included).
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Report which units would run without sending any transaction.
    #[arg(long)]
    pub dry_run: bool,
}

type EnvResult = (String, Result<RunReport, PipelineError>);

impl DeployArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        let config = Arc::new(load_config(config_path)?);
        let units = Arc::new(units::all().context("invalid unit declarations")?);

        let targets: Vec<Option<String>> = if self.envs.is_empty() {
            vec![None]
        } else {
            self.envs.into_iter().map(Some).collect()
        };
        for target in &targets {
            let (id, env) = config.environment(target.as_deref())?;
            if env.live && !self.dry_run {
                println!(
                    "{} '{id}' is a live network (chain {})",
                    "!".yellow().bold(),
                    env.chain_id
                );
            }
        }

        let options = RunOptions {
            tags: self.tags,
            dry_run: self.dry_run,
            cancel: CancelToken::new(),
        };
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        let results = runtime.block_on(run_all(config, units, targets, options.clone()))?;

        let mut failures = Vec::new();
        for (env, result) in results {
            match result {
                Ok(report) => {
                    print_report(&report, options.dry_run);
                    if let Some((unit, err)) = report.failed_unit() {
                        failures.push(format!("unit '{unit}' failed on '{env}': {err}"));
                    } else if report.cancelled {
                        failures.push(format!("run on '{env}' was cancelled"));
                    }
                }
                Err(e) => failures.push(format!("'{env}': {e}")),
            }
        }
        if !failures.is_empty() {
            bail!("deployment failed\n  {}", failures.join("\n  "));
        }
        Ok(())
    }
}

async fn run_all(
    config: Arc<RolloutConfig>,
    units: Arc<UnitSet>,
    targets: Vec<Option<String>>,
    options: RunOptions,
) -> Result<Vec<EnvResult>> {
    let cancel = options.cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; stopping after the current unit");
            cancel.cancel();
        }
    });

    let handles: Vec<_> = targets
        .into_iter()
        .map(|target| {
            let config = Arc::clone(&config);
            let units = Arc::clone(&units);
            let options = options.clone();
            tokio::task::spawn_blocking(move || {
                let label = target
                    .clone()
                    .or_else(|| config.default_environment.clone())
                    .unwrap_or_default();
                let result = pipeline::deploy(&config, target.as_deref(), &units, &options);
                (label, result)
            })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.context("deployment task panicked")?);
    }
    watcher.abort();
    Ok(results)
}

fn print_report(report: &RunReport, dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };
    let count = |label: &str| report.units.iter().filter(|r| r.outcome.label() == label).count();
    let mark = if report.is_success() {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };

    if dry_run {
        println!(
            "{prefix}{mark} '{}' ({} would run, {} skipped)",
            report.environment,
            count("would run"),
            count("skipped"),
        );
    } else {
        println!(
            "{prefix}{mark} '{}' ({} deployed, {} skipped, {} transactions)",
            report.environment,
            count("deployed"),
            count("skipped"),
            report.transactions(),
        );
    }

    for r in &report.units {
        match &r.outcome {
            UnitOutcome::Succeeded { artifacts, .. } => {
                let names: Vec<&str> = artifacts.iter().map(|a| a.0.as_str()).collect();
                println!("  ✎  {} → {}", r.unit, names.join(", "));
            }
            UnitOutcome::Skipped => println!("  ·  {} (skipped)", r.unit),
            UnitOutcome::WouldRun => println!("  ~  {}", r.unit),
            UnitOutcome::Failed(e) => println!("  {}  {}: {e}", "✗".red(), r.unit),
            UnitOutcome::NotRun => println!("  -  {} (not run)", r.unit),
        }
    }
}
