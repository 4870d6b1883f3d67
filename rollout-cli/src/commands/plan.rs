//! `rollout plan`: print the execution order without touching any chain.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use rollout_engine::resolve;

use crate::units;

/// Arguments for `rollout plan`.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Unit names or tags to select (dependencies are always included).
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,
}

impl PlanArgs {
    pub fn run(self) -> Result<()> {
        let units = units::all().context("invalid unit declarations")?;
        let plan = resolve(&units, &self.tags).context("failed to resolve execution plan")?;

        for (i, unit) in plan.units().iter().enumerate() {
            let mut line = format!("{:>2}. {}", i + 1, unit.name().to_string().bold());
            if !unit.dependencies().is_empty() {
                line.push_str(&format!("  ← {}", unit.dependencies().join(", ")));
            }
            println!("{line}");
        }
        Ok(())
    }
}
