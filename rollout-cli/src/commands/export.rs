//! `rollout export`: registry snapshot as JSON, for front ends and scripts.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use rollout_engine::pipeline;

use crate::commands::load_config;

/// Arguments for `rollout export`.
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Environment to export (default: `default_environment`).
    #[arg(long)]
    pub env: Option<String>,

    /// Write to a file instead of stdout.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

impl ExportArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        let config = load_config(config_path)?;
        let export = pipeline::export(&config, self.env.as_deref())
            .context("failed to read registry")?;
        let json = serde_json::to_string_pretty(&export).context("failed to serialize export")?;

        match self.output {
            Some(path) => {
                std::fs::write(&path, format!("{json}\n"))
                    .with_context(|| format!("failed to write '{}'", path.display()))?;
                println!("✓ exported {} contracts to {}", export.contracts.len(), path.display());
            }
            None => println!("{json}"),
        }
        Ok(())
    }
}
