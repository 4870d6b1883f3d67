//! `rollout accounts`: named account roles resolved for an environment.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use rollout_engine::pipeline;

use crate::commands::load_config;

/// Arguments for `rollout accounts`.
#[derive(Args, Debug)]
pub struct AccountsArgs {
    /// Environment to resolve against (default: `default_environment`).
    #[arg(long)]
    pub env: Option<String>,
}

#[derive(Tabled)]
struct AccountRow {
    #[tabled(rename = "role")]
    role: String,
    #[tabled(rename = "address")]
    address: String,
}

impl AccountsArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        let config = load_config(config_path)?;
        let (id, roles) = pipeline::accounts(&config, self.env.as_deref())
            .context("failed to resolve named accounts")?;

        println!("{}", id.to_string().bold());
        if roles.is_empty() {
            println!("No named accounts configured.");
            return Ok(());
        }
        let rows: Vec<AccountRow> = roles
            .into_iter()
            .map(|(role, resolved)| AccountRow {
                role,
                address: match resolved {
                    Ok(address) => address.to_string(),
                    Err(e) => e.to_string().red().to_string(),
                },
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
