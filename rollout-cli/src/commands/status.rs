//! `rollout status`: what a deploy would do, per unit, without sending anything.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use rollout_engine::pipeline;
use rollout_engine::{UnitStatus, UnitStatusReport};

use crate::commands::load_config;
use crate::units;

/// Arguments for `rollout status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Environment to inspect (default: `default_environment`).
    #[arg(long)]
    pub env: Option<String>,

    /// Unit names or tags to select.
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        let config = load_config(config_path)?;
        let units = units::all().context("invalid unit declarations")?;
        let (id, reports) = pipeline::status(&config, self.env.as_deref(), &units, &self.tags)
            .context("status check failed")?;

        if self.json {
            let payload = StatusJson {
                environment: id.0,
                units: reports.iter().map(UnitStatusJson::from).collect(),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        let pending = reports
            .iter()
            .filter(|r| !matches!(r.status, UnitStatus::Current { .. }))
            .count();
        println!("{} | {} units | {} pending", id.to_string().bold(), reports.len(), pending);
        let rows: Vec<StatusRow> = reports.iter().map(StatusRow::from).collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        if pending > 0 {
            println!("Run 'rollout deploy --env {id}' to bring pending units up to date.");
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusJson {
    environment: String,
    units: Vec<UnitStatusJson>,
}

#[derive(Serialize)]
struct UnitStatusJson {
    unit: String,
    artifact: String,
    status: &'static str,
    address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl From<&UnitStatusReport> for UnitStatusJson {
    fn from(r: &UnitStatusReport) -> Self {
        Self {
            unit: r.unit.0.clone(),
            artifact: r.artifact.clone(),
            status: r.status.label(),
            address: address(&r.status),
            reason: match &r.status {
                UnitStatus::Unknown { reason } => Some(reason.clone()),
                _ => None,
            },
        }
    }
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "unit")]
    unit: String,
    #[tabled(rename = "artifact")]
    artifact: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "address")]
    address: String,
}

impl From<&UnitStatusReport> for StatusRow {
    fn from(r: &UnitStatusReport) -> Self {
        Self {
            unit: r.unit.0.clone(),
            artifact: r.artifact.clone(),
            status: indicator(&r.status),
            address: address(&r.status).unwrap_or_else(|| "-".to_owned()),
        }
    }
}

fn address(status: &UnitStatus) -> Option<String> {
    match status {
        UnitStatus::Current { address } | UnitStatus::Changed { address } => {
            Some(address.to_string())
        }
        UnitStatus::NotDeployed | UnitStatus::Unknown { .. } => None,
    }
}

fn indicator(status: &UnitStatus) -> String {
    let label = status.label().to_uppercase();
    match status {
        UnitStatus::Current { .. } => label.green().to_string(),
        UnitStatus::Changed { .. } => label.yellow().to_string(),
        UnitStatus::NotDeployed => label.bright_black().to_string(),
        UnitStatus::Unknown { .. } => label.red().to_string(),
    }
}
