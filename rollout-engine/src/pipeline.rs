//! Shared per-environment entrypoints used by the CLI.
//!
//! `deploy` is the canonical run: resolve the plan, connect, take the
//! environment lock, load the registry, execute.

use std::sync::Arc;

use rollout_chain::{Sequencer, Transport};
use rollout_core::{
    AccountError, Address, ArtifactStore, EnvironmentConfig, EnvironmentId, NamedAccounts, Registry,
    RegistryExport, RolloutConfig, RunLock,
};

use crate::context::Environment;
use crate::engine::{CancelToken, Engine, RunReport};
use crate::error::PipelineError;
use crate::graph;
use crate::status::{self, UnitStatusReport};
use crate::unit::UnitSet;

/// Options for one environment run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Unit names or tags; empty selects every unit.
    pub tags: Vec<String>,
    pub dry_run: bool,
    pub cancel: CancelToken,
}

/// Run `units` against environment `name` (or the default environment).
pub fn deploy(
    config: &RolloutConfig,
    name: Option<&str>,
    units: &UnitSet,
    options: &RunOptions,
) -> Result<RunReport, PipelineError> {
    let (_, env_config) = config.environment(name)?;
    // Resolve before connecting so graph errors never touch the chain.
    graph::resolve(units, &options.tags)?;
    let transport = rollout_chain::connect(env_config)?;
    deploy_with_transport(config, name, units, options, transport)
}

/// [`deploy`] over an already-open transport.
pub fn deploy_with_transport(
    config: &RolloutConfig,
    name: Option<&str>,
    units: &UnitSet,
    options: &RunOptions,
    transport: Arc<dyn Transport>,
) -> Result<RunReport, PipelineError> {
    let (id, env_config) = config.environment(name)?;
    let plan = graph::resolve(units, &options.tags)?;

    let mut sequencer = Sequencer::new(transport, config.retry.clone(), config.confirmation.clone())
        .with_gas_limit(env_config.gas_limit);
    let signers = if env_config.accounts.is_empty() {
        sequencer.accounts()?
    } else {
        env_config.accounts.clone()
    };
    let env = environment(config, id.clone(), env_config, signers)?;

    let _lock = if options.dry_run {
        None
    } else {
        Some(RunLock::acquire(&config.deployments, &id)?)
    };
    let mut registry = Registry::load(&config.deployments, &id, env_config.chain_id)?;
    tracing::info!(
        environment = %id,
        units = plan.len(),
        records = registry.len(),
        dry_run = options.dry_run,
        "starting run"
    );

    let report = Engine::new(&env, &mut sequencer)
        .dry_run(options.dry_run)
        .with_cancel(options.cancel.clone())
        .run(&plan, &mut registry);
    Ok(report)
}

/// Fingerprint status of the selected units; no transaction is sent.
pub fn status(
    config: &RolloutConfig,
    name: Option<&str>,
    units: &UnitSet,
    tags: &[String],
) -> Result<(EnvironmentId, Vec<UnitStatusReport>), PipelineError> {
    let (id, env_config) = config.environment(name)?;
    let plan = graph::resolve(units, tags)?;
    let env = environment(config, id.clone(), env_config, signers(env_config)?)?;
    let registry = Registry::load(&config.deployments, &id, env_config.chain_id)?;
    Ok((id, status::check(&plan, &env, &registry)))
}

/// Every named account role resolved for an environment.
pub fn accounts(
    config: &RolloutConfig,
    name: Option<&str>,
) -> Result<(EnvironmentId, Vec<(String, Result<Address, AccountError>)>), PipelineError> {
    let (id, env_config) = config.environment(name)?;
    let named = NamedAccounts::new(id.clone(), signers(env_config)?, config.named_accounts.clone());
    Ok((id, named.resolve_all()))
}

/// Registry snapshot for external consumers.
pub fn export(config: &RolloutConfig, name: Option<&str>) -> Result<RegistryExport, PipelineError> {
    let (id, env_config) = config.environment(name)?;
    Ok(Registry::load(&config.deployments, &id, env_config.chain_id)?.export())
}

/// Configured signers, else whatever the endpoint manages.
fn signers(env_config: &EnvironmentConfig) -> Result<Vec<Address>, PipelineError> {
    if !env_config.accounts.is_empty() {
        return Ok(env_config.accounts.clone());
    }
    let transport = rollout_chain::connect(env_config)?;
    let endpoint = transport.endpoint().to_owned();
    transport.accounts().map_err(|e| {
        PipelineError::Chain(rollout_chain::ChainError::Rpc {
            endpoint,
            message: e.to_string(),
        })
    })
}

fn environment(
    config: &RolloutConfig,
    id: EnvironmentId,
    env_config: &EnvironmentConfig,
    signers: Vec<Address>,
) -> Result<Environment, PipelineError> {
    let artifacts = ArtifactStore::load_dir(&config.artifacts)?;
    Ok(Environment {
        accounts: NamedAccounts::new(id.clone(), signers, config.named_accounts.clone()),
        id,
        chain_id: env_config.chain_id,
        live: env_config.live,
        artifacts,
    })
}
