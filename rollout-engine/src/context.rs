//! What a unit sees while it runs.
//!
//! [`Context`] is the read-only view: environment, named accounts, compiled
//! artifacts, the registry, and chain queries. [`Deployer`] is the write handle
//! handed to a unit's run step. It owns the unit's staging area: artifacts it
//! deploys or saves are visible to its own later steps immediately, but reach
//! the registry only when the whole unit succeeds.

use std::collections::BTreeMap;

use chrono::Utc;

use rollout_chain::{CallTarget, Receipt, Sequencer, TxOptions};
use rollout_core::{
    abi, Address, ArtifactName, ArtifactRecord, ArtifactStore, CompiledArtifact, EnvironmentId,
    EventRule, Fingerprint, NamedAccounts, Registry, Token, H256,
};

use crate::error::UnitError;
use crate::unit::Unit;

/// A resolved target environment.
#[derive(Debug, Clone)]
pub struct Environment {
    pub id: EnvironmentId,
    pub chain_id: u64,
    pub live: bool,
    pub accounts: NamedAccounts,
    pub artifacts: ArtifactStore,
}

/// Identity of a would-be deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub code: Fingerprint,
    pub args: Fingerprint,
    pub combined: Fingerprint,
}

impl Identity {
    /// Fingerprint `artifact` created with `args`.
    pub fn of(artifact: &CompiledArtifact, args: &[Token]) -> Result<Self, UnitError> {
        let context = format!("{} constructor", artifact.contract_name);
        let encoded = abi::encode(&artifact.abi.constructor(), args, &context)?;
        let code = artifact.code_fingerprint();
        let args = Fingerprint::of(&encoded);
        Ok(Self {
            combined: Fingerprint::combine(&code, &args),
            code,
            args,
        })
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Read-only view available while computing arguments and running units.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    env: &'a Environment,
    registry: &'a Registry,
    staged: Option<&'a BTreeMap<ArtifactName, ArtifactRecord>>,
    sequencer: Option<&'a Sequencer>,
}

impl<'a> Context<'a> {
    /// A view with no staged artifacts. Without a sequencer, chain queries
    /// fail with [`UnitError::Offline`].
    pub fn new(
        env: &'a Environment,
        registry: &'a Registry,
        sequencer: Option<&'a Sequencer>,
    ) -> Self {
        Self {
            env,
            registry,
            staged: None,
            sequencer,
        }
    }

    pub fn environment(&self) -> &'a EnvironmentId {
        &self.env.id
    }

    pub fn chain_id(&self) -> u64 {
        self.env.chain_id
    }

    pub fn is_live(&self) -> bool {
        self.env.live
    }

    /// Resolve a named account role (`deployer`).
    pub fn account(&self, role: &str) -> Result<Address, UnitError> {
        Ok(self.env.accounts.resolve(role)?)
    }

    pub fn artifact(&self, contract: &str) -> Result<&'a CompiledArtifact, UnitError> {
        Ok(self.env.artifacts.get(contract)?)
    }

    /// Staged artifact of the running unit, else the registry record.
    pub fn get(&self, name: &str) -> Option<&'a ArtifactRecord> {
        let name = ArtifactName::from(name);
        self.staged
            .and_then(|staged| staged.get(&name))
            .or_else(|| self.registry.get(&name))
    }

    pub fn address(&self, name: &str) -> Result<Address, UnitError> {
        self.record(name).map(|r| r.address)
    }

    fn record(&self, name: &str) -> Result<&'a ArtifactRecord, UnitError> {
        self.get(name).ok_or_else(|| UnitError::MissingArtifact {
            name: ArtifactName::from(name),
        })
    }

    /// Read-only call of `method` on a deployed artifact.
    pub fn query(
        &self,
        artifact: &str,
        method: &str,
        args: &[Token],
    ) -> Result<Vec<u8>, UnitError> {
        let record = self.record(artifact)?;
        let sequencer = self.sequencer.ok_or_else(|| UnitError::Offline {
            artifact: artifact.to_owned(),
        })?;
        let target = CallTarget {
            label: artifact,
            address: record.address,
            interface: &record.abi,
        };
        Ok(sequencer.query(target, method, args)?)
    }

    /// Decoding rule for an address field of an event declared by a deployed
    /// artifact's interface.
    pub fn event_rule(
        &self,
        artifact: &str,
        event: &str,
        field: &str,
    ) -> Result<EventRule, UnitError> {
        Ok(self.record(artifact)?.abi.event_rule(artifact, event, field)?)
    }
}

// ---------------------------------------------------------------------------
// Deployer
// ---------------------------------------------------------------------------

/// A contract creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deploy {
    pub contract: String,
    pub from: Address,
    pub args: Vec<Token>,
    pub gas_limit: Option<u64>,
}

impl Deploy {
    pub fn new(contract: impl Into<String>, from: Address) -> Self {
        Self {
            contract: contract.into(),
            from,
            args: Vec::new(),
            gas_limit: None,
        }
    }

    pub fn args(mut self, args: Vec<Token>) -> Self {
        self.args = args;
        self
    }

    pub fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }
}

/// Artifacts a unit produced, ready to be persisted.
#[derive(Debug)]
pub(crate) struct Staged {
    pub records: BTreeMap<ArtifactName, ArtifactRecord>,
    pub transactions: usize,
}

/// Write handle for one unit run.
pub struct Deployer<'a> {
    env: &'a Environment,
    registry: &'a Registry,
    sequencer: &'a mut Sequencer,
    unit: &'a Unit,
    primary_args: Vec<Token>,
    staged: BTreeMap<ArtifactName, ArtifactRecord>,
    transactions_at_start: usize,
}

impl<'a> Deployer<'a> {
    pub(crate) fn new(
        env: &'a Environment,
        registry: &'a Registry,
        sequencer: &'a mut Sequencer,
        unit: &'a Unit,
        primary_args: Vec<Token>,
    ) -> Self {
        let transactions_at_start = sequencer.transactions();
        Self {
            env,
            registry,
            sequencer,
            unit,
            primary_args,
            staged: BTreeMap::new(),
            transactions_at_start,
        }
    }

    pub(crate) fn finish(self) -> Staged {
        Staged {
            transactions: self.sequencer.transactions() - self.transactions_at_start,
            records: self.staged,
        }
    }

    /// Read-only view including this unit's staged artifacts.
    pub fn context(&self) -> Context<'_> {
        Context {
            env: self.env,
            registry: self.registry,
            staged: Some(&self.staged),
            sequencer: Some(&*self.sequencer),
        }
    }

    pub fn account(&self, role: &str) -> Result<Address, UnitError> {
        self.context().account(role)
    }

    pub fn get(&self, name: &str) -> Option<&ArtifactRecord> {
        let name = ArtifactName::from(name);
        self.staged.get(&name).or_else(|| self.registry.get(&name))
    }

    pub fn address(&self, name: &str) -> Result<Address, UnitError> {
        self.context().address(name)
    }

    pub fn query(
        &self,
        artifact: &str,
        method: &str,
        args: &[Token],
    ) -> Result<Vec<u8>, UnitError> {
        self.context().query(artifact, method, args)
    }

    pub fn event_rule(
        &self,
        artifact: &str,
        event: &str,
        field: &str,
    ) -> Result<EventRule, UnitError> {
        self.context().event_rule(artifact, event, field)
    }

    /// Deploy the unit's primary artifact with the arguments its declaration
    /// resolved for this run.
    pub fn deploy_primary(
        &mut self,
        from: Address,
        gas_limit: Option<u64>,
    ) -> Result<ArtifactRecord, UnitError> {
        let unit = self.unit;
        let primary = unit.primary();
        let mut request =
            Deploy::new(primary.contract.clone(), from).args(self.primary_args.clone());
        request.gas_limit = gas_limit;
        let name = primary.artifact.0.clone();
        self.deploy(&name, request)
    }

    /// Deploy `request.contract` as artifact `name`.
    ///
    /// When the unit already staged, or the registry already holds, `name`
    /// with the same fingerprint, that record is returned and no transaction
    /// is sent.
    pub fn deploy(&mut self, name: &str, request: Deploy) -> Result<ArtifactRecord, UnitError> {
        let env = self.env;
        let artifact = env.artifacts.get(&request.contract)?;
        let identity = Identity::of(artifact, &request.args)?;

        if let Some(existing) = self.get(name).filter(|r| r.fingerprint == identity.combined) {
            tracing::debug!(
                unit = %self.unit.name(),
                artifact = name,
                address = %existing.address,
                "reusing deployed artifact"
            );
            return Ok(existing.clone());
        }

        let deployment = self.sequencer.deploy(
            artifact,
            &request.args,
            request.from,
            TxOptions {
                gas_limit: request.gas_limit,
            },
        )?;
        let record = ArtifactRecord {
            name: ArtifactName::from(name),
            unit: self.unit.name().clone(),
            contract: request.contract,
            address: deployment.address,
            abi: artifact.abi.clone(),
            code_fingerprint: identity.code,
            args_fingerprint: identity.args,
            fingerprint: identity.combined,
            transaction: Some(deployment.receipt.transaction_hash),
            deployed_at: Utc::now(),
        };
        self.staged.insert(record.name.clone(), record.clone());
        Ok(record)
    }

    /// Call a state-changing method on a deployed artifact. `method` is a bare
    /// name or a full signature.
    pub fn execute(
        &mut self,
        artifact: &str,
        method: &str,
        args: &[Token],
        from: Address,
    ) -> Result<Receipt, UnitError> {
        let record = self
            .get(artifact)
            .cloned()
            .ok_or_else(|| UnitError::MissingArtifact {
                name: ArtifactName::from(artifact),
            })?;
        let target = CallTarget {
            label: artifact,
            address: record.address,
            interface: &record.abi,
        };
        Ok(self.sequencer.call(target, method, args, from, TxOptions::default())?)
    }

    /// Register an artifact created indirectly (a factory product) under
    /// `name`, with the interface of compiled `contract`.
    pub fn save(
        &mut self,
        name: &str,
        contract: &str,
        address: Address,
        transaction: Option<H256>,
    ) -> Result<ArtifactRecord, UnitError> {
        let artifact = self.env.artifacts.get(contract)?;
        let code = artifact.code_fingerprint();
        let args = Fingerprint::of(&address.0);
        let record = ArtifactRecord {
            name: ArtifactName::from(name),
            unit: self.unit.name().clone(),
            contract: contract.to_owned(),
            address,
            abi: artifact.abi.clone(),
            fingerprint: Fingerprint::combine(&code, &args),
            code_fingerprint: code,
            args_fingerprint: args,
            transaction,
            deployed_at: Utc::now(),
        };
        tracing::info!(unit = %self.unit.name(), artifact = name, address = %address, "saved");
        self.staged.insert(record.name.clone(), record.clone());
        Ok(record)
    }
}
