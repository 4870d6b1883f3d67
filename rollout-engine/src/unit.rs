//! Unit declarations.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use rollout_core::{ArtifactName, Token, UnitName};

use crate::context::{Context, Deployer};
use crate::error::{GraphError, UnitError};

/// Constructor arguments of a unit's primary artifact, resolved at run time.
pub type ArgsFn = Arc<dyn Fn(&Context<'_>) -> Result<Vec<Token>, UnitError> + Send + Sync>;

/// A unit's deployment and initialization logic.
pub type RunFn = Arc<dyn Fn(&mut Deployer<'_>) -> Result<(), UnitError> + Send + Sync>;

/// The artifact whose fingerprint identifies a unit.
#[derive(Clone)]
pub struct Primary {
    pub artifact: ArtifactName,
    /// Compiled contract the artifact is created from.
    pub contract: String,
    args: ArgsFn,
}

impl Primary {
    pub fn args(&self, ctx: &Context<'_>) -> Result<Vec<Token>, UnitError> {
        (self.args)(ctx)
    }
}

impl fmt::Debug for Primary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Primary")
            .field("artifact", &self.artifact)
            .field("contract", &self.contract)
            .finish_non_exhaustive()
    }
}

/// A named step that deploys one or more artifacts. Immutable once built.
#[derive(Clone)]
pub struct Unit {
    name: UnitName,
    tags: BTreeSet<String>,
    dependencies: Vec<String>,
    primary: Primary,
    run: RunFn,
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("dependencies", &self.dependencies)
            .field("primary", &self.primary)
            .finish_non_exhaustive()
    }
}

impl Unit {
    pub fn builder(name: impl Into<UnitName>) -> UnitBuilder {
        UnitBuilder {
            name: name.into(),
            tags: BTreeSet::new(),
            dependencies: Vec::new(),
            primary: None,
            run: None,
        }
    }

    pub fn name(&self) -> &UnitName {
        &self.name
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Unit names or tags this unit needs, in declaration order.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn primary(&self) -> &Primary {
        &self.primary
    }

    pub(crate) fn invoke(&self, deployer: &mut Deployer<'_>) -> Result<(), UnitError> {
        (self.run)(deployer)
    }
}

pub struct UnitBuilder {
    name: UnitName,
    tags: BTreeSet<String>,
    dependencies: Vec<String>,
    primary: Option<Primary>,
    run: Option<RunFn>,
}

impl UnitBuilder {
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(dependencies.into_iter().map(Into::into));
        self
    }

    pub fn primary<F>(
        mut self,
        artifact: impl Into<ArtifactName>,
        contract: impl Into<String>,
        args: F,
    ) -> Self
    where
        F: Fn(&Context<'_>) -> Result<Vec<Token>, UnitError> + Send + Sync + 'static,
    {
        self.primary = Some(Primary {
            artifact: artifact.into(),
            contract: contract.into(),
            args: Arc::new(args),
        });
        self
    }

    pub fn run<F>(mut self, run: F) -> Self
    where
        F: Fn(&mut Deployer<'_>) -> Result<(), UnitError> + Send + Sync + 'static,
    {
        self.run = Some(Arc::new(run));
        self
    }

    pub fn build(self) -> Result<Unit, GraphError> {
        let incomplete = |missing| GraphError::IncompleteUnit {
            name: self.name.clone(),
            missing,
        };
        let primary = self.primary.clone().ok_or_else(|| incomplete("primary artifact"))?;
        let run = self.run.clone().ok_or_else(|| incomplete("run step"))?;
        Ok(Unit {
            name: self.name,
            tags: self.tags,
            dependencies: self.dependencies,
            primary,
            run,
        })
    }
}

/// Units in declaration order, unique by name.
#[derive(Debug, Clone, Default)]
pub struct UnitSet {
    units: Vec<Unit>,
    index: BTreeMap<UnitName, usize>,
}

impl UnitSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, unit: Unit) -> Result<(), GraphError> {
        if self.index.contains_key(unit.name()) {
            return Err(GraphError::DuplicateUnit {
                name: unit.name().clone(),
            });
        }
        self.index.insert(unit.name().clone(), self.units.len());
        self.units.push(unit);
        Ok(())
    }

    pub fn from_units(units: impl IntoIterator<Item = Unit>) -> Result<Self, GraphError> {
        let mut set = Self::new();
        for unit in units {
            set.push(unit)?;
        }
        Ok(set)
    }

    pub fn get(&self, name: &str) -> Option<&Unit> {
        self.position(name).map(|i| &self.units[i])
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.index.get(&UnitName::from(name)).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Unit> {
        self.units.iter()
    }

    pub(crate) fn as_slice(&self) -> &[Unit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
