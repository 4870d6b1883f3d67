//! Named account resolver: logical roles (`deployer`) to concrete signers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AccountError;
use crate::types::{Address, EnvironmentId};

/// Table key that applies when no environment-specific entry exists.
pub const DEFAULT_KEY: &str = "default";

/// One entry of a role's table: a signer index or a literal address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountEntry {
    Index(usize),
    Address(Address),
}

/// Role table bound to one environment and its signer set.
#[derive(Debug, Clone)]
pub struct NamedAccounts {
    environment: EnvironmentId,
    signers: Vec<Address>,
    table: BTreeMap<String, BTreeMap<String, AccountEntry>>,
}

impl NamedAccounts {
    pub fn new(
        environment: EnvironmentId,
        signers: Vec<Address>,
        table: BTreeMap<String, BTreeMap<String, AccountEntry>>,
    ) -> Self {
        Self {
            environment,
            signers,
            table,
        }
    }

    pub fn environment(&self) -> &EnvironmentId {
        &self.environment
    }

    pub fn signers(&self) -> &[Address] {
        &self.signers
    }

    /// Resolve `role` for the bound environment.
    ///
    /// An entry keyed by the environment name wins over `default`.
    pub fn resolve(&self, role: &str) -> Result<Address, AccountError> {
        let entry = self
            .table
            .get(role)
            .and_then(|t| t.get(&self.environment.0).or_else(|| t.get(DEFAULT_KEY)))
            .ok_or_else(|| AccountError::UnknownRole {
                role: role.to_owned(),
                environment: self.environment.clone(),
            })?;
        match *entry {
            AccountEntry::Address(address) => Ok(address),
            AccountEntry::Index(index) => {
                self.signers
                    .get(index)
                    .copied()
                    .ok_or_else(|| AccountError::AccountUnavailable {
                        role: role.to_owned(),
                        environment: self.environment.clone(),
                        index,
                        available: self.signers.len(),
                    })
            }
        }
    }

    /// Every configured role with its resolution, sorted by role.
    pub fn resolve_all(&self) -> Vec<(String, Result<Address, AccountError>)> {
        self.table
            .keys()
            .map(|role| (role.clone(), self.resolve(role)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
