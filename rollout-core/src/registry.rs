//! Per-environment artifact registry.
//!
//! # Storage layout
//!
//! ```text
//! <deployments>/
//!   <environment>/
//!     .chain_id           (chain the records belong to)
//!     .lock               (flocked while a run owns the environment)
//!     <artifact>.json     (one envelope per artifact, mode 0600)
//! ```
//!
//! Every record is written on its own with the `.tmp` + rename pattern, so a
//! crash mid-run leaves each file either at its previous content or its new
//! content, never torn. Only records `put` since the last flush are written.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, RegistryError};
use crate::interface::Interface;
use crate::types::{Address, ArtifactName, EnvironmentId, Fingerprint, UnitName, H256};

pub const RECORD_VERSION: u32 = 1;
pub const CHAIN_ID_FILE: &str = ".chain_id";
pub const LOCK_FILE: &str = ".lock";

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One deployed artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub name: ArtifactName,
    /// Unit that produced the artifact.
    pub unit: UnitName,
    /// Compiled contract the interface came from.
    pub contract: String,
    pub address: Address,
    pub abi: Interface,
    pub code_fingerprint: Fingerprint,
    pub args_fingerprint: Fingerprint,
    /// `Fingerprint::combine(code_fingerprint, args_fingerprint)`.
    pub fingerprint: Fingerprint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<H256>,
    pub deployed_at: DateTime<Utc>,
}

/// On-disk envelope around a record.
#[derive(Debug, Serialize, Deserialize)]
struct RecordFile {
    version: u32,
    checksum: String,
    record: Value,
}

fn checksum(record: &Value) -> Result<String, RegistryError> {
    Ok(Fingerprint::of(&serde_json::to_vec(record)?).0)
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<root>/<environment>/`. Pure, no I/O.
pub fn environment_dir(root: &Path, environment: &EnvironmentId) -> PathBuf {
    root.join(&environment.0)
}

/// `<root>/<environment>/<artifact>.json`. Pure, no I/O.
pub fn record_path(root: &Path, environment: &EnvironmentId, name: &ArtifactName) -> PathBuf {
    environment_dir(root, environment).join(format!("{}.json", name.0))
}

fn validate_name(name: &ArtifactName) -> Result<(), RegistryError> {
    let bad = name.0.is_empty()
        || name.0.starts_with('.')
        || name.0.contains(['/', '\\'])
        || name.0.ends_with(".tmp");
    if bad {
        return Err(RegistryError::InvalidName(name.0.clone()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// In-memory view of one environment's registry, bound to its directory.
#[derive(Debug)]
pub struct Registry {
    dir: PathBuf,
    environment: EnvironmentId,
    chain_id: u64,
    records: BTreeMap<ArtifactName, ArtifactRecord>,
    dirty: BTreeSet<ArtifactName>,
}

impl Registry {
    /// Load every record for `environment` under `root`.
    ///
    /// A missing directory is an empty registry. Fails with
    /// [`RegistryError::Corrupt`] when any record is malformed, fails its
    /// checksum, or is stored under the wrong file name, and with
    /// [`RegistryError::ChainIdMismatch`] when the directory belongs to a
    /// different chain.
    pub fn load(
        root: &Path,
        environment: &EnvironmentId,
        chain_id: u64,
    ) -> Result<Self, RegistryError> {
        let dir = environment_dir(root, environment);
        let mut registry = Registry {
            dir: dir.clone(),
            environment: environment.clone(),
            chain_id,
            records: BTreeMap::new(),
            dirty: BTreeSet::new(),
        };
        if !dir.exists() {
            return Ok(registry);
        }

        let chain_path = dir.join(CHAIN_ID_FILE);
        if chain_path.exists() {
            let raw = std::fs::read_to_string(&chain_path).map_err(|e| io_err(&chain_path, e))?;
            let stored: u64 = raw.trim().parse().map_err(|_| RegistryError::Corrupt {
                path: chain_path.clone(),
                reason: format!("'{}' is not a chain id", raw.trim()),
            })?;
            if stored != chain_id {
                return Err(RegistryError::ChainIdMismatch {
                    environment: environment.clone(),
                    stored,
                    expected: chain_id,
                });
            }
        }

        let mut entries: Vec<_> = std::fs::read_dir(&dir)
            .map_err(|e| io_err(&dir, e))?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .collect();
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(stem) = file_name.strip_suffix(".json") else {
                continue;
            };
            if stem.starts_with('.') {
                continue;
            }
            let record = read_record(&entry.path())?;
            if record.name.0 != stem {
                return Err(RegistryError::Corrupt {
                    path: entry.path(),
                    reason: format!("record is named '{}'", record.name),
                });
            }
            registry.records.insert(record.name.clone(), record);
        }

        tracing::debug!(
            environment = %environment,
            records = registry.records.len(),
            "loaded registry"
        );
        Ok(registry)
    }

    pub fn environment(&self) -> &EnvironmentId {
        &self.environment
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `None` means "not yet deployed"; it is not an error.
    pub fn get(&self, name: &ArtifactName) -> Option<&ArtifactRecord> {
        self.records.get(name)
    }

    /// Insert or replace the record for `record.name` (last write wins).
    pub fn put(&mut self, record: ArtifactRecord) -> Result<(), RegistryError> {
        validate_name(&record.name)?;
        self.dirty.insert(record.name.clone());
        self.records.insert(record.name.clone(), record);
        Ok(())
    }

    pub fn records(&self) -> impl Iterator<Item = &ArtifactRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Names `put` since the last flush.
    pub fn pending(&self) -> impl Iterator<Item = &ArtifactName> {
        self.dirty.iter()
    }

    /// Write every pending record to disk. Returns the number written.
    pub fn flush(&mut self) -> Result<usize, RegistryError> {
        if self.dirty.is_empty() {
            return Ok(0);
        }
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))?;
            set_dir_permissions(&self.dir)?;
        }
        let chain_path = self.dir.join(CHAIN_ID_FILE);
        if !chain_path.exists() {
            write_atomic(&chain_path, format!("{}\n", self.chain_id).as_bytes())?;
        }

        let mut written = 0;
        while let Some(name) = self.dirty.pop_first() {
            let Some(record) = self.records.get(&name) else {
                continue;
            };
            let value = serde_json::to_value(record)?;
            let file = RecordFile {
                version: RECORD_VERSION,
                checksum: checksum(&value)?,
                record: value,
            };
            let path = self.dir.join(format!("{}.json", name.0));
            let mut json = serde_json::to_vec_pretty(&file)?;
            json.push(b'\n');
            if let Err(e) = write_atomic(&path, &json) {
                // Keep the record pending so a retried flush writes it.
                self.dirty.insert(name);
                return Err(e);
            }
            tracing::debug!(artifact = %record.name, path = %path.display(), "flushed record");
            written += 1;
        }
        Ok(written)
    }

    /// Snapshot for external consumers: name → address + interface.
    pub fn export(&self) -> RegistryExport {
        RegistryExport {
            environment: self.environment.0.clone(),
            chain_id: self.chain_id,
            contracts: self
                .records
                .values()
                .map(|r| {
                    (
                        r.name.0.clone(),
                        ExportedContract {
                            address: r.address,
                            abi: r.abi.clone(),
                        },
                    )
                })
                .collect(),
        }
    }
}

fn read_record(path: &Path) -> Result<ArtifactRecord, RegistryError> {
    let corrupt = |reason: String| RegistryError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let file: RecordFile = serde_json::from_str(&contents).map_err(|e| corrupt(e.to_string()))?;
    if file.version != RECORD_VERSION {
        return Err(corrupt(format!("unsupported record version {}", file.version)));
    }
    if checksum(&file.record)? != file.checksum {
        return Err(corrupt("checksum mismatch".to_owned()));
    }
    let record: ArtifactRecord =
        serde_json::from_value(file.record).map_err(|e| corrupt(e.to_string()))?;
    let combined = Fingerprint::combine(&record.code_fingerprint, &record.args_fingerprint);
    if combined != record.fingerprint {
        return Err(corrupt("fingerprint does not match its components".to_owned()));
    }
    Ok(record)
}

/// Registry snapshot for external consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryExport {
    pub environment: String,
    pub chain_id: u64,
    pub contracts: BTreeMap<String, ExportedContract>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedContract {
    pub address: Address,
    pub abi: Interface,
}

// ---------------------------------------------------------------------------
// Run lock
// ---------------------------------------------------------------------------

/// Exclusive ownership of one environment's registry for a run.
///
/// Held as an advisory lock on the open `.lock` file, so the OS releases it
/// when the owning process exits, however it exits. The file itself stays
/// behind and only carries the last holder's run id.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
    run_id: String,
}

impl RunLock {
    pub fn acquire(root: &Path, environment: &EnvironmentId) -> Result<Self, RegistryError> {
        let dir = environment_dir(root, environment);
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
            set_dir_permissions(&dir)?;
        }
        let path = dir.join(LOCK_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.raw_os_error() != fs2::lock_contended_error().raw_os_error() {
                return Err(io_err(&path, e));
            }
            let holder = std::fs::read_to_string(&path).unwrap_or_default();
            return Err(RegistryError::Locked {
                environment: environment.clone(),
                holder: holder.trim().to_owned(),
                path,
            });
        }

        let run_id = format!(
            "{}-{}",
            std::process::id(),
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
        );
        file.set_len(0).map_err(|e| io_err(&path, e))?;
        file.write_all(run_id.as_bytes()).map_err(|e| io_err(&path, e))?;
        file.sync_data().map_err(|e| io_err(&path, e))?;
        tracing::debug!(environment = %environment, run_id = %run_id, "acquired run lock");
        Ok(Self { file, path, run_id })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release run lock");
        }
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Write flow: `<name>.tmp` sibling → `chmod 0600` → `rename`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RegistryError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!("{file_name}.tmp"));
    std::fs::write(&tmp, bytes).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), RegistryError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), RegistryError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), RegistryError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), RegistryError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
