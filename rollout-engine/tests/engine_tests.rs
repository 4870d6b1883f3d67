//! Execution engine scenarios against the in-process chain.
//!
//! Each test gets its own registry directory and chain.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rollout_chain::{ChainError, MemoryChain, Sequencer, Transport};
use rollout_core::interface::keccak256;
use rollout_core::{
    registry, AccountEntry, ArtifactName, ArtifactStore, CompiledArtifact, ConfirmationConfig,
    EnvironmentId, Interface, NamedAccounts, Registry, RetryPolicy, Token, H256,
};
use rollout_engine::{
    resolve, status, CancelToken, Deploy, Engine, Environment, RunReport, Unit, UnitError,
    UnitOutcome, UnitSet, UnitStatus,
};
use serde_json::json;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn artifacts() -> ArtifactStore {
    let mut store = ArtifactStore::new();
    store.insert(CompiledArtifact::new("Simple", Interface::default(), vec![0x01]));
    store.insert(CompiledArtifact::new(
        "Holder",
        Interface::from_json(json!([
            {"type": "constructor", "inputs": [{"name": "target", "type": "address"}]}
        ]))
        .unwrap(),
        vec![0x02],
    ));
    store.insert(CompiledArtifact::new(
        "Token",
        Interface::from_json(json!([
            {"type": "constructor", "inputs": [
                {"name": "name", "type": "string"},
                {"name": "supply", "type": "uint256"},
                {"name": "owner", "type": "address"}
            ]},
            {"type": "function", "name": "approve", "inputs": [
                {"name": "spender", "type": "address"},
                {"name": "amount", "type": "uint256"}
            ]}
        ]))
        .unwrap(),
        vec![0x03],
    ));
    store.insert(CompiledArtifact::new(
        "Factory",
        Interface::from_json(json!([
            {
                "type": "function",
                "name": "createChild",
                "inputs": [{"name": "label", "type": "string"}]
            },
            {"type": "event", "name": "ChildCreated", "anonymous": false, "inputs": [
                {"name": "child", "type": "address", "indexed": true}
            ]}
        ]))
        .unwrap(),
        vec![0x04],
    ));
    store.insert(CompiledArtifact::new(
        "Child",
        Interface::from_json(json!([{"type": "function", "name": "label", "inputs": []}])).unwrap(),
        vec![0x05],
    ));
    store
}

struct Harness {
    _dir: TempDir,
    root: PathBuf,
    chain: Arc<MemoryChain>,
    env: Environment,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("deployments");
        let chain = Arc::new(MemoryChain::new(1337, 2));
        let id = EnvironmentId::from("hardhat");
        let table = BTreeMap::from([(
            "deployer".to_owned(),
            BTreeMap::from([("default".to_owned(), AccountEntry::Index(0))]),
        )]);
        let env = Environment {
            accounts: NamedAccounts::new(id.clone(), chain.accounts().expect("accounts"), table),
            id,
            chain_id: 1337,
            live: false,
            artifacts: artifacts(),
        };
        Self { _dir: dir, root, chain, env }
    }

    fn registry(&self) -> Registry {
        Registry::load(&self.root, &self.env.id, 1337).expect("load registry")
    }

    fn run(&self, units: &UnitSet) -> RunReport {
        self.run_with(units, CancelToken::new(), false)
    }

    fn run_with(&self, units: &UnitSet, cancel: CancelToken, dry_run: bool) -> RunReport {
        let plan = resolve(units, &[]).expect("plan");
        let mut registry = self.registry();
        let mut sequencer = Sequencer::new(
            self.chain.clone(),
            RetryPolicy::immediate(3),
            ConfirmationConfig::default(),
        );
        Engine::new(&self.env, &mut sequencer)
            .dry_run(dry_run)
            .with_cancel(cancel)
            .run(&plan, &mut registry)
    }

    /// Every file in the environment directory, by name.
    fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        let dir = registry::environment_dir(&self.root, &self.env.id);
        let Ok(entries) = fs::read_dir(&dir) else {
            return BTreeMap::new();
        };
        entries
            .map(|e| {
                let e = e.expect("entry");
                (e.file_name().to_string_lossy().into_owned(), fs::read(e.path()).expect("read"))
            })
            .collect()
    }
}

fn outcomes(report: &RunReport) -> Vec<(&str, &'static str)> {
    report
        .units
        .iter()
        .map(|r| (r.unit.0.as_str(), r.outcome.label()))
        .collect()
}

/// Unit deploying contract `Simple` as its primary.
fn simple(name: &str, deps: &[&str]) -> Unit {
    Unit::builder(name)
        .depends_on(deps.iter().copied())
        .primary(name, "Simple", |_| Ok(Vec::new()))
        .run(|d| {
            let from = d.account("deployer")?;
            d.deploy_primary(from, None)?;
            Ok(())
        })
        .build()
        .expect("unit")
}

/// Unit deploying `Holder(address of target)`.
fn holder(name: &str, target: &'static str) -> Unit {
    Unit::builder(name)
        .depends_on([target])
        .primary(name, "Holder", move |ctx| Ok(vec![ctx.address(target)?.into()]))
        .run(|d| {
            let from = d.account("deployer")?;
            d.deploy_primary(from, None)?;
            Ok(())
        })
        .build()
        .expect("unit")
}

fn token(supply: u128) -> Unit {
    Unit::builder("Token")
        .primary("Token", "Token", move |ctx| {
            Ok(vec!["Token".into(), Token::uint(supply), ctx.account("deployer")?.into()])
        })
        .run(|d| {
            let from = d.account("deployer")?;
            d.deploy_primary(from, Some(8_000_000))?;
            Ok(())
        })
        .build()
        .expect("unit")
}

// ---------------------------------------------------------------------------
// 1. Ordering and persistence
// ---------------------------------------------------------------------------

#[test]
fn chain_of_three_runs_in_dependency_order() {
    let h = Harness::new();
    let units =
        UnitSet::from_units([holder("C", "B"), simple("A", &[]), holder("B", "A")]).unwrap();

    let report = h.run(&units);
    assert!(report.is_success(), "{report:?}");
    assert_eq!(outcomes(&report), [("A", "deployed"), ("B", "deployed"), ("C", "deployed")]);
    assert_eq!(report.transactions(), 3);

    let registry = h.registry();
    assert_eq!(registry.len(), 3);
    let a = registry.get(&ArtifactName::from("A")).unwrap();
    let b = registry.get(&ArtifactName::from("B")).unwrap();
    // B was constructed with A's address.
    let code = h.chain.code_at(&b.address).unwrap();
    assert_eq!(&code[1..], &a.address.to_word()[..]);
}

#[test]
fn rerun_is_a_no_op() {
    let h = Harness::new();
    let units =
        UnitSet::from_units([simple("A", &[]), holder("B", "A"), holder("C", "B")]).unwrap();
    h.run(&units);
    let before = h.snapshot();
    let sent = h.chain.transaction_count();

    let report = h.run(&units);
    assert_eq!(outcomes(&report), [("A", "skipped"), ("B", "skipped"), ("C", "skipped")]);
    assert_eq!(report.transactions(), 0);
    assert_eq!(h.chain.transaction_count(), sent);
    assert_eq!(h.snapshot(), before, "registry must be byte-identical");
}

#[test]
fn changed_constructor_args_redeploy() {
    let h = Harness::new();
    h.run(&UnitSet::from_units([token(1_000)]).unwrap());
    let first = h.registry().get(&ArtifactName::from("Token")).cloned().unwrap();

    let same = h.run(&UnitSet::from_units([token(1_000)]).unwrap());
    assert!(matches!(same.outcome("Token"), Some(UnitOutcome::Skipped)));

    let changed = h.run(&UnitSet::from_units([token(2_000)]).unwrap());
    assert!(matches!(
        changed.outcome("Token"),
        Some(UnitOutcome::Succeeded { transactions: 1, .. })
    ));
    let second = h.registry().get(&ArtifactName::from("Token")).cloned().unwrap();
    assert_ne!(first.address, second.address);
    assert_eq!(first.code_fingerprint, second.code_fingerprint);
    assert_ne!(first.args_fingerprint, second.args_fingerprint);
}

#[test]
fn dry_run_sends_nothing_and_writes_nothing() {
    let h = Harness::new();
    let units = UnitSet::from_units([simple("A", &[]), simple("B", &["A"])]).unwrap();
    let report = h.run_with(&units, CancelToken::new(), true);
    assert_eq!(outcomes(&report), [("A", "would run"), ("B", "would run")]);
    assert_eq!(h.chain.transaction_count(), 0);
    assert!(h.snapshot().is_empty());
}

#[test]
fn dry_run_reports_dependents_of_undeployed_units() {
    let h = Harness::new();
    let units = UnitSet::from_units([simple("A", &[]), holder("B", "A")]).unwrap();
    let report = h.run_with(&units, CancelToken::new(), true);
    assert!(report.is_success(), "{report:?}");
    assert_eq!(outcomes(&report), [("A", "would run"), ("B", "would run")]);
    assert_eq!(h.chain.transaction_count(), 0);
    assert!(h.snapshot().is_empty());
}

#[test]
fn dry_run_reports_dependents_of_redeployed_units() {
    let h = Harness::new();
    h.run(&UnitSet::from_units([token(1_000), holder("Vault", "Token")]).unwrap());
    let before = h.snapshot();
    let sent = h.chain.transaction_count();

    let changed = UnitSet::from_units([token(2_000), holder("Vault", "Token")]).unwrap();
    let report = h.run_with(&changed, CancelToken::new(), true);
    assert_eq!(outcomes(&report), [("Token", "would run"), ("Vault", "would run")]);
    assert_eq!(h.chain.transaction_count(), sent);
    assert_eq!(h.snapshot(), before);

    // The live run agrees: both are redeployed.
    let report = h.run(&changed);
    assert_eq!(outcomes(&report), [("Token", "deployed"), ("Vault", "deployed")]);
}

#[test]
fn status_never_reports_a_dependent_of_a_changed_unit_as_current() {
    let h = Harness::new();
    h.run(&UnitSet::from_units([token(1_000), holder("Vault", "Token")]).unwrap());
    let registry = h.registry();

    let same = UnitSet::from_units([token(1_000), holder("Vault", "Token")]).unwrap();
    let statuses = status::check(&resolve(&same, &[]).unwrap(), &h.env, &registry);
    assert!(
        statuses.iter().all(|s| matches!(s.status, UnitStatus::Current { .. })),
        "{statuses:?}"
    );

    let changed = UnitSet::from_units([token(2_000), holder("Vault", "Token")]).unwrap();
    let statuses = status::check(&resolve(&changed, &[]).unwrap(), &h.env, &registry);
    let labels: Vec<_> = statuses.iter().map(|s| (s.unit.0.as_str(), s.status.label())).collect();
    assert_eq!(labels, [("Token", "changed"), ("Vault", "changed")]);
}

// ---------------------------------------------------------------------------
// 2. Failure and resume
// ---------------------------------------------------------------------------

#[test]
fn failed_unit_discards_staging_and_resume_skips_prior_units() {
    let h = Harness::new();
    let fail = Arc::new(AtomicBool::new(true));
    let flag = fail.clone();
    let b = Unit::builder("B")
        .depends_on(["A"])
        .primary("B", "Simple", |_| Ok(Vec::new()))
        .run(move |d| {
            let from = d.account("deployer")?;
            d.deploy_primary(from, None)?;
            if flag.load(Ordering::SeqCst) {
                return Err(UnitError::Failed("interrupted".into()));
            }
            Ok(())
        })
        .build()
        .unwrap();
    let units = UnitSet::from_units([simple("A", &[]), b, simple("C", &["B"])]).unwrap();

    let report = h.run(&units);
    assert_eq!(outcomes(&report), [("A", "deployed"), ("B", "failed"), ("C", "not run")]);
    let (unit, err) = report.failed_unit().unwrap();
    assert_eq!(unit.0, "B");
    assert_eq!(err.to_string(), "interrupted");

    let registry = h.registry();
    assert!(registry.get(&ArtifactName::from("A")).is_some());
    assert!(registry.get(&ArtifactName::from("B")).is_none(), "staged B discarded");

    fail.store(false, Ordering::SeqCst);
    let resumed = h.run(&units);
    assert_eq!(outcomes(&resumed), [("A", "skipped"), ("B", "deployed"), ("C", "deployed")]);
    assert_eq!(h.registry().len(), 3);
}

#[test]
fn cancellation_stops_between_units() {
    let h = Harness::new();
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let a = Unit::builder("A")
        .primary("A", "Simple", |_| Ok(Vec::new()))
        .run(move |d| {
            let from = d.account("deployer")?;
            d.deploy_primary(from, None)?;
            trigger.cancel();
            Ok(())
        })
        .build()
        .unwrap();
    let units = UnitSet::from_units([a, simple("B", &["A"])]).unwrap();

    let report = h.run_with(&units, cancel, false);
    assert!(report.cancelled);
    assert!(!report.is_success());
    assert_eq!(outcomes(&report), [("A", "deployed"), ("B", "not run")]);
    assert_eq!(h.registry().len(), 1);
}

#[test]
fn reverted_call_fails_the_unit() {
    let h = Harness::new();
    let approve = artifacts().get("Token").unwrap().abi.method("Token", "approve").unwrap();
    h.chain.revert_on(approve.selector, "approvals paused");

    let unit = Unit::builder("Approve")
        .primary("Token", "Token", |ctx| {
            Ok(vec!["T".into(), Token::uint(1), ctx.account("deployer")?.into()])
        })
        .run(|d| {
            let from = d.account("deployer")?;
            d.deploy_primary(from, None)?;
            d.execute("Token", "approve", &[from.into(), Token::max_int256()], from)?;
            Ok(())
        })
        .build()
        .unwrap();
    let report = h.run(&UnitSet::from_units([unit]).unwrap());

    match report.failed_unit() {
        Some((_, UnitError::Chain(ChainError::ExecutionReverted { target, reason, .. }))) => {
            assert_eq!(target, "Token");
            assert_eq!(reason, "approvals paused");
        }
        other => panic!("expected revert, got {other:?}"),
    }
    assert!(h.registry().is_empty());
}

#[test]
fn unit_that_skips_its_primary_fails() {
    let h = Harness::new();
    let unit = Unit::builder("Lazy")
        .primary("Lazy", "Simple", |_| Ok(Vec::new()))
        .run(|d| {
            let from = d.account("deployer")?;
            d.deploy("Other", Deploy::new("Simple", from))?;
            Ok(())
        })
        .build()
        .unwrap();
    let report = h.run(&UnitSet::from_units([unit]).unwrap());
    assert!(matches!(report.failed_unit(), Some((_, UnitError::MissingPrimary { .. }))));
    assert!(h.registry().is_empty());
}

// ---------------------------------------------------------------------------
// 3. Multi-artifact units
// ---------------------------------------------------------------------------

#[test]
fn factory_unit_records_children() {
    let h = Harness::new();
    let factory_abi = artifacts().get("Factory").unwrap().abi.clone();
    let create = factory_abi.method("Factory", "createChild").unwrap();
    let topic = H256(keccak256(b"ChildCreated(address)"));
    h.chain.on_call(create.selector, move |frame| {
        let child = frame.create();
        frame.emit(vec![topic, H256(child.to_word())], Vec::new());
        Ok(Vec::new())
    });

    let unit = Unit::builder("D")
        .primary("Factory", "Factory", |_| Ok(Vec::new()))
        .run(|d| {
            let from = d.account("deployer")?;
            d.deploy_primary(from, None)?;
            let rule = d.event_rule("Factory", "ChildCreated", "child")?;
            for name in ["ChildA", "ChildB"] {
                let receipt = d.execute("Factory", "createChild", &[name.into()], from)?;
                let address = receipt.extract_address(&rule)?;
                d.save(name, "Child", address, Some(receipt.transaction_hash))?;
            }
            Ok(())
        })
        .build()
        .unwrap();
    let units = UnitSet::from_units([unit]).unwrap();

    let report = h.run(&units);
    assert!(matches!(
        report.outcome("D"),
        Some(UnitOutcome::Succeeded { artifacts, transactions: 3 }) if artifacts.len() == 3
    ));

    let registry = h.registry();
    assert_eq!(registry.len(), 3);
    let a = registry.get(&ArtifactName::from("ChildA")).unwrap();
    let b = registry.get(&ArtifactName::from("ChildB")).unwrap();
    assert_ne!(a.address, b.address);
    assert!(h.chain.code_at(&a.address).is_some());
    assert_eq!(a.contract, "Child");
    assert!(a.abi.method("ChildA", "label").is_ok());

    assert!(matches!(h.run(&units).outcome("D"), Some(UnitOutcome::Skipped)));
}

#[test]
fn unchanged_artifacts_are_reused_when_a_unit_reruns() {
    let h = Harness::new();
    let stack = |supply: u128| {
        Unit::builder("Stack")
            .primary("Core", "Token", move |ctx| {
                Ok(vec!["Core".into(), Token::uint(supply), ctx.account("deployer")?.into()])
            })
            .run(|d| {
                let from = d.account("deployer")?;
                d.deploy("Helper", Deploy::new("Simple", from))?;
                d.deploy_primary(from, None)?;
                Ok(())
            })
            .build()
            .unwrap()
    };

    let first = h.run(&UnitSet::from_units([stack(1)]).unwrap());
    assert_eq!(first.transactions(), 2);
    let helper = h.registry().get(&ArtifactName::from("Helper")).cloned().unwrap();

    let second = h.run(&UnitSet::from_units([stack(2)]).unwrap());
    assert!(matches!(
        second.outcome("Stack"),
        Some(UnitOutcome::Succeeded { transactions: 1, .. })
    ));
    assert_eq!(h.registry().get(&ArtifactName::from("Helper")), Some(&helper));
}

#[test]
fn unknown_role_fails_before_any_transaction() {
    let h = Harness::new();
    let unit = Unit::builder("Gov")
        .primary("Gov", "Holder", |ctx| Ok(vec![ctx.account("governance")?.into()]))
        .run(|_| Ok(()))
        .build()
        .unwrap();
    let report = h.run(&UnitSet::from_units([unit]).unwrap());
    assert!(matches!(report.failed_unit(), Some((_, UnitError::Account(_)))));
    assert_eq!(h.chain.transaction_count(), 0);
}
