use std::process::Command;

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;
use predicates::str::contains;
use serde_json::{json, Value};

const CONFIG: &str = r#"
default_environment: hardhat
environments:
  hardhat:
    chain_id: 1337
    transport: { kind: memory }
named_accounts:
  deployer:
    default: 0
  dummy:
    default: 1
"#;

fn artifact(name: &str, bytecode: &str, abi: Value) -> String {
    json!({
        "_format": "hh-sol-artifact-1",
        "contractName": name,
        "sourceName": format!("contracts/{name}.sol"),
        "abi": abi,
        "bytecode": bytecode,
        "deployedBytecode": bytecode,
    })
    .to_string()
}

fn function(name: &str, inputs: &[(&str, &str)]) -> Value {
    let inputs: Vec<Value> = inputs
        .iter()
        .map(|(name, ty)| json!({"name": name, "type": ty}))
        .collect();
    json!({
        "type": "function",
        "name": name,
        "inputs": inputs,
        "outputs": [],
        "stateMutability": "nonpayable"
    })
}

fn constructor(inputs: &[(&str, &str)]) -> Value {
    let inputs: Vec<Value> = inputs
        .iter()
        .map(|(name, ty)| json!({"name": name, "type": ty}))
        .collect();
    json!({"type": "constructor", "inputs": inputs, "stateMutability": "nonpayable"})
}

/// A project directory with `rollout.yaml` and compiled artifacts for every
/// contract the shipped units use.
fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    dir.child("rollout.yaml").write_str(CONFIG).unwrap();

    let contracts = [
        (
            "TestToken",
            "0x60a0",
            json!([
                constructor(&[("name", "string"), ("symbol", "string"), ("supply", "uint256")]),
                function("approve", &[("spender", "address"), ("amount", "uint256")]),
            ]),
        ),
        (
            "Superfluid",
            "0x60a1",
            json!([
                constructor(&[("nonUpgradable", "bool"), ("appWhiteListingEnabled", "bool")]),
                function("initialize", &[("gov", "address")]),
                function("updateSuperTokenFactory", &[("newFactory", "address")]),
                function("registerAgreementClass", &[("agreementClassLogic", "address")]),
            ]),
        ),
        ("SuperTokenFactoryHelper", "0x60a2", json!([])),
        (
            "SuperTokenFactory",
            "0x60a3",
            json!([
                constructor(&[("host", "address"), ("helper", "address")]),
                function(
                    "createERC20Wrapper",
                    &[
                        ("underlyingToken", "address"),
                        ("upgradability", "uint8"),
                        ("name", "string"),
                        ("symbol", "string"),
                    ],
                ),
                {"type": "event", "name": "SuperTokenCreated", "anonymous": false, "inputs": [
                    {
                        "name": "token",
                        "type": "address",
                        "indexed": true,
                        "internalType": "contract ISuperToken"
                    }
                ]},
            ]),
        ),
        ("ConstantFlowAgreementV1", "0x60a4", json!([])),
        ("SuperToken", "0x60a5", json!([function("upgrade", &[("amount", "uint256")])])),
    ];
    for (name, bytecode, abi) in contracts {
        dir.child(format!("artifacts/contracts/{name}.sol/{name}.json"))
            .write_str(&artifact(name, bytecode, abi))
            .unwrap();
        dir.child(format!("artifacts/contracts/{name}.sol/{name}.dbg.json"))
            .write_str(r#"{"_format": "hh-sol-dbg-1", "buildInfo": "../../build-info/x.json"}"#)
            .unwrap();
    }
    dir
}

fn rollout(dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("rollout"));
    cmd.current_dir(dir.path()).env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().expect("run rollout");
    assert!(
        output.status.success(),
        "command failed: status={} stderr={}",
        output.status,
        String::from_utf8_lossy(&output.stderr),
    );
    String::from_utf8(output.stdout).unwrap()
}

// ---------------------------------------------------------------------------
// plan
// ---------------------------------------------------------------------------

#[test]
fn plan_orders_tokens_before_the_stack() {
    let dir = TempDir::new().unwrap();
    let stdout = stdout_of(rollout(&dir).arg("plan"));
    let a = stdout.find("1. TokenA").expect("TokenA first");
    let b = stdout.find("2. TokenB").expect("TokenB second");
    let s = stdout.find("3. Superfluid").expect("Superfluid third");
    assert!(a < b && b < s);
    assert!(stdout.contains("← TokenA, TokenB"));
}

#[test]
fn plan_with_unknown_tag_fails() {
    let dir = TempDir::new().unwrap();
    rollout(&dir)
        .args(["plan", "--tags", "Uniswap"])
        .assert()
        .failure()
        .stderr(contains("Uniswap"));
}

// ---------------------------------------------------------------------------
// deploy
// ---------------------------------------------------------------------------

#[test]
fn dry_run_writes_nothing() {
    let dir = project();
    rollout(&dir)
        .args(["deploy", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("[dry-run]").and(contains("3 would run")));
    dir.child("deployments").assert(predicate::path::missing());
}

#[test]
fn token_deploy_is_idempotent() {
    let dir = project();
    rollout(&dir)
        .args(["deploy", "--tags", "TokenA,TokenB"])
        .assert()
        .success()
        .stdout(contains("2 deployed, 0 skipped, 2 transactions"));
    dir.child("deployments/hardhat/TokenA.json").assert(predicate::path::is_file());
    dir.child("deployments/hardhat/TokenB.json").assert(predicate::path::is_file());
    dir.child("deployments/hardhat/.chain_id").assert("1337\n");

    let before = std::fs::read(dir.child("deployments/hardhat/TokenA.json").path()).unwrap();
    rollout(&dir)
        .args(["deploy", "--tags", "TokenA,TokenB"])
        .assert()
        .success()
        .stdout(contains("0 deployed, 2 skipped, 0 transactions"));
    let after = std::fs::read(dir.child("deployments/hardhat/TokenA.json").path()).unwrap();
    assert_eq!(before, after);
}

#[test]
fn failing_unit_is_named_and_earlier_units_persist() {
    // The memory chain emits no factory events, so wrapper creation fails.
    let dir = project();
    rollout(&dir)
        .arg("deploy")
        .assert()
        .failure()
        .stdout(contains("✗  Superfluid"))
        .stderr(
            contains("unit 'Superfluid' failed on 'hardhat'").and(contains("SuperTokenCreated")),
        );

    dir.child("deployments/hardhat/TokenA.json").assert(predicate::path::is_file());
    dir.child("deployments/hardhat/TokenB.json").assert(predicate::path::is_file());
    dir.child("deployments/hardhat/Superfluid.json").assert(predicate::path::missing());
    dir.child("deployments/hardhat/SuperTokenFactory.json").assert(predicate::path::missing());
}

#[test]
fn unknown_environment_fails() {
    let dir = project();
    rollout(&dir)
        .args(["deploy", "--env", "goerli"])
        .assert()
        .failure()
        .stderr(contains("goerli"));
}

#[test]
fn missing_config_is_reported() {
    let dir = TempDir::new().unwrap();
    rollout(&dir)
        .arg("status")
        .assert()
        .failure()
        .stderr(contains("rollout.yaml"));
}

// ---------------------------------------------------------------------------
// status / accounts / export
// ---------------------------------------------------------------------------

#[test]
fn status_json_tracks_deployed_units() {
    let dir = project();
    rollout(&dir).args(["deploy", "--tags", "TokenA"]).assert().success();

    let stdout = stdout_of(rollout(&dir).args(["status", "--json"]));
    let status: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(status["environment"], "hardhat");
    let units = status["units"].as_array().unwrap();
    let by_unit = |name: &str| {
        units
            .iter()
            .find(|u| u["unit"] == name)
            .unwrap_or_else(|| panic!("missing {name}"))["status"]
            .clone()
    };
    assert_eq!(by_unit("TokenA"), "current");
    assert_eq!(by_unit("TokenB"), "not deployed");
    assert_eq!(by_unit("Superfluid"), "not deployed");
    assert!(units.iter().any(|u| u["unit"] == "TokenA" && u["address"].is_string()));
}

#[test]
fn status_table_lists_every_unit() {
    let dir = project();
    rollout(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(contains("3 units | 3 pending").and(contains("NOT DEPLOYED")));
}

#[test]
fn accounts_resolve_roles() {
    let dir = project();
    rollout(&dir)
        .arg("accounts")
        .assert()
        .success()
        .stdout(contains("deployer").and(contains("dummy")).and(contains("0x")));
}

#[test]
fn export_lists_recorded_contracts() {
    let dir = project();
    rollout(&dir).args(["deploy", "--tags", "TokenB"]).assert().success();

    let stdout = stdout_of(rollout(&dir).arg("export"));
    let export: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(export["chain_id"], 1337);
    assert!(export["contracts"]["TokenB"]["address"].is_string());
    assert!(export["contracts"]["TokenA"].is_null());

    rollout(&dir)
        .args(["export", "--output", "registry.json"])
        .assert()
        .success()
        .stdout(contains("exported 1 contracts"));
    dir.child("registry.json").assert(predicate::str::contains("\"TokenB\""));
}
