//! Deployment units shipped with the `rollout` binary: two test tokens and the
//! Superfluid stack that wraps them.

use rollout_core::Token;
use rollout_engine::{Deploy, Deployer, GraphError, Unit, UnitError, UnitSet};

/// Gas limit for the large Superfluid contracts.
const STACK_GAS: u64 = 10_000_000;

/// Amount of each underlying token upgraded into its wrapper.
const UPGRADE_AMOUNT: u64 = 5_000;

const TEST_TOKEN_SUPPLY: u64 = 1_000_000;

/// An ERC-20 wrapper created through the super token factory.
struct Wrapper {
    underlying: &'static str,
    artifact: &'static str,
    name: &'static str,
    symbol: &'static str,
}

const WRAPPERS: [Wrapper; 2] = [
    Wrapper {
        underlying: "TokenA",
        artifact: "SuperTokenA",
        name: "Super Token A",
        symbol: "xTKA",
    },
    Wrapper {
        underlying: "TokenB",
        artifact: "SuperTokenB",
        name: "Super Token B",
        symbol: "XTKB",
    },
];

/// Every unit, in declaration order.
pub fn all() -> Result<UnitSet, GraphError> {
    UnitSet::from_units([
        test_token("TokenA", "Token A", "TKA")?,
        test_token("TokenB", "Token B", "TKB")?,
        superfluid()?,
    ])
}

fn test_token(
    unit: &'static str,
    name: &'static str,
    symbol: &'static str,
) -> Result<Unit, GraphError> {
    Unit::builder(unit)
        .tags([unit])
        .primary(unit, "TestToken", move |_| {
            Ok(vec![name.into(), symbol.into(), Token::ether(TEST_TOKEN_SUPPLY)])
        })
        .run(|d| {
            let deployer = d.account("deployer")?;
            d.deploy_primary(deployer, None)?;
            Ok(())
        })
        .build()
}

fn superfluid() -> Result<Unit, GraphError> {
    Unit::builder("Superfluid")
        .tags([
            "Superfluid",
            "SuperTokenFactory",
            "SuperTokenFactoryHelper",
            "ConstantFlowAgreementV1",
        ])
        .depends_on(["TokenA", "TokenB"])
        .primary("Superfluid", "Superfluid", |_| Ok(vec![true.into(), false.into()]))
        .run(deploy_superfluid)
        .build()
}

fn deploy_superfluid(d: &mut Deployer<'_>) -> Result<(), UnitError> {
    let deployer = d.account("deployer")?;

    let host = d.deploy_primary(deployer, Some(STACK_GAS))?;
    d.execute("Superfluid", "initialize", &[deployer.into()], deployer)?;

    let helper = d.deploy(
        "SuperTokenFactoryHelper",
        Deploy::new("SuperTokenFactoryHelper", deployer).gas_limit(STACK_GAS),
    )?;
    let factory = d.deploy(
        "SuperTokenFactory",
        Deploy::new("SuperTokenFactory", deployer)
            .args(vec![host.address.into(), helper.address.into()])
            .gas_limit(STACK_GAS),
    )?;
    d.execute("Superfluid", "updateSuperTokenFactory", &[factory.address.into()], deployer)?;

    let cfa = d.deploy(
        "ConstantFlowAgreementV1",
        Deploy::new("ConstantFlowAgreementV1", deployer).gas_limit(STACK_GAS),
    )?;
    d.execute("Superfluid", "registerAgreementClass", &[cfa.address.into()], deployer)?;

    let created = d.event_rule("SuperTokenFactory", "SuperTokenCreated", "token")?;
    for wrapper in &WRAPPERS {
        let underlying = d.address(wrapper.underlying)?;
        let receipt = d.execute(
            "SuperTokenFactory",
            "createERC20Wrapper(address,uint8,string,string)",
            &[underlying.into(), Token::uint(0), wrapper.name.into(), wrapper.symbol.into()],
            deployer,
        )?;
        let address = receipt.extract_address(&created)?;
        d.save(wrapper.artifact, "SuperToken", address, Some(receipt.transaction_hash))?;
    }

    for wrapper in &WRAPPERS {
        let address = d.address(wrapper.artifact)?;
        d.execute(wrapper.underlying, "approve", &[address.into(), Token::max_int256()], deployer)?;
    }
    for wrapper in &WRAPPERS {
        d.execute(wrapper.artifact, "upgrade", &[Token::ether(UPGRADE_AMOUNT)], deployer)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
