//! # rollout-engine
//!
//! Unit declarations, dependency resolution, and the execution engine.
//!
//! Declare units with [`Unit::builder`], collect them in a [`UnitSet`],
//! order them with [`graph::resolve`], and execute the plan with an
//! [`Engine`]. [`pipeline`] wires these to a configured environment.

pub mod context;
pub mod engine;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod status;
pub mod unit;

pub use context::{Context, Deploy, Deployer, Environment, Identity};
pub use engine::{CancelToken, Engine, RunReport, UnitOutcome, UnitReport};
pub use error::{GraphError, PipelineError, UnitError};
pub use graph::{resolve, ExecutionPlan};
pub use pipeline::RunOptions;
pub use status::{UnitStatus, UnitStatusReport};
pub use unit::{Unit, UnitBuilder, UnitSet};
