pub mod accounts;
pub mod deploy;
pub mod export;
pub mod plan;
pub mod status;

use std::path::Path;

use anyhow::{Context, Result};
use rollout_core::RolloutConfig;

/// Load `rollout.yaml`, naming the file in the error.
pub fn load_config(path: &Path) -> Result<RolloutConfig> {
    RolloutConfig::load(path).with_context(|| format!("failed to load config '{}'", path.display()))
}
