pub mod publish;
pub mod relay;

use anyhow::{anyhow, Result};
use lucida_core::config::Config;
use std::path::Path;

pub(crate) fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load_or_default(path).map_err(|e| anyhow!("{e}"))
}
