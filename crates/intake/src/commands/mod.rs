//! CLI command implementations.

use anyhow::{Context, Result};

use intake::config::{Config, StoreBackend};

pub mod serve;
pub mod sweep;

/// Load the config file, apply the backend override and validate.
async fn load_config(config_path: &str, backend_override: Option<StoreBackend>) -> Result<Config> {
    let mut config = Config::load(config_path)
        .await
        .with_context(|| format!("Failed to load config '{config_path}'"))?;

    if let Some(backend) = backend_override {
        config.store.backend = backend;
    }
    config.validate()?;
    Ok(config)
}
