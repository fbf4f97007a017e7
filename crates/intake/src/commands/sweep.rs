//! One-shot expiry sweep, for running from cron instead of in-process.

use anyhow::{Context, Result};
use tracing::info;

use intake::config::StoreBackend;
use intake::store;

pub async fn run(config_path: &str, backend_override: Option<StoreBackend>) -> Result<()> {
    let config = super::load_config(config_path, backend_override).await?;

    let stores = store::connect(&config.store)
        .await
        .context("Failed to open session store")?;

    let removed = stores
        .sessions
        .sweep_expired()
        .await
        .context("Sweep failed")?;

    info!(backend = stores.backend(), removed, "Sweep finished");
    println!("Removed {removed} expired session(s)");
    Ok(())
}
