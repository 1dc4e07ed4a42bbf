//! `secret-store` binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (tracing, optional OTLP export).
//! 3. Build the encryption key resolver over the process environment.
//! 4. Probe for a default encryption key and pick the converters; a configured
//!    but unusable key aborts startup.
//! 5. Open the [`SecretStore`] over the secrets directory.
//! 6. Start the directory watcher that drives cache invalidation.
//! 7. Purge secrets of functions that no longer exist.
//! 8. Warm the host secrets (generating them on first start).
//! 9. Run until interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use secret_store::config::Config;
use secret_store::telemetry;
use secret_store::{
    ConverterFactory, EncryptionKeyResolver, Hosting, KeyCache, ProcessEnvironment, SecretStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        secrets_path = %cfg.secrets_path.display(),
        hosted = cfg.hosted,
        "secret-store starting"
    );

    // -----------------------------------------------------------------------
    // 3. Key resolver
    // -----------------------------------------------------------------------
    let resolver = Arc::new(EncryptionKeyResolver::new(
        Arc::new(ProcessEnvironment),
        Hosting::from_flag(cfg.hosted),
        KeyCache::new(),
    ));

    // -----------------------------------------------------------------------
    // 4. Converters
    // -----------------------------------------------------------------------
    let converters = ConverterFactory::probe(resolver)
        .context("default encryption key is configured but unusable")?;
    if !converters.encryption_supported() {
        if cfg.require_encryption {
            anyhow::bail!("REQUIRE_ENCRYPTION is set but no default encryption key is configured");
        }
        warn!("no default encryption key configured; new keys are stored in plaintext");
    }

    // -----------------------------------------------------------------------
    // 5. Store
    // -----------------------------------------------------------------------
    let store = SecretStore::open(&cfg.secrets_path, converters).await?;

    // -----------------------------------------------------------------------
    // 6. Watcher
    // -----------------------------------------------------------------------
    let _watcher = store.watch()?;

    // -----------------------------------------------------------------------
    // 7. Orphan purge
    // -----------------------------------------------------------------------
    if let Some(script_root) = &cfg.script_root {
        store.purge_orphans(script_root).await;
    }

    // -----------------------------------------------------------------------
    // 8. Host secrets
    // -----------------------------------------------------------------------
    let host = store
        .host_secrets()
        .await
        .context("failed to load host secrets")?;
    info!(
        function_keys = host.function_keys.len(),
        "host secrets ready"
    );

    // -----------------------------------------------------------------------
    // 9. Run
    // -----------------------------------------------------------------------
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");
    telemetry::shutdown_telemetry();

    Ok(())
}
