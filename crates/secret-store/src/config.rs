//! Configuration loading and validation for the secret store service.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any required variable is missing or invalid.
//! Encryption keys are not part of this struct: they are resolved lazily from the
//! environment by [`crate::crypto::EncryptionKeyResolver`].

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Validated service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory holding `host.json` and the per-function secrets files. **Required.**
    pub secrets_path: PathBuf,

    /// Root of the function scripts; one subdirectory per function. Orphaned
    /// function secrets are purged at startup when set.
    #[serde(default)]
    pub script_root: Option<PathBuf>,

    /// Whether the process runs in the hosted environment. Selects which
    /// variable supplies the default encryption key.
    #[serde(default)]
    pub hosted: bool,

    /// Refuse to start when no default encryption key is configured.
    #[serde(default)]
    pub require_encryption: bool,

    /// OTLP endpoint of an OTEL collector. Spans are only exported when set.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        if self.secrets_path.as_os_str().is_empty() {
            anyhow::bail!("SECRETS_PATH is required and must not be empty");
        }
        if let Some(root) = &self.script_root {
            if root.as_os_str().is_empty() {
                anyhow::bail!("SCRIPT_ROOT must not be empty when set");
            }
            if root == &self.secrets_path {
                anyhow::bail!("SCRIPT_ROOT must differ from SECRETS_PATH");
            }
        }
        if let Some(endpoint) = &self.otel_exporter_otlp_endpoint {
            ensure_non_empty(endpoint, "OTEL_EXPORTER_OTLP_ENDPOINT")?;
        }
        ensure_non_empty(&self.log_level, "LOG_LEVEL")?;
        Ok(())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} must not be empty");
    }
    Ok(())
}
