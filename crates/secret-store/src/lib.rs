//! File-backed secret store for a multi-tenant function host.
//!
//! Generates, persists and serves the host master key, host function keys and
//! per-function keys. Keys are encrypted at rest when a default encryption key
//! is configured, files carry a format version that is upgraded on read, and
//! resolved values are cached until the backing file changes.

pub mod config;
pub mod convert;
pub mod crypto;
pub mod serializer;
pub mod store;
pub mod telemetry;

pub use convert::{ConverterFactory, KeyValueConverter};
pub use crypto::{EncryptionKeyResolver, Environment, Hosting, KeyCache, ProcessEnvironment};
pub use store::{generate_secret_value, SecretStore, SecretsWatcher};
