//! Secret model and error types shared across the secret store crates.

pub mod error;
pub mod secret;

pub use error::SecretsError;
pub use secret::{FunctionKeys, HostSecrets, HostSecretsInfo, Secret};
