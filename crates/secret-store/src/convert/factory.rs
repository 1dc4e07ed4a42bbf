use std::sync::Arc;

use common::{Secret, SecretsError};
use tracing::debug;

use super::{
    ConversionAction, EncryptingConverter, KeyAccess, KeyValueConverter, PlaintextConverter,
};
use crate::crypto::EncryptionKeyResolver;

/// Selects a [`KeyValueConverter`] for each secret and direction.
///
/// Reads follow the record: an encrypted record always goes through the
/// cipher and a plaintext record never does. Writes encrypt only when
/// encryption is supported in this environment.
#[derive(Debug, Clone)]
pub struct ConverterFactory {
    resolver: Arc<EncryptionKeyResolver>,
    encryption_supported: bool,
}

impl ConverterFactory {
    pub fn new(resolver: Arc<EncryptionKeyResolver>, encryption_supported: bool) -> Self {
        Self {
            resolver,
            encryption_supported,
        }
    }

    /// Build a factory whose write side encrypts iff a default key is
    /// configured.
    ///
    /// # Errors
    ///
    /// Fails when a default key is configured but unusable, so a broken key
    /// never silently turns into plaintext storage.
    pub fn probe(resolver: Arc<EncryptionKeyResolver>) -> Result<Self, SecretsError> {
        let encryption_supported = resolver.resolve(None)?.is_some();
        debug!(encryption_supported, "probed secret encryption support");
        Ok(Self::new(resolver, encryption_supported))
    }

    pub fn encryption_supported(&self) -> bool {
        self.encryption_supported
    }

    pub fn converter(&self, secret: &Secret, action: ConversionAction) -> Box<dyn KeyValueConverter> {
        let encrypt = match action {
            ConversionAction::Read => secret.is_encrypted(),
            ConversionAction::Write => self.encryption_supported,
        };
        let access = KeyAccess::from(action);

        if encrypt {
            Box::new(EncryptingConverter::new(self.resolver.clone(), access))
        } else {
            Box::new(PlaintextConverter::new(access))
        }
    }

    /// Plaintext value of a persisted secret.
    ///
    /// # Errors
    ///
    /// Propagates key resolution and cipher failures; never falls back to the
    /// stored value of an encrypted record.
    pub fn read(&self, secret: &Secret) -> Result<String, SecretsError> {
        self.converter(secret, ConversionAction::Read)
            .read_value(secret)
    }

    /// At-rest form of a freshly created secret.
    ///
    /// # Errors
    ///
    /// Propagates key resolution and cipher failures.
    pub fn write(&self, secret: &Secret) -> Result<Secret, SecretsError> {
        self.converter(secret, ConversionAction::Write)
            .write_value(secret)
    }
}
