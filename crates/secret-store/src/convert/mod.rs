//! Conversion between persisted [`Secret`] records and usable plaintext.
//!
//! - [`PlaintextConverter`] passes values through unchanged.
//! - [`EncryptingConverter`] decrypts on read and encrypts on write, using the
//!   key named by the secret (or the default key).
//! - [`ConverterFactory`] picks one per record and direction: reads follow the
//!   record's `encrypted` flag, writes follow whether encryption is available.

pub mod encrypting;
pub mod factory;
pub mod plaintext;

pub use encrypting::EncryptingConverter;
pub use factory::ConverterFactory;
pub use plaintext::PlaintextConverter;

use common::{Secret, SecretsError};

/// Direction a converter was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAccess {
    Read,
    Write,
}

impl KeyAccess {
    fn check(self, action: ConversionAction) -> Result<(), SecretsError> {
        match (self, action) {
            (KeyAccess::Read, ConversionAction::Read)
            | (KeyAccess::Write, ConversionAction::Write) => Ok(()),
            (_, ConversionAction::Read) => Err(SecretsError::Usage("read")),
            (_, ConversionAction::Write) => Err(SecretsError::Usage("write")),
        }
    }
}

/// The operation a converter is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionAction {
    Read,
    Write,
}

impl From<ConversionAction> for KeyAccess {
    fn from(action: ConversionAction) -> Self {
        match action {
            ConversionAction::Read => KeyAccess::Read,
            ConversionAction::Write => KeyAccess::Write,
        }
    }
}

/// Converts a [`Secret`] to and from its at-rest form.
pub trait KeyValueConverter: Send + Sync {
    /// Plaintext value of `secret`.
    ///
    /// # Errors
    ///
    /// Fails with [`SecretsError::Usage`] on a write-only converter, and with
    /// a key or cipher error when an encrypted value cannot be decrypted.
    fn read_value(&self, secret: &Secret) -> Result<String, SecretsError>;

    /// New record holding `secret`'s value in its at-rest form.
    ///
    /// # Errors
    ///
    /// Fails with [`SecretsError::Usage`] on a read-only converter, and with
    /// a key or cipher error when encryption is not possible.
    fn write_value(&self, secret: &Secret) -> Result<Secret, SecretsError>;
}
