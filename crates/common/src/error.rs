//! Error taxonomy shared by every layer of the secret store.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level secret store error type.
///
/// Variants map to short machine codes via [`SecretsError::code`]:
/// - [`SecretsError::KeyResolution`] / [`SecretsError::MissingKeyId`] → `key_resolution`
/// - [`SecretsError::Format`] → `format`
/// - [`SecretsError::Cipher`] → `cipher`
/// - [`SecretsError::Io`] → `io`
///
/// None of these are retried by the store: missing key configuration and
/// malformed files do not heal on their own.
#[derive(Debug, Error)]
pub enum SecretsError {
    /// No key material could be found for the requested key id.
    #[error("missing key configuration (key id: {0})")]
    KeyResolution(String),

    /// A secret is flagged as encrypted but names no encryption key.
    #[error("encrypted secret {0:?} does not carry an encryption key id")]
    MissingKeyId(String),

    /// Unknown document version, malformed JSON, or a document that does not
    /// match the schema of its declared version.
    #[error("invalid secrets file format: {0}")]
    Format(String),

    /// Wrong key length, malformed base64, or corrupted IV framing.
    #[error("cryptographic failure: {0}")]
    Cipher(String),

    /// A converter was used for an access mode it was not constructed for.
    #[error("converter was not constructed for {0} access")]
    Usage(&'static str),

    /// The function name cannot be mapped onto a secrets file.
    #[error("invalid function name: {0:?}")]
    InvalidFunctionName(String),

    /// Reading or writing a secrets file failed.
    #[error("secrets file I/O failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The secrets directory watcher could not be started.
    #[error("secrets directory watch failed: {0}")]
    Watch(String),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SecretsError {
    /// Short machine-readable code, safe to put in log fields.
    pub fn code(&self) -> &'static str {
        match self {
            SecretsError::KeyResolution(_) | SecretsError::MissingKeyId(_) => "key_resolution",
            SecretsError::Format(_) => "format",
            SecretsError::Cipher(_) => "cipher",
            SecretsError::Usage(_) => "usage",
            SecretsError::InvalidFunctionName(_) => "invalid_function_name",
            SecretsError::Io { .. } => "io",
            SecretsError::Watch(_) => "watch",
            SecretsError::Internal(_) => "internal",
        }
    }

    /// Wrap an I/O failure together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SecretsError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for SecretsError {
    fn from(e: serde_json::Error) -> Self {
        SecretsError::Format(e.to_string())
    }
}
