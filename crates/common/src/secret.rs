//! The secret model: persisted [`Secret`] records, the host and function
//! documents built from them, and the resolved plaintext projections served
//! to request authorization.
//!
//! Persisted types serialise to the current on-disk shape:
//!
//! ```text
//! {"name": "default", "value": "...", "encrypted": true, "encryptionKeyId": "default"}
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use subtle::ConstantTimeEq;

/// Name of the host master key.
pub const MASTER_KEY_NAME: &str = "master";

/// Name of the auto-generated host-wide function key.
pub const HOST_FUNCTION_KEY_NAME: &str = "function";

/// Name of the auto-generated key of each function.
pub const DEFAULT_KEY_NAME: &str = "default";

/// A single named key, either plaintext or encrypted at rest.
///
/// Immutable: conversions produce new instances. Equality compares all four
/// fields and uses a constant-time comparison for `value`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Secret {
    #[serde(default, deserialize_with = "null_as_empty")]
    name: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    value: String,

    #[serde(rename = "encrypted", default)]
    is_encrypted: bool,

    #[serde(rename = "encryptionKeyId", alias = "keyId", default)]
    encryption_key_id: Option<String>,
}

impl Secret {
    /// A plaintext secret.
    pub fn plaintext(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            is_encrypted: false,
            encryption_key_id: None,
        }
    }

    /// An encrypted secret whose `value` is the base64 cipher blob.
    pub fn encrypted(
        name: impl Into<String>,
        value: impl Into<String>,
        encryption_key_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            is_encrypted: true,
            encryption_key_id: Some(encryption_key_id.into()),
        }
    }

    /// A plaintext secret that asks to be encrypted with a specific key when
    /// it passes through a write converter.
    pub fn with_key_id(mut self, encryption_key_id: impl Into<String>) -> Self {
        self.encryption_key_id = Some(encryption_key_id.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stored value: plaintext, or the cipher blob when [`Self::is_encrypted`].
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_encrypted(&self) -> bool {
        self.is_encrypted
    }

    /// Key id, with empty strings treated as absent.
    pub fn encryption_key_id(&self) -> Option<&str> {
        self.encryption_key_id.as_deref().filter(|id| !id.is_empty())
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        let same_value: bool = self.value.as_bytes().ct_eq(other.value.as_bytes()).into();
        same_value
            && self.name == other.name
            && self.is_encrypted == other.is_encrypted
            && self.encryption_key_id == other.encryption_key_id
    }
}

impl Eq for Secret {}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .field("is_encrypted", &self.is_encrypted)
            .field("encryption_key_id", &self.encryption_key_id)
            .finish()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// The host-wide secrets document, persisted as exactly one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSecrets {
    pub master_key: Secret,
    pub function_keys: Vec<Secret>,
}

/// Resolved plaintext keys of one function, by key name.
pub type FunctionKeys = HashMap<String, String>;

/// Resolved (decrypted) projection of [`HostSecrets`]. Never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct HostSecretsInfo {
    pub master_key: String,
    pub function_keys: FunctionKeys,
}

impl fmt::Debug for HostSecretsInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.function_keys.keys().collect();
        names.sort();
        f.debug_struct("HostSecretsInfo")
            .field("master_key", &"[REDACTED]")
            .field("function_keys", &names)
            .finish()
    }
}
