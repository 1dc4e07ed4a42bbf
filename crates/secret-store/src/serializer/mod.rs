//! Versioned JSON serialisation of host and function secrets documents.
//!
//! Every document carries an integer `version` property; a missing property
//! means version 0. Reads dispatch to the handler registered for exactly that
//! version and reject anything else. Writes always use the highest registered
//! version, so rewriting an old document upgrades it. That migration is one
//! way: nothing writes an older version.
//!
//! | version | function document              | host document                                   |
//! |---------|-------------------------------|-------------------------------------------------|
//! | 0       | `{"key": "..."}`              | `{"masterKey": "...", "functionKey": "..."}`    |
//! | 1       | `{"keys": [Secret], "version": 1}` | `{"masterKey": Secret, "functionKeys": [Secret], "version": 1}` |

pub mod v0;
pub mod v1;

use common::{HostSecrets, Secret, SecretsError};
use serde_json::{Map, Value};

pub use v0::FormatV0;
pub use v1::FormatV1;

/// JSON property holding the format version.
pub const VERSION_PROPERTY: &str = "version";

/// A handler for one on-disk format version.
pub trait SecretsFormat: Send + Sync {
    /// Version number this handler reads and writes.
    fn version(&self) -> u32;

    fn read_host(&self, document: Map<String, Value>) -> Result<HostSecrets, SecretsError>;

    fn read_function(&self, document: Map<String, Value>) -> Result<Vec<Secret>, SecretsError>;

    fn write_host(&self, secrets: &HostSecrets) -> Result<String, SecretsError>;

    fn write_function(&self, secrets: &[Secret]) -> Result<String, SecretsError>;
}

/// Registered handlers, one per version.
static FORMATS: [&dyn SecretsFormat; 2] = [&FormatV0, &FormatV1];

/// A document read from disk, with the version it was written in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded<T> {
    pub format_version: u32,
    pub secrets: T,
}

impl<T> Decoded<T> {
    /// `true` when the document was written in an older format than
    /// [`current`] and should be rewritten.
    pub fn is_outdated(&self) -> bool {
        self.format_version < current().version()
    }
}

/// The handler used for all writes: the highest registered version.
pub fn current() -> &'static dyn SecretsFormat {
    FORMATS
        .iter()
        .copied()
        .fold(FORMATS[0], |best, f| if f.version() > best.version() { f } else { best })
}

/// Handler registered for exactly `version`.
///
/// # Errors
///
/// Returns [`SecretsError::Format`] for an unknown version.
pub fn for_version(version: u32) -> Result<&'static dyn SecretsFormat, SecretsError> {
    FORMATS
        .iter()
        .copied()
        .find(|f| f.version() == version)
        .ok_or_else(|| SecretsError::Format(format!("unsupported secrets format version {version}")))
}

pub fn read_host(json: &str) -> Result<Decoded<HostSecrets>, SecretsError> {
    let (format, document) = detect(json)?;
    Ok(Decoded {
        format_version: format.version(),
        secrets: format.read_host(document)?,
    })
}

pub fn read_function(json: &str) -> Result<Decoded<Vec<Secret>>, SecretsError> {
    let (format, document) = detect(json)?;
    Ok(Decoded {
        format_version: format.version(),
        secrets: format.read_function(document)?,
    })
}

pub fn write_host(secrets: &HostSecrets) -> Result<String, SecretsError> {
    current().write_host(secrets)
}

pub fn write_function(secrets: &[Secret]) -> Result<String, SecretsError> {
    current().write_function(secrets)
}

/// Parse `json` and pick the handler for its declared version.
fn detect(json: &str) -> Result<(&'static dyn SecretsFormat, Map<String, Value>), SecretsError> {
    let document = match serde_json::from_str::<Value>(json)? {
        Value::Object(map) => map,
        _ => {
            return Err(SecretsError::Format(
                "secrets document must be a JSON object".into(),
            ))
        }
    };

    let version = match document.get(VERSION_PROPERTY) {
        None | Some(Value::Null) => 0,
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| SecretsError::Format(format!("invalid format version {v}")))?,
    };

    Ok((for_version(version)?, document))
}

/// String property `name` of `document`.
pub(crate) fn string_property(
    document: &Map<String, Value>,
    name: &str,
) -> Result<String, SecretsError> {
    match document.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(SecretsError::Format(format!(
            "missing or non-string property {name:?}"
        ))),
    }
}
