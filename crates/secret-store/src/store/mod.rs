//! [`SecretStore`]: the secrets directory, its generated keys, and the cache of
//! resolved plaintext values.
//!
//! # Layout
//!
//! ```text
//! <secrets_path>/host.json          host master key + host function keys
//! <secrets_path>/<function>.json    keys of one function (lower-cased name)
//! ```
//!
//! # Lifecycle per scope
//!
//! Each scope (the host, or one function) starts unloaded. The first access
//! reads its file, or generates and persists fresh keys when there is none,
//! then decrypts and caches the plaintext. A change notification for the file
//! drops the cache entry; the next access reloads from disk.
//!
//! # Failure policy
//!
//! Load, generate and save failures propagate to the caller. There is no
//! fallback to an empty key set. Orphan purging is best-effort and only logs.

pub mod cache;
pub mod watcher;

pub use cache::ScopeSlot;
pub use watcher::{ChangeKind, SecretsChange, SecretsWatcher};

use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::secret::{DEFAULT_KEY_NAME, HOST_FUNCTION_KEY_NAME, MASTER_KEY_NAME};
use common::{FunctionKeys, HostSecrets, HostSecretsInfo, Secret, SecretsError};
use rand::{rngs::OsRng, RngCore};
use tracing::{debug, error, info, warn};

use crate::convert::ConverterFactory;
use crate::serializer;

/// File name of the host secrets document.
pub const HOST_SECRETS_FILE: &str = "host.json";

/// Extension of every secrets file.
pub const SECRETS_FILE_EXTENSION: &str = "json";

const HOST_SECRETS_STEM: &str = "host";

/// Random bytes drawn per generated key.
const GENERATED_SECRET_BYTES: usize = 40;

/// Generate a new key value: 40 random bytes, base64 encoded, with every `+`
/// replaced by `a` so the value can sit in a URL path unescaped.
pub fn generate_secret_value() -> String {
    let mut data = [0u8; GENERATED_SECRET_BYTES];
    OsRng.fill_bytes(&mut data);
    let value = STANDARD.encode(data).replace('+', "a");
    data.iter_mut().for_each(|b| *b = 0);
    value
}

/// File-backed store of host and function keys.
///
/// Cheap to clone; clones share the directory, converters and cache.
#[derive(Clone)]
pub struct SecretStore {
    inner: Arc<Inner>,
}

struct Inner {
    secrets_path: PathBuf,
    converters: ConverterFactory,
    host: Arc<ScopeSlot<HostSecretsInfo>>,
    functions: Mutex<HashMap<String, Arc<ScopeSlot<FunctionKeys>>>>,
}

impl SecretStore {
    /// Open the store over `secrets_path`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SecretsError::Io`] if the directory cannot be created.
    pub async fn open(
        secrets_path: impl Into<PathBuf>,
        converters: ConverterFactory,
    ) -> Result<Self, SecretsError> {
        let secrets_path = secrets_path.into();
        tokio::fs::create_dir_all(&secrets_path)
            .await
            .map_err(|e| SecretsError::io(&secrets_path, e))?;

        info!(
            path = %secrets_path.display(),
            encryption_supported = converters.encryption_supported(),
            "secret store opened"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                secrets_path,
                converters,
                host: Arc::new(ScopeSlot::new()),
                functions: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn secrets_path(&self) -> &Path {
        &self.inner.secrets_path
    }

    /// Whether newly generated keys are encrypted at rest.
    pub fn encryption_supported(&self) -> bool {
        self.inner.converters.encryption_supported()
    }

    /// Master key and host function keys, generating them on first use.
    ///
    /// # Errors
    ///
    /// Propagates I/O, format, key resolution and cipher failures.
    pub async fn host_secrets(&self) -> Result<Arc<HostSecretsInfo>, SecretsError> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .host
            .get_or_load(move || async move { inner.load_host().await })
            .await
    }

    /// Keys of `function_name` (case-insensitive), generating a default key on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns [`SecretsError::InvalidFunctionName`] for names that cannot map
    /// to a secrets file, and propagates I/O, format, key resolution and
    /// cipher failures.
    pub async fn function_secrets(
        &self,
        function_name: &str,
    ) -> Result<Arc<FunctionKeys>, SecretsError> {
        let name = normalize_function_name(function_name)?;
        let slot = self.inner.function_slot(&name);
        let inner = Arc::clone(&self.inner);
        slot.get_or_load(move || async move { inner.load_function(&name).await })
            .await
    }

    /// Drop the cache entry backed by `path`.
    ///
    /// `host.json` clears the host secrets; any other `*.json` file clears the
    /// function named by its base name. Other paths are ignored.
    pub async fn invalidate(&self, path: &Path) {
        if !is_secrets_file_name(path) {
            return;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return;
        };

        if file_name.eq_ignore_ascii_case(HOST_SECRETS_FILE) {
            self.inner.host.invalidate().await;
            debug!("host secrets cache invalidated");
            return;
        }

        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            return;
        };
        let name = stem.to_lowercase();
        let slot = self.inner.existing_function_slot(&name);
        if let Some(slot) = slot {
            slot.invalidate().await;
            debug!(function = %name, "function secrets cache invalidated");
        }
    }

    /// Start watching the secrets directory; changes invalidate the cache until
    /// the returned handle is dropped. Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SecretsError::Watch`] if the watcher cannot be started.
    pub fn watch(&self) -> Result<SecretsWatcher, SecretsError> {
        watcher::spawn(self.clone())
    }

    /// Delete secrets files of functions that no longer have a directory under
    /// `script_root`. The host secrets file is never touched.
    ///
    /// Best-effort: individual deletion failures are logged and skipped, and
    /// an enumeration failure aborts the purge with a log entry. Never fails.
    pub async fn purge_orphans(&self, script_root: &Path) {
        match self.try_purge_orphans(script_root).await {
            Ok(0) => debug!("no orphaned secret files"),
            Ok(deleted) => info!(deleted, "purged orphaned secret files"),
            Err(e) => error!(
                error = %e,
                code = e.code(),
                "an error occurred while purging secret files"
            ),
        }
    }

    async fn try_purge_orphans(&self, script_root: &Path) -> Result<usize, SecretsError> {
        let Some(functions) = function_directories(script_root).await? else {
            return Ok(0);
        };

        let secrets_path = self.secrets_path();
        let mut entries = match tokio::fs::read_dir(secrets_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(SecretsError::io(secrets_path, e)),
        };

        let mut deleted = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SecretsError::io(secrets_path, e))?
        {
            let path = entry.path();
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if !is_file || !is_secrets_file_name(&path) {
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let name = stem.to_lowercase();
            if name == HOST_SECRETS_STEM || functions.contains(&name) {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    deleted += 1;
                    debug!(path = %path.display(), "deleted orphaned secret file");
                    self.inner.forget_function(&name).await;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to delete orphaned secret file");
                }
            }
        }

        Ok(deleted)
    }

    #[cfg(test)]
    pub(crate) fn cached_function(&self, name: &str) -> Option<Arc<FunctionKeys>> {
        self.inner
            .existing_function_slot(&name.to_lowercase())
            .and_then(|slot| slot.cached())
    }
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStore")
            .field("secrets_path", &self.inner.secrets_path)
            .field("encryption_supported", &self.encryption_supported())
            .finish()
    }
}

impl Inner {
    fn host_path(&self) -> PathBuf {
        self.secrets_path.join(HOST_SECRETS_FILE)
    }

    fn function_path(&self, name: &str) -> PathBuf {
        self.secrets_path
            .join(format!("{name}.{SECRETS_FILE_EXTENSION}"))
    }

    fn function_slot(&self, name: &str) -> Arc<ScopeSlot<FunctionKeys>> {
        let mut map = self.functions.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(name.to_owned()).or_default())
    }

    fn existing_function_slot(&self, name: &str) -> Option<Arc<ScopeSlot<FunctionKeys>>> {
        self.functions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Drop the slot of a function whose secrets file is gone. Waits for an
    /// in-flight load of that slot to finish.
    async fn forget_function(&self, name: &str) {
        let slot = self
            .functions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        if let Some(slot) = slot {
            slot.invalidate().await;
        }
    }

    async fn load_host(&self) -> Result<HostSecretsInfo, SecretsError> {
        let path = self.host_path();
        let secrets = match read_if_exists(&path).await? {
            Some(json) => {
                let decoded = serializer::read_host(&json)?;
                if decoded.is_outdated() {
                    upgrade(&path, decoded.format_version, serializer::write_host(&decoded.secrets))
                        .await;
                }
                decoded.secrets
            }
            None => {
                let secrets = HostSecrets {
                    master_key: self.generate(MASTER_KEY_NAME)?,
                    function_keys: vec![self.generate(HOST_FUNCTION_KEY_NAME)?],
                };
                write_file(&path, &serializer::write_host(&secrets)?).await?;
                info!(
                    encrypted = secrets.master_key.is_encrypted(),
                    "generated host secrets"
                );
                secrets
            }
        };

        Ok(HostSecretsInfo {
            master_key: self.converters.read(&secrets.master_key)?,
            function_keys: self.resolve_keys(&secrets.function_keys)?,
        })
    }

    async fn load_function(&self, name: &str) -> Result<FunctionKeys, SecretsError> {
        let path = self.function_path(name);
        let secrets = match read_if_exists(&path).await? {
            Some(json) => {
                let decoded = serializer::read_function(&json)?;
                if decoded.is_outdated() {
                    upgrade(
                        &path,
                        decoded.format_version,
                        serializer::write_function(&decoded.secrets),
                    )
                    .await;
                }
                decoded.secrets
            }
            None => {
                let secrets = vec![self.generate(DEFAULT_KEY_NAME)?];
                write_file(&path, &serializer::write_function(&secrets)?).await?;
                info!(
                    function = %name,
                    encrypted = secrets[0].is_encrypted(),
                    "generated function secrets"
                );
                secrets
            }
        };

        self.resolve_keys(&secrets)
    }

    /// Decrypt `secrets` into a name → value map. Names must be unique
    /// ignoring case.
    fn resolve_keys(&self, secrets: &[Secret]) -> Result<FunctionKeys, SecretsError> {
        let mut seen = HashSet::with_capacity(secrets.len());
        let mut keys = FunctionKeys::with_capacity(secrets.len());
        for secret in secrets {
            if !seen.insert(secret.name().to_lowercase()) {
                return Err(SecretsError::Format(format!(
                    "duplicate key name {:?}",
                    secret.name()
                )));
            }
            keys.insert(secret.name().to_owned(), self.converters.read(secret)?);
        }
        Ok(keys)
    }

    fn generate(&self, name: &str) -> Result<Secret, SecretsError> {
        self.converters
            .write(&Secret::plaintext(name, generate_secret_value()))
    }
}

/// Lower-cased function name, or an error if it cannot name a secrets file.
fn normalize_function_name(function_name: &str) -> Result<String, SecretsError> {
    let name = function_name.to_lowercase();
    let invalid = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name == HOST_SECRETS_STEM
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(SecretsError::InvalidFunctionName(function_name.to_owned()));
    }
    Ok(name)
}

fn is_secrets_file_name(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(SECRETS_FILE_EXTENSION))
}

/// Lower-cased names of the directories directly under `script_root`,
/// including symlinks to directories, or `None` if `script_root` does not
/// exist.
async fn function_directories(script_root: &Path) -> Result<Option<HashSet<String>>, SecretsError> {
    let mut entries = match tokio::fs::read_dir(script_root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SecretsError::io(script_root, e)),
    };

    let mut names = HashSet::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| SecretsError::io(script_root, e))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| SecretsError::io(entry.path(), e))?;
        let is_dir = if file_type.is_symlink() {
            // A dangling link is not a function directory.
            tokio::fs::metadata(entry.path())
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false)
        } else {
            file_type.is_dir()
        };
        if is_dir {
            names.insert(entry.file_name().to_string_lossy().to_lowercase());
        }
    }
    Ok(Some(names))
}

async fn read_if_exists(path: &Path) -> Result<Option<String>, SecretsError> {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => Ok(Some(json)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SecretsError::io(path, e)),
    }
}

async fn write_file(path: &Path, contents: &str) -> Result<(), SecretsError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| SecretsError::io(path, e))
}

/// Rewrite an outdated document in the current format. A failure keeps the
/// old file and is only logged; the loaded secrets are still served.
async fn upgrade(path: &Path, from_version: u32, json: Result<String, SecretsError>) {
    let result = match json {
        Ok(json) => write_file(path, &json).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => info!(
            path = %path.display(),
            from_version,
            to_version = serializer::current().version(),
            "upgraded secrets file format"
        ),
        Err(e) => warn!(
            path = %path.display(),
            from_version,
            error = %e,
            "failed to upgrade secrets file format; keeping the old file"
        ),
    }
}
