//! Encryption key resolution from environment variables.
//!
//! All key material is hex encoded, for the default key and for named keys
//! alike.
//!
//! - The default key is selected by any of the aliases in [`is_default_key_id`].
//!   [`DEFAULT_KEY_ID_VAR`] may point it at another variable; otherwise it is
//!   read from [`HOSTED_KEY_VAR`] or [`LOCAL_KEY_VAR`] depending on [`Hosting`].
//! - Any other key id is the name of the variable holding the key.

use std::collections::HashMap;
use std::sync::Arc;

use common::SecretsError;
use tracing::warn;

use super::cipher::{CipherError, KEY_LENS};
use super::key::CryptographicKey;
use super::key_cache::KeyCache;

/// Id reported for keys resolved through the default hosted/local variables.
pub const DEFAULT_KEY_ID: &str = "default";

/// Names the variable that holds the default key, overriding the
/// hosted/local lookup.
pub const DEFAULT_KEY_ID_VAR: &str = "SECRET_STORE_ENCRYPTION_KEY_ID";

/// Default key in a hosted environment.
pub const HOSTED_KEY_VAR: &str = "SECRET_STORE_HOST_ENCRYPTION_KEY";

/// Default key in a local/dev environment.
pub const LOCAL_KEY_VAR: &str = "SECRET_STORE_LOCAL_ENCRYPTION_KEY";

/// Source of environment variables.
#[cfg_attr(test, mockall::automock)]
pub trait Environment: Send + Sync {
    /// Value of `name`, or `None` when unset.
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Where the host runs, which decides the default-key variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hosting {
    Hosted,
    Local,
}

impl Hosting {
    pub fn from_flag(hosted: bool) -> Self {
        if hosted {
            Hosting::Hosted
        } else {
            Hosting::Local
        }
    }
}

/// `true` if `key_id` selects the default key: absent, empty, `"default"`,
/// or the hosted default-key variable name (case-insensitive).
pub fn is_default_key_id(key_id: Option<&str>) -> bool {
    match key_id {
        None => true,
        Some(id) => {
            id.is_empty()
                || id.eq_ignore_ascii_case(DEFAULT_KEY_ID)
                || id.eq_ignore_ascii_case(HOSTED_KEY_VAR)
        }
    }
}

/// Locates key material for a key id.
///
/// Resolved keys are memoised in the injected [`KeyCache`], so every call in
/// the life of the resolver sees identical bytes for a given id.
pub struct EncryptionKeyResolver {
    env: Arc<dyn Environment>,
    hosting: Hosting,
    cache: KeyCache,
}

impl EncryptionKeyResolver {
    pub fn new(env: Arc<dyn Environment>, hosting: Hosting, cache: KeyCache) -> Self {
        Self {
            env,
            hosting,
            cache,
        }
    }

    /// Resolve `key_id` to key material.
    ///
    /// Returns `Ok(None)` when no key is configured for `key_id`; whether that
    /// is fatal is up to the caller.
    ///
    /// # Errors
    ///
    /// A configured key that cannot be used is an error, never `None`:
    /// - [`SecretsError::KeyResolution`] when [`DEFAULT_KEY_ID_VAR`] names a
    ///   variable that is not set.
    /// - [`SecretsError::Cipher`] when the material is not hex or not a valid
    ///   AES key length.
    pub fn resolve(&self, key_id: Option<&str>) -> Result<Option<CryptographicKey>, SecretsError> {
        match key_id {
            Some(id) if !is_default_key_id(Some(id)) => self.named_key(id),
            _ => self.default_key(),
        }
    }

    pub fn hosting(&self) -> Hosting {
        self.hosting
    }

    fn default_key(&self) -> Result<Option<CryptographicKey>, SecretsError> {
        if let Some(id) = self.var(DEFAULT_KEY_ID_VAR) {
            return match self.named_key(&id)? {
                Some(key) => Ok(Some(key)),
                None => Err(SecretsError::KeyResolution(id)),
            };
        }

        let var = match self.hosting {
            Hosting::Hosted => HOSTED_KEY_VAR,
            Hosting::Local => LOCAL_KEY_VAR,
        };
        self.cache
            .get_or_resolve(DEFAULT_KEY_ID, || self.load_key(DEFAULT_KEY_ID, var))
    }

    fn named_key(&self, key_id: &str) -> Result<Option<CryptographicKey>, SecretsError> {
        self.cache
            .get_or_resolve(key_id, || self.load_key(key_id, key_id))
    }

    fn load_key(&self, key_id: &str, var: &str) -> Result<Option<CryptographicKey>, SecretsError> {
        let Some(value) = self.var(var) else {
            return Ok(None);
        };

        let key = CryptographicKey::from_hex(key_id, &value).map_err(|e| {
            warn!(key_id = %key_id, error = %e, "key material is not valid hex");
            SecretsError::Cipher(format!("key material for {key_id:?} is not valid hex: {e}"))
        })?;
        if !KEY_LENS.contains(&key.bytes().len()) {
            warn!(key_id = %key_id, len = key.bytes().len(), "key material has an invalid length");
            return Err(CipherError::InvalidKeyLength(key.bytes().len()).into());
        }
        Ok(Some(key))
    }

    /// Non-blank value of `name`.
    fn var(&self, name: &str) -> Option<String> {
        self.env.var(name).filter(|v| !v.trim().is_empty())
    }
}

impl std::fmt::Debug for EncryptionKeyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKeyResolver")
            .field("hosting", &self.hosting)
            .field("cached_keys", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0F75CA46E7EBDD39E4CA6B074D1F9A5972B849A55F91A248";

    fn resolver_with(vars: &[(&str, &str)], hosting: Hosting) -> EncryptionKeyResolver {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EncryptionKeyResolver::new(Arc::new(env), hosting, KeyCache::new())
    }

    fn expected_bytes() -> Vec<u8> {
        hex::decode(TEST_KEY).unwrap()
    }

    #[test]
    fn default_aliases() {
        assert!(is_default_key_id(None));
        assert!(is_default_key_id(Some("")));
        assert!(is_default_key_id(Some("default")));
        assert!(is_default_key_id(Some("DEFAULT")));
        assert!(is_default_key_id(Some(HOSTED_KEY_VAR)));
        assert!(is_default_key_id(Some(&HOSTED_KEY_VAR.to_lowercase())));
        assert!(!is_default_key_id(Some("testkey")));
    }

    #[test]
    fn hosted_default_key_from_environment() {
        let resolver = resolver_with(&[(HOSTED_KEY_VAR, TEST_KEY)], Hosting::Hosted);
        let key = resolver.resolve(None).unwrap().unwrap();
        assert_eq!(key.id(), DEFAULT_KEY_ID);
        assert_eq!(key.bytes(), expected_bytes().as_slice());
    }

    #[test]
    fn local_default_key_from_environment() {
        let resolver = resolver_with(&[(LOCAL_KEY_VAR, TEST_KEY)], Hosting::Local);
        for id in [None, Some(""), Some("default")] {
            let key = resolver.resolve(id).unwrap().unwrap();
            assert_eq!(key.id(), DEFAULT_KEY_ID);
            assert_eq!(key.bytes(), expected_bytes().as_slice());
        }
    }

    #[test]
    fn hosting_selects_variable() {
        let resolver = resolver_with(&[(LOCAL_KEY_VAR, TEST_KEY)], Hosting::Hosted);
        assert!(resolver.resolve(None).unwrap().is_none());
        let resolver = resolver_with(&[(HOSTED_KEY_VAR, TEST_KEY)], Hosting::Local);
        assert!(resolver.resolve(None).unwrap().is_none());
    }

    #[test]
    fn override_names_default_key() {
        let resolver = resolver_with(
            &[(DEFAULT_KEY_ID_VAR, "testkey"), ("testkey", TEST_KEY)],
            Hosting::Local,
        );
        let key = resolver.resolve(None).unwrap().unwrap();
        assert_eq!(key.id(), "testkey");
        assert_eq!(key.bytes(), expected_bytes().as_slice());
    }

    #[test]
    fn named_key_from_environment() {
        let resolver = resolver_with(&[("testkey", TEST_KEY)], Hosting::Local);
        let key = resolver.resolve(Some("testkey")).unwrap().unwrap();
        assert_eq!(key.id(), "testkey");
        assert_eq!(key.bytes(), expected_bytes().as_slice());
    }

    #[test]
    fn missing_key_is_none() {
        let resolver = resolver_with(&[], Hosting::Local);
        assert!(resolver.resolve(None).unwrap().is_none());
        assert!(resolver.resolve(Some("missing-env-var")).unwrap().is_none());
    }

    #[test]
    fn blank_variable_counts_as_unset() {
        let resolver = resolver_with(&[(LOCAL_KEY_VAR, "  ")], Hosting::Local);
        assert!(resolver.resolve(None).unwrap().is_none());
    }

    #[test]
    fn invalid_hex_is_an_error() {
        let resolver = resolver_with(
            &[("bad", "not-hex"), (LOCAL_KEY_VAR, "not-hex-key")],
            Hosting::Local,
        );
        assert!(matches!(
            resolver.resolve(Some("bad")),
            Err(SecretsError::Cipher(_))
        ));
        assert!(matches!(resolver.resolve(None), Err(SecretsError::Cipher(_))));
    }

    #[test]
    fn wrong_key_length_is_an_error() {
        let resolver = resolver_with(&[(LOCAL_KEY_VAR, "00112233")], Hosting::Local);
        assert!(matches!(resolver.resolve(None), Err(SecretsError::Cipher(_))));
    }

    #[test]
    fn override_naming_unset_variable_is_an_error() {
        let resolver = resolver_with(
            &[(DEFAULT_KEY_ID_VAR, "nope"), (LOCAL_KEY_VAR, TEST_KEY)],
            Hosting::Local,
        );
        assert!(matches!(
            resolver.resolve(None),
            Err(SecretsError::KeyResolution(id)) if id == "nope"
        ));
    }

    #[test]
    fn keys_are_read_once_per_id() {
        let mut env = MockEnvironment::new();
        env.expect_var()
            .withf(|name| name == "testkey")
            .times(1)
            .returning(|_| Some(TEST_KEY.to_string()));
        let resolver = EncryptionKeyResolver::new(Arc::new(env), Hosting::Local, KeyCache::new());

        let first = resolver.resolve(Some("testkey")).unwrap().unwrap();
        let second = resolver.resolve(Some("testkey")).unwrap().unwrap();
        assert_eq!(first.bytes(), second.bytes());
    }

    #[test]
    fn default_key_is_cached() {
        let mut env = MockEnvironment::new();
        env.expect_var()
            .withf(|name| name == DEFAULT_KEY_ID_VAR)
            .returning(|_| None);
        env.expect_var()
            .withf(|name| name == LOCAL_KEY_VAR)
            .times(1)
            .returning(|_| Some(TEST_KEY.to_string()));
        let resolver = EncryptionKeyResolver::new(Arc::new(env), Hosting::Local, KeyCache::new());

        assert!(resolver.resolve(None).unwrap().is_some());
        assert!(resolver.resolve(Some("default")).unwrap().is_some());
    }
}
