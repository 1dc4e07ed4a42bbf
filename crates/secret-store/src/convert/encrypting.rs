use std::sync::Arc;

use common::{Secret, SecretsError};

use super::{ConversionAction, KeyAccess, KeyValueConverter};
use crate::crypto::{decrypt_value, encrypt_value, CryptographicKey, EncryptionKeyResolver};

/// Converter for secrets encrypted at rest with AES-CBC.
#[derive(Debug, Clone)]
pub struct EncryptingConverter {
    resolver: Arc<EncryptionKeyResolver>,
    access: KeyAccess,
}

impl EncryptingConverter {
    pub fn new(resolver: Arc<EncryptionKeyResolver>, access: KeyAccess) -> Self {
        Self { resolver, access }
    }

    fn key_for(&self, key_id: Option<&str>) -> Result<CryptographicKey, SecretsError> {
        self.resolver.resolve(key_id)?.ok_or_else(|| {
            SecretsError::KeyResolution(key_id.unwrap_or("default").to_owned())
        })
    }
}

impl KeyValueConverter for EncryptingConverter {
    fn read_value(&self, secret: &Secret) -> Result<String, SecretsError> {
        self.access.check(ConversionAction::Read)?;

        let key_id = secret
            .encryption_key_id()
            .ok_or_else(|| SecretsError::MissingKeyId(secret.name().to_owned()))?;
        let key = self.key_for(Some(key_id))?;

        Ok(decrypt_value(secret.value(), key.bytes())?)
    }

    fn write_value(&self, secret: &Secret) -> Result<Secret, SecretsError> {
        self.access.check(ConversionAction::Write)?;

        let key = self.key_for(secret.encryption_key_id())?;
        let blob = encrypt_value(secret.value(), key.bytes())?;

        Ok(Secret::encrypted(secret.name(), blob, key.id()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::crypto::resolver::{DEFAULT_KEY_ID_VAR, LOCAL_KEY_VAR};
    use crate::crypto::{Hosting, KeyCache};

    const TEST_KEY: &str = "0F75CA46E7EBDD39E4CA6B074D1F9A5972B849A55F91A248";

    fn converter(vars: &[(&str, &str)], access: KeyAccess) -> EncryptingConverter {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let resolver = EncryptionKeyResolver::new(Arc::new(env), Hosting::Local, KeyCache::new());
        EncryptingConverter::new(Arc::new(resolver), access)
    }

    #[test]
    fn reads_written_key() {
        let vars = [("testkey", TEST_KEY)];
        let input = Secret::plaintext("Test", "Test secret value").with_key_id("testkey");

        let written = converter(&vars, KeyAccess::Write).write_value(&input).unwrap();
        assert!(written.is_encrypted());
        assert_eq!(written.name(), "Test");
        assert_eq!(written.encryption_key_id(), Some("testkey"));
        assert_ne!(written.value(), "Test secret value");

        let read = converter(&vars, KeyAccess::Read).read_value(&written).unwrap();
        assert_eq!(read, "Test secret value");
    }

    #[test]
    fn unspecified_key_id_uses_default_key() {
        let vars = [(DEFAULT_KEY_ID_VAR, "testkey"), ("testkey", TEST_KEY)];
        let written = converter(&vars, KeyAccess::Write)
            .write_value(&Secret::plaintext("Test", "Test secret value"))
            .unwrap();
        assert_eq!(written.encryption_key_id(), Some("testkey"));

        let read = converter(&vars, KeyAccess::Read).read_value(&written).unwrap();
        assert_eq!(read, "Test secret value");
    }

    #[test]
    fn local_default_key_records_default_id() {
        let vars = [(LOCAL_KEY_VAR, TEST_KEY)];
        let written = converter(&vars, KeyAccess::Write)
            .write_value(&Secret::plaintext("n", "v"))
            .unwrap();
        assert_eq!(written.encryption_key_id(), Some("default"));
        assert_eq!(
            converter(&vars, KeyAccess::Read).read_value(&written).unwrap(),
            "v"
        );
    }

    #[test]
    fn undecodable_default_key_fails_write() {
        let converter = converter(&[(LOCAL_KEY_VAR, "not-hex-key")], KeyAccess::Write);
        assert!(matches!(
            converter.write_value(&Secret::plaintext("n", "v")),
            Err(SecretsError::Cipher(_))
        ));
    }

    #[test]
    fn write_with_read_access_rejected() {
        let converter = converter(&[], KeyAccess::Read);
        assert!(matches!(
            converter.write_value(&Secret::plaintext("n", "v")),
            Err(SecretsError::Usage("write"))
        ));
    }

    #[test]
    fn read_with_write_access_rejected() {
        let converter = converter(&[], KeyAccess::Write);
        assert!(matches!(
            converter.read_value(&Secret::encrypted("n", "v", "k")),
            Err(SecretsError::Usage("read"))
        ));
    }

    #[test]
    fn missing_key_configuration_fails_write() {
        let converter = converter(&[], KeyAccess::Write);
        assert!(matches!(
            converter.write_value(&Secret::plaintext("n", "v")),
            Err(SecretsError::KeyResolution(_))
        ));
        assert!(matches!(
            converter.write_value(&Secret::plaintext("n", "v").with_key_id("INVALID")),
            Err(SecretsError::KeyResolution(id)) if id == "INVALID"
        ));
    }

    #[test]
    fn missing_key_fails_closed_on_read() {
        let converter = converter(&[], KeyAccess::Read);
        let secret = Secret::encrypted("n", "c29tZSBjaXBoZXJ0ZXh0", "missing-env-var");
        assert!(matches!(
            converter.read_value(&secret),
            Err(SecretsError::KeyResolution(id)) if id == "missing-env-var"
        ));
    }

    #[test]
    fn encrypted_secret_without_key_id_rejected() {
        let converter = converter(&[(LOCAL_KEY_VAR, TEST_KEY)], KeyAccess::Read);
        let secret: Secret = serde_json::from_str(
            r#"{"name":"n","value":"abc","encrypted":true,"encryptionKeyId":null}"#,
        )
        .unwrap();
        assert!(matches!(
            converter.read_value(&secret),
            Err(SecretsError::MissingKeyId(name)) if name == "n"
        ));
    }

    #[test]
    fn corrupt_blob_is_cipher_error() {
        let converter = converter(&[("testkey", TEST_KEY)], KeyAccess::Read);
        let secret = Secret::encrypted("n", "not base64!", "testkey");
        assert!(matches!(
            converter.read_value(&secret),
            Err(SecretsError::Cipher(_))
        ));
    }
}
