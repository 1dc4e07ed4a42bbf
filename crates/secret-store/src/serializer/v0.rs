//! Version 0: flat, unnamed, plaintext-only keys.
//!
//! Only one host function key and one function key are representable; each is
//! read back as an unnamed secret. Kept for reading legacy files.

use common::{HostSecrets, Secret, SecretsError};
use serde_json::{json, Map, Value};

use super::{string_property, SecretsFormat};

const MASTER_KEY_PROPERTY: &str = "masterKey";
const HOST_FUNCTION_KEY_PROPERTY: &str = "functionKey";
const FUNCTION_KEY_PROPERTY: &str = "key";

#[derive(Debug, Clone, Copy, Default)]
pub struct FormatV0;

impl SecretsFormat for FormatV0 {
    fn version(&self) -> u32 {
        0
    }

    fn read_host(&self, document: Map<String, Value>) -> Result<HostSecrets, SecretsError> {
        let master = string_property(&document, MASTER_KEY_PROPERTY)?;
        let function = string_property(&document, HOST_FUNCTION_KEY_PROPERTY)?;
        Ok(HostSecrets {
            master_key: Secret::plaintext("", master),
            function_keys: vec![Secret::plaintext("", function)],
        })
    }

    fn read_function(&self, document: Map<String, Value>) -> Result<Vec<Secret>, SecretsError> {
        let key = string_property(&document, FUNCTION_KEY_PROPERTY)?;
        Ok(vec![Secret::plaintext("", key)])
    }

    fn write_host(&self, secrets: &HostSecrets) -> Result<String, SecretsError> {
        let master = representable(&secrets.master_key)?;
        let function = first_unnamed(&secrets.function_keys)?;
        Ok(serde_json::to_string_pretty(&json!({
            MASTER_KEY_PROPERTY: master,
            HOST_FUNCTION_KEY_PROPERTY: function,
        }))?)
    }

    fn write_function(&self, secrets: &[Secret]) -> Result<String, SecretsError> {
        let key = first_unnamed(secrets)?;
        Ok(serde_json::to_string_pretty(&json!({ FUNCTION_KEY_PROPERTY: key }))?)
    }
}

fn first_unnamed(secrets: &[Secret]) -> Result<&str, SecretsError> {
    let secret = secrets
        .iter()
        .find(|s| s.name().is_empty())
        .ok_or_else(|| SecretsError::Format("version 0 requires an unnamed key".into()))?;
    representable(secret)
}

fn representable(secret: &Secret) -> Result<&str, SecretsError> {
    if secret.is_encrypted() {
        return Err(SecretsError::Format(
            "version 0 cannot represent encrypted keys".into(),
        ));
    }
    Ok(secret.value())
}
