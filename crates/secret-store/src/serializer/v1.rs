//! Version 1: structured, named keys with encryption metadata.

use common::{HostSecrets, Secret, SecretsError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::SecretsFormat;

const VERSION: u32 = 1;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HostDocument<'a> {
    master_key: &'a Secret,
    function_keys: &'a [Secret],
    version: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HostDocumentOwned {
    master_key: Secret,
    #[serde(default)]
    function_keys: Vec<Secret>,
}

#[derive(Serialize)]
struct FunctionDocument<'a> {
    keys: &'a [Secret],
    version: u32,
}

#[derive(Deserialize)]
struct FunctionDocumentOwned {
    keys: Vec<Secret>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FormatV1;

impl SecretsFormat for FormatV1 {
    fn version(&self) -> u32 {
        VERSION
    }

    fn read_host(&self, document: Map<String, Value>) -> Result<HostSecrets, SecretsError> {
        let doc: HostDocumentOwned = serde_json::from_value(Value::Object(document))?;
        Ok(HostSecrets {
            master_key: doc.master_key,
            function_keys: doc.function_keys,
        })
    }

    fn read_function(&self, document: Map<String, Value>) -> Result<Vec<Secret>, SecretsError> {
        let doc: FunctionDocumentOwned = serde_json::from_value(Value::Object(document))?;
        Ok(doc.keys)
    }

    fn write_host(&self, secrets: &HostSecrets) -> Result<String, SecretsError> {
        Ok(serde_json::to_string_pretty(&HostDocument {
            master_key: &secrets.master_key,
            function_keys: &secrets.function_keys,
            version: VERSION,
        })?)
    }

    fn write_function(&self, secrets: &[Secret]) -> Result<String, SecretsError> {
        Ok(serde_json::to_string_pretty(&FunctionDocument {
            keys: secrets,
            version: VERSION,
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn writes_function_schema() {
        let json = FormatV1
            .write_function(&[Secret::encrypted("default", "blob", "default")])
            .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value,
            json!({
                "keys": [
                    {"name": "default", "value": "blob", "encrypted": true, "encryptionKeyId": "default"}
                ],
                "version": 1
            })
        );
    }

    #[test]
    fn writes_host_schema() {
        let host = HostSecrets {
            master_key: Secret::plaintext("master", "m"),
            function_keys: vec![Secret::plaintext("default", "f")],
        };
        let value: Value = serde_json::from_str(&FormatV1.write_host(&host).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "masterKey": {"name": "master", "value": "m", "encrypted": false, "encryptionKeyId": null},
                "functionKeys": [
                    {"name": "default", "value": "f", "encrypted": false, "encryptionKeyId": null}
                ],
                "version": 1
            })
        );
    }

    #[test]
    fn host_without_function_keys_reads_empty() {
        let host = FormatV1
            .read_host(object(json!({
                "masterKey": {"name": "master", "value": "m", "encrypted": false},
                "version": 1
            })))
            .unwrap();
        assert!(host.function_keys.is_empty());
        assert_eq!(host.master_key, Secret::plaintext("master", "m"));
    }

    #[test]
    fn missing_required_properties_rejected() {
        assert!(FormatV1.read_host(object(json!({"version": 1}))).is_err());
        assert!(FormatV1.read_function(object(json!({"version": 1}))).is_err());
        assert!(FormatV1
            .read_function(object(json!({"keys": "nope", "version": 1})))
            .is_err());
    }
}
