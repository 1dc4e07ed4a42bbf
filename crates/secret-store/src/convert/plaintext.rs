use common::{Secret, SecretsError};

use super::{ConversionAction, KeyAccess, KeyValueConverter};

/// Identity converter for secrets stored in plaintext.
#[derive(Debug, Clone, Copy)]
pub struct PlaintextConverter {
    access: KeyAccess,
}

impl PlaintextConverter {
    pub fn new(access: KeyAccess) -> Self {
        Self { access }
    }
}

impl KeyValueConverter for PlaintextConverter {
    fn read_value(&self, secret: &Secret) -> Result<String, SecretsError> {
        self.access.check(ConversionAction::Read)?;
        Ok(secret.value().to_owned())
    }

    fn write_value(&self, secret: &Secret) -> Result<Secret, SecretsError> {
        self.access.check(ConversionAction::Write)?;
        Ok(Secret::plaintext(secret.name(), secret.value()))
    }
}
