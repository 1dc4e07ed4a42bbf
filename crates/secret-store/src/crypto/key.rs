//! [`CryptographicKey`]: raw key material plus the id it was resolved under.

use std::fmt;

/// Raw AES key bytes and their key id.
///
/// Cloning copies the bytes, so a key handed out of the resolver never aliases
/// the cached copy. When this type is dropped, the buffer is overwritten with
/// zeroes to minimise the window during which key material lives in RAM.
#[derive(Clone)]
pub struct CryptographicKey {
    id: String,
    bytes: Box<[u8]>,
}

impl CryptographicKey {
    /// Build a key by copying `bytes`.
    pub fn new(id: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            id: id.into(),
            bytes: bytes.to_vec().into_boxed_slice(),
        }
    }

    /// Decode hex key material (either case).
    ///
    /// # Errors
    ///
    /// Returns the decoder error if `value` is not an even-length hex string.
    pub fn from_hex(id: impl Into<String>, value: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(value.trim())?;
        Ok(Self {
            id: id.into(),
            bytes: bytes.into_boxed_slice(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for CryptographicKey {
    fn drop(&mut self) {
        self.bytes.iter_mut().for_each(|b| *b = 0);
    }
}

impl fmt::Debug for CryptographicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material.
        f.debug_struct("CryptographicKey")
            .field("id", &self.id)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_hex_decodes_both_cases() {
        let upper = CryptographicKey::from_hex("k", "0F75CA46").unwrap();
        let lower = CryptographicKey::from_hex("k", "0f75ca46").unwrap();
        assert_eq!(upper.bytes(), &[0x0f, 0x75, 0xca, 0x46]);
        assert_eq!(upper.bytes(), lower.bytes());
        assert_eq!(upper.id(), "k");
    }

    #[test]
    fn from_hex_rejects_garbage() {
        assert!(CryptographicKey::from_hex("k", "xyz").is_err());
        assert!(CryptographicKey::from_hex("k", "abc").is_err());
    }

    #[test]
    fn clone_does_not_alias() {
        let key = CryptographicKey::new("k", &[1, 2, 3]);
        let copy = key.clone();
        assert_ne!(key.bytes().as_ptr(), copy.bytes().as_ptr());
        assert_eq!(key.bytes(), copy.bytes());
    }

    #[test]
    fn key_bytes_redacted_in_debug() {
        let key = CryptographicKey::new("k", &[0xAB; 16]);
        let out = format!("{key:?}");
        assert!(out.contains("REDACTED"));
        assert!(!out.contains("171"));
    }
}
