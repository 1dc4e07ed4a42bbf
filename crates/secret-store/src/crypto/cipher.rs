//! AES-CBC encryption and decryption of individual secret values.
//!
//! **Algorithm choice:** AES in CBC mode with PKCS#7 padding and a fresh random
//! IV per call. This matches the at-rest format of existing secrets files, so
//! it has to stay readable and writable byte-for-byte.
//!
//! **No authentication tag.** A blob that was tampered with may decrypt to
//! garbage instead of failing. Integrity of the secrets directory relies on
//! file-system permissions.

use aes::{Aes128, Aes192, Aes256};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{
    block_padding::Pkcs7, BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit,
};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

use common::SecretsError;

/// AES block length; also the IV length.
pub const BLOCK_LEN: usize = 16;

/// Accepted key lengths in bytes (AES-128, AES-192, AES-256).
pub const KEY_LENS: [usize; 3] = [16, 24, 32];

const UTF8_BOM: char = '\u{feff}';

/// Errors produced by the cipher layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    /// The key is not an AES key length.
    #[error("invalid key length: expected 16, 24 or 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// The blob is not valid base64.
    #[error("encrypted value is not valid base64")]
    InvalidEncoding,

    /// The decoded blob is too short or not block aligned after the IV.
    #[error("encrypted value has invalid IV/ciphertext framing")]
    InvalidFraming,

    /// Padding check failed: wrong key or corrupted data.
    #[error("decryption failed")]
    DecryptionFailure,

    /// The decrypted bytes are not UTF-8.
    #[error("decrypted value is not valid UTF-8")]
    InvalidUtf8,
}

impl From<CipherError> for SecretsError {
    fn from(e: CipherError) -> Self {
        SecretsError::Cipher(e.to_string())
    }
}

/// Encrypt a UTF-8 string.
///
/// Output is `base64(IV || AES-CBC(plaintext, key, IV))` using the standard
/// padded base64 alphabet.
///
/// # Errors
///
/// Returns [`CipherError::InvalidKeyLength`] if `key` is not 16, 24 or 32 bytes.
pub fn encrypt_value(plaintext: &str, key: &[u8]) -> Result<String, CipherError> {
    let mut iv = [0u8; BLOCK_LEN];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = match key.len() {
        16 => encrypt_with::<Aes128>(key, &iv, plaintext.as_bytes())?,
        24 => encrypt_with::<Aes192>(key, &iv, plaintext.as_bytes())?,
        32 => encrypt_with::<Aes256>(key, &iv, plaintext.as_bytes())?,
        n => return Err(CipherError::InvalidKeyLength(n)),
    };

    let mut blob = Vec::with_capacity(BLOCK_LEN + ciphertext.len());
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(blob))
}

/// Decrypt a blob produced by [`encrypt_value`].
///
/// # Errors
///
/// Returns [`CipherError::InvalidKeyLength`] for a bad key,
/// [`CipherError::InvalidEncoding`] / [`CipherError::InvalidFraming`] for a
/// malformed blob, and [`CipherError::DecryptionFailure`] when the padding
/// does not verify (usually the wrong key).
pub fn decrypt_value(blob: &str, key: &[u8]) -> Result<String, CipherError> {
    if !KEY_LENS.contains(&key.len()) {
        return Err(CipherError::InvalidKeyLength(key.len()));
    }

    let data = STANDARD
        .decode(blob.trim())
        .map_err(|_| CipherError::InvalidEncoding)?;

    // IV plus at least one padded block.
    if data.len() < 2 * BLOCK_LEN || data.len() % BLOCK_LEN != 0 {
        return Err(CipherError::InvalidFraming);
    }
    let (iv, ciphertext) = data.split_at(BLOCK_LEN);

    let plaintext = match key.len() {
        16 => decrypt_with::<Aes128>(key, iv, ciphertext)?,
        24 => decrypt_with::<Aes192>(key, iv, ciphertext)?,
        _ => decrypt_with::<Aes256>(key, iv, ciphertext)?,
    };

    let text = String::from_utf8(plaintext).map_err(|_| CipherError::InvalidUtf8)?;
    Ok(match text.strip_prefix(UTF8_BOM) {
        Some(stripped) => stripped.to_owned(),
        None => text,
    })
}

fn encrypt_with<C>(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CipherError>
where
    C: BlockEncryptMut + BlockCipher + KeyInit,
{
    let encryptor = cbc::Encryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| CipherError::InvalidKeyLength(key.len()))?;
    Ok(encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

fn decrypt_with<C>(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CipherError>
where
    C: BlockDecryptMut + BlockCipher + KeyInit,
{
    let decryptor = cbc::Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| CipherError::InvalidKeyLength(key.len()))?;
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CipherError::DecryptionFailure)
}
