//! Key material and the value cipher.
//!
//! This module is intentionally free of file-system and serialisation
//! dependencies. It provides key resolution and the low-level encrypt/decrypt
//! operations used by the converter layer.
//!
//! # Ciphertext format
//!
//! ```text
//! base64(IV || AES-CBC-PKCS7(utf8(plaintext), key, IV))
//! ```
//!
//! The IV is one AES block (16 bytes), freshly drawn from the OS CSPRNG for
//! every encryption.

pub mod cipher;
pub mod key;
pub mod key_cache;
pub mod resolver;

pub use cipher::{decrypt_value, encrypt_value, CipherError};
pub use key::CryptographicKey;
pub use key_cache::KeyCache;
pub use resolver::{EncryptionKeyResolver, Environment, Hosting, ProcessEnvironment};
