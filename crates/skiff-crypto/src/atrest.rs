//! AES-256-GCM encryption for objects at rest.
//!
//! Each stored object is sealed under the server's single long-lived file
//! encryption key with a fresh random 96-bit IV. The tag is kept detached so
//! the ciphertext on disk has exactly the plaintext's length; IV and tag live
//! in the object's metadata document.

use crate::{CryptoError, random};
use aes_gcm::{
    Aes256Gcm, Key,
    aead::{AeadInPlace, KeyInit},
};
use zeroize::Zeroizing;

/// A sealed object ready for persistence
pub struct SealedObject {
    /// Per-object random IV
    pub iv: [u8; 12],
    /// Ciphertext, same length as the plaintext
    pub ciphertext: Vec<u8>,
    /// Detached GCM authentication tag
    pub tag: [u8; 16],
}

/// At-rest cipher holding the file-encryption key.
///
/// The key never leaves this struct; it is generated from the OS CSPRNG at
/// construction and zeroised when the server shuts down.
pub struct ObjectCipher {
    cipher: Aes256Gcm,
}

impl ObjectCipher {
    /// Generate a cipher with a fresh random key
    pub fn generate() -> Result<Self, CryptoError> {
        let key = Zeroizing::new(random::random_32()?);
        Ok(Self::from_key(&key))
    }

    /// Build a cipher from an existing 32-byte key
    pub fn from_key(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Encrypt an object with a fresh IV, returning detached IV and tag
    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedObject, CryptoError> {
        let mut iv = [0u8; 12];
        random::fill_random(&mut iv)?;

        let mut buffer = plaintext.to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached((&iv).into(), &[], &mut buffer)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(SealedObject {
            iv,
            ciphertext: buffer,
            tag: tag.into(),
        })
    }

    /// Decrypt an object; fails if the tag does not verify
    pub fn open(
        &self,
        iv: &[u8; 12],
        ciphertext: &[u8],
        tag: &[u8; 16],
    ) -> Result<Vec<u8>, CryptoError> {
        let mut buffer = ciphertext.to_vec();
        self.cipher
            .decrypt_in_place_detached(iv.into(), &[], &mut buffer, tag.into())
            .map_err(|_| CryptoError::DecryptionFailed)?;
        Ok(buffer)
    }
}
