//! XChaCha20-Poly1305 AEAD encryption for wire metadata.

use crate::CryptoError;
use chacha20poly1305::{
    XChaCha20Poly1305,
    aead::{Aead, KeyInit, Payload},
};

/// AEAD cipher bound to a 32-byte session key
pub struct AeadCipher {
    cipher: XChaCha20Poly1305,
}

impl AeadCipher {
    /// Create a new AEAD cipher with the given key
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(key.into()),
        }
    }

    /// Encrypt plaintext with the given nonce and associated data.
    ///
    /// Returns ciphertext with the 16-byte Poly1305 tag appended.
    pub fn encrypt(
        &self,
        nonce: &[u8; 24],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let payload = Payload {
            msg: plaintext,
            aad,
        };

        self.cipher
            .encrypt(nonce.into(), payload)
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Decrypt ciphertext (with appended tag) under the given nonce and
    /// associated data.
    pub fn decrypt(
        &self,
        nonce: &[u8; 24],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let payload = Payload {
            msg: ciphertext,
            aad,
        };

        self.cipher
            .decrypt(nonce.into(), payload)
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Authenticate associated data only: seal an empty message, returning
    /// just the 16-byte tag.
    pub fn seal_tag(&self, nonce: &[u8; 24], aad: &[u8]) -> Result<[u8; 16], CryptoError> {
        let sealed = self.encrypt(nonce, &[], aad)?;
        let mut tag = [0u8; 16];
        tag.copy_from_slice(&sealed);
        Ok(tag)
    }

    /// Verify a tag produced by [`AeadCipher::seal_tag`].
    pub fn open_tag(&self, nonce: &[u8; 24], aad: &[u8], tag: &[u8; 16]) -> bool {
        self.decrypt(nonce, tag, aad).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aead_roundtrip() {
        let key = [0x42u8; 32];
        let nonce = [0x07u8; 24];
        let plaintext = b"hello.txt";
        let aad = b"filename";

        let cipher = AeadCipher::new(&key);

        let ciphertext = cipher.encrypt(&nonce, plaintext, aad).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len() + 16);

        let decrypted = cipher.decrypt(&nonce, &ciphertext, aad).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_aead_tamper_detection() {
        let key = [0x42u8; 32];
        let nonce = [0x00u8; 24];
        let cipher = AeadCipher::new(&key);

        let mut ciphertext = cipher.encrypt(&nonce, b"payload", b"").unwrap();
        ciphertext[0] ^= 0xFF;

        assert!(cipher.decrypt(&nonce, &ciphertext, b"").is_err());
    }

    #[test]
    fn test_aead_wrong_aad_rejected() {
        let key = [0x11u8; 32];
        let nonce = [0x22u8; 24];
        let cipher = AeadCipher::new(&key);

        let ciphertext = cipher.encrypt(&nonce, b"data", b"size").unwrap();
        assert!(cipher.decrypt(&nonce, &ciphertext, b"recipient").is_err());
    }

    #[test]
    fn test_tag_only_seal() {
        let key = [0x33u8; 32];
        let nonce = [0x44u8; 24];
        let cipher = AeadCipher::new(&key);

        let tag = cipher.seal_tag(&nonce, b"header bytes").unwrap();
        assert!(cipher.open_tag(&nonce, b"header bytes", &tag));
        assert!(!cipher.open_tag(&nonce, b"other bytes", &tag));

        let mut bad = tag;
        bad[3] ^= 0x01;
        assert!(!cipher.open_tag(&nonce, b"header bytes", &bad));
    }
}
