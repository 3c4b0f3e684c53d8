//! Per-connection session context.
//!
//! Owns the ephemeral key pair, runs the X25519 agreement, derives the
//! session key, seals and opens metadata blobs, and enforces per-direction
//! nonce uniqueness. The context is symmetric: both client and server sides
//! use the same type, differing only in which records they sign and verify.
//!
//! Session key material is zeroised when the context drops and is never
//! logged or exposed beyond [`SessionContext::session_key_hex`].

use crate::records::{CommandRecord, EncryptedMetadata, ResponseRecord};
use crate::{FILENAME_MAX, FINGERPRINT_LEN, REPLAY_WINDOW, SESSION_KEY_LABEL, SessionError};
use skiff_crypto::aead::AeadCipher;
use skiff_crypto::{hash, kx, random};
use std::collections::{HashSet, VecDeque};
use zeroize::Zeroizing;

/// Decrypted command metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    /// Object name
    pub filename: String,
    /// Plaintext byte count
    pub size: i64,
    /// Intended recipient fingerprint, if addressed
    pub recipient: Option<String>,
}

/// Bounded window of recently observed nonces.
///
/// Remembers the last [`REPLAY_WINDOW`] nonces seen in one direction;
/// observing a remembered nonce again is a replay.
pub struct ReplayWindow {
    seen: HashSet<[u8; 24]>,
    order: VecDeque<[u8; 24]>,
    capacity: usize,
}

impl ReplayWindow {
    /// Create a window remembering `capacity` nonces
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a nonce. Returns `false` if it was already in the window.
    pub fn observe(&mut self, nonce: &[u8; 24]) -> bool {
        if !self.seen.insert(*nonce) {
            return false;
        }
        self.order.push_back(*nonce);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

/// Derive the nonce for one metadata field from the blob's base nonce.
///
/// The wire carries a single base nonce; flipping the final byte by the
/// field index keeps every (key, nonce) pair unique across the three seals.
fn field_nonce(base: &[u8; 24], index: u8) -> [u8; 24] {
    let mut nonce = *base;
    nonce[23] ^= index;
    nonce
}

const FIELD_FILENAME: (u8, &[u8]) = (0, b"filename");
const FIELD_SIZE: (u8, &[u8]) = (1, b"size");
const FIELD_RECIPIENT: (u8, &[u8]) = (2, b"recipient");

/// Per-connection cryptographic state
pub struct SessionContext {
    secret: Option<kx::EphemeralSecret>,
    public: [u8; 32],
    session_key: Option<Zeroizing<[u8; 32]>>,
    command_window: ReplayWindow,
    response_window: ReplayWindow,
}

impl SessionContext {
    /// Generate an ephemeral key pair; the session is not yet established.
    pub fn new() -> Result<Self, SessionError> {
        let (secret, public) = kx::keypair()?;
        Ok(Self {
            secret: Some(secret),
            public,
            session_key: None,
            command_window: ReplayWindow::new(REPLAY_WINDOW),
            response_window: ReplayWindow::new(REPLAY_WINDOW),
        })
    }

    /// Our ephemeral public point
    #[must_use]
    pub fn public_key(&self) -> [u8; 32] {
        self.public
    }

    /// Whether the session key has been derived
    #[must_use]
    pub fn established(&self) -> bool {
        self.session_key.is_some()
    }

    /// Store the peer's public point, compute the shared secret and derive
    /// the session key. Consumes the private scalar.
    ///
    /// Fails with [`SessionError::InvalidKey`] if the peer point is the
    /// identity or another low-order point.
    pub fn accept_peer(&mut self, peer_public: &[u8; 32]) -> Result<(), SessionError> {
        let secret = self.secret.take().ok_or(SessionError::NotEstablished)?;

        let shared = kx::agree(secret, peer_public).map_err(|_| SessionError::InvalidKey)?;
        let key = hash::derive_key(SESSION_KEY_LABEL, shared.as_bytes());
        self.session_key = Some(Zeroizing::new(key));
        Ok(())
    }

    /// The derived session key
    pub fn session_key(&self) -> Result<&[u8; 32], SessionError> {
        self.session_key
            .as_deref()
            .ok_or(SessionError::NotEstablished)
    }

    /// Hex rendering of the session key, the identity the ban list is keyed by
    pub fn session_key_hex(&self) -> Result<String, SessionError> {
        Ok(hex::encode(self.session_key()?))
    }

    fn cipher(&self) -> Result<AeadCipher, SessionError> {
        Ok(AeadCipher::new(self.session_key()?))
    }

    /// Seal filename, size and recipient into a metadata blob under a fresh
    /// base nonce.
    ///
    /// An absent recipient encodes as a zero-length ciphertext with a zero
    /// tag. Filename and recipient lengths are validated against the layout.
    pub fn seal_meta(&self, meta: &FileMeta) -> Result<EncryptedMetadata, SessionError> {
        if meta.filename.len() > FILENAME_MAX {
            return Err(SessionError::MalformedMetadata);
        }
        if let Some(recipient) = &meta.recipient {
            if recipient.len() != FINGERPRINT_LEN {
                return Err(SessionError::MalformedMetadata);
            }
        }

        let cipher = self.cipher()?;
        let base = random::random_24().map_err(SessionError::Crypto)?;
        let mut enc = EncryptedMetadata {
            nonce: base,
            ..EncryptedMetadata::default()
        };

        let (idx, aad) = FIELD_FILENAME;
        let sealed = cipher.encrypt(&field_nonce(&base, idx), meta.filename.as_bytes(), aad)?;
        let (ct, tag) = sealed.split_at(meta.filename.len());
        enc.fname_len = meta.filename.len() as u16;
        enc.fname_ct[..ct.len()].copy_from_slice(ct);
        enc.fname_tag.copy_from_slice(tag);

        let (idx, aad) = FIELD_SIZE;
        let sealed = cipher.encrypt(&field_nonce(&base, idx), &meta.size.to_be_bytes(), aad)?;
        let (ct, tag) = sealed.split_at(8);
        enc.size_ct.copy_from_slice(ct);
        enc.size_tag.copy_from_slice(tag);

        if let Some(recipient) = &meta.recipient {
            let (idx, aad) = FIELD_RECIPIENT;
            let sealed = cipher.encrypt(&field_nonce(&base, idx), recipient.as_bytes(), aad)?;
            let (ct, tag) = sealed.split_at(FINGERPRINT_LEN);
            enc.rcpt_len = FINGERPRINT_LEN as u16;
            enc.rcpt_ct.copy_from_slice(ct);
            enc.rcpt_tag.copy_from_slice(tag);
        }

        Ok(enc)
    }

    /// Open a metadata blob. Any tag mismatch is [`SessionError::AuthFailed`].
    pub fn open_meta(&self, enc: &EncryptedMetadata) -> Result<FileMeta, SessionError> {
        let cipher = self.cipher()?;
        let base = enc.nonce;

        let fname_len = enc.fname_len as usize;
        let mut sealed = Vec::with_capacity(fname_len + 16);
        sealed.extend_from_slice(&enc.fname_ct[..fname_len]);
        sealed.extend_from_slice(&enc.fname_tag);
        let (idx, aad) = FIELD_FILENAME;
        let fname_bytes = cipher
            .decrypt(&field_nonce(&base, idx), &sealed, aad)
            .map_err(|_| SessionError::AuthFailed)?;
        let filename =
            String::from_utf8(fname_bytes).map_err(|_| SessionError::MalformedMetadata)?;

        let mut sealed = Vec::with_capacity(8 + 16);
        sealed.extend_from_slice(&enc.size_ct);
        sealed.extend_from_slice(&enc.size_tag);
        let (idx, aad) = FIELD_SIZE;
        let size_bytes = cipher
            .decrypt(&field_nonce(&base, idx), &sealed, aad)
            .map_err(|_| SessionError::AuthFailed)?;
        let mut size_arr = [0u8; 8];
        size_arr.copy_from_slice(&size_bytes);
        let size = i64::from_be_bytes(size_arr);

        let recipient = if enc.rcpt_len == 0 {
            None
        } else {
            let mut sealed = Vec::with_capacity(FINGERPRINT_LEN + 16);
            sealed.extend_from_slice(&enc.rcpt_ct);
            sealed.extend_from_slice(&enc.rcpt_tag);
            let (idx, aad) = FIELD_RECIPIENT;
            let rcpt_bytes = cipher
                .decrypt(&field_nonce(&base, idx), &sealed, aad)
                .map_err(|_| SessionError::AuthFailed)?;
            Some(String::from_utf8(rcpt_bytes).map_err(|_| SessionError::MalformedMetadata)?)
        };

        Ok(FileMeta {
            filename,
            size,
            recipient,
        })
    }

    /// Sign an outgoing command record with a fresh per-packet nonce.
    pub fn sign_command(&self, record: &mut CommandRecord) -> Result<(), SessionError> {
        let cipher = self.cipher()?;
        record.nonce = random::random_24().map_err(SessionError::Crypto)?;
        record.auth_tag = cipher.seal_tag(&record.nonce, &record.aad())?;
        Ok(())
    }

    /// Verify an incoming command record's tag and nonce freshness.
    pub fn authenticate_command(&mut self, record: &CommandRecord) -> Result<(), SessionError> {
        let cipher = self.cipher()?;
        if !self.command_window.observe(&record.nonce) {
            return Err(SessionError::AuthFailed);
        }
        if !cipher.open_tag(&record.nonce, &record.aad(), &record.auth_tag) {
            return Err(SessionError::AuthFailed);
        }
        Ok(())
    }

    /// Sign an outgoing response record with a fresh nonce.
    pub fn sign_response(&self, record: &mut ResponseRecord) -> Result<(), SessionError> {
        let cipher = self.cipher()?;
        record.nonce = random::random_24().map_err(SessionError::Crypto)?;
        record.auth_tag = cipher.seal_tag(&record.nonce, &record.aad())?;
        Ok(())
    }

    /// Verify an incoming response record's tag and nonce freshness.
    pub fn authenticate_response(&mut self, record: &ResponseRecord) -> Result<(), SessionError> {
        let cipher = self.cipher()?;
        if !self.response_window.observe(&record.nonce) {
            return Err(SessionError::AuthFailed);
        }
        if !cipher.open_tag(&record.nonce, &record.aad(), &record.auth_tag) {
            return Err(SessionError::AuthFailed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn established_pair() -> (SessionContext, SessionContext) {
        let mut client = SessionContext::new().unwrap();
        let mut server = SessionContext::new().unwrap();
        let client_pk = client.public_key();
        let server_pk = server.public_key();
        client.accept_peer(&server_pk).unwrap();
        server.accept_peer(&client_pk).unwrap();
        (client, server)
    }

    #[test]
    fn test_key_agreement_matches() {
        let (client, server) = established_pair();
        assert!(client.established());
        assert_eq!(
            client.session_key().unwrap(),
            server.session_key().unwrap()
        );
    }

    #[test]
    fn test_reject_low_order_peer() {
        let mut ctx = SessionContext::new().unwrap();
        assert!(matches!(
            ctx.accept_peer(&[0u8; 32]),
            Err(SessionError::InvalidKey)
        ));
    }

    #[test]
    fn test_meta_roundtrip() {
        let (client, server) = established_pair();

        let meta = FileMeta {
            filename: "report.pdf".into(),
            size: 12345,
            recipient: Some("ab".repeat(32)),
        };

        let sealed = client.seal_meta(&meta).unwrap();
        let opened = server.open_meta(&sealed).unwrap();
        assert_eq!(opened, meta);
    }

    #[test]
    fn test_meta_empty_recipient() {
        let (client, server) = established_pair();

        let meta = FileMeta {
            filename: "hello.txt".into(),
            size: 6,
            recipient: None,
        };

        let sealed = client.seal_meta(&meta).unwrap();
        assert_eq!(sealed.rcpt_len, 0);
        assert_eq!(sealed.rcpt_tag, [0u8; 16]);

        let opened = server.open_meta(&sealed).unwrap();
        assert_eq!(opened.recipient, None);
    }

    #[test]
    fn test_meta_tamper_rejected() {
        let (client, server) = established_pair();

        let meta = FileMeta {
            filename: "a.bin".into(),
            size: 1,
            recipient: None,
        };

        let mut sealed = client.seal_meta(&meta).unwrap();
        sealed.fname_ct[0] ^= 0x01;
        assert!(matches!(
            server.open_meta(&sealed),
            Err(SessionError::AuthFailed)
        ));
    }

    #[test]
    fn test_meta_unreadable_without_key() {
        let (client, _server) = established_pair();
        let (_other_client, other_server) = established_pair();

        let sealed = client
            .seal_meta(&FileMeta {
                filename: "secret.bin".into(),
                size: 9,
                recipient: None,
            })
            .unwrap();

        assert!(matches!(
            other_server.open_meta(&sealed),
            Err(SessionError::AuthFailed)
        ));
    }

    #[test]
    fn test_command_sign_and_authenticate() {
        let (client, mut server) = established_pair();

        let mut record = CommandRecord {
            tag: 2,
            metadata: EncryptedMetadata::default(),
            offset: 0,
            flags: 0,
            file_hash: [0u8; 32],
            nonce: [0u8; 24],
            auth_tag: [0u8; 16],
        };
        client.sign_command(&mut record).unwrap();
        server.authenticate_command(&record).unwrap();
    }

    #[test]
    fn test_command_replay_rejected() {
        let (client, mut server) = established_pair();

        let mut record = CommandRecord {
            tag: 105,
            metadata: EncryptedMetadata::default(),
            offset: 0,
            flags: 0,
            file_hash: [0u8; 32],
            nonce: [0u8; 24],
            auth_tag: [0u8; 16],
        };
        client.sign_command(&mut record).unwrap();

        server.authenticate_command(&record).unwrap();
        assert!(matches!(
            server.authenticate_command(&record),
            Err(SessionError::AuthFailed)
        ));
    }

    #[test]
    fn test_command_aad_tamper_rejected() {
        let (client, mut server) = established_pair();

        let mut record = CommandRecord {
            tag: 1,
            metadata: EncryptedMetadata::default(),
            offset: 0,
            flags: 0,
            file_hash: [0u8; 32],
            nonce: [0u8; 24],
            auth_tag: [0u8; 16],
        };
        client.sign_command(&mut record).unwrap();

        record.offset = 4096;
        assert!(matches!(
            server.authenticate_command(&record),
            Err(SessionError::AuthFailed)
        ));
    }

    #[test]
    fn test_response_sign_and_authenticate() {
        let (mut client, server) = established_pair();

        let mut record = ResponseRecord {
            status: 0,
            size: 42,
            nonce: [0u8; 24],
            auth_tag: [0u8; 16],
        };
        server.sign_response(&mut record).unwrap();
        client.authenticate_response(&record).unwrap();

        record.size = 43;
        assert!(client.authenticate_response(&record).is_err());
    }

    #[test]
    fn test_replay_window_eviction() {
        let mut window = ReplayWindow::new(4);

        for i in 0u8..4 {
            assert!(window.observe(&[i; 24]));
        }
        // Window full; oldest nonce evicted by the next insert.
        assert!(window.observe(&[4u8; 24]));
        assert!(window.observe(&[0u8; 24]));
        // Recent nonces still rejected.
        assert!(!window.observe(&[4u8; 24]));
    }

    #[test]
    fn test_field_nonces_distinct() {
        let base = [0xAAu8; 24];
        let n0 = field_nonce(&base, 0);
        let n1 = field_nonce(&base, 1);
        let n2 = field_nonce(&base, 2);
        assert_eq!(n0, base);
        assert_ne!(n1, n0);
        assert_ne!(n2, n0);
        assert_ne!(n1, n2);
    }

    #[test]
    fn test_not_established_errors() {
        let ctx = SessionContext::new().unwrap();
        assert!(matches!(
            ctx.session_key(),
            Err(SessionError::NotEstablished)
        ));
        assert!(
            ctx.seal_meta(&FileMeta {
                filename: "x".into(),
                size: 1,
                recipient: None,
            })
            .is_err()
        );
    }
}
