//! Fixed-layout protocol records.
//!
//! Every record has a frozen byte map; encode/decode work on exactly
//! [`Record::LEN`] bytes and never accept short input. Integers are
//! big-endian.

use crate::{FILENAME_MAX, FINGERPRINT_LEN, WireError};

/// A fixed-size wire record
pub trait Record: Sized {
    /// Exact encoded length in bytes
    const LEN: usize;

    /// Write the record into `buf`, which must be exactly [`Self::LEN`] long
    fn encode_into(&self, buf: &mut [u8]);

    /// Parse from exactly [`Self::LEN`] bytes
    fn decode(buf: &[u8]) -> Result<Self, WireError>;

    /// Encode into a fresh buffer
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::LEN];
        self.encode_into(&mut buf);
        buf
    }
}

fn check_len(buf: &[u8], expected: usize) -> Result<(), WireError> {
    if buf.len() != expected {
        return Err(WireError::Truncated {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

/// Encrypted filename/size/recipient triple.
///
/// Each field is sealed independently under the session key; the single base
/// nonce is embedded and per-field nonces are derived from it (see
/// `session::field_nonce`). An absent recipient encodes as `rcpt_len = 0`
/// with an all-zero ciphertext and tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedMetadata {
    /// Filename ciphertext length (0..=256)
    pub fname_len: u16,
    /// Filename ciphertext, zero padded
    pub fname_ct: [u8; FILENAME_MAX],
    /// Filename field tag
    pub fname_tag: [u8; 16],
    /// Size ciphertext (i64, big-endian plaintext)
    pub size_ct: [u8; 8],
    /// Size field tag
    pub size_tag: [u8; 16],
    /// Recipient ciphertext length: 0 or 64
    pub rcpt_len: u16,
    /// Recipient ciphertext, zero padded
    pub rcpt_ct: [u8; FINGERPRINT_LEN],
    /// Recipient field tag
    pub rcpt_tag: [u8; 16],
    /// Base nonce for the three field seals
    pub nonce: [u8; 24],
}

impl Default for EncryptedMetadata {
    fn default() -> Self {
        Self {
            fname_len: 0,
            fname_ct: [0u8; FILENAME_MAX],
            fname_tag: [0u8; 16],
            size_ct: [0u8; 8],
            size_tag: [0u8; 16],
            rcpt_len: 0,
            rcpt_ct: [0u8; FINGERPRINT_LEN],
            rcpt_tag: [0u8; 16],
            nonce: [0u8; 24],
        }
    }
}

impl Record for EncryptedMetadata {
    const LEN: usize = 2 + FILENAME_MAX + 16 + 8 + 16 + 2 + FINGERPRINT_LEN + 16 + 24;

    fn encode_into(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.fname_len.to_be_bytes());
        buf[2..258].copy_from_slice(&self.fname_ct);
        buf[258..274].copy_from_slice(&self.fname_tag);
        buf[274..282].copy_from_slice(&self.size_ct);
        buf[282..298].copy_from_slice(&self.size_tag);
        buf[298..300].copy_from_slice(&self.rcpt_len.to_be_bytes());
        buf[300..364].copy_from_slice(&self.rcpt_ct);
        buf[364..380].copy_from_slice(&self.rcpt_tag);
        buf[380..404].copy_from_slice(&self.nonce);
    }

    fn decode(buf: &[u8]) -> Result<Self, WireError> {
        check_len(buf, Self::LEN)?;

        let fname_len = u16::from_be_bytes([buf[0], buf[1]]);
        let rcpt_len = u16::from_be_bytes([buf[298], buf[299]]);
        if fname_len as usize > FILENAME_MAX || !(rcpt_len == 0 || rcpt_len as usize == FINGERPRINT_LEN) {
            return Err(WireError::InvalidFieldLength);
        }

        let mut meta = Self {
            fname_len,
            rcpt_len,
            ..Self::default()
        };
        meta.fname_ct.copy_from_slice(&buf[2..258]);
        meta.fname_tag.copy_from_slice(&buf[258..274]);
        meta.size_ct.copy_from_slice(&buf[274..282]);
        meta.size_tag.copy_from_slice(&buf[282..298]);
        meta.rcpt_ct.copy_from_slice(&buf[300..364]);
        meta.rcpt_tag.copy_from_slice(&buf[364..380]);
        meta.nonce.copy_from_slice(&buf[380..404]);
        Ok(meta)
    }
}

/// Client command record
#[derive(Debug, Clone)]
pub struct CommandRecord {
    /// Command tag (kept raw so unknown tags can be answered)
    pub tag: u32,
    /// Encrypted filename/size/recipient
    pub metadata: EncryptedMetadata,
    /// Download seek offset
    pub offset: i64,
    /// Flag bitfield (`FLAG_PUBLIC`, `FLAG_ANONYMOUS`)
    pub flags: u8,
    /// BLAKE3 digest of the upload plaintext
    pub file_hash: [u8; 32],
    /// Fresh per-packet nonce
    pub nonce: [u8; 24],
    /// AEAD tag over the record header
    pub auth_tag: [u8; 16],
}

impl CommandRecord {
    /// Associated data covered by `auth_tag`
    #[must_use]
    pub fn aad(&self) -> Vec<u8> {
        let mut aad = Vec::with_capacity(4 + 8 + 1 + 32);
        aad.extend_from_slice(&self.tag.to_be_bytes());
        aad.extend_from_slice(&self.offset.to_be_bytes());
        aad.push(self.flags);
        aad.extend_from_slice(&self.file_hash);
        aad
    }
}

impl Record for CommandRecord {
    const LEN: usize = 4 + EncryptedMetadata::LEN + 8 + 1 + 32 + 24 + 16;

    fn encode_into(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.tag.to_be_bytes());
        self.metadata.encode_into(&mut buf[4..408]);
        buf[408..416].copy_from_slice(&self.offset.to_be_bytes());
        buf[416] = self.flags;
        buf[417..449].copy_from_slice(&self.file_hash);
        buf[449..473].copy_from_slice(&self.nonce);
        buf[473..489].copy_from_slice(&self.auth_tag);
    }

    fn decode(buf: &[u8]) -> Result<Self, WireError> {
        check_len(buf, Self::LEN)?;

        let tag = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let metadata = EncryptedMetadata::decode(&buf[4..408])?;
        let mut offset_bytes = [0u8; 8];
        offset_bytes.copy_from_slice(&buf[408..416]);
        let offset = i64::from_be_bytes(offset_bytes);
        let flags = buf[416];

        let mut file_hash = [0u8; 32];
        file_hash.copy_from_slice(&buf[417..449]);
        let mut nonce = [0u8; 24];
        nonce.copy_from_slice(&buf[449..473]);
        let mut auth_tag = [0u8; 16];
        auth_tag.copy_from_slice(&buf[473..489]);

        Ok(Self {
            tag,
            metadata,
            offset,
            flags,
            file_hash,
            nonce,
            auth_tag,
        })
    }
}

/// Server response record
#[derive(Debug, Clone)]
pub struct ResponseRecord {
    /// Status tag
    pub status: u32,
    /// Payload size when the response announces following bytes
    pub size: i64,
    /// Response nonce (zero before session establishment)
    pub nonce: [u8; 24],
    /// AEAD tag over status and size (zero before establishment)
    pub auth_tag: [u8; 16],
}

impl ResponseRecord {
    /// Associated data covered by `auth_tag`
    #[must_use]
    pub fn aad(&self) -> Vec<u8> {
        let mut aad = Vec::with_capacity(12);
        aad.extend_from_slice(&self.status.to_be_bytes());
        aad.extend_from_slice(&self.size.to_be_bytes());
        aad
    }
}

impl Record for ResponseRecord {
    const LEN: usize = 4 + 8 + 24 + 16;

    fn encode_into(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.status.to_be_bytes());
        buf[4..12].copy_from_slice(&self.size.to_be_bytes());
        buf[12..36].copy_from_slice(&self.nonce);
        buf[36..52].copy_from_slice(&self.auth_tag);
    }

    fn decode(buf: &[u8]) -> Result<Self, WireError> {
        check_len(buf, Self::LEN)?;

        let status = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let mut size_bytes = [0u8; 8];
        size_bytes.copy_from_slice(&buf[4..12]);
        let size = i64::from_be_bytes(size_bytes);
        let mut nonce = [0u8; 24];
        nonce.copy_from_slice(&buf[12..36]);
        let mut auth_tag = [0u8; 16];
        auth_tag.copy_from_slice(&buf[36..52]);

        Ok(Self {
            status,
            size,
            nonce,
            auth_tag,
        })
    }
}

/// Key-exchange initiation (client's first bytes)
#[derive(Debug, Clone)]
pub struct KxInit {
    /// Client ephemeral public point
    pub public_key: [u8; 32],
    /// Client-chosen base nonce
    pub nonce: [u8; 24],
}

impl Record for KxInit {
    const LEN: usize = 32 + 24;

    fn encode_into(&self, buf: &mut [u8]) {
        buf[0..32].copy_from_slice(&self.public_key);
        buf[32..56].copy_from_slice(&self.nonce);
    }

    fn decode(buf: &[u8]) -> Result<Self, WireError> {
        check_len(buf, Self::LEN)?;

        let mut public_key = [0u8; 32];
        public_key.copy_from_slice(&buf[0..32]);
        let mut nonce = [0u8; 24];
        nonce.copy_from_slice(&buf[32..56]);

        Ok(Self { public_key, nonce })
    }
}

/// Key-exchange response (server's ephemeral key plus a proof-of-key blob)
#[derive(Debug, Clone)]
pub struct KxResponse {
    /// Server ephemeral public point
    pub public_key: [u8; 32],
    /// Empty metadata sealed under the freshly derived session key
    pub metadata: EncryptedMetadata,
    /// Copy of the blob's filename tag
    pub tag: [u8; 16],
}

impl Record for KxResponse {
    const LEN: usize = 32 + EncryptedMetadata::LEN + 16;

    fn encode_into(&self, buf: &mut [u8]) {
        buf[0..32].copy_from_slice(&self.public_key);
        self.metadata.encode_into(&mut buf[32..436]);
        buf[436..452].copy_from_slice(&self.tag);
    }

    fn decode(buf: &[u8]) -> Result<Self, WireError> {
        check_len(buf, Self::LEN)?;

        let mut public_key = [0u8; 32];
        public_key.copy_from_slice(&buf[0..32]);
        let metadata = EncryptedMetadata::decode(&buf[32..436])?;
        let mut tag = [0u8; 16];
        tag.copy_from_slice(&buf[436..452]);

        Ok(Self {
            public_key,
            metadata,
            tag,
        })
    }
}

/// Session-key confirmation (client echoes the derived key with its hash)
#[derive(Debug, Clone)]
pub struct SessionKeyRecord {
    /// Client's derived session key
    pub session_key: [u8; 32],
    /// BLAKE3 hash of `session_key`
    pub key_hash: [u8; 32],
}

impl Record for SessionKeyRecord {
    const LEN: usize = 32 + 32;

    fn encode_into(&self, buf: &mut [u8]) {
        buf[0..32].copy_from_slice(&self.session_key);
        buf[32..64].copy_from_slice(&self.key_hash);
    }

    fn decode(buf: &[u8]) -> Result<Self, WireError> {
        check_len(buf, Self::LEN)?;

        let mut session_key = [0u8; 32];
        session_key.copy_from_slice(&buf[0..32]);
        let mut key_hash = [0u8; 32];
        key_hash.copy_from_slice(&buf[32..64]);

        Ok(Self {
            session_key,
            key_hash,
        })
    }
}
