//! BLAKE3 hashing and labelled key derivation.

/// BLAKE3 hash output (32 bytes).
pub type HashOutput = [u8; 32];

/// Compute BLAKE3 hash of input data.
#[must_use]
pub fn hash32(data: &[u8]) -> HashOutput {
    *blake3::hash(data).as_bytes()
}

/// Derive a 32-byte key from input key material under a fixed label.
///
/// Used to turn the X25519 shared secret into the per-connection session key
/// (label `"session-key/v1"`).
#[must_use]
pub fn derive_key(label: &str, ikm: &[u8]) -> [u8; 32] {
    blake3::derive_key(label, ikm)
}

/// Incremental BLAKE3 hasher for streaming file bytes.
pub struct StreamHasher {
    hasher: blake3::Hasher,
    total_len: u64,
}

impl StreamHasher {
    /// Create a new streaming hasher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hasher: blake3::Hasher::new(),
            total_len: 0,
        }
    }

    /// Update with more data.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.total_len += data.len() as u64;
    }

    /// Get total bytes hashed so far.
    #[must_use]
    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    /// Finalize and return the hash.
    #[must_use]
    pub fn finalize(&self) -> HashOutput {
        *self.hasher.finalize().as_bytes()
    }
}

impl Default for StreamHasher {
    fn default() -> Self {
        Self::new()
    }
}
