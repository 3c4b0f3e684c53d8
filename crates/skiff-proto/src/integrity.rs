//! Streaming integrity verification for transferred objects.
//!
//! The uploader declares the BLAKE3 digest of the whole plaintext in its
//! command record; the receiver hashes bytes as they arrive and compares in
//! constant time at end-of-stream.

use skiff_crypto::constant_time;
use skiff_crypto::hash::StreamHasher;

/// Incremental digest check against a declared hash
pub struct StreamVerifier {
    hasher: StreamHasher,
    expected: [u8; 32],
}

impl StreamVerifier {
    /// Start verifying against `expected`
    #[must_use]
    pub fn new(expected: [u8; 32]) -> Self {
        Self {
            hasher: StreamHasher::new(),
            expected,
        }
    }

    /// Feed the next chunk
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    /// Bytes fed so far
    #[must_use]
    pub fn bytes_hashed(&self) -> u64 {
        self.hasher.total_len()
    }

    /// Finish and compare, constant-time. The observed digest is not
    /// exposed, so a mismatch cannot leak it into logs.
    #[must_use]
    pub fn verify(self) -> bool {
        let observed = self.hasher.finalize();
        constant_time::verify_32(&observed, &self.expected)
    }
}
