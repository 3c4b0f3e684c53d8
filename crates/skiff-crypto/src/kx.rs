//! Curve25519 key agreement for the per-connection handshake.
//!
//! Each connection generates one ephemeral pair and performs exactly one
//! scalar multiplication against the peer's point; [`agree`] consumes the
//! secret so the scalar cannot be reused. The raw 32-byte points are what
//! travels in the key-exchange records, and the agreement output goes
//! straight into the session-key derivation.

use crate::{CryptoError, random};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Ephemeral private scalar, held only until the handshake's agreement
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct EphemeralSecret(x25519_dalek::StaticSecret);

/// Shared agreement output, zeroised on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret(x25519_dalek::SharedSecret);

/// Generate an ephemeral pair from the OS CSPRNG.
///
/// Returns the secret scalar and the 32-byte public point as it appears on
/// the wire.
pub fn keypair() -> Result<(EphemeralSecret, [u8; 32]), CryptoError> {
    let mut scalar = [0u8; 32];
    random::fill_random(&mut scalar)?;
    let secret = x25519_dalek::StaticSecret::from(scalar);
    scalar.zeroize();

    let public = x25519_dalek::PublicKey::from(&secret);
    Ok((EphemeralSecret(secret), *public.as_bytes()))
}

/// Scalar-multiply our secret with the peer's public point.
///
/// Consumes the secret; a connection agrees at most once. Fails with
/// [`CryptoError::InvalidKey`] when the peer point is the identity or
/// another low-order point, which collapse the product to all zeros.
pub fn agree(secret: EphemeralSecret, peer_point: &[u8; 32]) -> Result<SharedSecret, CryptoError> {
    let peer = x25519_dalek::PublicKey::from(*peer_point);
    let shared = secret.0.diffie_hellman(&peer);

    if shared.as_bytes() == &[0u8; 32] {
        return Err(CryptoError::InvalidKey);
    }

    Ok(SharedSecret(shared))
}

impl SharedSecret {
    /// The agreement bytes; input key material for the session-key
    /// derivation, never used as a key directly.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_sides_agree() {
        let (client_secret, client_point) = keypair().unwrap();
        let (server_secret, server_point) = keypair().unwrap();

        let client_shared = agree(client_secret, &server_point).unwrap();
        let server_shared = agree(server_secret, &client_point).unwrap();

        assert_eq!(client_shared.as_bytes(), server_shared.as_bytes());
    }

    #[test]
    fn test_points_are_distinct_per_pair() {
        let (_, a) = keypair().unwrap();
        let (_, b) = keypair().unwrap();
        assert_ne!(a, b);
        assert_ne!(a, [0u8; 32]);
    }

    #[test]
    fn test_identity_point_rejected() {
        let (secret, _) = keypair().unwrap();
        assert_eq!(
            agree(secret, &[0u8; 32]).map(|_| ()),
            Err(CryptoError::InvalidKey)
        );
    }

    // RFC 7748 test vector 1 (vector 2 is altered by scalar clamping and
    // cannot be used raw)
    #[test]
    fn test_rfc7748_vector_1() {
        let scalar_bytes = [
            0xa5, 0x46, 0xe3, 0x6b, 0xf0, 0x52, 0x7c, 0x9d, 0x3b, 0x16, 0x15, 0x4b, 0x82, 0x46,
            0x5e, 0xdd, 0x62, 0x14, 0x4c, 0x0a, 0xc1, 0xfc, 0x5a, 0x18, 0x50, 0x6a, 0x22, 0x44,
            0xba, 0x44, 0x9a, 0xc4,
        ];

        let basepoint_bytes = [
            0xe6, 0xdb, 0x68, 0x67, 0x58, 0x30, 0x30, 0xdb, 0x35, 0x94, 0xc1, 0xa4, 0x24, 0xb1,
            0x5f, 0x7c, 0x72, 0x66, 0x24, 0xec, 0x26, 0xb3, 0x35, 0x3b, 0x10, 0xa9, 0x03, 0xa6,
            0xd0, 0xab, 0x1c, 0x4c,
        ];

        let expected_bytes = [
            0xc3, 0xda, 0x55, 0x37, 0x9d, 0xe9, 0xc6, 0x90, 0x8e, 0x94, 0xea, 0x4d, 0xf2, 0x8d,
            0x08, 0x4f, 0x32, 0xec, 0xcf, 0x03, 0x49, 0x1c, 0x71, 0xf7, 0x54, 0xb4, 0x07, 0x55,
            0x77, 0xa2, 0x85, 0x52,
        ];

        let secret = EphemeralSecret(x25519_dalek::StaticSecret::from(scalar_bytes));
        let shared = agree(secret, &basepoint_bytes).unwrap();

        assert_eq!(shared.as_bytes(), &expected_bytes);
    }
}
