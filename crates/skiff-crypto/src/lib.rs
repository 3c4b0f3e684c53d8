//! # SKIFF Crypto
//!
//! Cryptographic primitives for the SKIFF exchange protocol.
//!
//! This crate is the single surface through which the rest of the workspace
//! touches cryptography:
//! - X25519 ephemeral key exchange
//! - `XChaCha20-Poly1305` AEAD for on-the-wire metadata
//! - `AES-256-GCM` for at-rest object encryption
//! - BLAKE3 hashing and labelled key derivation
//! - Constant-time comparisons
//! - OS CSPRNG access
//!
//! No primitive is re-implemented here; every module wraps an audited crate.
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm |
//! |----------|-----------|
//! | Key Exchange | X25519 |
//! | Wire AEAD | XChaCha20-Poly1305 |
//! | At-rest AEAD | AES-256-GCM |
//! | Hash / KDF | BLAKE3 |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod aead;
pub mod atrest;
pub mod constant_time;
pub mod error;
pub mod hash;
pub mod kx;
pub mod random;

pub use error::CryptoError;

/// X25519 public key size
pub const X25519_PUBLIC_KEY_SIZE: usize = 32;

/// Derived session key size
pub const SESSION_KEY_SIZE: usize = 32;

/// XChaCha20-Poly1305 nonce size
pub const XCHACHA_NONCE_SIZE: usize = 24;

/// Poly1305 / GCM authentication tag size
pub const AEAD_TAG_SIZE: usize = 16;

/// AES-256-GCM IV size (96 bits)
pub const GCM_IV_SIZE: usize = 12;

/// BLAKE3 output size
pub const BLAKE3_OUTPUT_SIZE: usize = 32;
