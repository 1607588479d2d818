//! # Axiom Crypto
//!
//! Identity and transport-security material for an Axiom node:
//!
//! - [`NodeIdentity`] - the RSA-2048 keypair that names a node. Its SHA-256
//!   fingerprint is the node's stable identity; losing the key file is
//!   equivalent to a new identity.
//! - [`tls`] - self-signed certificate generation and rustls configuration
//!   for the peer-to-peer transport.
//!
//! Signatures are PKCS#1 v1.5 over SHA-256 digests. Verification failures
//! are ordinary errors: the caller drops the offending message and applies a
//! reputation penalty.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod identity;
pub mod tls;

pub use identity::{fingerprint_of_pem, NodeIdentity};
pub use tls::{client_config, ensure_tls_material, server_config, TlsMaterial};

use thiserror::Error;

/// Errors raised by identity and TLS operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key generation, parsing or encoding failed.
    #[error("key error: {0}")]
    Key(String),

    /// A signature did not verify against the claimed public key.
    #[error("signature verification failed")]
    BadSignature,

    /// TLS material could not be created or loaded.
    #[error("tls error: {0}")]
    Tls(String),

    /// Filesystem access to key material failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
