//! RSA-2048 node identity.

use crate::{CryptoError, Result};
use axiom_types::sha256_hex;
use rsa::pkcs8::{
    DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding,
};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

/// RSA modulus size in bits.
const KEY_BITS: usize = 2048;

/// A node's keypair and derived fingerprint.
///
/// The fingerprint (SHA-256 of the DER-encoded public key, hex) is the
/// node's identity on the wire and in validator records.
pub struct NodeIdentity {
    private: RsaPrivateKey,
    public: RsaPublicKey,
    fingerprint: String,
}

impl NodeIdentity {
    /// Generates a fresh RSA-2048 keypair.
    pub fn generate() -> Result<Self> {
        let mut rng = rand::rngs::OsRng;
        let private =
            RsaPrivateKey::new(&mut rng, KEY_BITS).map_err(|e| CryptoError::Key(e.to_string()))?;
        Self::from_private(private)
    }

    /// Test-only: the deterministic keypair every node started with
    /// `--shared-keys` derives, so a local multi-node harness shares one
    /// identity without copying key files around.
    pub fn generate_shared() -> Result<Self> {
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x4158_494f_4d5f_3031);
        let private =
            RsaPrivateKey::new(&mut rng, KEY_BITS).map_err(|e| CryptoError::Key(e.to_string()))?;
        Self::from_private(private)
    }

    /// Loads the identity from a PKCS#8 PEM file, or generates and persists
    /// a new one (mode 0600) if the file does not exist.
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        if path.exists() {
            let pem = std::fs::read_to_string(path)?;
            let private = RsaPrivateKey::from_pkcs8_pem(&pem)
                .map_err(|e| CryptoError::Key(format!("{}: {}", path.display(), e)))?;
            let identity = Self::from_private(private)?;
            info!(fingerprint = %identity.fingerprint(), path = %path.display(), "loaded node identity");
            Ok(identity)
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let identity = Self::generate()?;
            let pem = identity
                .private
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|e| CryptoError::Key(e.to_string()))?;
            std::fs::write(path, pem.as_bytes())?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
            }
            info!(fingerprint = %identity.fingerprint(), path = %path.display(), "generated new node identity");
            Ok(identity)
        }
    }

    fn from_private(private: RsaPrivateKey) -> Result<Self> {
        let public = private.to_public_key();
        let der = public
            .to_public_key_der()
            .map_err(|e| CryptoError::Key(e.to_string()))?;
        let fingerprint = sha256_hex(der.as_bytes());
        Ok(Self {
            private,
            public,
            fingerprint,
        })
    }

    /// The node's stable identity: SHA-256 hex of the DER public key.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// The public key as SubjectPublicKeyInfo PEM, as carried in `HELLO`.
    pub fn public_key_pem(&self) -> Result<String> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::Key(e.to_string()))
    }

    /// Signs a message: PKCS#1 v1.5 over the SHA-256 digest of `message`.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let digest = Sha256::digest(message);
        self.private
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map_err(|e| CryptoError::Key(e.to_string()))
    }

    /// Signs a message and hex-encodes the signature.
    pub fn sign_hex(&self, message: &[u8]) -> Result<String> {
        Ok(hex::encode(self.sign(message)?))
    }
}

impl std::fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never render key material.
        f.debug_struct("NodeIdentity")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// Fingerprint of a PEM-encoded public key.
pub fn fingerprint_of_pem(pem: &str) -> Result<String> {
    let public =
        RsaPublicKey::from_public_key_pem(pem).map_err(|e| CryptoError::Key(e.to_string()))?;
    let der = public
        .to_public_key_der()
        .map_err(|e| CryptoError::Key(e.to_string()))?;
    Ok(sha256_hex(der.as_bytes()))
}

/// Verifies a signature against a PEM-encoded public key.
pub fn verify_with_pem(pem: &str, message: &[u8], signature: &[u8]) -> Result<()> {
    let public =
        RsaPublicKey::from_public_key_pem(pem).map_err(|e| CryptoError::Key(e.to_string()))?;
    let digest = Sha256::digest(message);
    public
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
        .map_err(|_| CryptoError::BadSignature)
}

/// Verifies a hex-encoded signature against a PEM-encoded public key.
pub fn verify_hex_with_pem(pem: &str, message: &[u8], signature_hex: &str) -> Result<()> {
    let signature =
        hex::decode(signature_hex).map_err(|e| CryptoError::Key(format!("signature hex: {e}")))?;
    verify_with_pem(pem, message, &signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_round_trip() {
        let identity = NodeIdentity::generate().unwrap();
        let pem = identity.public_key_pem().unwrap();
        let sig = identity.sign(b"block-hash").unwrap();
        verify_with_pem(&pem, b"block-hash", &sig).unwrap();
        assert!(verify_with_pem(&pem, b"other-message", &sig).is_err());
    }

    #[test]
    fn fingerprint_matches_pem_derivation() {
        let identity = NodeIdentity::generate().unwrap();
        let pem = identity.public_key_pem().unwrap();
        assert_eq!(fingerprint_of_pem(&pem).unwrap(), identity.fingerprint());
    }
}
