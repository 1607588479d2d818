//! Self-signed TLS material for the peer transport.
//!
//! Every node owns a self-signed certificate pair under `<data-dir>/tls/`.
//! Peers do not authenticate each other through TLS (identity comes from the
//! signed `HELLO` exchange); the channel only provides confidentiality, so
//! the client side accepts any presented certificate.

use crate::{CryptoError, Result};
use rcgen::{generate_simple_self_signed, CertifiedKey};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, ServerConfig, SignatureScheme};
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Paths of a node's certificate pair.
#[derive(Debug, Clone)]
pub struct TlsMaterial {
    /// PEM certificate (`tls/node.crt`).
    pub cert_path: PathBuf,
    /// PEM private key (`tls/node.key`).
    pub key_path: PathBuf,
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

/// Creates the certificate pair under `dir` if absent, returning its paths.
pub fn ensure_tls_material(dir: &Path) -> Result<TlsMaterial> {
    let cert_path = dir.join("node.crt");
    let key_path = dir.join("node.key");

    if !cert_path.exists() || !key_path.exists() {
        fs::create_dir_all(dir)?;
        let CertifiedKey { cert, key_pair } =
            generate_simple_self_signed(vec!["axiom-node".to_string()])
                .map_err(|e| CryptoError::Tls(e.to_string()))?;
        fs::write(&cert_path, cert.pem())?;
        fs::write(&key_path, key_pair.serialize_pem())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&key_path, fs::Permissions::from_mode(0o600))?;
        }
        info!(path = %dir.display(), "generated self-signed transport certificate");
    }

    Ok(TlsMaterial {
        cert_path,
        key_path,
    })
}

/// Builds the rustls server config from a node's certificate pair.
pub fn server_config(material: &TlsMaterial) -> Result<Arc<ServerConfig>> {
    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut BufReader::new(fs::File::open(&material.cert_path)?))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| CryptoError::Tls(format!("certificate: {e}")))?;
    let key: PrivateKeyDer<'static> =
        rustls_pemfile::private_key(&mut BufReader::new(fs::File::open(&material.key_path)?))
            .map_err(|e| CryptoError::Tls(format!("private key: {e}")))?
            .ok_or_else(|| CryptoError::Tls("no private key in key file".into()))?;

    let config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| CryptoError::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| CryptoError::Tls(e.to_string()))?;
    Ok(Arc::new(config))
}

/// Builds the rustls client config that accepts self-signed peers.
pub fn client_config() -> Result<Arc<ClientConfig>> {
    let provider = provider();
    let verifier = AcceptSelfSigned {
        provider: provider.clone(),
    };
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| CryptoError::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Accepts any server certificate while still checking handshake signatures.
#[derive(Debug)]
struct AcceptSelfSigned {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptSelfSigned {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
