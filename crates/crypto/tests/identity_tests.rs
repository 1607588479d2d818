//! Identity persistence tests.

use axiom_crypto::{identity::verify_hex_with_pem, NodeIdentity};

#[test]
fn identity_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("identity.pem");

    let first = NodeIdentity::load_or_generate(&path).unwrap();
    let reloaded = NodeIdentity::load_or_generate(&path).unwrap();
    assert_eq!(first.fingerprint(), reloaded.fingerprint());
}

#[test]
fn fresh_paths_give_fresh_identities() {
    let dir = tempfile::tempdir().unwrap();
    let a = NodeIdentity::load_or_generate(&dir.path().join("a.pem")).unwrap();
    let b = NodeIdentity::load_or_generate(&dir.path().join("b.pem")).unwrap();
    assert_ne!(a.fingerprint(), b.fingerprint());
}

#[cfg(unix)]
#[test]
fn key_file_is_private() {
    use std::os::unix::fs::PermissionsExt;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("identity.pem");
    NodeIdentity::load_or_generate(&path).unwrap();
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn hex_signature_round_trip() {
    let identity = NodeIdentity::generate().unwrap();
    let pem = identity.public_key_pem().unwrap();
    let sig = identity.sign_hex(b"payload").unwrap();
    verify_hex_with_pem(&pem, b"payload", &sig).unwrap();
    assert!(verify_hex_with_pem(&pem, b"tampered", &sig).is_err());
}
