use std::collections::HashSet;
use std::fs;
use std::sync::OnceLock;

use mtls_chain::chain_verification::verify_persisted_chain;
use mtls_chain::storage::{Artifact, ArtifactLocations, ArtifactStore};
use mtls_chain::trust_chain::{ChainPolicy, TrustChain, TrustChainBuilder};
use mtls_chain::Error;
use x509_parser::prelude::*;

fn chain() -> &'static TrustChain {
    static CHAIN: OnceLock<TrustChain> = OnceLock::new();
    CHAIN.get_or_init(|| {
        TrustChainBuilder::new(ChainPolicy::default())
            .build()
            .expect("trust chain generation should succeed")
    })
}

fn persisted() -> (tempfile::TempDir, ArtifactStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(ArtifactLocations::in_directory(dir.path()));
    chain().persist(&store).unwrap();
    (dir, store)
}

fn der(certificate: &mtls_chain::issue_certificate::Certificate) -> Vec<u8> {
    certificate.to_der().unwrap()
}

#[test]
fn only_the_root_is_self_issued() {
    let chain = chain();
    let root_der = der(&chain.root().certificate);
    let server_der = der(&chain.server().certificate);
    let client_der = der(&chain.client().certificate);

    let (_, root) = X509Certificate::from_der(&root_der).unwrap();
    let (_, server) = X509Certificate::from_der(&server_der).unwrap();
    let (_, client) = X509Certificate::from_der(&client_der).unwrap();

    assert_eq!(root.subject().as_raw(), root.issuer().as_raw());
    for leaf in [&server, &client] {
        assert_ne!(leaf.subject().as_raw(), leaf.issuer().as_raw());
        assert_eq!(leaf.issuer().as_raw(), root.subject().as_raw());
    }
}

#[test]
fn leaves_verify_against_the_root_key() {
    let chain = chain();
    let root_public = chain.root().key_pair.public_key().unwrap();
    assert!(chain.root().certificate.is_signed_by(&root_public).unwrap());
    assert!(chain.server().certificate.is_signed_by(&root_public).unwrap());
    assert!(chain.client().certificate.is_signed_by(&root_public).unwrap());

    let server_public = chain.server().key_pair.public_key().unwrap();
    assert!(!chain.client().certificate.is_signed_by(&server_public).unwrap());
}

#[test]
fn usages_follow_the_role_policy() {
    let chain = chain();
    let root_der = der(&chain.root().certificate);
    let server_der = der(&chain.server().certificate);
    let client_der = der(&chain.client().certificate);

    let (_, root) = X509Certificate::from_der(&root_der).unwrap();
    assert!(root.is_ca());
    let root_ku = root.key_usage().unwrap().expect("root has key usage");
    assert!(root_ku.value.key_cert_sign());
    assert!(root_ku.value.digital_signature());

    let (_, server) = X509Certificate::from_der(&server_der).unwrap();
    assert!(!server.is_ca());
    let server_ku = server.key_usage().unwrap().expect("server has key usage");
    assert!(server_ku.value.digital_signature());
    assert!(server_ku.value.key_encipherment());
    assert!(!server_ku.value.key_cert_sign());
    let server_eku = server
        .extended_key_usage()
        .unwrap()
        .expect("server has extended key usage");
    assert!(server_eku.value.server_auth);
    assert!(!server_eku.value.client_auth);

    let (_, client) = X509Certificate::from_der(&client_der).unwrap();
    assert!(!client.is_ca());
    let client_eku = client
        .extended_key_usage()
        .unwrap()
        .expect("client has extended key usage");
    assert!(client_eku.value.client_auth);
    assert!(!client_eku.value.server_auth);
}

#[test]
fn server_certificate_names_the_expected_hosts() {
    let server_der = der(&chain().server().certificate);
    let (_, server) = X509Certificate::from_der(&server_der).unwrap();
    let san = server
        .subject_alternative_name()
        .unwrap()
        .expect("server has subject alternative names");
    let dns: Vec<&str> = san
        .value
        .general_names
        .iter()
        .filter_map(|name| match name {
            GeneralName::DNSName(dns) => Some(*dns),
            _ => None,
        })
        .collect();
    assert!(dns.contains(&"localhost"));
    assert!(dns.contains(&"test"));
}

#[test]
fn all_certificates_share_one_validity_window() {
    let chain = chain();
    let windows: Vec<(i64, i64)> = [
        der(&chain.root().certificate),
        der(&chain.server().certificate),
        der(&chain.client().certificate),
    ]
    .iter()
    .map(|der| {
        let (_, cert) = X509Certificate::from_der(der).unwrap();
        (
            cert.validity().not_before.timestamp(),
            cert.validity().not_after.timestamp(),
        )
    })
    .collect();

    assert!(windows.windows(2).all(|pair| pair[0] == pair[1]));
    let (not_before, not_after) = windows[0];
    assert_eq!(not_after - not_before, 1200 * 3600);
}

#[test]
fn two_runs_produce_distinct_serials() {
    let second = TrustChainBuilder::new(ChainPolicy::default()).build().unwrap();
    let mut serials = HashSet::new();
    for chain in [chain(), &second] {
        for identity in [chain.root(), chain.server(), chain.client()] {
            assert!(serials.insert(identity.certificate.serial_number().unwrap()));
        }
    }
    assert_eq!(serials.len(), 6);
}

#[test]
fn pem_round_trip_is_byte_identical() {
    let (_dir, store) = persisted();
    let chain = chain();

    assert_eq!(
        store.load(Artifact::RootCertificate).unwrap(),
        der(&chain.root().certificate)
    );
    assert_eq!(
        store.load(Artifact::ServerCertificate).unwrap(),
        der(&chain.server().certificate)
    );
    assert_eq!(
        store.load(Artifact::ClientPrivateKey).unwrap(),
        chain.client().key_pair.private_key_to_pkcs8().unwrap()
    );
}

#[test]
fn root_private_key_is_never_written() {
    let (dir, _store) = persisted();
    let mut names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec!["ca.cert", "client.cert", "client.key", "server.cert", "server.key"]
    );
}

#[test]
fn persisted_chain_verifies() {
    let (_dir, store) = persisted();
    let verified = verify_persisted_chain(&store, "localhost").unwrap();
    assert_eq!(
        verified.root_serial,
        chain().root().certificate.serial_number().unwrap()
    );

    let err = verify_persisted_chain(&store, "elsewhere.example").unwrap_err();
    assert!(matches!(err, Error::TrustVerification(_)));
}

#[test]
fn tampered_certificate_is_detected() {
    let (dir, store) = persisted();
    let path = dir.path().join("server.cert");
    let mut pem = fs::read(&path).unwrap();

    let body_start = pem.iter().position(|b| *b == b'\n').unwrap() + 1;
    let middle = body_start + (pem.len() - body_start) / 2;
    let index = (middle..pem.len())
        .find(|&i| pem[i].is_ascii_alphanumeric())
        .unwrap();
    pem[index] = if pem[index] == b'A' { b'B' } else { b'A' };
    fs::write(&path, pem).unwrap();

    let err = verify_persisted_chain(&store, "localhost").unwrap_err();
    assert!(!matches!(err, Error::Io { .. }), "unexpected error: {err}");
    assert!(!err.to_string().is_empty());
}

#[test]
fn swapped_private_key_is_detected() {
    let (dir, store) = persisted();
    fs::copy(dir.path().join("client.key"), dir.path().join("server.key")).unwrap();

    let err = verify_persisted_chain(&store, "localhost").unwrap_err();
    assert!(matches!(err, Error::TrustVerification(_)), "{err}");
}

#[test]
fn leaf_from_another_root_is_rejected() {
    let (dir, store) = persisted();
    let other = TrustChainBuilder::new(ChainPolicy::default()).build().unwrap();
    let other_dir = tempfile::tempdir().unwrap();
    other
        .persist(&ArtifactStore::new(ArtifactLocations::in_directory(other_dir.path())))
        .unwrap();
    fs::copy(other_dir.path().join("ca.cert"), dir.path().join("ca.cert")).unwrap();

    let err = verify_persisted_chain(&store, "localhost").unwrap_err();
    assert!(matches!(err, Error::TrustVerification(_)), "{err}");
}

#[test]
fn trailing_data_after_certificate_is_detected() {
    let (_dir, store) = persisted();
    let mut der = store.load(Artifact::ClientCertificate).unwrap();
    der.extend_from_slice(&[0x00, 0x00]);
    store.save(Artifact::ClientCertificate, &der).unwrap();

    let err = verify_persisted_chain(&store, "localhost").unwrap_err();
    assert!(matches!(err, Error::MalformedPem { .. }), "{err}");
}

#[test]
fn flipped_base64_padding_is_detected() {
    // Only DER lengths that are not a multiple of three carry padding.
    for name in ["ca.cert", "server.cert", "client.cert"] {
        let (dir, store) = persisted();
        let path = dir.path().join(name);
        let text = fs::read_to_string(&path).unwrap();
        let end = text.find("-----END").unwrap();
        let Some(pad) = text[..end].rfind('=') else {
            continue;
        };
        let mut tampered = text.into_bytes();
        tampered[pad] = b'A';
        fs::write(&path, tampered).unwrap();

        let err = verify_persisted_chain(&store, "localhost").unwrap_err();
        assert!(!matches!(err, Error::Io { .. }), "{name}: unexpected error: {err}");
    }
}
