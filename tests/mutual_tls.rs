use std::sync::OnceLock;
use std::thread;

use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use tempfile::TempDir;

use mtls_chain::chain_verification::trust_store;
use mtls_chain::echo_client::EchoClient;
use mtls_chain::echo_server::EchoServer;
use mtls_chain::protocol::Response;
use mtls_chain::storage::{Artifact, ArtifactLocations, ArtifactStore};
use mtls_chain::tls_endpoint::TransportSecurity;
use mtls_chain::trust_chain::{ChainPolicy, TrustChainBuilder};
use mtls_chain::{Error, Result};

/// Generate a chain into a fresh directory. The directory is returned so it
/// outlives the test.
fn persisted_chain() -> (TempDir, ArtifactLocations) {
    let dir = tempfile::tempdir().unwrap();
    let locations = ArtifactLocations::in_directory(dir.path());
    TrustChainBuilder::new(ChainPolicy::default())
        .build()
        .unwrap()
        .persist(&ArtifactStore::new(locations.clone()))
        .unwrap();
    (dir, locations)
}

fn trusted() -> &'static (TempDir, ArtifactLocations) {
    static CHAIN: OnceLock<(TempDir, ArtifactLocations)> = OnceLock::new();
    CHAIN.get_or_init(persisted_chain)
}

fn rogue() -> &'static (TempDir, ArtifactLocations) {
    static CHAIN: OnceLock<(TempDir, ArtifactLocations)> = OnceLock::new();
    CHAIN.get_or_init(persisted_chain)
}

/// Start a server that handles exactly one connection.
fn spawn_server(
    security: TransportSecurity,
    store: &ArtifactStore,
) -> (std::net::SocketAddr, thread::JoinHandle<Result<()>>) {
    let server = EchoServer::bind("127.0.0.1:0", security, store).unwrap();
    let addr = server.local_addr().unwrap();
    (addr, thread::spawn(move || server.handle_next()))
}

#[test]
fn mutually_authenticated_ping_gets_pong() {
    let store = ArtifactStore::new(trusted().1.clone());
    let (addr, server) = spawn_server(TransportSecurity::MutualTls, &store);

    let client = EchoClient::new(TransportSecurity::MutualTls, &store, "localhost").unwrap();
    assert_eq!(client.ping(addr).unwrap(), Response::Pong);
    server.join().unwrap().unwrap();
}

#[test]
fn client_without_certificate_is_rejected() {
    let store = ArtifactStore::new(trusted().1.clone());
    let (addr, server) = spawn_server(TransportSecurity::MutualTls, &store);

    let root = store.load_certificate(Artifact::RootCertificate).unwrap();
    let mut builder = SslConnector::builder(SslMethod::tls_client()).unwrap();
    builder.set_verify_cert_store(trust_store(&root).unwrap()).unwrap();
    builder.set_verify(SslVerifyMode::PEER);
    let client = EchoClient::from_connector(Some(builder.build()), "localhost");

    assert!(client.ping(addr).is_err());
    let outcome = server.join().unwrap();
    assert!(matches!(outcome, Err(Error::Handshake(_))), "{outcome:?}");
}

#[test]
fn client_certificate_from_another_root_is_rejected() {
    let trusted = &trusted().1;
    let rogue = &rogue().1;
    let server_store = ArtifactStore::new(trusted.clone());
    let (addr, server) = spawn_server(TransportSecurity::MutualTls, &server_store);

    let client_store = ArtifactStore::new(ArtifactLocations {
        client_certificate: rogue.client_certificate.clone(),
        client_private_key: rogue.client_private_key.clone(),
        ..trusted.clone()
    });
    let client =
        EchoClient::new(TransportSecurity::MutualTls, &client_store, "localhost").unwrap();

    assert!(client.ping(addr).is_err());
    let outcome = server.join().unwrap();
    assert!(matches!(outcome, Err(Error::Handshake(_))), "{outcome:?}");
}

#[test]
fn server_name_outside_the_certificate_is_rejected() {
    let store = ArtifactStore::new(trusted().1.clone());
    let (addr, server) = spawn_server(TransportSecurity::MutualTls, &store);

    let client =
        EchoClient::new(TransportSecurity::MutualTls, &store, "elsewhere.example").unwrap();
    let err = client.ping(addr).unwrap_err();
    assert!(matches!(err, Error::Handshake(_)), "{err}");
    assert!(server.join().unwrap().is_err());
}

#[test]
fn server_certificate_from_another_root_is_rejected() {
    let (addr, server) = spawn_server(
        TransportSecurity::MutualTls,
        &ArtifactStore::new(rogue().1.clone()),
    );

    let store = ArtifactStore::new(trusted().1.clone());
    let client = EchoClient::new(TransportSecurity::MutualTls, &store, "localhost").unwrap();
    let err = client.ping(addr).unwrap_err();
    assert!(matches!(err, Error::Handshake(_)), "{err}");
    assert!(server.join().unwrap().is_err());
}

#[test]
fn insecure_mode_needs_no_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(ArtifactLocations::in_directory(dir.path()));
    let (addr, server) = spawn_server(TransportSecurity::Insecure, &store);

    let client = EchoClient::new(TransportSecurity::Insecure, &store, "localhost").unwrap();
    assert_eq!(client.ping(addr).unwrap(), Response::Pong);
    server.join().unwrap().unwrap();
}
