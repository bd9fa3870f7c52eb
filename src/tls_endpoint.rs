//! Mutual TLS endpoint configuration.
//!
//! Both sides present their own certificate and private key and trust exactly
//! one anchor: the persisted root certificate. The server refuses clients that
//! present no certificate; the client checks the server chain and the server
//! name against the certificate's subject alternative names.

use openssl::error::ErrorStack;
use openssl::ssl::{SslAcceptor, SslConnector, SslMethod, SslVerifyMode};
use tracing::info;

use crate::chain_verification::trust_store;
use crate::error::{Error, Result};
use crate::storage::{Artifact, ArtifactStore};

/// Whether the transport authenticates both peers or runs as plain TCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportSecurity {
    #[default]
    MutualTls,
    /// Escape hatch: no TLS at all. Only for debugging the echo exchange.
    Insecure,
}

impl TransportSecurity {
    pub fn from_insecure_flag(insecure: bool) -> Self {
        if insecure {
            TransportSecurity::Insecure
        } else {
            TransportSecurity::MutualTls
        }
    }
}

fn configure(step: &'static str) -> impl FnOnce(ErrorStack) -> Error {
    move |e| Error::Handshake(format!("failed to {step}: {e}"))
}

/// Server side: requires and verifies a client certificate issued by the root.
pub fn server_acceptor(store: &ArtifactStore) -> Result<SslAcceptor> {
    let certificate = store.load_certificate(Artifact::ServerCertificate)?;
    let key_pair = store.load_key_pair(Artifact::ServerPrivateKey)?;
    info!("server cert loaded");
    let root = store.load_certificate(Artifact::RootCertificate)?;

    let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls_server())
        .map_err(configure("create TLS acceptor"))?;
    builder
        .set_certificate(certificate.as_x509())
        .map_err(configure("set server certificate"))?;
    builder
        .set_private_key(key_pair.private_key())
        .map_err(configure("set server private key"))?;
    builder.check_private_key().map_err(|_| {
        Error::TrustVerification(
            "server private key does not match the server certificate".to_string(),
        )
    })?;

    builder
        .add_client_ca(root.as_x509())
        .map_err(configure("advertise client CA"))?;
    builder
        .set_verify_cert_store(trust_store(&root)?)
        .map_err(configure("install trust anchor"))?;
    builder.set_verify(SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT);
    info!("root CA added as the only client trust anchor");

    Ok(builder.build())
}

/// Client side: presents the client certificate and verifies the server
/// against the root. Hostname checking happens in [`SslConnector::connect`].
pub fn client_connector(store: &ArtifactStore) -> Result<SslConnector> {
    let certificate = store.load_certificate(Artifact::ClientCertificate)?;
    let key_pair = store.load_key_pair(Artifact::ClientPrivateKey)?;
    let root = store.load_certificate(Artifact::RootCertificate)?;

    let mut builder =
        SslConnector::builder(SslMethod::tls_client()).map_err(configure("create TLS connector"))?;
    builder
        .set_certificate(certificate.as_x509())
        .map_err(configure("set client certificate"))?;
    builder
        .set_private_key(key_pair.private_key())
        .map_err(configure("set client private key"))?;
    builder.check_private_key().map_err(|_| {
        Error::TrustVerification(
            "client private key does not match the client certificate".to_string(),
        )
    })?;
    builder
        .set_verify_cert_store(trust_store(&root)?)
        .map_err(configure("install trust anchor"))?;
    builder.set_verify(SslVerifyMode::PEER);

    Ok(builder.build())
}
