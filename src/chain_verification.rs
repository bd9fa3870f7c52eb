//! Load-and-verify for a persisted trust chain.
//!
//! Re-reads every artifact from disk and checks the properties the TLS endpoints
//! depend on before a server or client is started against them.

use std::net::IpAddr;

use openssl::stack::Stack;
use openssl::x509::store::{X509Store, X509StoreBuilder};
use openssl::x509::{X509StoreContext, X509};
use tracing::info;

use crate::error::{Error, Result};
use crate::issue_certificate::Certificate;
use crate::serial_number::SerialNumber;
use crate::storage::{Artifact, ArtifactStore};

/// Serials of a chain that passed verification.
#[derive(Debug, Clone)]
pub struct VerifiedChain {
    pub root_serial: SerialNumber,
    pub server_serial: SerialNumber,
    pub client_serial: SerialNumber,
}

/// Verify the persisted chain.
///
/// Checks that the root is self-signed, that both leaves chain to the root
/// (signature, validity window, CA constraints), that each private key belongs
/// to its certificate, and that `server_name` is among the server certificate's
/// subject alternative names.
pub fn verify_persisted_chain(store: &ArtifactStore, server_name: &str) -> Result<VerifiedChain> {
    let root = store.load_certificate(Artifact::RootCertificate)?;
    let root_public = root.public_key()?;
    if !root.is_self_issued()? || !root.is_signed_by(&root_public)? {
        return Err(Error::TrustVerification(
            "root certificate is not self-signed".to_string(),
        ));
    }
    let trust_anchor = trust_store(&root)?;

    let server = store.load_certificate(Artifact::ServerCertificate)?;
    verify_leaf(&trust_anchor, &server, "server")?;
    let server_key = store.load_key_pair(Artifact::ServerPrivateKey)?;
    if !server.matches_key_pair(&server_key)? {
        return Err(Error::TrustVerification(
            "server private key does not match the server certificate".to_string(),
        ));
    }
    if !matches_host(&server, server_name) {
        return Err(Error::TrustVerification(format!(
            "server certificate has no subject alternative name for {server_name}"
        )));
    }

    let client = store.load_certificate(Artifact::ClientCertificate)?;
    verify_leaf(&trust_anchor, &client, "client")?;
    let client_key = store.load_key_pair(Artifact::ClientPrivateKey)?;
    if !client.matches_key_pair(&client_key)? {
        return Err(Error::TrustVerification(
            "client private key does not match the client certificate".to_string(),
        ));
    }

    let verified = VerifiedChain {
        root_serial: root.serial_number()?,
        server_serial: server.serial_number()?,
        client_serial: client.serial_number()?,
    };
    info!(
        root = %verified.root_serial,
        server = %verified.server_serial,
        client = %verified.client_serial,
        "persisted trust chain verified"
    );
    Ok(verified)
}

/// An X509 store holding `root` as its only trust anchor.
pub fn trust_store(root: &Certificate) -> Result<X509Store> {
    let mut builder = X509StoreBuilder::new().map_err(Error::TrustStore)?;
    builder
        .add_cert(root.as_x509().to_owned())
        .map_err(Error::TrustStore)?;
    Ok(builder.build())
}

fn verify_leaf(trust_anchor: &X509Store, leaf: &Certificate, label: &str) -> Result<()> {
    let chain = Stack::<X509>::new().map_err(Error::TrustStore)?;
    let mut context = X509StoreContext::new().map_err(Error::TrustStore)?;
    let failure = context
        .init(trust_anchor, leaf.as_x509(), &chain, |ctx| {
            let valid = ctx.verify_cert()?;
            Ok(if valid {
                None
            } else {
                Some(ctx.error().error_string())
            })
        })
        .map_err(Error::TrustStore)?;

    match failure {
        None => Ok(()),
        Some(reason) => Err(Error::TrustVerification(format!(
            "{label} certificate does not chain to the root: {reason}"
        ))),
    }
}

/// Exact, case-insensitive match against DNS names, or an IP match when
/// `host` is an address literal.
pub fn matches_host(certificate: &Certificate, host: &str) -> bool {
    let Some(names) = certificate.as_x509().subject_alt_names() else {
        return false;
    };
    let ip = host.parse::<IpAddr>().ok();
    names.iter().any(|name| match (ip, name.ipaddress(), name.dnsname()) {
        (Some(IpAddr::V4(v4)), Some(octets), _) => octets == v4.octets(),
        (Some(IpAddr::V6(v6)), Some(octets), _) => octets == v6.octets(),
        (None, _, Some(dns)) => dns.eq_ignore_ascii_case(host),
        _ => false,
    })
}
