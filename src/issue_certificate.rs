//! Certificate Issuance Module
//!
//! Turns a [`CertificateTemplate`] plus a subject public key into a signed
//! X.509v3 certificate. The same code path issues both kinds of certificate in
//! the chain:
//!
//! ```text
//! Root CA (self-signed, parent = None)
//!   ├── Server leaf (parent = root, signed with the root key)
//!   └── Client leaf (parent = root, signed with the root key)
//! ```
//!
//! # Certificate Properties
//! - **Version**: X.509v3
//! - **Signature Algorithm**: SHA-256 with RSA
//! - **Serial Number**: fresh random 128-bit value per call
//! - **Extensions**: basic constraints, key usage and extended key usage from the
//!   template, subject alternative names when present, subject key identifier,
//!   and an authority key identifier for CA-signed certificates
//!
//! The issuer does not decide whether a template is allowed to be a CA. That
//! policy lives in [`crate::trust_chain`].

use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{HasPublic, PKey, PKeyRef, Public};
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage as EkuExtension,
    KeyUsage as KeyUsageExtension, SubjectAlternativeName, SubjectKeyIdentifier,
};
use openssl::x509::{X509NameRef, X509Ref, X509};
use tracing::debug;

use crate::certificate_template::{
    CertificateTemplate, ExtendedKeyUsage, KeyUsage, SubjectAltName,
};
use crate::error::{Error, Result};
use crate::generate_key_pair::KeyPair;
use crate::serial_number::SerialNumber;

const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2

/// A signed, immutable X.509 certificate.
#[derive(Clone)]
pub struct Certificate {
    x509: X509,
}

impl Certificate {
    pub fn from_x509(x509: X509) -> Self {
        Self { x509 }
    }

    /// Decode exactly one certificate. Bytes after the certificate are rejected.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let x509 = X509::from_der(der).map_err(Error::Decode)?;
        let encoded = x509.to_der().map_err(Error::Decode)?;
        if encoded != der {
            return Err(Error::NonCanonicalEncoding {
                expected: encoded.len(),
                actual: der.len(),
            });
        }
        Ok(Self { x509 })
    }

    pub fn as_x509(&self) -> &X509Ref {
        &self.x509
    }

    /// Standard DER encoding of the certificate.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.x509.to_der().map_err(Error::issuance("encode certificate"))
    }

    pub fn serial_number(&self) -> Result<SerialNumber> {
        SerialNumber::from_asn1(self.x509.serial_number())
    }

    pub fn public_key(&self) -> Result<PKey<Public>> {
        self.x509.public_key().map_err(Error::Decode)
    }

    pub fn subject_common_name(&self) -> Option<String> {
        common_name(self.x509.subject_name())
    }

    pub fn issuer_common_name(&self) -> Option<String> {
        common_name(self.x509.issuer_name())
    }

    /// Issuer name equals subject name.
    pub fn is_self_issued(&self) -> Result<bool> {
        let subject = self.x509.subject_name().to_der().map_err(Error::Decode)?;
        let issuer = self.x509.issuer_name().to_der().map_err(Error::Decode)?;
        Ok(subject == issuer)
    }

    /// Issuer name of `self` equals subject name of `issuer`.
    pub fn names_issuer(&self, issuer: &Certificate) -> Result<bool> {
        let expected = issuer.x509.subject_name().to_der().map_err(Error::Decode)?;
        let actual = self.x509.issuer_name().to_der().map_err(Error::Decode)?;
        Ok(expected == actual)
    }

    /// Check the certificate signature against `key`.
    pub fn is_signed_by<T: HasPublic>(&self, key: &PKeyRef<T>) -> Result<bool> {
        self.x509.verify(key).map_err(Error::Decode)
    }

    /// The certificate was issued for the private half of `key_pair`.
    pub fn matches_key_pair(&self, key_pair: &KeyPair) -> Result<bool> {
        Ok(self.public_key()?.public_eq(key_pair.private_key()))
    }
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject_common_name())
            .field("issuer", &self.issuer_common_name())
            .field("serial", &self.serial_number().ok())
            .finish()
    }
}

pub(crate) fn common_name(name: &X509NameRef) -> Option<String> {
    name.entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().to_string().ok())
}

/// Issue a certificate for `subject_public_key` described by `template`.
///
/// With `parent == None` the certificate is self-signed: the template subject is
/// also the issuer and `signer` must be the subject's own key pair. With a
/// parent, the issuer name is copied from the parent's subject and `signer`
/// must hold the private key matching the parent certificate.
///
/// # Errors
/// - [`Error::SerialGeneration`] if the random serial cannot be drawn
/// - [`Error::InvalidTemplate`] if the signer does not match the parent, or
///   the subject name is unusable
/// - [`Error::Issuance`] for any failure while building or signing
pub fn issue_certificate<T: HasPublic>(
    subject_public_key: &PKeyRef<T>,
    signer: &KeyPair,
    template: &CertificateTemplate,
    parent: Option<&Certificate>,
) -> Result<Certificate> {
    if let Some(parent) = parent {
        if !parent.matches_key_pair(signer)? {
            return Err(Error::InvalidTemplate(
                "signer key does not belong to the parent certificate".to_string(),
            ));
        }
    }

    let mut builder = X509::builder().map_err(Error::issuance("create X509 builder"))?;
    builder
        .set_version(X509_VERSION_3)
        .map_err(Error::issuance("set version"))?;

    let serial = SerialNumber::generate()?;
    let serial_asn1 = serial.to_asn1_integer()?;
    builder
        .set_serial_number(&serial_asn1)
        .map_err(Error::issuance("set serial number"))?;

    let subject_name = template.subject.to_x509_name()?;
    builder
        .set_subject_name(&subject_name)
        .map_err(Error::issuance("set subject"))?;
    match parent {
        Some(parent) => builder
            .set_issuer_name(parent.as_x509().subject_name())
            .map_err(Error::issuance("set issuer from parent"))?,
        None => builder
            .set_issuer_name(&subject_name)
            .map_err(Error::issuance("set issuer"))?,
    }

    let not_before = openssl::asn1::Asn1Time::from_unix(template.validity.not_before() as _)
        .map_err(Error::issuance("create not_before"))?;
    builder
        .set_not_before(&not_before)
        .map_err(Error::issuance("set not_before"))?;
    let not_after = openssl::asn1::Asn1Time::from_unix(template.validity.not_after() as _)
        .map_err(Error::issuance("create not_after"))?;
    builder
        .set_not_after(&not_after)
        .map_err(Error::issuance("set not_after"))?;

    builder
        .set_pubkey(subject_public_key)
        .map_err(Error::issuance("set public key"))?;

    if template.basic_constraints_valid {
        let mut bc = BasicConstraints::new();
        bc.critical();
        if template.is_ca {
            bc.ca();
        }
        let extension = bc
            .build()
            .map_err(Error::issuance("build BasicConstraints"))?;
        builder
            .append_extension(extension)
            .map_err(Error::issuance("add BasicConstraints"))?;
    }

    if !template.key_usage.is_empty() {
        let mut ku = KeyUsageExtension::new();
        ku.critical();
        for usage in &template.key_usage {
            match usage {
                KeyUsage::DigitalSignature => ku.digital_signature(),
                KeyUsage::KeyEncipherment => ku.key_encipherment(),
                KeyUsage::CertificateSigning => ku.key_cert_sign(),
            };
        }
        let extension = ku.build().map_err(Error::issuance("build KeyUsage"))?;
        builder
            .append_extension(extension)
            .map_err(Error::issuance("add KeyUsage"))?;
    }

    if !template.extended_key_usage.is_empty() {
        let mut eku = EkuExtension::new();
        for purpose in &template.extended_key_usage {
            match purpose {
                ExtendedKeyUsage::ServerAuth => eku.server_auth(),
                ExtendedKeyUsage::ClientAuth => eku.client_auth(),
            };
        }
        let extension = eku
            .build()
            .map_err(Error::issuance("build ExtendedKeyUsage"))?;
        builder
            .append_extension(extension)
            .map_err(Error::issuance("add ExtendedKeyUsage"))?;
    }

    if !template.subject_alt_names.is_empty() {
        let mut san = SubjectAlternativeName::new();
        for name in &template.subject_alt_names {
            match name {
                SubjectAltName::Dns(dns) => san.dns(dns),
                SubjectAltName::Ip(ip) => san.ip(&ip.to_string()),
            };
        }
        let extension = san
            .build(&builder.x509v3_context(parent.map(|p| p.as_x509()), None))
            .map_err(Error::issuance("build SubjectAlternativeName"))?;
        builder
            .append_extension(extension)
            .map_err(Error::issuance("add SubjectAlternativeName"))?;
    }

    let ski = SubjectKeyIdentifier::new()
        .build(&builder.x509v3_context(parent.map(|p| p.as_x509()), None))
        .map_err(Error::issuance("build SubjectKeyIdentifier"))?;
    builder
        .append_extension(ski)
        .map_err(Error::issuance("add SubjectKeyIdentifier"))?;

    if let Some(parent) = parent {
        let aki = AuthorityKeyIdentifier::new()
            .keyid(false)
            .build(&builder.x509v3_context(Some(parent.as_x509()), None))
            .map_err(Error::issuance("build AuthorityKeyIdentifier"))?;
        builder
            .append_extension(aki)
            .map_err(Error::issuance("add AuthorityKeyIdentifier"))?;
    }

    builder
        .sign(signer.private_key(), MessageDigest::sha256())
        .map_err(Error::issuance("sign certificate"))?;

    debug!(
        subject = %template.subject.common_name,
        serial = %serial,
        self_signed = parent.is_none(),
        "issued certificate"
    );
    Ok(Certificate::from_x509(builder.build()))
}
