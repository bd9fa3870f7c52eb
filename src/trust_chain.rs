//! Trust Chain Generation Module
//!
//! Builds the three identities of the chain in a fixed order and applies the
//! role policy to each template before it is signed:
//!
//! ```text
//! Root CA   CA=true   keyCertSign, digitalSignature
//!   ├── Server   CA=false  digitalSignature, keyEncipherment   EKU serverAuth   SAN = server hostnames
//!   └── Client   CA=false  digitalSignature, keyEncipherment   EKU clientAuth   SAN = client names
//! ```
//!
//! The hierarchy is flat: both leaves are signed directly by the root and there
//! is no intermediate tier. All three certificates share one validity window
//! anchored at generation time.

use std::time::Duration;

use tracing::info;

use crate::certificate_template::{
    CertificateTemplate, DistinguishedName, ExtendedKeyUsage, KeyUsage, SubjectAltName,
    ValidityWindow,
};
use crate::error::{Error, Result, Role};
use crate::generate_key_pair::KeyPair;
use crate::issue_certificate::{issue_certificate, Certificate};
use crate::storage::{Artifact, ArtifactStore};

/// Role-specific knobs for chain generation.
#[derive(Debug, Clone)]
pub struct ChainPolicy {
    pub validity: Duration,
    pub root_subject: DistinguishedName,
    pub server_subject: DistinguishedName,
    pub client_subject: DistinguishedName,
    pub server_names: Vec<SubjectAltName>,
    pub client_names: Vec<SubjectAltName>,
}

impl Default for ChainPolicy {
    fn default() -> Self {
        let names = vec![
            SubjectAltName::Dns("test".to_string()),
            SubjectAltName::Dns("localhost".to_string()),
        ];
        Self {
            validity: Duration::from_secs(1200 * 3600),
            root_subject: DistinguishedName::new("mtls-chain Root CA"),
            server_subject: DistinguishedName::new("localhost"),
            client_subject: DistinguishedName::new("mtls-chain client"),
            server_names: names.clone(),
            client_names: names,
        }
    }
}

impl ChainPolicy {
    pub fn root_template(&self, validity: ValidityWindow) -> CertificateTemplate {
        CertificateTemplate::new(self.root_subject.clone(), validity)
            .certificate_authority()
            .with_key_usage([KeyUsage::CertificateSigning, KeyUsage::DigitalSignature])
    }

    pub fn server_template(&self, validity: ValidityWindow) -> CertificateTemplate {
        CertificateTemplate::new(self.server_subject.clone(), validity)
            .with_key_usage([KeyUsage::KeyEncipherment, KeyUsage::DigitalSignature])
            .with_extended_key_usage([ExtendedKeyUsage::ServerAuth])
            .with_subject_alt_names(self.server_names.iter().cloned())
    }

    pub fn client_template(&self, validity: ValidityWindow) -> CertificateTemplate {
        CertificateTemplate::new(self.client_subject.clone(), validity)
            .with_key_usage([KeyUsage::KeyEncipherment, KeyUsage::DigitalSignature])
            .with_extended_key_usage([ExtendedKeyUsage::ClientAuth])
            .with_subject_alt_names(self.client_names.iter().cloned())
    }
}

/// A certificate together with the key pair it was issued for.
#[derive(Debug)]
pub struct Identity {
    pub key_pair: KeyPair,
    pub certificate: Certificate,
    can_sign_certificates: bool,
}

impl Identity {
    /// Issued from a CA template carrying certificate signing.
    pub fn can_sign_certificates(&self) -> bool {
        self.can_sign_certificates
    }
}

/// Root, server and client identities. Immutable once built.
#[derive(Debug)]
pub struct TrustChain {
    root: Identity,
    server: Identity,
    client: Identity,
}

impl TrustChain {
    pub fn root(&self) -> &Identity {
        &self.root
    }

    pub fn server(&self) -> &Identity {
        &self.server
    }

    pub fn client(&self) -> &Identity {
        &self.client
    }

    /// Write the five runtime artifacts. The root private key stays in memory.
    ///
    /// Either every artifact lands on disk or none does.
    pub fn persist(&self, store: &ArtifactStore) -> Result<()> {
        let artifacts = [
            (Artifact::RootCertificate, self.root.certificate.to_der()?),
            (Artifact::ServerCertificate, self.server.certificate.to_der()?),
            (Artifact::ServerPrivateKey, self.server.key_pair.private_key_to_pkcs8()?),
            (Artifact::ClientCertificate, self.client.certificate.to_der()?),
            (Artifact::ClientPrivateKey, self.client.key_pair.private_key_to_pkcs8()?),
        ];
        store.save_all(&artifacts)?;
        info!(directory = %store.locations().describe(), "trust chain persisted");
        Ok(())
    }
}

/// Runs the issuance pipeline: root, then server, then client.
pub struct TrustChainBuilder {
    policy: ChainPolicy,
}

impl TrustChainBuilder {
    pub fn new(policy: ChainPolicy) -> Self {
        Self { policy }
    }

    /// Generate the whole chain. Any failure aborts the run; there is no
    /// partially built chain.
    pub fn build(&self) -> Result<TrustChain> {
        let validity = ValidityWindow::starting_now(self.policy.validity)?;

        let root = self
            .issue_root(self.policy.root_template(validity))
            .map_err(Error::in_step(Role::Root))?;
        let server = self
            .issue_leaf(&root, self.policy.server_template(validity), Role::Server)
            .map_err(Error::in_step(Role::Server))?;
        let client = self
            .issue_leaf(&root, self.policy.client_template(validity), Role::Client)
            .map_err(Error::in_step(Role::Client))?;

        info!("certificates generated");
        Ok(TrustChain {
            root,
            server,
            client,
        })
    }

    fn issue_root(&self, template: CertificateTemplate) -> Result<Identity> {
        if !template.can_sign_certificates() {
            return Err(Error::InvalidTemplate(
                "root template must be a CA with certificate signing".to_string(),
            ));
        }
        info!("generating the root CA private key");
        let key_pair = KeyPair::generate()?;
        info!("generating the root CA certificate");
        let certificate = issue_certificate(key_pair.private_key(), &key_pair, &template, None)?;
        Ok(Identity {
            key_pair,
            certificate,
            can_sign_certificates: true,
        })
    }

    fn issue_leaf(
        &self,
        root: &Identity,
        template: CertificateTemplate,
        role: Role,
    ) -> Result<Identity> {
        if template.is_ca || template.key_usage.contains(&KeyUsage::CertificateSigning) {
            return Err(Error::InvalidTemplate(format!(
                "{role} certificate must not be able to sign certificates"
            )));
        }
        if !root.can_sign_certificates() {
            return Err(Error::InvalidTemplate(format!(
                "{role} certificate parent is not a CA allowed to sign certificates"
            )));
        }
        if !root.certificate.is_self_issued()? {
            return Err(Error::InvalidTemplate(format!(
                "{role} certificate must be issued by the self-signed root"
            )));
        }
        info!("generating the {role} private key");
        let key_pair = KeyPair::generate()?;
        info!("generating the {role} certificate");
        let certificate = issue_certificate(
            key_pair.private_key(),
            &root.key_pair,
            &template,
            Some(&root.certificate),
        )?;
        Ok(Identity {
            key_pair,
            certificate,
            can_sign_certificates: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_templates_carry_role_usages() {
        let policy = ChainPolicy::default();
        let window = ValidityWindow::starting_now(policy.validity).unwrap();

        let root = policy.root_template(window);
        assert!(root.can_sign_certificates());
        assert!(root.extended_key_usage.is_empty());

        let server = policy.server_template(window);
        assert!(!server.is_ca);
        assert!(server.extended_key_usage.contains(&ExtendedKeyUsage::ServerAuth));
        assert!(!server.extended_key_usage.contains(&ExtendedKeyUsage::ClientAuth));
        assert!(server
            .subject_alt_names
            .contains(&SubjectAltName::Dns("localhost".to_string())));

        let client = policy.client_template(window);
        assert!(client.extended_key_usage.contains(&ExtendedKeyUsage::ClientAuth));
        assert!(!client.extended_key_usage.contains(&ExtendedKeyUsage::ServerAuth));
    }

    #[test]
    fn root_without_cert_sign_is_refused() {
        let builder = TrustChainBuilder::new(ChainPolicy::default());
        let window = ValidityWindow::starting_now(Duration::from_secs(60)).unwrap();
        let template = CertificateTemplate::new(DistinguishedName::new("not a CA"), window)
            .with_key_usage([KeyUsage::DigitalSignature]);

        let err = builder.issue_root(template).unwrap_err();
        assert!(matches!(err, Error::InvalidTemplate(_)));
    }

    #[test]
    fn leaf_parent_must_be_a_signing_ca() {
        let builder = TrustChainBuilder::new(ChainPolicy::default());
        let window = ValidityWindow::starting_now(Duration::from_secs(60)).unwrap();
        let key_pair = KeyPair::generate().unwrap();
        let template = CertificateTemplate::new(DistinguishedName::new("self-signed leaf"), window)
            .with_key_usage([KeyUsage::DigitalSignature]);
        let certificate =
            issue_certificate(key_pair.private_key(), &key_pair, &template, None).unwrap();
        let not_a_ca = Identity {
            key_pair,
            certificate,
            can_sign_certificates: false,
        };
        assert!(not_a_ca.certificate.is_self_issued().unwrap());

        let err = builder
            .issue_leaf(&not_a_ca, builder.policy.server_template(window), Role::Server)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTemplate(_)), "{err}");
    }

    #[test]
    fn zero_validity_fails_before_any_key_is_generated() {
        let policy = ChainPolicy {
            validity: Duration::ZERO,
            ..ChainPolicy::default()
        };
        let err = TrustChainBuilder::new(policy).build().unwrap_err();
        assert!(matches!(err, Error::InvalidTemplate(_)));
    }

    #[test]
    fn built_chain_is_flat_and_signed_by_root() {
        let chain = TrustChainBuilder::new(ChainPolicy::default()).build().unwrap();
        let root_public = chain.root().key_pair.public_key().unwrap();

        assert!(chain.root().certificate.is_self_issued().unwrap());
        assert!(chain.root().can_sign_certificates());
        for leaf in [chain.server(), chain.client()] {
            assert!(!leaf.certificate.is_self_issued().unwrap());
            assert!(leaf.certificate.names_issuer(&chain.root().certificate).unwrap());
            assert!(leaf.certificate.is_signed_by(&root_public).unwrap());
            assert!(leaf.certificate.matches_key_pair(&leaf.key_pair).unwrap());
            assert!(!leaf.can_sign_certificates());
        }
    }
}
