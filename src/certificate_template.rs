//! Certificate templates: everything an identity declares before it is signed.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use openssl::nid::Nid;
use openssl::x509::{X509Name, X509NameBuilder};

use crate::error::{Error, Result};

/// Key usage bits this crate issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyUsage {
    DigitalSignature,
    KeyEncipherment,
    CertificateSigning,
}

/// Extended key usage purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExtendedKeyUsage {
    ServerAuth,
    ClientAuth,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectAltName {
    Dns(String),
    Ip(IpAddr),
}

impl SubjectAltName {
    /// Parse a configured name: IP literals become IP entries, everything else DNS.
    pub fn parse(name: &str) -> Self {
        match name.parse::<IpAddr>() {
            Ok(ip) => SubjectAltName::Ip(ip),
            Err(_) => SubjectAltName::Dns(name.to_string()),
        }
    }
}

/// Subject distinguished name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinguishedName {
    pub common_name: String,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
}

impl DistinguishedName {
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            organization: None,
            organizational_unit: None,
        }
    }

    pub fn organization(mut self, organization: Option<String>) -> Self {
        self.organization = organization;
        self
    }

    pub fn organizational_unit(mut self, organizational_unit: Option<String>) -> Self {
        self.organizational_unit = organizational_unit;
        self
    }

    pub(crate) fn to_x509_name(&self) -> Result<X509Name> {
        if self.common_name.is_empty() {
            return Err(Error::InvalidTemplate(
                "subject common name must not be empty".to_string(),
            ));
        }
        let mut name_builder =
            X509NameBuilder::new().map_err(Error::issuance("create name builder"))?;
        name_builder
            .append_entry_by_nid(Nid::COMMONNAME, &self.common_name)
            .map_err(Error::issuance("set CN"))?;
        if let Some(organization) = &self.organization {
            name_builder
                .append_entry_by_nid(Nid::ORGANIZATIONNAME, organization)
                .map_err(Error::issuance("set organization"))?;
        }
        if let Some(unit) = &self.organizational_unit {
            name_builder
                .append_entry_by_nid(Nid::ORGANIZATIONALUNITNAME, unit)
                .map_err(Error::issuance("set organizational unit"))?;
        }
        Ok(name_builder.build())
    }
}

/// Validity window in unix seconds. Both bounds are inclusive per X.509.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityWindow {
    not_before: i64,
    not_after: i64,
}

impl ValidityWindow {
    pub fn new(not_before: i64, not_after: i64) -> Result<Self> {
        if not_after <= not_before {
            return Err(Error::InvalidTemplate(format!(
                "not_after ({not_after}) must be later than not_before ({not_before})"
            )));
        }
        Ok(Self {
            not_before,
            not_after,
        })
    }

    /// Window starting at the current time and lasting `lifetime`.
    pub fn starting_now(lifetime: Duration) -> Result<Self> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| Error::InvalidTemplate("system clock is before 1970".to_string()))?;
        let not_before = i64::try_from(now.as_secs())
            .map_err(|_| Error::InvalidTemplate("current time out of range".to_string()))?;
        let lifetime = i64::try_from(lifetime.as_secs())
            .map_err(|_| Error::InvalidTemplate("validity lifetime out of range".to_string()))?;
        Self::new(not_before, not_before.saturating_add(lifetime))
    }

    pub fn not_before(&self) -> i64 {
        self.not_before
    }

    pub fn not_after(&self) -> i64 {
        self.not_after
    }

    pub fn lifetime(&self) -> Duration {
        Duration::from_secs((self.not_after - self.not_before) as u64)
    }
}

/// Declared attributes of an identity prior to signing.
#[derive(Debug, Clone)]
pub struct CertificateTemplate {
    pub subject: DistinguishedName,
    pub validity: ValidityWindow,
    pub key_usage: BTreeSet<KeyUsage>,
    pub extended_key_usage: BTreeSet<ExtendedKeyUsage>,
    pub subject_alt_names: Vec<SubjectAltName>,
    pub is_ca: bool,
    pub basic_constraints_valid: bool,
}

impl CertificateTemplate {
    /// A template with no usages, not a CA, basic constraints present.
    pub fn new(subject: DistinguishedName, validity: ValidityWindow) -> Self {
        Self {
            subject,
            validity,
            key_usage: BTreeSet::new(),
            extended_key_usage: BTreeSet::new(),
            subject_alt_names: Vec::new(),
            is_ca: false,
            basic_constraints_valid: true,
        }
    }

    pub fn with_key_usage(mut self, usages: impl IntoIterator<Item = KeyUsage>) -> Self {
        self.key_usage.extend(usages);
        self
    }

    pub fn with_extended_key_usage(
        mut self,
        purposes: impl IntoIterator<Item = ExtendedKeyUsage>,
    ) -> Self {
        self.extended_key_usage.extend(purposes);
        self
    }

    pub fn with_subject_alt_names(
        mut self,
        names: impl IntoIterator<Item = SubjectAltName>,
    ) -> Self {
        self.subject_alt_names.extend(names);
        self
    }

    pub fn certificate_authority(mut self) -> Self {
        self.is_ca = true;
        self.basic_constraints_valid = true;
        self
    }

    /// True when the template describes a key allowed to sign certificates.
    pub fn can_sign_certificates(&self) -> bool {
        self.is_ca
            && self.basic_constraints_valid
            && self.key_usage.contains(&KeyUsage::CertificateSigning)
    }
}
