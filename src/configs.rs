use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::certificate_template::{DistinguishedName, SubjectAltName};
use crate::storage::ArtifactLocations;
use crate::tls_endpoint::TransportSecurity;
use crate::trust_chain::ChainPolicy;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub artifacts: ArtifactPaths,
    #[serde(default)]
    pub validity: Validity,
    #[serde(default)]
    pub subjects: Subjects,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    /// Disable TLS for both the server and the client.
    #[serde(default)]
    pub insecure: bool,
}

/// Artifact directory plus optional per-file overrides.
#[derive(Debug, Deserialize, Clone)]
pub struct ArtifactPaths {
    #[serde(default = "default_artifact_dir")]
    pub directory: PathBuf,
    pub root_certificate: Option<PathBuf>,
    pub server_certificate: Option<PathBuf>,
    pub server_private_key: Option<PathBuf>,
    pub client_certificate: Option<PathBuf>,
    pub client_private_key: Option<PathBuf>,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            directory: default_artifact_dir(),
            root_certificate: None,
            server_certificate: None,
            server_private_key: None,
            client_certificate: None,
            client_private_key: None,
        }
    }
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("dist")
}

#[derive(Debug, Deserialize, Clone)]
pub struct Validity {
    #[serde(default = "default_validity_hours")]
    pub hours: u64,
}

impl Default for Validity {
    fn default() -> Self {
        Self {
            hours: default_validity_hours(),
        }
    }
}

fn default_validity_hours() -> u64 {
    1200 // 50 days
}

#[derive(Debug, Deserialize, Clone)]
pub struct Subjects {
    #[serde(default = "default_root_cn")]
    pub root_common_name: String,
    #[serde(default = "default_server_cn")]
    pub server_common_name: String,
    #[serde(default = "default_client_cn")]
    pub client_common_name: String,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
}

impl Default for Subjects {
    fn default() -> Self {
        Self {
            root_common_name: default_root_cn(),
            server_common_name: default_server_cn(),
            client_common_name: default_client_cn(),
            organization: None,
            organizational_unit: None,
        }
    }
}

fn default_root_cn() -> String {
    "mtls-chain Root CA".to_string()
}

fn default_server_cn() -> String {
    "localhost".to_string()
}

fn default_client_cn() -> String {
    "mtls-chain client".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Names placed in the server certificate's subject alternative names.
    #[serde(default = "default_names")]
    pub hostnames: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            hostnames: default_names(),
        }
    }
}

fn default_listen_address() -> String {
    "0.0.0.0:4242".to_string()
}

fn default_names() -> Vec<String> {
    vec!["test".to_string(), "localhost".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    #[serde(default = "default_server_address")]
    pub server_address: String,
    /// Name the server certificate is checked against.
    #[serde(default = "default_server_name")]
    pub server_name: String,
    /// Names placed in the client certificate's subject alternative names.
    #[serde(default = "default_names")]
    pub names: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: default_server_address(),
            server_name: default_server_name(),
            names: default_names(),
        }
    }
}

fn default_server_address() -> String {
    "localhost:4242".to_string()
}

fn default_server_name() -> String {
    "localhost".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig =
            toml::from_str(&config_str).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load from `path` when given, otherwise use the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn artifact_locations(&self) -> ArtifactLocations {
        let paths = &self.artifacts;
        let defaults = ArtifactLocations::in_directory(&paths.directory);
        ArtifactLocations {
            root_certificate: paths
                .root_certificate
                .clone()
                .unwrap_or(defaults.root_certificate),
            server_certificate: paths
                .server_certificate
                .clone()
                .unwrap_or(defaults.server_certificate),
            server_private_key: paths
                .server_private_key
                .clone()
                .unwrap_or(defaults.server_private_key),
            client_certificate: paths
                .client_certificate
                .clone()
                .unwrap_or(defaults.client_certificate),
            client_private_key: paths
                .client_private_key
                .clone()
                .unwrap_or(defaults.client_private_key),
        }
    }

    pub fn chain_policy(&self) -> ChainPolicy {
        let subject = |cn: &str| {
            DistinguishedName::new(cn)
                .organization(self.subjects.organization.clone())
                .organizational_unit(self.subjects.organizational_unit.clone())
        };
        ChainPolicy {
            validity: Duration::from_secs(self.validity.hours.saturating_mul(3600)),
            root_subject: subject(&self.subjects.root_common_name),
            server_subject: subject(&self.subjects.server_common_name),
            client_subject: subject(&self.subjects.client_common_name),
            server_names: self
                .server
                .hostnames
                .iter()
                .map(|n| SubjectAltName::parse(n))
                .collect(),
            client_names: self
                .client
                .names
                .iter()
                .map(|n| SubjectAltName::parse(n))
                .collect(),
        }
    }

    pub fn transport_security(&self) -> TransportSecurity {
        TransportSecurity::from_insecure_flag(self.insecure)
    }
}
