//! Artifact Storage Module
//!
//! Persists the runtime half of a trust chain as PEM files and reads it back for
//! the TLS endpoints. There are exactly five artifacts:
//!
//! | Artifact | Default file | PEM label |
//! |---|---|---|
//! | root certificate | `ca.cert` | `CERTIFICATE` |
//! | server certificate | `server.cert` | `CERTIFICATE` |
//! | server private key | `server.key` | `PRIVATE KEY` (PKCS#8) |
//! | client certificate | `client.cert` | `CERTIFICATE` |
//! | client private key | `client.key` | `PRIVATE KEY` (PKCS#8) |
//!
//! The root private key is a generation-time secret and has no artifact.
//!
//! # Write Safety
//!
//! Every artifact is written to a temporary file in its destination directory and
//! renamed into place, so a reader never observes a truncated file. `save_all`
//! stages the whole set before renaming anything and removes already renamed
//! files if a later rename fails.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use openssl::pkey::PKey;
use pem::{EncodeConfig, LineEnding, Pem};
use tempfile::{NamedTempFile, TempPath};
use tracing::{debug, info, warn};

use crate::error::{Error, Result, Role};
use crate::generate_key_pair::KeyPair;
use crate::issue_certificate::Certificate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Certificate,
    PrivateKey,
}

impl ArtifactKind {
    pub fn pem_label(&self) -> &'static str {
        match self {
            ArtifactKind::Certificate => "CERTIFICATE",
            ArtifactKind::PrivateKey => "PRIVATE KEY",
        }
    }
}

/// One named file of the persisted chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    RootCertificate,
    ServerCertificate,
    ServerPrivateKey,
    ClientCertificate,
    ClientPrivateKey,
}

impl Artifact {
    pub const ALL: [Artifact; 5] = [
        Artifact::RootCertificate,
        Artifact::ServerCertificate,
        Artifact::ServerPrivateKey,
        Artifact::ClientCertificate,
        Artifact::ClientPrivateKey,
    ];

    pub fn role(&self) -> Role {
        match self {
            Artifact::RootCertificate => Role::Root,
            Artifact::ServerCertificate | Artifact::ServerPrivateKey => Role::Server,
            Artifact::ClientCertificate | Artifact::ClientPrivateKey => Role::Client,
        }
    }

    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::RootCertificate
            | Artifact::ServerCertificate
            | Artifact::ClientCertificate => ArtifactKind::Certificate,
            Artifact::ServerPrivateKey | Artifact::ClientPrivateKey => ArtifactKind::PrivateKey,
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ArtifactKind::Certificate => write!(f, "{} certificate", self.role()),
            ArtifactKind::PrivateKey => write!(f, "{} private key", self.role()),
        }
    }
}

/// Where each artifact lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocations {
    pub root_certificate: PathBuf,
    pub server_certificate: PathBuf,
    pub server_private_key: PathBuf,
    pub client_certificate: PathBuf,
    pub client_private_key: PathBuf,
}

impl ArtifactLocations {
    /// The canonical file names inside `directory`.
    pub fn in_directory(directory: impl AsRef<Path>) -> Self {
        let dir = directory.as_ref();
        Self {
            root_certificate: dir.join("ca.cert"),
            server_certificate: dir.join("server.cert"),
            server_private_key: dir.join("server.key"),
            client_certificate: dir.join("client.cert"),
            client_private_key: dir.join("client.key"),
        }
    }

    pub fn path(&self, artifact: Artifact) -> &Path {
        match artifact {
            Artifact::RootCertificate => &self.root_certificate,
            Artifact::ServerCertificate => &self.server_certificate,
            Artifact::ServerPrivateKey => &self.server_private_key,
            Artifact::ClientCertificate => &self.client_certificate,
            Artifact::ClientPrivateKey => &self.client_private_key,
        }
    }

    pub(crate) fn describe(&self) -> String {
        self.root_certificate
            .parent()
            .map(|dir| dir.display().to_string())
            .unwrap_or_else(|| ".".to_string())
    }
}

/// Reads and writes PEM artifacts at configured locations.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    locations: ArtifactLocations,
}

impl ArtifactStore {
    pub fn new(locations: ArtifactLocations) -> Self {
        Self { locations }
    }

    pub fn locations(&self) -> &ArtifactLocations {
        &self.locations
    }

    /// PEM-wrap `der` under the artifact's label and atomically write it.
    pub fn save(&self, artifact: Artifact, der: &[u8]) -> Result<()> {
        let path = self.locations.path(artifact);
        let staged = self.stage(artifact, der)?;
        staged.persist(path).map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: e.error,
        })?;
        info!(path = %path.display(), "wrote {artifact}");
        Ok(())
    }

    /// Write a set of artifacts so that either all of them or none end up on disk.
    ///
    /// Artifacts already present at the destinations are moved aside first and
    /// put back if any rename fails, so a failed rerun leaves the previous set
    /// intact.
    pub fn save_all(&self, artifacts: &[(Artifact, Vec<u8>)]) -> Result<()> {
        let mut staged = Vec::with_capacity(artifacts.len());
        for (artifact, der) in artifacts {
            staged.push((*artifact, self.stage(*artifact, der)?));
        }

        let mut committed: Vec<(&Path, Option<TempPath>)> = Vec::with_capacity(staged.len());
        for (artifact, file) in staged {
            let path = self.locations.path(artifact);
            let backup = match set_aside(path) {
                Ok(backup) => backup,
                Err(e) => {
                    roll_back(committed);
                    return Err(e);
                }
            };
            if let Err(e) = file.persist(path) {
                committed.push((path, backup));
                roll_back(committed);
                return Err(Error::Io {
                    path: path.to_path_buf(),
                    source: e.error,
                });
            }
            info!(path = %path.display(), "wrote {artifact}");
            committed.push((path, backup));
        }
        // Dropping the backups deletes the previous set.
        drop(committed);
        Ok(())
    }

    /// Read an artifact and return the DER payload of its PEM block.
    pub fn load(&self, artifact: Artifact) -> Result<Vec<u8>> {
        let path = self.locations.path(artifact);
        let bytes = fs::read(path).map_err(Error::io(path))?;
        let block = pem::parse(&bytes).map_err(|e| Error::MalformedPem {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let expected = artifact.kind().pem_label();
        if block.tag() != expected {
            return Err(Error::MalformedPem {
                path: path.to_path_buf(),
                reason: format!("expected a {expected} block, found {}", block.tag()),
            });
        }
        debug!(path = %path.display(), "loaded {artifact}");
        Ok(block.into_contents())
    }

    pub fn load_certificate(&self, artifact: Artifact) -> Result<Certificate> {
        let der = self.load(artifact)?;
        Certificate::from_der(&der).map_err(|e| Error::MalformedPem {
            path: self.locations.path(artifact).to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn load_key_pair(&self, artifact: Artifact) -> Result<KeyPair> {
        let der = self.load(artifact)?;
        let private_key = PKey::private_key_from_pkcs8(&der).map_err(|e| Error::MalformedPem {
            path: self.locations.path(artifact).to_path_buf(),
            reason: format!("private key does not decode: {e}"),
        })?;
        Ok(KeyPair::from_private_key(private_key))
    }

    fn stage(&self, artifact: Artifact, der: &[u8]) -> Result<NamedTempFile> {
        let path = self.locations.path(artifact);
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(Error::io(dir))?;

        let block = Pem::new(artifact.kind().pem_label(), der.to_vec());
        let encoded =
            pem::encode_config(&block, EncodeConfig::new().set_line_ending(LineEnding::LF));

        let mut file = NamedTempFile::new_in(dir).map_err(Error::io(dir))?;
        file.write_all(encoded.as_bytes()).map_err(Error::io(path))?;
        file.as_file().sync_all().map_err(Error::io(path))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = match artifact.kind() {
                ArtifactKind::Certificate => 0o644,
                ArtifactKind::PrivateKey => 0o600,
            };
            fs::set_permissions(file.path(), fs::Permissions::from_mode(mode))
                .map_err(Error::io(path))?;
        }

        Ok(file)
    }
}

/// Move an existing regular file at `path` to a temporary sibling.
fn set_aside(path: &Path) -> Result<Option<TempPath>> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_file() => {}
        _ => return Ok(None),
    }
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let backup = tempfile::Builder::new()
        .prefix(".previous-")
        .tempfile_in(dir)
        .map_err(Error::io(dir))?
        .into_temp_path();
    fs::rename(path, &backup).map_err(Error::io(path))?;
    debug!(path = %path.display(), "moved previous artifact aside");
    Ok(Some(backup))
}

/// Undo renames in reverse order, restoring any previous artifact.
fn roll_back(committed: Vec<(&Path, Option<TempPath>)>) {
    for (path, backup) in committed.into_iter().rev() {
        if fs::symlink_metadata(path).map(|m| m.is_file()).unwrap_or(false) {
            let _ = fs::remove_file(path);
        }
        if let Some(backup) = backup {
            if let Err(e) = backup.persist(path) {
                warn!(path = %path.display(), "could not restore previous artifact: {}", e.error);
            }
        }
    }
}
