//! Error types for trust chain generation, persistence and the TLS transport.

use std::fmt;
use std::path::PathBuf;

use openssl::error::ErrorStack;

/// Identity a pipeline step was working on when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Root,
    Server,
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Root => f.write_str("root CA"),
            Role::Server => f.write_str("server"),
            Role::Client => f.write_str("client"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("key pair generation failed: {0}")]
    Generation(#[source] ErrorStack),

    #[error("serial number generation failed: {0}")]
    SerialGeneration(#[source] ErrorStack),

    #[error("certificate issuance failed to {step}: {source}")]
    Issuance {
        step: &'static str,
        #[source]
        source: ErrorStack,
    },

    #[error("certificate decoding failed: {0}")]
    Decode(#[source] ErrorStack),

    #[error("certificate encoding is not canonical DER: re-encodes to {expected} bytes, input has {actual}")]
    NonCanonicalEncoding { expected: usize, actual: usize },

    #[error("trust store setup failed: {0}")]
    TrustStore(#[source] ErrorStack),

    #[error("invalid certificate template: {0}")]
    InvalidTemplate(String),

    #[error("I/O on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed PEM in {}: {reason}", path.display())]
    MalformedPem { path: PathBuf, reason: String },

    #[error("trust verification failed: {0}")]
    TrustVerification(String),

    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    #[error("network: {0}")]
    Network(#[from] std::io::Error),

    #[error("protocol: {0}")]
    Protocol(String),

    #[error("{role} step failed: {source}")]
    Step {
        role: Role,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn issuance(step: &'static str) -> impl FnOnce(ErrorStack) -> Error {
        move |source| Error::Issuance { step, source }
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Error {
        let path = path.into();
        move |source| Error::Io { path, source }
    }

    pub(crate) fn in_step(role: Role) -> impl FnOnce(Error) -> Error {
        move |source| Error::Step {
            role,
            source: Box::new(source),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Protocol(e.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
