//! mtls-chain - Trust Chain Generation for Mutual TLS
//!
//! Generates a flat X.509 trust chain (one root CA that directly signs a server
//! certificate and a client certificate), persists it as PEM files, and uses it
//! to run a mutually authenticated echo service.
//!
//! # Overview
//!
//! ```text
//! Root CA (self-signed, CA=true, keyCertSign + digitalSignature)
//!   ├── Server certificate (serverAuth, SAN = server hostnames)
//!   └── Client certificate (clientAuth)
//! ```
//!
//! Generation is an offline, one-shot operation: every step either succeeds or
//! aborts the whole run, and the artifact set on disk is written all at once.
//! The server and the client later load the artifacts and trust nothing but the
//! persisted root.
//!
//! # Quick Start
//!
//! ```bash
//! mtls-chain generate          # writes dist/{ca.cert,server.cert,server.key,client.cert,client.key}
//! mtls-chain verify            # load-and-verify the persisted chain
//! mtls-chain serve             # echo server on 0.0.0.0:4242
//! mtls-chain ping              # one Ping/Pong against localhost:4242
//! ```
//!
//! # As a Library
//!
//! ```no_run
//! use mtls_chain::storage::{ArtifactLocations, ArtifactStore};
//! use mtls_chain::trust_chain::{ChainPolicy, TrustChainBuilder};
//!
//! fn main() -> mtls_chain::Result<()> {
//!     let store = ArtifactStore::new(ArtifactLocations::in_directory("dist"));
//!     let chain = TrustChainBuilder::new(ChainPolicy::default()).build()?;
//!     chain.persist(&store)?;
//!
//!     let verified = mtls_chain::chain_verification::verify_persisted_chain(&store, "localhost")?;
//!     println!("root serial {}", verified.root_serial);
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`generate_key_pair`]: RSA-4096 key pairs
//! - [`serial_number`]: 128-bit random serial numbers
//! - [`certificate_template`]: subject, validity window, usages, SANs, CA flag
//! - [`issue_certificate`]: self-signed and CA-signed X.509v3 issuance
//! - [`trust_chain`]: issuance order and per-role policy
//! - [`storage`]: PEM artifacts at configured locations, atomic writes
//! - [`chain_verification`]: load-and-verify of a persisted chain
//! - [`tls_endpoint`]: OpenSSL acceptor / connector built from the artifacts
//! - [`protocol`], [`echo_server`], [`echo_client`]: the Ping/Pong exchange
//! - [`configs`]: TOML configuration
//!
//! # Error Handling
//!
//! Library APIs return [`Result`] with the [`Error`] taxonomy. Nothing here
//! terminates the process; the binary decides how to report failures.

pub mod certificate_template;
pub mod chain_verification;
pub mod configs;
pub mod echo_client;
pub mod echo_server;
pub mod error;
pub mod generate_key_pair;
pub mod issue_certificate;
pub mod protocol;
pub mod serial_number;
pub mod storage;
pub mod tls_endpoint;
pub mod trust_chain;

pub use error::{Error, Result, Role};
