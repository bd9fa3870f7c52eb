//! RSA Key Pair Generation Module
//!
//! Every identity in the trust chain (root CA, server, client) gets its own
//! freshly generated RSA key pair. The key size is fixed: 4096 bits leaves a wide
//! security margin over any validity window the chain is configured with.

use std::fmt;

use openssl::pkey::{PKey, PKeyRef, Private, Public};
use openssl::rsa::Rsa;

use crate::error::{Error, Result};

const RSA_KEY_SIZE: u32 = 4096;

/// An RSA key pair owned by a single identity.
///
/// The private half never leaves the process except when the server or client
/// key is persisted through [`crate::storage::ArtifactStore`].
pub struct KeyPair {
    private_key: PKey<Private>,
}

impl KeyPair {
    /// Generate a new RSA-4096 key pair.
    ///
    /// # Errors
    /// Returns [`Error::Generation`] if OpenSSL cannot produce a key (entropy
    /// exhaustion or allocation failure). Callers treat this as fatal.
    pub fn generate() -> Result<Self> {
        let rsa = Rsa::generate(RSA_KEY_SIZE).map_err(Error::Generation)?;
        let private_key = PKey::from_rsa(rsa).map_err(Error::Generation)?;
        Ok(Self { private_key })
    }

    /// Wrap an already existing private key, e.g. one loaded from disk.
    pub fn from_private_key(private_key: PKey<Private>) -> Self {
        Self { private_key }
    }

    pub fn private_key(&self) -> &PKeyRef<Private> {
        &self.private_key
    }

    /// The public half, detached from the private key.
    pub fn public_key(&self) -> Result<PKey<Public>> {
        let der = self
            .private_key
            .public_key_to_der()
            .map_err(Error::Generation)?;
        PKey::public_key_from_der(&der).map_err(Error::Generation)
    }

    /// PKCS#8 DER encoding of the private key, ready for PEM wrapping.
    pub fn private_key_to_pkcs8(&self) -> Result<Vec<u8>> {
        self.private_key
            .private_key_to_pkcs8()
            .map_err(Error::Generation)
    }

    pub fn key_bits(&self) -> u32 {
        self.private_key.bits()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("bits", &self.private_key.bits())
            .field("private_key", &"<redacted>")
            .finish()
    }
}
