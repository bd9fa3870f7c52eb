//! Random certificate serial numbers.

use std::fmt;

use openssl::asn1::{Asn1Integer, Asn1IntegerRef};
use openssl::bn::{BigNum, MsbOption};

use crate::error::{Error, Result};

/// Width of the uniform random range serials are drawn from.
pub const SERIAL_NUMBER_BITS: i32 = 128;

/// A certificate serial number drawn uniformly from `[0, 2^128)`.
///
/// Uniqueness is probabilistic: with 128 random bits a collision between any
/// two draws is cryptographically negligible, so no issuance log is kept.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SerialNumber {
    bytes: Vec<u8>,
}

impl SerialNumber {
    /// Draw a fresh serial from the OpenSSL CSPRNG.
    pub fn generate() -> Result<Self> {
        let mut serial = BigNum::new().map_err(Error::SerialGeneration)?;
        serial
            .rand(SERIAL_NUMBER_BITS, MsbOption::MAYBE_ZERO, false)
            .map_err(Error::SerialGeneration)?;
        Ok(Self {
            bytes: serial.to_vec(),
        })
    }

    /// Read the serial back out of an issued certificate.
    pub fn from_asn1(integer: &Asn1IntegerRef) -> Result<Self> {
        let bn = integer.to_bn().map_err(Error::issuance("read serial number"))?;
        Ok(Self { bytes: bn.to_vec() })
    }

    pub fn to_asn1_integer(&self) -> Result<Asn1Integer> {
        BigNum::from_slice(&self.bytes)
            .and_then(|bn| bn.to_asn1_integer())
            .map_err(Error::SerialGeneration)
    }

    pub fn bit_len(&self) -> usize {
        match self.bytes.first() {
            Some(&msb) => self.bytes.len() * 8 - msb.leading_zeros() as usize,
            None => 0,
        }
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bytes.is_empty() {
            return f.write_str("00");
        }
        for byte in &self.bytes {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerialNumber({})", self)
    }
}
