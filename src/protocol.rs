//! Protocol Module
//!
//! The echo service spoken over the (mutually authenticated) channel. Every
//! message is a frame made of a 4-byte little-endian length followed by a JSON
//! document.

use std::io::{Read, Write};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest frame either side accepts.
pub const MAX_FRAME_LEN: u32 = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum Request {
    Ping,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum Response {
    Pong,
}

/// Serialize a message to a length-prefixed byte array.
///
/// Returns the payload length and the full frame (prefix included).
pub fn serialize_frame<T: Serialize>(message: &T) -> Result<(u32, Vec<u8>)> {
    let json = serde_json::to_vec(message)?;
    let length = u32::try_from(json.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or_else(|| Error::Protocol(format!("frame of {} bytes is too large", json.len())))?;

    let mut buffer = Vec::with_capacity(4 + json.len());
    buffer.extend_from_slice(&length.to_le_bytes());
    buffer.extend_from_slice(&json);
    Ok((length, buffer))
}

pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let (_, frame) = serialize_frame(message)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let length = u32::from_le_bytes(len_buf);
    if length > MAX_FRAME_LEN {
        return Err(Error::Protocol(format!(
            "peer announced a {length} byte frame, limit is {MAX_FRAME_LEN}"
        )));
    }
    let mut buf = vec![0u8; length as usize];
    reader.read_exact(&mut buf)?;
    Ok(serde_json::from_slice(&buf)?)
}
