//! URL-safe base64 codec, the 32-byte big-endian "note" encoding, and
//! buffer concatenation — the primitives every other module in this crate
//! builds on.

use crate::error::Result;
use base64::{engine::general_purpose, Engine as _};

const NOTE_SIZE: usize = 32;

/// Encode raw bytes as URL-safe base64 with padding stripped.
pub fn b64_encode(bytes: &[u8]) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode a URL-safe base64 string. Padding is tolerated if present.
pub fn b64_decode(b64str: &str) -> Result<Vec<u8>> {
    let bytes = general_purpose::URL_SAFE_NO_PAD.decode(b64str.trim_end_matches('='))?;
    Ok(bytes)
}

/// Big-endian 32-byte representation of an offset, per the Arweave "note"
/// encoding: the value sits in the trailing bytes, the rest zero-padded.
pub fn note32(n: u64) -> [u8; NOTE_SIZE] {
    let mut note = [0u8; NOTE_SIZE];
    note[NOTE_SIZE - 8..].copy_from_slice(&n.to_be_bytes());
    note
}

/// Inverse of [`note32`] — reads the big-endian value out of a 32-byte note.
/// Values above `u64::MAX` are not representable by this crate's chunker
/// (payloads are bounded by a `u64` length) and are truncated.
pub fn note32_to_u64(note: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let take = note.len().min(8);
    buf[8 - take..].copy_from_slice(&note[note.len() - take..]);
    u64::from_be_bytes(buf)
}

/// Ordered concatenation of buffers.
pub fn concat(buffers: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(buffers.iter().map(|b| b.len()).sum());
    for b in buffers {
        out.extend_from_slice(b);
    }
    out
}

/// `#[serde(with = "codec::base64_serde")]` — de/serializes a `Vec<u8>`
/// field as a URL-safe base64 string, for the wire representation of any
/// byte-valued transaction field.
pub mod base64_serde {
    use super::{b64_decode, b64_encode};
    use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &Vec<u8>, s: S) -> Result<S::Ok, S::Error> {
        String::serialize(&b64_encode(v), s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        b64_decode(&s).map_err(de::Error::custom)
    }
}
