//! Info hash parsing for hex and base-32 encodings

use std::fmt;
use std::str::FromStr;

use data_encoding::BASE32;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// SHA-1 hash identifying a unique torrent.
///
/// 20-byte SHA-1 hash of the info dictionary from a torrent file.
/// Used to uniquely identify torrents across the BitTorrent network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash([u8; 20]);

/// Errors produced while parsing a textual info hash.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InfoHashError {
    #[error("Invalid info hash length: {length} (expected 40 hex or 32 base-32 characters)")]
    InvalidLength { length: usize },

    #[error("Invalid character in info hash: {value}")]
    InvalidCharacter { value: String },
}

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase 40-character hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses either the 40-character hex form or the 32-character base-32 form.
    ///
    /// Hex input is case-insensitive. Base-32 input is case-insensitive and must
    /// decode to exactly 20 bytes. Surrounding whitespace is not stripped.
    ///
    /// # Errors
    ///
    /// - `InfoHashError::InvalidLength` - Input is neither 40 nor 32 characters
    /// - `InfoHashError::InvalidCharacter` - Input contains characters outside the alphabet
    pub fn parse(value: &str) -> Result<Self, InfoHashError> {
        match value.len() {
            40 => Self::parse_hex(value),
            32 => Self::parse_base32(value),
            length => Err(InfoHashError::InvalidLength { length }),
        }
    }

    fn parse_hex(value: &str) -> Result<Self, InfoHashError> {
        let mut hash = [0u8; 20];
        hex::decode_to_slice(value, &mut hash).map_err(|_| InfoHashError::InvalidCharacter {
            value: value.to_string(),
        })?;
        Ok(Self(hash))
    }

    fn parse_base32(value: &str) -> Result<Self, InfoHashError> {
        let invalid = || InfoHashError::InvalidCharacter {
            value: value.to_string(),
        };
        let decoded = BASE32
            .decode(value.to_ascii_uppercase().as_bytes())
            .map_err(|_| invalid())?;
        let hash: [u8; 20] = decoded.try_into().map_err(|_| invalid())?;
        Ok(Self(hash))
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for InfoHash {
    type Err = InfoHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for InfoHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_hex().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for InfoHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
