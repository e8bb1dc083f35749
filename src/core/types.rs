/*!
 * Core Types
 * Identity, result codes and correlation keys shared across the head node
 */

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Peer identity
///
/// A peer is identified by its 32-byte ed25519 public key, so the key used to
/// verify a peer's signed results can always be derived from the identity itself.
/// On the wire it is carried as a lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId([u8; 32]);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerIdError {
    #[error("invalid hex encoding: {0}")]
    Encoding(String),

    #[error("peer ID must be 32 bytes, got {0}")]
    Length(usize),
}

impl PeerId {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_public_key(key: &VerifyingKey) -> Self {
        Self(key.to_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive the ed25519 verifying key embedded in this identity
    pub fn public_key(&self) -> Result<VerifyingKey, ed25519_dalek::SignatureError> {
        VerifyingKey::from_bytes(&self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable
        write!(f, "PeerId({})", &hex::encode(self.0)[..12])
    }
}

impl FromStr for PeerId {
    type Err = PeerIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| PeerIdError::Encoding(e.to_string()))?;
        let len = bytes.len();
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| PeerIdError::Length(len))?;
        Ok(Self(bytes))
    }
}

impl Serialize for PeerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PeerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Result codes carried in responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Code {
    #[serde(rename = "200")]
    Ok,
    #[serde(rename = "202")]
    Accepted,
    #[serde(rename = "206")]
    PartialContent,
    #[serde(rename = "400")]
    Invalid,
    #[serde(rename = "404")]
    NotFound,
    #[serde(rename = "408")]
    Timeout,
    #[serde(rename = "500")]
    #[default]
    Error,
    #[serde(rename = "503")]
    NotAvailable,
}

impl Code {
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "200",
            Code::Accepted => "202",
            Code::PartialContent => "206",
            Code::Invalid => "400",
            Code::NotFound => "404",
            Code::Timeout => "408",
            Code::Error => "500",
            Code::NotAvailable => "503",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generate a fresh request identifier
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Correlation key for a peer's reply to a request
pub fn peer_request_key(request_id: &str, peer: &PeerId) -> String {
    format!("{}/{}", request_id, peer)
}

/// Correlation key for a peer's reply to one chunk of a batch
pub fn peer_chunk_key(request_id: &str, chunk_id: &str, peer: &PeerId) -> String {
    format!("{}/{}/{}", request_id, chunk_id, peer)
}
