/*!
 * Consensus Types
 */

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Consensus algorithm a cluster runs for an execution
///
/// Carried as a number on the wire (`0`, `1`, `2`); configured by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConsensusType {
    #[default]
    None,
    Raft,
    Pbft,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown consensus algorithm: {0}")]
pub struct UnknownConsensus(pub String);

impl ConsensusType {
    pub fn as_u8(&self) -> u8 {
        match self {
            ConsensusType::None => 0,
            ConsensusType::Raft => 1,
            ConsensusType::Pbft => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ConsensusType::None),
            1 => Some(ConsensusType::Raft),
            2 => Some(ConsensusType::Pbft),
            _ => None,
        }
    }

    /// Whether executions with this algorithm need a formed cluster
    pub fn requires_cluster(&self) -> bool {
        !matches!(self, ConsensusType::None)
    }
}

impl fmt::Display for ConsensusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConsensusType::None => "none",
            ConsensusType::Raft => "raft",
            ConsensusType::Pbft => "pbft",
        };
        f.write_str(name)
    }
}

impl FromStr for ConsensusType {
    type Err = UnknownConsensus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "none" => Ok(ConsensusType::None),
            "raft" => Ok(ConsensusType::Raft),
            "pbft" => Ok(ConsensusType::Pbft),
            _ => Err(UnknownConsensus(s.to_string())),
        }
    }
}

impl Serialize for ConsensusType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for ConsensusType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        ConsensusType::from_u8(value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid consensus type {}", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!("PBFT".parse::<ConsensusType>().unwrap(), ConsensusType::Pbft);
        assert_eq!("raft".parse::<ConsensusType>().unwrap(), ConsensusType::Raft);
        assert_eq!("".parse::<ConsensusType>().unwrap(), ConsensusType::None);
        assert!("paxos".parse::<ConsensusType>().is_err());
    }

    #[test]
    fn test_numeric_wire_format() {
        assert_eq!(serde_json::to_string(&ConsensusType::Pbft).unwrap(), "2");
        let parsed: ConsensusType = serde_json::from_str("1").unwrap();
        assert_eq!(parsed, ConsensusType::Raft);
        assert!(serde_json::from_str::<ConsensusType>("9").is_err());
    }
}
