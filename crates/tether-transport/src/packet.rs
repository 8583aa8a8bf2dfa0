//! `<TYPE>:<json>` datagram codec.
//!
//! Every discovery and pairing datagram is an ASCII type tag, a colon, and a
//! camelCase JSON body:
//!
//! ```text
//! PAIR_CANCEL:{"fromId":"a","toId":"b"}
//! ```

use crate::transport::{TransportError, TransportResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;

/// Datagram type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Discovery request (broadcast or directed)
    Discover,
    /// Unicast reply to a discovery request
    DiscoverReply,
    /// Pairing request
    PairRequest,
    /// Pairing response
    PairResponse,
    /// Pairing cancellation
    PairCancel,
}

impl PacketType {
    /// All packet types.
    pub const ALL: [PacketType; 5] = [
        Self::Discover,
        Self::DiscoverReply,
        Self::PairRequest,
        Self::PairResponse,
        Self::PairCancel,
    ];

    /// Wire tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discover => "DISCOVER",
            Self::DiscoverReply => "DISCOVER_REPLY",
            Self::PairRequest => "PAIR_REQUEST",
            Self::PairResponse => "PAIR_RESPONSE",
            Self::PairCancel => "PAIR_CANCEL",
        }
    }

    /// Whether this packet belongs to the pairing handshake.
    #[must_use]
    pub fn is_pairing(self) -> bool {
        matches!(
            self,
            Self::PairRequest | Self::PairResponse | Self::PairCancel
        )
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PacketType {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TransportError::Malformed(format!("unknown packet type {s:?}")))
    }
}

/// A decoded datagram: its type and raw JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Type tag
    pub kind: PacketType,
    /// JSON body, not yet parsed
    pub body: String,
}

impl Packet {
    /// Build a packet by serializing `message`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Malformed` if serialization fails.
    pub fn new<T: Serialize>(kind: PacketType, message: &T) -> TransportResult<Self> {
        let body =
            serde_json::to_string(message).map_err(|e| TransportError::Malformed(e.to_string()))?;
        Ok(Self { kind, body })
    }

    /// Wire bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.kind.as_str().len() + 1 + self.body.len());
        out.extend_from_slice(self.kind.as_str().as_bytes());
        out.push(b':');
        out.extend_from_slice(self.body.as_bytes());
        out
    }

    /// Split a datagram into its tag and body.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Malformed` for non-UTF-8 input, a missing
    /// colon, or an unknown tag.
    pub fn decode(datagram: &[u8]) -> TransportResult<Self> {
        let text = std::str::from_utf8(datagram)
            .map_err(|_| TransportError::Malformed("datagram is not UTF-8".into()))?;
        let (tag, body) = text
            .split_once(':')
            .ok_or_else(|| TransportError::Malformed("missing type separator".into()))?;
        Ok(Self {
            kind: tag.parse()?,
            body: body.to_owned(),
        })
    }

    /// Parse the JSON body.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Malformed` if the body does not match `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> TransportResult<T> {
        serde_json::from_str(&self.body)
            .map_err(|e| TransportError::Malformed(format!("{} body: {e}", self.kind)))
    }
}

/// Serialize `message` into wire bytes in one step.
///
/// # Errors
///
/// Returns `TransportError::Malformed` if serialization fails.
pub fn encode<T: Serialize>(kind: PacketType, message: &T) -> TransportResult<Vec<u8>> {
    Ok(Packet::new(kind, message)?.encode())
}
