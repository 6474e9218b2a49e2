//! Message envelope shared by the protocols and by applications
//!
//! All network communication uses bincode for the envelope and for the typed
//! payload carried in `data`.
use bincode::{Decode, Encode};

use super::Address;
use crate::error::Result;

#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Message {
    /// Kind discriminator, matched exactly by subscribers
    pub qualifier: String,
    /// Ties a reply to its request (probe period, sync round)
    pub correlation_id: Option<String>,
    /// Set by the sending transport
    pub sender: Option<Address>,
    /// bincode-encoded payload
    pub data: Vec<u8>,
}

fn wire_config() -> impl bincode::config::Config {
    bincode::config::standard().with_big_endian()
}

impl Message {
    /// Message without a payload
    pub fn new(qualifier: impl Into<String>) -> Self {
        Self {
            qualifier: qualifier.into(),
            correlation_id: None,
            sender: None,
            data: Vec::new(),
        }
    }

    /// Message carrying an encoded typed payload
    pub fn with_data<T: Encode>(qualifier: impl Into<String>, data: &T) -> Result<Self> {
        let mut message = Self::new(qualifier);
        message.data = bincode::encode_to_vec(data, wire_config())?;
        Ok(message)
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Raw payload bytes, for applications with their own encoding
    pub fn with_bytes(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Decode the typed payload
    pub fn data<T: Decode<()>>(&self) -> Result<T> {
        let (data, _) = bincode::decode_from_slice(&self.data, wire_config())?;
        Ok(data)
    }

    /// Serialize the whole envelope for the wire
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::encode_to_vec(self, wire_config())?)
    }

    /// Deserialize an envelope received from the wire
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (message, _) = bincode::decode_from_slice(bytes, wire_config())?;
        Ok(message)
    }
}
