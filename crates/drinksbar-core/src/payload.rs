//! Bounded receive buffers.
//!
//! Every receive reads into a buffer one byte larger than the configured
//! capacity, so a message that does not fit is noticed instead of being
//! cut off silently. What happens next is the [`OversizePolicy`].

use std::borrow::Cow;
use std::fmt;

use drinksbar_config::{OversizePolicy, PayloadConfig};

use crate::channel::TransferError;

/// Capacity contract applied to every receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadLimit {
    pub max_bytes: usize,
    pub oversize: OversizePolicy,
}

impl PayloadLimit {
    pub fn new(max_bytes: usize, oversize: OversizePolicy) -> Self {
        Self {
            max_bytes,
            oversize,
        }
    }

    /// A zeroed buffer sized to detect one byte of overflow.
    pub fn buffer(&self) -> Vec<u8> {
        vec![0; self.max_bytes + 1]
    }

    /// Turn the bytes of one receive into a [`Payload`].
    pub fn admit(&self, received: &[u8]) -> Result<Payload, TransferError> {
        if received.is_empty() {
            return Err(TransferError::Empty);
        }
        if received.len() <= self.max_bytes {
            return Ok(Payload {
                bytes: received.to_vec(),
                truncated: false,
            });
        }
        match self.oversize {
            OversizePolicy::Truncate => Ok(Payload {
                bytes: received[..self.max_bytes].to_vec(),
                truncated: true,
            }),
            OversizePolicy::Reject => Err(TransferError::Oversize {
                max: self.max_bytes,
            }),
        }
    }
}

impl Default for PayloadLimit {
    fn default() -> Self {
        Self::from(&PayloadConfig::default())
    }
}

impl From<&PayloadConfig> for PayloadLimit {
    fn from(config: &PayloadConfig) -> Self {
        Self::new(config.max_bytes, config.oversize)
    }
}

/// Raw bytes received from a peer in one receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    bytes: Vec<u8>,
    truncated: bool,
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the sender's message was longer than what was kept.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Printable text: everything before the first NUL, lossily decoded.
    pub fn text(&self) -> Cow<'_, str> {
        let end = self
            .bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.bytes.len());
        String::from_utf8_lossy(&self.bytes[..end])
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}
