use bytes::Bytes;

use crate::{PacketStream, WireError};

/// Framing discipline: turns header bytes into a payload length, and wraps
/// a complete payload as a [`PacketStream`] for the application. This is the
/// injection point spec'd for applications that want a custom framing
/// discipline; [`LengthPrefixProcessor`] is the default.
pub trait PacketProcessor: Send + Sync {
    /// Number of header bytes preceding the payload. Not counted in the
    /// length the header encodes.
    fn header_size(&self) -> usize;

    /// Parse the payload length out of exactly `header_size()` header
    /// bytes.
    fn message_len(&self, header: &[u8]) -> Result<usize, WireError>;

    /// Wrap a complete payload (header already stripped) as an inbound
    /// packet.
    fn create_packet(&self, payload: Bytes) -> PacketStream {
        PacketStream::from_bytes(payload)
    }
}

/// Default framing: a 4-byte little-endian length prefix covering the
/// payload only, per §6's wire format.
#[derive(Debug, Default, Clone, Copy)]
pub struct LengthPrefixProcessor;

impl PacketProcessor for LengthPrefixProcessor {
    fn header_size(&self) -> usize {
        4
    }

    fn message_len(&self, header: &[u8]) -> Result<usize, WireError> {
        let bytes: [u8; 4] = header
            .try_into()
            .map_err(|_| WireError::EndOfStream { needed: 4, available: header.len() })?;
        Ok(u32::from_le_bytes(bytes) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_le_length() {
        let processor = LengthPrefixProcessor;
        assert_eq!(processor.message_len(&5u32.to_le_bytes()).unwrap(), 5);
    }
}
