use bytes::{Bytes, BytesMut};

use crate::{WireError, WireRead, WireWrite};

/// Reserved for the length prefix written once the stream's buffer is first
/// observed for transmission. Matches the `u32` header in the default wire
/// format (§6).
const HEADER_RESERVED: usize = 4;

/// Typed read/write over a growable byte buffer.
///
/// A stream constructed from received bytes via [`PacketStream::from_bytes`]
/// is readable: reads are allowed, writes are not. A stream constructed via
/// [`PacketStream::for_sending`] is write-only until finalized: writes are
/// allowed, reads are not. This mirrors the "readable" flag in the source
/// data model rather than allowing a stream to switch modes mid-life.
pub struct PacketStream {
    buf: BytesMut,
    pos: usize,
    readable: bool,
    header_written: bool,
}

impl PacketStream {
    /// Build a stream meant to be filled via [`PacketStream::write`] and
    /// eventually sent. The first four bytes of the buffer are reserved for
    /// the length prefix, written lazily the first time [`PacketStream::buffer`]
    /// is called.
    pub fn for_sending() -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.resize(HEADER_RESERVED, 0);
        Self { buf, pos: HEADER_RESERVED, readable: false, header_written: false }
    }

    /// Wrap a complete, already-framed payload (header already stripped) as
    /// a readable stream. This is what [`crate::PacketProcessor::create_packet`]
    /// hands to the application on every inbound frame.
    pub fn from_bytes(payload: Bytes) -> Self {
        let mut buf = BytesMut::with_capacity(payload.len());
        buf.extend_from_slice(&payload);
        Self { buf, pos: 0, readable: true, header_written: true }
    }

    pub fn is_readable(&self) -> bool {
        self.readable
    }

    /// Total size of the buffer's payload (excludes the reserved header for
    /// an in-progress write stream).
    pub fn len(&self) -> usize {
        if self.readable { self.buf.len() } else { self.buf.len() - HEADER_RESERVED }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes remaining to be read from the current position.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Append the wire encoding of `value`. Fails with
    /// [`WireError::InvalidOperation`] if this stream was built from
    /// received bytes (read-only mode).
    pub fn write<T: WireWrite>(&mut self, value: &T) -> Result<(), WireError> {
        if self.readable {
            return Err(WireError::InvalidOperation);
        }
        value.write_wire(&mut self.buf)
    }

    /// Read one `T`, advancing the cursor. Fails with
    /// [`WireError::InvalidOperation`] in write-only mode, or
    /// [`WireError::EndOfStream`] if insufficient bytes remain.
    pub fn read<T: WireRead>(&mut self) -> Result<T, WireError> {
        if !self.readable {
            return Err(WireError::InvalidOperation);
        }
        T::read_wire(&self.buf, &mut self.pos)
    }

    /// Read an array of exactly `n` elements without an encoded count
    /// prefix (the count is carried out-of-band by the caller).
    pub fn read_n<T: WireRead>(&mut self, n: usize) -> Result<Vec<T>, WireError> {
        if !self.readable {
            return Err(WireError::InvalidOperation);
        }
        let mut items = Vec::with_capacity(n.min(4096));
        for _ in 0..n {
            items.push(T::read_wire(&self.buf, &mut self.pos)?);
        }
        Ok(items)
    }

    /// Returns the stream's bytes. When built for sending, the first call
    /// writes the length prefix (total size minus the 4-byte header itself,
    /// little-endian) into the reserved header bytes; later calls reuse the
    /// already-written prefix.
    pub fn buffer(&mut self) -> Bytes {
        if !self.readable && !self.header_written {
            let payload_len = (self.buf.len() - HEADER_RESERVED) as u32;
            self.buf[0..HEADER_RESERVED].copy_from_slice(&payload_len.to_le_bytes());
            self.header_written = true;
        }
        self.buf.clone().freeze()
    }

    /// Releases the underlying buffer. Dropping a `PacketStream` does the
    /// same thing; this is provided so callers can make disposal explicit
    /// at the point they're done with a packet.
    pub fn dispose(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_roundtrip() {
        let mut out = PacketStream::for_sending();
        out.write(&42u32).unwrap();
        out.write(&"hello".to_string()).unwrap();
        out.write(&true).unwrap();
        let bytes = out.buffer();

        // strip the 4-byte length header the way the processor would.
        let payload_len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        assert_eq!(payload_len, bytes.len() - 4);

        let mut input = PacketStream::from_bytes(bytes.slice(4..));
        assert_eq!(input.read::<u32>().unwrap(), 42);
        assert_eq!(input.read::<String>().unwrap(), "hello");
        assert!(input.read::<bool>().unwrap());
    }

    #[test]
    fn read_past_end_fails() {
        let mut input = PacketStream::from_bytes(Bytes::from_static(&[1, 2]));
        assert_eq!(
            input.read::<u32>(),
            Err(WireError::EndOfStream { needed: 4, available: 2 })
        );
    }

    #[test]
    fn write_on_readable_stream_is_invalid() {
        let mut input = PacketStream::from_bytes(Bytes::new());
        assert_eq!(input.write(&1u8), Err(WireError::InvalidOperation));
    }

    #[test]
    fn read_on_write_stream_is_invalid() {
        let mut out = PacketStream::for_sending();
        assert_eq!(out.read::<u8>(), Err(WireError::InvalidOperation));
    }

    #[test]
    fn array_roundtrip() {
        let mut out = PacketStream::for_sending();
        out.write(&vec![1u16, 2, 3]).unwrap();
        let bytes = out.buffer();
        let mut input = PacketStream::from_bytes(bytes.slice(4..));
        assert_eq!(input.read::<Vec<u16>>().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn read_n_reads_a_count_carried_out_of_band() {
        let mut out = PacketStream::for_sending();
        out.write(&7u16).unwrap();
        out.write(&8u16).unwrap();
        out.write(&9u16).unwrap();
        let bytes = out.buffer();

        // no encoded count prefix: the reader already knows there are 3.
        let mut input = PacketStream::from_bytes(bytes.slice(4..));
        assert_eq!(input.read_n::<u16>(3).unwrap(), vec![7, 8, 9]);
        assert_eq!(input.remaining(), 0);
    }

    #[test]
    fn read_n_on_write_stream_is_invalid() {
        let mut out = PacketStream::for_sending();
        assert_eq!(out.read_n::<u8>(1), Err(WireError::InvalidOperation));
    }
}
