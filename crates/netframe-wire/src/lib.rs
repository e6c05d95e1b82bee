//! Typed primitive packet codec and the pluggable length-prefix framing
//! discipline used to turn a byte stream into discrete messages.

mod error;
mod primitives;
mod processor;
mod stream;

pub use error::WireError;
pub use processor::{LengthPrefixProcessor, PacketProcessor};
pub use stream::PacketStream;

/// Types that can be written into a [`PacketStream`].
pub trait WireWrite {
    fn write_wire(&self, out: &mut bytes::BytesMut) -> Result<(), WireError>;
}

/// Types that can be read out of a [`PacketStream`].
pub trait WireRead: Sized {
    fn read_wire(buf: &[u8], pos: &mut usize) -> Result<Self, WireError>;
}
