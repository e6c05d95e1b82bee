use bytes::{BufMut, BytesMut};

use crate::{WireError, WireRead, WireWrite};

macro_rules! impl_int {
    ($t:ty, $put:ident, $size:expr) => {
        impl WireWrite for $t {
            fn write_wire(&self, out: &mut BytesMut) -> Result<(), WireError> {
                out.$put(*self);
                Ok(())
            }
        }

        impl WireRead for $t {
            fn read_wire(buf: &[u8], pos: &mut usize) -> Result<Self, WireError> {
                if buf.len() < *pos + $size {
                    return Err(WireError::EndOfStream { needed: $size, available: buf.len() - *pos });
                }
                let bytes: [u8; $size] = buf[*pos..*pos + $size].try_into().unwrap();
                *pos += $size;
                Ok(<$t>::from_le_bytes(bytes))
            }
        }
    };
}

impl_int!(u8, put_u8, 1);
impl_int!(i8, put_i8, 1);
impl_int!(u16, put_u16_le, 2);
impl_int!(i16, put_i16_le, 2);
impl_int!(u32, put_u32_le, 4);
impl_int!(i32, put_i32_le, 4);
impl_int!(u64, put_u64_le, 8);
impl_int!(i64, put_i64_le, 8);
impl_int!(f32, put_f32_le, 4);
impl_int!(f64, put_f64_le, 8);

impl WireWrite for bool {
    fn write_wire(&self, out: &mut BytesMut) -> Result<(), WireError> {
        out.put_u8(if *self { 1 } else { 0 });
        Ok(())
    }
}

impl WireRead for bool {
    fn read_wire(buf: &[u8], pos: &mut usize) -> Result<Self, WireError> {
        let byte = u8::read_wire(buf, pos)?;
        Ok(byte != 0)
    }
}

impl WireWrite for str {
    fn write_wire(&self, out: &mut BytesMut) -> Result<(), WireError> {
        let bytes = self.as_bytes();
        if bytes.len() > u32::MAX as usize {
            return Err(WireError::StringTooLong(bytes.len()));
        }
        out.put_u32_le(bytes.len() as u32);
        out.put_slice(bytes);
        Ok(())
    }
}

impl WireWrite for String {
    fn write_wire(&self, out: &mut BytesMut) -> Result<(), WireError> {
        self.as_str().write_wire(out)
    }
}

impl WireRead for String {
    fn read_wire(buf: &[u8], pos: &mut usize) -> Result<Self, WireError> {
        let len = u32::read_wire(buf, pos)? as usize;
        if buf.len() < *pos + len {
            return Err(WireError::EndOfStream { needed: len, available: buf.len() - *pos });
        }
        let slice = &buf[*pos..*pos + len];
        *pos += len;
        Ok(String::from_utf8_lossy(slice).into_owned())
    }
}

/// Arrays of `T` are encoded as a `u32` count followed by that many
/// wire-encoded `T`s.
impl<T: WireWrite> WireWrite for Vec<T> {
    fn write_wire(&self, out: &mut BytesMut) -> Result<(), WireError> {
        if self.len() > u32::MAX as usize {
            return Err(WireError::StringTooLong(self.len()));
        }
        out.put_u32_le(self.len() as u32);
        for item in self {
            item.write_wire(out)?;
        }
        Ok(())
    }
}

impl<T: WireRead> WireRead for Vec<T> {
    fn read_wire(buf: &[u8], pos: &mut usize) -> Result<Self, WireError> {
        let count = u32::read_wire(buf, pos)?;
        let mut items = Vec::with_capacity(count.min(4096) as usize);
        for _ in 0..count {
            items.push(T::read_wire(buf, pos)?);
        }
        Ok(items)
    }
}
