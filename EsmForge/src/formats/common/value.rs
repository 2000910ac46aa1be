//! Fixed-size little-endian values stored in subrecord payloads

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::RecName;

/// A value with a fixed on-disk size, read and written little-endian.
///
/// Implemented for the integer and float primitives, `RecName`, fixed arrays
/// and small tuples, so `get_h_t::<(i32, i32)>()` reads a coordinate pair.
pub trait EsmValue: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self>;

    fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()>;
}

impl EsmValue for u8 {
    const SIZE: usize = 1;

    fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        reader.read_u8()
    }

    fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u8(*self)
    }
}

impl EsmValue for i8 {
    const SIZE: usize = 1;

    fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        reader.read_i8()
    }

    fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_i8(*self)
    }
}

macro_rules! le_value {
    ($ty:ty, $size:expr, $read:ident, $write:ident) => {
        impl EsmValue for $ty {
            const SIZE: usize = $size;

            fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
                reader.$read::<LittleEndian>()
            }

            fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
                writer.$write::<LittleEndian>(*self)
            }
        }
    };
}

le_value!(u16, 2, read_u16, write_u16);
le_value!(i16, 2, read_i16, write_i16);
le_value!(u32, 4, read_u32, write_u32);
le_value!(i32, 4, read_i32, write_i32);
le_value!(u64, 8, read_u64, write_u64);
le_value!(i64, 8, read_i64, write_i64);
le_value!(f32, 4, read_f32, write_f32);
le_value!(f64, 8, read_f64, write_f64);

impl EsmValue for RecName {
    const SIZE: usize = 4;

    fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let mut bytes = [0u8; 4];
        reader.read_exact(&mut bytes)?;
        Ok(RecName::new(&bytes))
    }

    fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(self.as_bytes())
    }
}

impl<T: EsmValue + Copy + Default, const N: usize> EsmValue for [T; N] {
    const SIZE: usize = T::SIZE * N;

    fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let mut out = [T::default(); N];
        for slot in &mut out {
            *slot = T::read_from(reader)?;
        }
        Ok(out)
    }

    fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        self.iter().try_for_each(|value| value.write_to(writer))
    }
}

impl<A: EsmValue, B: EsmValue> EsmValue for (A, B) {
    const SIZE: usize = A::SIZE + B::SIZE;

    fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        Ok((A::read_from(reader)?, B::read_from(reader)?))
    }

    fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        self.0.write_to(writer)?;
        self.1.write_to(writer)
    }
}

impl<A: EsmValue, B: EsmValue, C: EsmValue> EsmValue for (A, B, C) {
    const SIZE: usize = A::SIZE + B::SIZE + C::SIZE;

    fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        Ok((A::read_from(reader)?, B::read_from(reader)?, C::read_from(reader)?))
    }

    fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        self.0.write_to(writer)?;
        self.1.write_to(writer)?;
        self.2.write_to(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_tuple_layout_is_packed_little_endian() {
        let mut buf = Vec::new();
        (1i32, -2i32).write_to(&mut buf).unwrap();
        assert_eq!(buf, [1, 0, 0, 0, 0xfe, 0xff, 0xff, 0xff]);
        assert_eq!(<(i32, i32)>::SIZE, 8);
    }

    #[test]
    fn test_array_reads_elements_in_order() {
        let mut cursor = Cursor::new(vec![1u8, 0, 2, 0, 3, 0]);
        let values = <[u16; 3]>::read_from(&mut cursor).unwrap();
        assert_eq!(values, [1, 2, 3]);
        assert_eq!(<[u16; 3]>::SIZE, 6);
    }
}
