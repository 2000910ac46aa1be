//! Stream adapters for the framing reader and writer
//!
//! The reader works on any boxed `Read + Seek` source with buffered peeking.
//! The writer needs `Write + Seek` so record sizes can be back-patched.

use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::formats::common::EsmValue;

/// Trait for types that can Read and Seek
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Buffered input with exact reads, relative seeks and one-byte peeks.
pub(crate) struct InputStream {
    inner: BufReader<Box<dyn ReadSeek>>,
    len: u64,
}

impl InputStream {
    pub(crate) fn new(mut source: Box<dyn ReadSeek>) -> io::Result<Self> {
        let len = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(0))?;
        Ok(Self {
            inner: BufReader::new(source),
            len,
        })
    }

    /// Total stream length, measured when the stream was opened.
    pub(crate) fn len(&self) -> u64 {
        self.len
    }

    pub(crate) fn position(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    pub(crate) fn seek_to(&mut self, position: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    pub(crate) fn seek_relative(&mut self, offset: i64) -> io::Result<()> {
        self.inner.seek_relative(offset)
    }

    pub(crate) fn skip(&mut self, count: u64) -> io::Result<()> {
        let offset = i64::try_from(count)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "skip too large"))?;
        self.inner.seek_relative(offset)
    }

    pub(crate) fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.inner.read_exact(buf)
    }

    pub(crate) fn read_value<T: EsmValue>(&mut self) -> io::Result<T> {
        T::read_from(&mut self.inner)
    }

    /// Next byte without consuming it, `None` at end of stream.
    pub(crate) fn peek_u8(&mut self) -> io::Result<Option<u8>> {
        Ok(self.inner.fill_buf()?.first().copied())
    }
}

/// Output sink that tracks its own position and can patch earlier bytes.
pub(crate) struct OutputStream<W: Write + Seek> {
    inner: W,
    position: u64,
}

impl<W: Write + Seek> OutputStream<W> {
    pub(crate) fn new(mut inner: W) -> io::Result<Self> {
        let position = inner.stream_position()?;
        Ok(Self { inner, position })
    }

    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    /// Overwrite a `u32` at `at`, then return to the current end.
    pub(crate) fn patch_u32(&mut self, at: u64, value: u32) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(at))?;
        self.inner.write_u32::<LittleEndian>(value)?;
        self.inner.seek(SeekFrom::Start(self.position))?;
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub(crate) fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_peek_does_not_consume() {
        let mut stream = InputStream::new(Box::new(Cursor::new(vec![7u8, 8]))).unwrap();
        assert_eq!(stream.len(), 2);
        assert_eq!(stream.peek_u8().unwrap(), Some(7));
        assert_eq!(stream.read_value::<u8>().unwrap(), 7);
        assert_eq!(stream.peek_u8().unwrap(), Some(8));
        stream.skip(1).unwrap();
        assert_eq!(stream.peek_u8().unwrap(), None);
    }

    #[test]
    fn test_seek_relative_backwards() {
        let mut stream = InputStream::new(Box::new(Cursor::new(vec![1u8, 2, 3, 4]))).unwrap();
        let mut buf = [0u8; 3];
        stream.read_exact(&mut buf).unwrap();
        stream.seek_relative(-2).unwrap();
        assert_eq!(stream.position().unwrap(), 1);
        assert_eq!(stream.read_value::<u8>().unwrap(), 2);
    }

    #[test]
    fn test_patch_returns_to_end() {
        let mut out = OutputStream::new(Cursor::new(Vec::new())).unwrap();
        out.write_all(&[0, 0, 0, 0, 9]).unwrap();
        out.patch_u32(0, 0x0102_0304).unwrap();
        out.write_all(&[10]).unwrap();
        assert_eq!(out.position(), 6);
        assert_eq!(out.into_inner().into_inner(), vec![4, 3, 2, 1, 9, 10]);
    }
}
