// AOgmaNeo host - binary codec
//
// Sequential little-endian byte sinks/sources. Every transfer moves exactly the requested
// number of bytes or fails; nothing is ever silently truncated.

use std::io::{ErrorKind, Read, Write};

use crate::error::{Error, FormatError, Result};
use crate::helpers::Int3;

// --- Writer ---

pub trait Writer {
    fn write_bytes(&mut self, data: &[u8]) -> Result<()>;

    fn write_i32(&mut self, v: i32) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    fn write_u32(&mut self, v: u32) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    fn write_f32(&mut self, v: f32) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    fn write_u8(&mut self, v: u8) -> Result<()> {
        self.write_bytes(&[v])
    }

    fn write_i32_slice(&mut self, slice: &[i32]) -> Result<()> {
        let bytes: Vec<u8> = slice.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.write_bytes(&bytes)
    }

    fn write_f32_slice(&mut self, slice: &[f32]) -> Result<()> {
        let bytes: Vec<u8> = slice.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.write_bytes(&bytes)
    }

    fn write_u8_slice(&mut self, slice: &[u8]) -> Result<()> {
        self.write_bytes(slice)
    }

    fn write_i8_slice(&mut self, slice: &[i8]) -> Result<()> {
        let bytes: Vec<u8> = slice.iter().map(|&v| v as u8).collect();
        self.write_bytes(&bytes)
    }

    fn write_int3(&mut self, v: Int3) -> Result<()> {
        self.write_i32(v.x)?;
        self.write_i32(v.y)?;
        self.write_i32(v.z)
    }
}

// --- Reader ---

pub trait Reader {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()>;

    fn read_i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_f32(&mut self) -> Result<f32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(f32::from_le_bytes(buf))
    }

    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_bytes(&mut buf)?;
        Ok(buf[0])
    }

    fn read_i32_slice(&mut self, slice: &mut [i32]) -> Result<()> {
        let mut bytes = vec![0u8; slice.len() * 4];
        self.read_bytes(&mut bytes)?;
        for (v, chunk) in slice.iter_mut().zip(bytes.chunks_exact(4)) {
            *v = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(())
    }

    fn read_f32_slice(&mut self, slice: &mut [f32]) -> Result<()> {
        let mut bytes = vec![0u8; slice.len() * 4];
        self.read_bytes(&mut bytes)?;
        for (v, chunk) in slice.iter_mut().zip(bytes.chunks_exact(4)) {
            *v = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(())
    }

    fn read_u8_slice(&mut self, slice: &mut [u8]) -> Result<()> {
        self.read_bytes(slice)
    }

    fn read_i8_slice(&mut self, slice: &mut [i8]) -> Result<()> {
        let mut bytes = vec![0u8; slice.len()];
        self.read_bytes(&mut bytes)?;
        for (v, b) in slice.iter_mut().zip(bytes) {
            *v = b as i8;
        }
        Ok(())
    }

    fn read_int3(&mut self) -> Result<Int3> {
        let x = self.read_i32()?;
        let y = self.read_i32()?;
        let z = self.read_i32()?;
        Ok(Int3::new(x, y, z))
    }

    /// Read a non-negative count, rejecting anything above `limit`.
    fn read_count(&mut self, what: &str, limit: usize) -> Result<usize> {
        let v = self.read_i32()?;
        if v < 0 || v as usize > limit {
            return Err(FormatError::Corrupt {
                what: what.to_string(),
                detail: format!("count {v} outside [0, {limit}]"),
            }
            .into());
        }
        Ok(v as usize)
    }
}

// --- Memory-buffer backings ---

/// Fixed-capacity in-memory sink. Writing past the capacity is an error.
#[derive(Debug)]
pub struct BufferWriter {
    data: Vec<u8>,
    pos: usize,
}

impl BufferWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
            pos: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Hand back the buffer, failing if it was not filled exactly.
    pub fn finish(self, section: &'static str) -> Result<Vec<u8>> {
        if self.pos != self.data.len() {
            return Err(FormatError::SectionSize {
                section,
                expected: self.data.len(),
                actual: self.pos,
            }
            .into());
        }
        Ok(self.data)
    }
}

impl Writer for BufferWriter {
    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        let end = self.pos + data.len();
        if end > self.data.len() {
            return Err(FormatError::Overflow {
                offset: self.pos,
                len: data.len(),
                capacity: self.data.len(),
            }
            .into());
        }
        self.data[self.pos..end].copy_from_slice(data);
        self.pos = end;
        Ok(())
    }
}

/// Cursor over a borrowed byte slice.
#[derive(Debug)]
pub struct BufferReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BufferReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

impl Reader for BufferReader<'_> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        let end = self.pos + buf.len();
        if end > self.data.len() {
            return Err(FormatError::Truncated {
                offset: self.pos,
                needed: buf.len(),
                available: self.remaining(),
            }
            .into());
        }
        buf.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }
}

/// Sink that only counts bytes; used to report section sizes before allocating.
#[derive(Debug, Default)]
pub struct SizeCounter {
    len: usize,
}

impl SizeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Writer for SizeCounter {
    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.len += data.len();
        Ok(())
    }
}

// --- Stream backings ---

/// Sink over any `std::io::Write` (typically a buffered file).
pub struct StreamWriter<W: Write> {
    inner: W,
}

impl<W: Write> StreamWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Writer for StreamWriter<W> {
    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data)?;
        Ok(())
    }
}

/// Source over any `std::io::Read`. Running out of data is a format error.
pub struct StreamReader<R: Read> {
    inner: R,
    pos: usize,
}

impl<R: Read> StreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, pos: 0 }
    }
}

impl<R: Read> Reader for StreamReader<R> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.pos += buf.len();
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(FormatError::Truncated {
                offset: self.pos,
                needed: buf.len(),
                available: 0,
            }
            .into()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

// --- Framing ---

/// Write the magic and format version that open every full section.
pub fn write_header(writer: &mut dyn Writer, magic: u32, version: u32) -> Result<()> {
    writer.write_u32(magic)?;
    writer.write_u32(version)
}

/// Check the magic, then the version, before anything else is consumed.
pub fn read_header(
    reader: &mut dyn Reader,
    kind: &'static str,
    magic: u32,
    version: u32,
) -> Result<()> {
    let actual = reader.read_u32()?;
    if actual != magic {
        return Err(FormatError::BadMagic {
            kind,
            expected: magic,
            actual,
        }
        .into());
    }

    let actual = reader.read_u32()?;
    if actual != version {
        return Err(FormatError::UnsupportedVersion {
            kind,
            supported: version,
            actual,
        }
        .into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_roundtrip_scalars() {
        let mut w = BufferWriter::with_capacity(4 + 4 + 1 + 12 + 3);
        w.write_i32(-7).unwrap();
        w.write_f32(1.5).unwrap();
        w.write_u8(9).unwrap();
        w.write_int3(Int3::new(1, 2, 3)).unwrap();
        w.write_i8_slice(&[-1, 0, 1]).unwrap();
        let bytes = w.finish("test").unwrap();

        let mut r = BufferReader::new(&bytes);
        assert_eq!(r.read_i32().unwrap(), -7);
        assert_eq!(r.read_f32().unwrap(), 1.5);
        assert_eq!(r.read_u8().unwrap(), 9);
        assert_eq!(r.read_int3().unwrap(), Int3::new(1, 2, 3));
        let mut s = [0i8; 3];
        r.read_i8_slice(&mut s).unwrap();
        assert_eq!(s, [-1, 0, 1]);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_buffer_writer_overflow_is_error() {
        let mut w = BufferWriter::with_capacity(3);
        let err = w.write_i32(1).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::Overflow { capacity: 3, .. })));
        assert_eq!(w.position(), 0);
    }

    #[test]
    fn test_buffer_writer_underfill_is_error() {
        let mut w = BufferWriter::with_capacity(8);
        w.write_i32(1).unwrap();
        assert!(matches!(
            w.finish("state"),
            Err(Error::Format(FormatError::SectionSize { expected: 8, actual: 4, .. }))
        ));
    }

    #[test]
    fn test_buffer_reader_truncated() {
        let bytes = [1u8, 2, 3];
        let mut r = BufferReader::new(&bytes);
        let err = r.read_u32().unwrap_err();
        assert!(matches!(
            err,
            Error::Format(FormatError::Truncated { offset: 0, needed: 4, available: 3 })
        ));
    }

    #[test]
    fn test_size_counter_matches_buffer() {
        let mut c = SizeCounter::new();
        c.write_i32_slice(&[1, 2, 3]).unwrap();
        c.write_f32(0.0).unwrap();
        assert_eq!(c.len(), 16);
    }

    #[test]
    fn test_header_rejects_bad_magic_before_version() {
        let mut w = BufferWriter::with_capacity(8);
        write_header(&mut w, 0xdeadbeef, 1).unwrap();
        let bytes = w.finish("full").unwrap();

        let mut r = BufferReader::new(&bytes);
        let err = read_header(&mut r, "hierarchy", 0x4d474f41, 1).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::BadMagic { actual: 0xdeadbeef, .. })));
        assert_eq!(r.position(), 4);
    }

    #[test]
    fn test_stream_roundtrip_through_file() {
        let mut file = tempfile::tempfile().unwrap();
        {
            let mut w = StreamWriter::new(&mut file);
            w.write_f32_slice(&[0.25, -2.0]).unwrap();
        }
        use std::io::{Seek, SeekFrom};
        file.seek(SeekFrom::Start(0)).unwrap();

        let mut r = StreamReader::new(&mut file);
        let mut out = [0.0f32; 2];
        r.read_f32_slice(&mut out).unwrap();
        assert_eq!(out, [0.25, -2.0]);
        assert!(matches!(
            r.read_u8(),
            Err(Error::Format(FormatError::Truncated { .. }))
        ));
    }

    #[test]
    fn test_read_count_rejects_negative() {
        let mut w = BufferWriter::with_capacity(4);
        w.write_i32(-3).unwrap();
        let bytes = w.finish("t").unwrap();
        let mut r = BufferReader::new(&bytes);
        assert!(matches!(
            r.read_count("layers", 16),
            Err(Error::Format(FormatError::Corrupt { .. }))
        ));
    }
}
