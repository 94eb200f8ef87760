//! Cursor based reading of little- and big-endian binary data.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{BinaryError, Result};

/// Byte order of multi-byte values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// A read cursor over a byte slice.
///
/// Every failing read reports the absolute offset into the original slice, which
/// is what ends up in [`BinaryError::Parse`] messages.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endian,
    base_offset: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a reader starting at the beginning of `data`.
    pub fn new(data: &'a [u8], endian: Endian) -> Self {
        Self {
            data,
            pos: 0,
            endian,
            base_offset: 0,
        }
    }

    /// Create a reader whose reported offsets start at `base_offset`.
    ///
    /// Used when a sub-slice of a larger file is handed to a nested parser.
    pub fn with_base_offset(data: &'a [u8], endian: Endian, base_offset: usize) -> Self {
        Self {
            data,
            pos: 0,
            endian,
            base_offset,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    /// Position relative to the start of the slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Position relative to the start of the original file.
    pub fn offset(&self) -> usize {
        self.base_offset + self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(BinaryError::UnexpectedEof {
                offset: self.base_offset + self.data.len(),
                needed: pos - self.data.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.take(count).map(|_| ())
    }

    /// Borrow the next `count` bytes and advance.
    pub fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        if count > self.remaining() {
            return Err(BinaryError::UnexpectedEof {
                offset: self.offset(),
                needed: count - self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    /// Borrow all remaining bytes and advance to the end.
    pub fn take_rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos.min(self.data.len())..];
        self.pos = self.data.len();
        slice
    }

    /// Look at the next `count` bytes without advancing.
    pub fn peek(&self, count: usize) -> Result<&'a [u8]> {
        if count > self.remaining() {
            return Err(BinaryError::UnexpectedEof {
                offset: self.offset(),
                needed: count - self.remaining(),
            });
        }
        Ok(&self.data[self.pos..self.pos + count])
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        self.take(count).map(|b| b.to_vec())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(match self.endian {
            Endian::Little => LittleEndian::read_u16(b),
            Endian::Big => BigEndian::read_u16(b),
        })
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        let b = self.take(2)?;
        Ok(match self.endian {
            Endian::Little => LittleEndian::read_i16(b),
            Endian::Big => BigEndian::read_i16(b),
        })
    }

    /// Read an unsigned 24-bit integer.
    pub fn read_u24(&mut self) -> Result<u32> {
        let b = self.take(3)?;
        Ok(match self.endian {
            Endian::Little => LittleEndian::read_u24(b),
            Endian::Big => BigEndian::read_u24(b),
        })
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(match self.endian {
            Endian::Little => LittleEndian::read_u32(b),
            Endian::Big => BigEndian::read_u32(b),
        })
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(match self.endian {
            Endian::Little => LittleEndian::read_i32(b),
            Endian::Big => BigEndian::read_i32(b),
        })
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(match self.endian {
            Endian::Little => LittleEndian::read_u64(b),
            Endian::Big => BigEndian::read_u64(b),
        })
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let b = self.take(4)?;
        Ok(match self.endian {
            Endian::Little => LittleEndian::read_f32(b),
            Endian::Big => BigEndian::read_f32(b),
        })
    }

    /// Read a four character code.
    pub fn read_fourcc(&mut self) -> Result<[u8; 4]> {
        let b = self.take(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    /// Read `magic.len()` bytes and fail with [`BinaryError::Parse`] if they differ.
    pub fn expect_magic(&mut self, magic: &[u8]) -> Result<()> {
        let offset = self.offset();
        let found = self.take(magic.len())?;
        if found != magic {
            return Err(BinaryError::parse(
                offset,
                format!("magic {}", printable(magic)),
                printable(found),
            ));
        }
        Ok(())
    }

    /// Read a fixed-width ASCII field, cutting at the first NUL and trimming spaces.
    pub fn read_fixed_ascii(&mut self, width: usize) -> Result<String> {
        let bytes = self.take(width)?;
        Ok(ascii_field(bytes))
    }

    /// Read an ASCII string prefixed by a 1-byte length.
    pub fn read_string_u8(&mut self) -> Result<String> {
        let len = self.read_u8()? as usize;
        Ok(String::from_utf8_lossy(self.take(len)?).into_owned())
    }

    /// Read an ASCII string prefixed by a 2-byte length.
    pub fn read_string_u16(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        Ok(String::from_utf8_lossy(self.take(len)?).into_owned())
    }

    /// Read an ASCII string prefixed by a 4-byte length.
    pub fn read_string_u32(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        Ok(String::from_utf8_lossy(self.take(len)?).into_owned())
    }

    /// Read a UTF-16 string prefixed by its 4-byte length in code units.
    ///
    /// The code units follow the reader's byte order.
    pub fn read_utf16(&mut self) -> Result<String> {
        let offset = self.offset();
        let units = self.read_u32()? as usize;
        if units * 2 > self.remaining() {
            return Err(BinaryError::parse(
                offset,
                format!("UTF-16 string of at most {} units", self.remaining() / 2),
                format!("{} units", units),
            ));
        }
        let mut buf = Vec::with_capacity(units);
        for _ in 0..units {
            buf.push(self.read_u16()?);
        }
        String::from_utf16(&buf).map_err(|_| BinaryError::parse(offset, "valid UTF-16", "invalid surrogates"))
    }
}

/// Convert a NUL padded byte field into a trimmed string.
pub fn ascii_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

/// Render bytes for error messages, as text when printable.
pub fn printable(bytes: &[u8]) -> String {
    if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        format!("'{}'", String::from_utf8_lossy(bytes))
    } else {
        bytes.iter().map(|b| format!("{:02X}", b)).collect::<Vec<_>>().join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_both_endians() {
        let data = [0x01, 0x02, 0x03, 0x04];
        let mut le = ByteReader::new(&data, Endian::Little);
        assert_eq!(le.read_u32().unwrap(), 0x0403_0201);
        let mut be = ByteReader::new(&data, Endian::Big);
        assert_eq!(be.read_u16().unwrap(), 0x0102);
        assert_eq!(be.read_u16().unwrap(), 0x0304);
    }

    #[test]
    fn test_eof_reports_offset() {
        let data = [0u8; 3];
        let mut reader = ByteReader::with_base_offset(&data, Endian::Little, 100);
        reader.skip(2).unwrap();
        match reader.read_u32() {
            Err(BinaryError::UnexpectedEof { offset, needed }) => {
                assert_eq!(offset, 102);
                assert_eq!(needed, 3);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_expect_magic_mismatch() {
        let mut reader = ByteReader::new(b"RIFX", Endian::Little);
        let err = reader.expect_magic(b"RIFF").unwrap_err();
        assert!(matches!(err, BinaryError::Parse { offset: 0, .. }));
    }

    #[test]
    fn test_length_prefixed_strings() {
        let data = [3, b'a', b'b', b'c', 2, 0, b'x', b'y'];
        let mut reader = ByteReader::new(&data, Endian::Little);
        assert_eq!(reader.read_string_u8().unwrap(), "abc");
        assert_eq!(reader.read_string_u16().unwrap(), "xy");
    }

    #[test]
    fn test_utf16_string() {
        let data = [2, 0, 0, 0, b'H', 0, b'i', 0];
        let mut reader = ByteReader::new(&data, Endian::Little);
        assert_eq!(reader.read_utf16().unwrap(), "Hi");
    }

    #[test]
    fn test_fixed_ascii_trims_nul_padding() {
        let mut reader = ByteReader::new(b"Piano\0\0\0", Endian::Big);
        assert_eq!(reader.read_fixed_ascii(8).unwrap(), "Piano");
    }
}
