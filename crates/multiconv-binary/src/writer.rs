//! Growable byte buffer with endian-aware writes.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{BinaryError, Result};
use crate::reader::Endian;

/// Writes binary values into an in-memory buffer.
///
/// Writes into a `Vec<u8>` cannot fail, so only the operations that validate
/// their input (string widths, patch offsets) return a `Result`.
#[derive(Debug, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
    endian: Endian,
}

macro_rules! write_num {
    ($name:ident, $ty:ty, $size:expr, $le:path, $be:path) => {
        pub fn $name(&mut self, value: $ty) {
            let mut tmp = [0u8; $size];
            match self.endian {
                Endian::Little => $le(&mut tmp, value),
                Endian::Big => $be(&mut tmp, value),
            }
            self.buf.extend_from_slice(&tmp);
        }
    };
}

impl ByteWriter {
    pub fn new(endian: Endian) -> Self {
        Self {
            buf: Vec::new(),
            endian,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buf.push(value as u8);
    }

    write_num!(write_u16, u16, 2, LittleEndian::write_u16, BigEndian::write_u16);
    write_num!(write_i16, i16, 2, LittleEndian::write_i16, BigEndian::write_i16);
    write_num!(write_u32, u32, 4, LittleEndian::write_u32, BigEndian::write_u32);
    write_num!(write_i32, i32, 4, LittleEndian::write_i32, BigEndian::write_i32);
    write_num!(write_u64, u64, 8, LittleEndian::write_u64, BigEndian::write_u64);
    write_num!(write_f32, f32, 4, LittleEndian::write_f32, BigEndian::write_f32);

    /// Write the lower 24 bits of `value`.
    pub fn write_u24(&mut self, value: u32) {
        let mut tmp = [0u8; 3];
        match self.endian {
            Endian::Little => LittleEndian::write_u24(&mut tmp, value & 0x00FF_FFFF),
            Endian::Big => BigEndian::write_u24(&mut tmp, value & 0x00FF_FFFF),
        }
        self.buf.extend_from_slice(&tmp);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_fourcc(&mut self, id: &[u8; 4]) {
        self.buf.extend_from_slice(id);
    }

    pub fn write_zeros(&mut self, count: usize) {
        self.buf.resize(self.buf.len() + count, 0);
    }

    /// Write `text` into a NUL padded field of exactly `width` bytes.
    ///
    /// Longer text is cut; non-ASCII characters are replaced by `_`.
    pub fn write_fixed_ascii(&mut self, text: &str, width: usize) {
        let mut field: Vec<u8> = text
            .chars()
            .map(|c| if c.is_ascii() { c as u8 } else { b'_' })
            .take(width)
            .collect();
        field.resize(width, 0);
        self.buf.extend_from_slice(&field);
    }

    /// Write an ASCII string prefixed by a 1-byte length.
    pub fn write_string_u8(&mut self, text: &str) -> Result<()> {
        let bytes = text.as_bytes();
        if bytes.len() > u8::MAX as usize {
            return Err(BinaryError::Encoding(format!("String too long for 1-byte prefix: {}", text)));
        }
        self.write_u8(bytes.len() as u8);
        self.write_bytes(bytes);
        Ok(())
    }

    /// Write an ASCII string prefixed by a 2-byte length.
    pub fn write_string_u16(&mut self, text: &str) -> Result<()> {
        let bytes = text.as_bytes();
        if bytes.len() > u16::MAX as usize {
            return Err(BinaryError::Encoding(format!(
                "String too long for 2-byte prefix: {} bytes",
                bytes.len()
            )));
        }
        self.write_u16(bytes.len() as u16);
        self.write_bytes(bytes);
        Ok(())
    }

    /// Write an ASCII string prefixed by a 4-byte length.
    pub fn write_string_u32(&mut self, text: &str) {
        let bytes = text.as_bytes();
        self.write_u32(bytes.len() as u32);
        self.write_bytes(bytes);
    }

    /// Write a UTF-16 string prefixed by its 4-byte length in code units.
    pub fn write_utf16(&mut self, text: &str) {
        let units: Vec<u16> = text.encode_utf16().collect();
        self.write_u32(units.len() as u32);
        for unit in units {
            self.write_u16(unit);
        }
    }

    /// Overwrite a previously written 32-bit value, typically a size field.
    pub fn patch_u32(&mut self, offset: usize, value: u32) -> Result<()> {
        if offset + 4 > self.buf.len() {
            return Err(BinaryError::Encoding(format!(
                "Patch offset {} outside of buffer of {} bytes",
                offset,
                self.buf.len()
            )));
        }
        let target = &mut self.buf[offset..offset + 4];
        match self.endian {
            Endian::Little => LittleEndian::write_u32(target, value),
            Endian::Big => BigEndian::write_u32(target, value),
        }
        Ok(())
    }

    /// Overwrite a previously written 64-bit value.
    pub fn patch_u64(&mut self, offset: usize, value: u64) -> Result<()> {
        if offset + 8 > self.buf.len() {
            return Err(BinaryError::Encoding(format!(
                "Patch offset {} outside of buffer of {} bytes",
                offset,
                self.buf.len()
            )));
        }
        let target = &mut self.buf[offset..offset + 8];
        match self.endian {
            Endian::Little => LittleEndian::write_u64(target, value),
            Endian::Big => BigEndian::write_u64(target, value),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ByteReader;

    #[test]
    fn test_written_values_read_back() {
        let mut writer = ByteWriter::new(Endian::Big);
        writer.write_u16(0xBEEF);
        writer.write_i32(-5);
        writer.write_u24(0x123456);
        writer.write_f32(0.25);
        let bytes = writer.into_inner();
        assert_eq!(&bytes[0..2], &[0xBE, 0xEF]);

        let mut reader = ByteReader::new(&bytes, Endian::Big);
        assert_eq!(reader.read_u16().unwrap(), 0xBEEF);
        assert_eq!(reader.read_i32().unwrap(), -5);
        assert_eq!(reader.read_u24().unwrap(), 0x123456);
        assert_eq!(reader.read_f32().unwrap(), 0.25);
    }

    #[test]
    fn test_patch_size_field() {
        let mut writer = ByteWriter::new(Endian::Little);
        writer.write_u32(0);
        writer.write_bytes(b"abc");
        let len = writer.len() as u32;
        writer.patch_u32(0, len).unwrap();
        assert_eq!(&writer.as_slice()[0..4], &[7, 0, 0, 0]);
        assert!(writer.patch_u32(5, 1).is_err());
    }

    #[test]
    fn test_fixed_ascii_pads_and_cuts() {
        let mut writer = ByteWriter::new(Endian::Little);
        writer.write_fixed_ascii("Grand Piano Long", 8);
        writer.write_fixed_ascii("Pad", 5);
        assert_eq!(writer.as_slice(), b"Grand PiPad\0\0");
    }
}
