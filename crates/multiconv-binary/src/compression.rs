//! ZLIB and FastLZ (de)compression.
//!
//! Decompression either returns the complete output buffer or fails with
//! [`BinaryError::CorruptData`]. Container parsers use that failure to decide
//! that a compressed sub-tree is most likely encrypted rather than broken.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{BinaryError, Result};

/// Largest back-reference distance of a level 2 short match.
const FASTLZ_L2_MAX_DISTANCE: usize = 8191;

/// Literal runs are limited to 32 bytes by the 5-bit control field.
const FASTLZ_MAX_LITERAL_RUN: usize = 32;

/// Inflate a complete ZLIB stream.
pub fn zlib_decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| BinaryError::CorruptData(format!("ZLIB stream: {}", e)))?;
    Ok(out)
}

/// Deflate `data` into a ZLIB stream.
pub fn zlib_compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompress a FastLZ block of either compression level.
///
/// The level is stored in the upper three bits of the first byte. The output
/// must have exactly `expected_size` bytes.
pub fn fastlz_decompress(input: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    if input.is_empty() {
        return if expected_size == 0 {
            Ok(Vec::new())
        } else {
            Err(BinaryError::CorruptData("empty FastLZ block".to_string()))
        };
    }

    let level = (input[0] >> 5) + 1;
    if level > 2 {
        return Err(BinaryError::CorruptData(format!("unknown FastLZ level {}", level)));
    }

    let mut out: Vec<u8> = Vec::with_capacity(expected_size);
    let mut ip = 1usize;
    let mut ctrl = (input[0] & 31) as usize;

    loop {
        if ctrl >= 32 {
            let mut len = (ctrl >> 5) - 1;
            let ofs = (ctrl & 31) << 8;
            let mut distance;

            if level == 1 {
                if len == 6 {
                    len += next_byte(input, &mut ip)? as usize;
                }
                distance = ofs + next_byte(input, &mut ip)? as usize + 1;
            } else {
                if len == 6 {
                    loop {
                        let code = next_byte(input, &mut ip)?;
                        len += code as usize;
                        if code != 255 {
                            break;
                        }
                    }
                }
                let code = next_byte(input, &mut ip)?;
                distance = ofs + code as usize + 1;
                if code == 255 && ofs == (31 << 8) {
                    let hi = next_byte(input, &mut ip)? as usize;
                    let lo = next_byte(input, &mut ip)? as usize;
                    distance = ((hi << 8) | lo) + FASTLZ_L2_MAX_DISTANCE + 1;
                }
            }

            if distance > out.len() {
                return Err(BinaryError::CorruptData(format!(
                    "FastLZ back reference {} before start of output at {}",
                    distance,
                    out.len()
                )));
            }
            let count = len + 3;
            if out.len() + count > expected_size {
                return Err(BinaryError::CorruptData("FastLZ output exceeds expected size".to_string()));
            }
            let start = out.len() - distance;
            for i in 0..count {
                let b = out[start + i];
                out.push(b);
            }
        } else {
            let count = ctrl + 1;
            if ip + count > input.len() {
                return Err(BinaryError::CorruptData(format!(
                    "FastLZ literal run of {} bytes exceeds input at {}",
                    count, ip
                )));
            }
            if out.len() + count > expected_size {
                return Err(BinaryError::CorruptData("FastLZ output exceeds expected size".to_string()));
            }
            out.extend_from_slice(&input[ip..ip + count]);
            ip += count;
        }

        if ip >= input.len() {
            break;
        }
        ctrl = input[ip] as usize;
        ip += 1;
    }

    if out.len() != expected_size {
        return Err(BinaryError::CorruptData(format!(
            "FastLZ produced {} bytes, expected {}",
            out.len(),
            expected_size
        )));
    }
    Ok(out)
}

/// Encode `data` as a level 1 FastLZ block made of literal runs only.
///
/// The result is a valid FastLZ stream that every decoder accepts; it trades
/// size for a trivially correct encoder.
pub fn fastlz_compress(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / FASTLZ_MAX_LITERAL_RUN + 1);
    for run in data.chunks(FASTLZ_MAX_LITERAL_RUN) {
        out.push((run.len() - 1) as u8);
        out.extend_from_slice(run);
    }
    out
}

fn next_byte(input: &[u8], ip: &mut usize) -> Result<u8> {
    let b = *input
        .get(*ip)
        .ok_or_else(|| BinaryError::CorruptData(format!("FastLZ block truncated at {}", ip)))?;
    *ip += 1;
    Ok(b)
}
