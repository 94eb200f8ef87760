//! Binary building blocks shared by all multiconv format codecs.
//!
//! This crate provides:
//! - Endian-aware cursor reading and writing ([`ByteReader`], [`ByteWriter`])
//! - RIFF and IFF style chunk trees ([`riff`])
//! - ZLIB and FastLZ (de)compression ([`compression`])
//! - WAV metadata chunks: `fmt `, `data`, `smpl`, `inst` and `bext` ([`wav`])
//!
//! All parse failures carry the byte offset at which they occurred so that callers
//! can report which chunk of which file was broken.

pub mod compression;
pub mod error;
pub mod reader;
pub mod riff;
pub mod wav;
pub mod writer;

pub use error::{BinaryError, Result};
pub use reader::{ByteReader, Endian};
pub use writer::ByteWriter;
