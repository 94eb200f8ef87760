//! The NI-Container item tree of Kontakt 5 and later.
//!
//! An item is framed as
//!
//! ```text
//! u64 size | u32 version | "hsin" | u32 item id | u32 reserved | uuid[16]
//! data block:  u64 size | data chunk*
//!   data chunk: u64 size | domain[4] | u32 type | u32 version | payload
//! u32 version | u32 child count
//!   child: u32 flags | domain[4] | u32 type | item
//! ```
//!
//! All sizes include their own size field. Integers are little-endian.
//!
//! A [`SUBTREE`](NiChunkType::Subtree) chunk wraps a complete nested item,
//! optionally FastLZ compressed. The nested item is decompressed on first
//! access; if that fails the sub-tree is considered encrypted and skipped by
//! all searches.

use std::sync::OnceLock;

use multiconv_binary::compression::{fastlz_compress, fastlz_decompress};
use multiconv_binary::reader::printable;
use multiconv_binary::{BinaryError, ByteReader, ByteWriter, Endian, Result};
use uuid::Uuid;

pub const ITEM_MAGIC: [u8; 4] = *b"hsin";
pub const DOMAIN_NI: [u8; 4] = *b"DSIN";
pub const DOMAIN_KONTAKT: [u8; 4] = *b"4KIN";

/// Offset of [`ITEM_MAGIC`] in a container file.
pub const MAGIC_OFFSET: usize = 12;

const ITEM_HEADER_SIZE: usize = 8 + 4 + 4 + 4 + 4 + 16;
const CHUNK_HEADER_SIZE: usize = 8 + 4 + 4 + 4;

/// Deepest nesting of items, counting children and sub-trees.
pub const MAX_DEPTH: usize = 64;

pub const COMPRESSION_NONE: u8 = 0;
pub const COMPRESSION_FASTLZ: u8 = 1;

/// Types of data chunks and child items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NiChunkType {
    Terminator,
    Authorization,
    BinaryChunk,
    SoundInfo,
    PresetChunk,
    Subtree,
    AuthoringApplication,
    Unknown(u32),
}

impl NiChunkType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Terminator,
            3 => Self::Authorization,
            4 => Self::BinaryChunk,
            101 => Self::SoundInfo,
            108 => Self::PresetChunk,
            115 => Self::Subtree,
            116 => Self::AuthoringApplication,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::Terminator => 1,
            Self::Authorization => 3,
            Self::BinaryChunk => 4,
            Self::SoundInfo => 101,
            Self::PresetChunk => 108,
            Self::Subtree => 115,
            Self::AuthoringApplication => 116,
            Self::Unknown(other) => other,
        }
    }
}

/// What a sub-tree turned out to contain.
#[derive(Debug)]
enum SubtreeContent {
    Item(Box<NiItem>),
    Encrypted,
}

/// A nested, possibly compressed item.
#[derive(Debug)]
pub struct NiSubtree {
    pub version: u32,
    pub compression: u8,
    pub raw_size: u32,
    /// The bytes as stored in the file.
    pub stored: Vec<u8>,
    /// Nesting depth of the item holding this sub-tree.
    depth: usize,
    content: OnceLock<SubtreeContent>,
}

impl Clone for NiSubtree {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            compression: self.compression,
            raw_size: self.raw_size,
            stored: self.stored.clone(),
            depth: self.depth,
            content: OnceLock::new(),
        }
    }
}

impl PartialEq for NiSubtree {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.compression == other.compression
            && self.raw_size == other.raw_size
            && self.stored == other.stored
    }
}

impl NiSubtree {
    /// Wrap `item` into a FastLZ compressed sub-tree.
    pub fn compress(item: &NiItem) -> Self {
        let raw = item.to_bytes();
        Self {
            version: 1,
            compression: COMPRESSION_FASTLZ,
            raw_size: raw.len() as u32,
            stored: fastlz_compress(&raw),
            depth: 0,
            content: OnceLock::new(),
        }
    }

    fn parse(payload: &[u8], base_offset: usize, depth: usize) -> Result<Self> {
        let mut reader = ByteReader::with_base_offset(payload, Endian::Little, base_offset);
        let version = reader.read_u32()?;
        let compression = reader.read_u8()?;
        let raw_size = reader.read_u32()?;
        let stored_size = reader.read_u32()? as usize;
        let stored = reader.read_bytes(stored_size)?;
        Ok(Self {
            version,
            compression,
            raw_size,
            stored,
            depth,
            content: OnceLock::new(),
        })
    }

    fn write(&self, writer: &mut ByteWriter) {
        writer.write_u32(self.version);
        writer.write_u8(self.compression);
        writer.write_u32(self.raw_size);
        writer.write_u32(self.stored.len() as u32);
        writer.write_bytes(&self.stored);
    }

    fn unpack(&self) -> SubtreeContent {
        let raw = match self.compression {
            COMPRESSION_NONE => Ok(self.stored.clone()),
            COMPRESSION_FASTLZ => fastlz_decompress(&self.stored, self.raw_size as usize),
            other => Err(BinaryError::CorruptData(format!("unknown compression {}", other))),
        };
        let item = raw.and_then(|bytes| NiItem::read(&mut ByteReader::new(&bytes, Endian::Little), self.depth + 1));
        match item {
            Ok(item) => SubtreeContent::Item(Box::new(item)),
            Err(e) => {
                log::warn!("Sub-tree could not be unpacked, probably encrypted: {}", e);
                SubtreeContent::Encrypted
            }
        }
    }

    /// The nested item, unpacked on first access. `None` if encrypted.
    pub fn item(&self) -> Option<&NiItem> {
        match self.content.get_or_init(|| self.unpack()) {
            SubtreeContent::Item(item) => Some(item.as_ref()),
            SubtreeContent::Encrypted => None,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.item().is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NiPayload {
    Raw(Vec<u8>),
    Subtree(NiSubtree),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NiDataChunk {
    pub domain: [u8; 4],
    pub chunk_type: NiChunkType,
    pub version: u32,
    pub payload: NiPayload,
}

impl NiDataChunk {
    pub fn raw(chunk_type: NiChunkType, data: Vec<u8>) -> Self {
        Self {
            domain: DOMAIN_NI,
            chunk_type,
            version: 1,
            payload: NiPayload::Raw(data),
        }
    }

    pub fn subtree(subtree: NiSubtree) -> Self {
        Self {
            domain: DOMAIN_NI,
            chunk_type: NiChunkType::Subtree,
            version: 1,
            payload: NiPayload::Subtree(subtree),
        }
    }

    pub fn with_domain(mut self, domain: [u8; 4]) -> Self {
        self.domain = domain;
        self
    }

    pub fn data(&self) -> Option<&[u8]> {
        match &self.payload {
            NiPayload::Raw(data) => Some(data.as_slice()),
            NiPayload::Subtree(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NiChild {
    pub flags: u32,
    pub domain: [u8; 4],
    pub child_type: NiChunkType,
    pub item: NiItem,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NiItem {
    pub version: u32,
    pub item_id: u32,
    pub reserved: u32,
    pub uuid: Uuid,
    pub chunks: Vec<NiDataChunk>,
    pub children_version: u32,
    pub children: Vec<NiChild>,
}

impl Default for NiItem {
    fn default() -> Self {
        Self {
            version: 1,
            item_id: 1,
            reserved: 0,
            uuid: Uuid::nil(),
            chunks: Vec::new(),
            children_version: 1,
            children: Vec::new(),
        }
    }
}

fn size_error(offset: usize, what: &str, size: u64, available: usize) -> BinaryError {
    BinaryError::parse(offset, format!("{} size of at most {}", what, available), size.to_string())
}

impl NiItem {
    /// An item with a fresh random UUID.
    pub fn new(chunks: Vec<NiDataChunk>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            chunks,
            ..Default::default()
        }
    }

    pub fn with_child(mut self, child_type: NiChunkType, item: NiItem) -> Self {
        self.children.push(NiChild {
            flags: 0,
            domain: DOMAIN_NI,
            child_type,
            item,
        });
        self
    }

    /// Parse the item at the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data, Endian::Little);
        Self::read(&mut reader, 0)
    }

    fn read(reader: &mut ByteReader, depth: usize) -> Result<Self> {
        let start = reader.position();
        let size_offset = reader.offset();
        if depth > MAX_DEPTH {
            return Err(BinaryError::parse(
                size_offset,
                format!("item nesting of at most {}", MAX_DEPTH),
                depth.to_string(),
            ));
        }
        let size = reader.read_u64()?;
        let available = reader.remaining() + 8;
        if size < ITEM_HEADER_SIZE as u64 || size > available as u64 {
            return Err(size_error(size_offset, "item", size, available));
        }
        let version = reader.read_u32()?;
        let magic_offset = reader.offset();
        let magic = reader.read_fourcc()?;
        if magic != ITEM_MAGIC {
            return Err(BinaryError::parse(magic_offset, "'hsin'", printable(&magic)));
        }
        let item_id = reader.read_u32()?;
        let reserved = reader.read_u32()?;
        let uuid_bytes = reader.take(16)?;
        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(uuid_bytes);

        let block_offset = reader.offset();
        let block_size = reader.read_u64()?;
        if block_size < 8 || block_size > reader.remaining() as u64 + 8 {
            return Err(size_error(block_offset, "data block", block_size, reader.remaining() + 8));
        }
        let block_base = reader.offset();
        let block = reader.take(block_size as usize - 8)?;
        let chunks = read_chunks(block, block_base, depth)?;

        let children_version = reader.read_u32()?;
        let count = reader.read_u32()?;
        let mut children = Vec::new();
        for _ in 0..count {
            let flags = reader.read_u32()?;
            let domain = reader.read_fourcc()?;
            let child_type = NiChunkType::from_u32(reader.read_u32()?);
            let item = Self::read(reader, depth + 1)?;
            children.push(NiChild {
                flags,
                domain,
                child_type,
                item,
            });
        }

        let consumed = (reader.position() - start) as u64;
        if consumed > size {
            return Err(BinaryError::parse(size_offset, format!("item size of at least {}", consumed), size.to_string()));
        }
        // unknown trailing data inside the item
        reader.skip((size - consumed) as usize)?;

        Ok(Self {
            version,
            item_id,
            reserved,
            uuid: Uuid::from_bytes(uuid),
            chunks,
            children_version,
            children,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new(Endian::Little);
        self.write(&mut writer);
        writer.into_inner()
    }

    fn write(&self, writer: &mut ByteWriter) {
        let start = writer.len();
        writer.write_u64(0);
        writer.write_u32(self.version);
        writer.write_fourcc(&ITEM_MAGIC);
        writer.write_u32(self.item_id);
        writer.write_u32(self.reserved);
        writer.write_bytes(self.uuid.as_bytes());

        let block_start = writer.len();
        writer.write_u64(0);
        for chunk in &self.chunks {
            let chunk_start = writer.len();
            writer.write_u64(0);
            writer.write_fourcc(&chunk.domain);
            writer.write_u32(chunk.chunk_type.as_u32());
            writer.write_u32(chunk.version);
            match &chunk.payload {
                NiPayload::Raw(data) => writer.write_bytes(data),
                NiPayload::Subtree(subtree) => subtree.write(writer),
            }
            patch_size(writer, chunk_start);
        }
        patch_size(writer, block_start);

        writer.write_u32(self.children_version);
        writer.write_u32(self.children.len() as u32);
        for child in &self.children {
            writer.write_u32(child.flags);
            writer.write_fourcc(&child.domain);
            writer.write_u32(child.child_type.as_u32());
            child.item.write(writer);
        }
        patch_size(writer, start);
    }

    /// First data chunk of type `chunk_type`, depth-first.
    ///
    /// The own chunks are searched first, then the items inside sub-trees,
    /// then the child items. Encrypted sub-trees are skipped.
    pub fn find(&self, chunk_type: NiChunkType) -> Option<&NiDataChunk> {
        if let Some(chunk) = self.chunks.iter().find(|c| c.chunk_type == chunk_type) {
            return Some(chunk);
        }
        let in_subtrees = self.subtree_items().find_map(|item| item.find(chunk_type));
        if in_subtrees.is_some() {
            return in_subtrees;
        }
        self.children.iter().find_map(|child| child.item.find(chunk_type))
    }

    /// All data chunks of type `chunk_type` in the order [`find`](Self::find) visits them.
    pub fn find_all(&self, chunk_type: NiChunkType) -> Vec<&NiDataChunk> {
        let mut found: Vec<&NiDataChunk> = self.chunks.iter().filter(|c| c.chunk_type == chunk_type).collect();
        for item in self.subtree_items() {
            found.extend(item.find_all(chunk_type));
        }
        for child in &self.children {
            found.extend(child.item.find_all(chunk_type));
        }
        found
    }

    /// True if any sub-tree in this item or below could not be unpacked.
    pub fn has_encrypted_subtree(&self) -> bool {
        let own = self.chunks.iter().any(|c| match &c.payload {
            NiPayload::Subtree(subtree) => subtree.item().map_or(true, |item| item.has_encrypted_subtree()),
            NiPayload::Raw(_) => false,
        });
        own || self.children.iter().any(|child| child.item.has_encrypted_subtree())
    }

    fn subtree_items(&self) -> impl Iterator<Item = &NiItem> {
        self.chunks.iter().filter_map(|c| match &c.payload {
            NiPayload::Subtree(subtree) => subtree.item(),
            NiPayload::Raw(_) => None,
        })
    }
}

fn patch_size(writer: &mut ByteWriter, start: usize) {
    let size = (writer.len() - start) as u64;
    // the placeholder was written by the caller, the offset is always valid
    let _ = writer.patch_u64(start, size);
}

fn read_chunks(block: &[u8], base_offset: usize, depth: usize) -> Result<Vec<NiDataChunk>> {
    let mut reader = ByteReader::with_base_offset(block, Endian::Little, base_offset);
    let mut chunks = Vec::new();
    while reader.remaining() >= CHUNK_HEADER_SIZE {
        let size_offset = reader.offset();
        let size = reader.read_u64()?;
        let available = reader.remaining() + 8;
        if size < CHUNK_HEADER_SIZE as u64 || size > available as u64 {
            return Err(size_error(size_offset, "data chunk", size, available));
        }
        let domain = reader.read_fourcc()?;
        let chunk_type = NiChunkType::from_u32(reader.read_u32()?);
        let version = reader.read_u32()?;
        let payload_offset = reader.offset();
        let payload = reader.take(size as usize - CHUNK_HEADER_SIZE)?;
        let payload = if chunk_type == NiChunkType::Subtree {
            NiPayload::Subtree(NiSubtree::parse(payload, payload_offset, depth)?)
        } else {
            NiPayload::Raw(payload.to_vec())
        };
        chunks.push(NiDataChunk {
            domain,
            chunk_type,
            version,
            payload,
        });
    }
    if !reader.is_exhausted() {
        log::debug!("Ignoring {} bytes after the last data chunk", reader.remaining());
    }
    Ok(chunks)
}

/// Descriptive data of a [`SoundInfo`](NiChunkType::SoundInfo) chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoundInfo {
    pub version: u32,
    pub name: String,
    pub author: String,
    pub description: String,
    pub tags: Vec<String>,
}

impl SoundInfo {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data, Endian::Little);
        let version = reader.read_u32()?;
        let name = reader.read_utf16()?;
        let author = reader.read_utf16()?;
        let description = reader.read_utf16()?;
        let count = reader.read_u32()?;
        let mut tags = Vec::new();
        for _ in 0..count {
            tags.push(reader.read_utf16()?);
        }
        Ok(Self {
            version,
            name,
            author,
            description,
            tags,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new(Endian::Little);
        writer.write_u32(self.version);
        writer.write_utf16(&self.name);
        writer.write_utf16(&self.author);
        writer.write_utf16(&self.description);
        writer.write_u32(self.tags.len() as u32);
        for tag in &self.tags {
            writer.write_utf16(tag);
        }
        writer.into_inner()
    }
}

/// True if `data` starts with an NI-Container item.
pub fn is_container(data: &[u8]) -> bool {
    data.len() >= MAGIC_OFFSET + 4 && data[MAGIC_OFFSET..MAGIC_OFFSET + 4] == ITEM_MAGIC
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(chunk_type: NiChunkType, data: &[u8]) -> NiItem {
        NiItem::new(vec![NiDataChunk::raw(chunk_type, data.to_vec())])
    }

    #[test]
    fn test_item_write_and_parse() {
        let item = leaf(NiChunkType::SoundInfo, b"info")
            .with_child(NiChunkType::BinaryChunk, leaf(NiChunkType::PresetChunk, b"preset"));
        let bytes = item.to_bytes();
        assert!(is_container(&bytes));
        let parsed = NiItem::parse(&bytes).unwrap();
        assert_eq!(parsed, item);
        assert_eq!(parsed.uuid, item.uuid);
    }

    #[test]
    fn test_find_searches_subtrees_before_children() {
        let nested = leaf(NiChunkType::PresetChunk, b"in subtree");
        let item = NiItem::new(vec![
            NiDataChunk::raw(NiChunkType::AuthoringApplication, b"app".to_vec()),
            NiDataChunk::subtree(NiSubtree::compress(&nested)),
        ])
        .with_child(NiChunkType::BinaryChunk, leaf(NiChunkType::PresetChunk, b"in child"));

        let parsed = NiItem::parse(&item.to_bytes()).unwrap();
        let found = parsed.find(NiChunkType::PresetChunk).unwrap();
        assert_eq!(found.data(), Some(&b"in subtree"[..]));
        let all: Vec<_> = parsed
            .find_all(NiChunkType::PresetChunk)
            .iter()
            .filter_map(|c| c.data())
            .collect();
        assert_eq!(all, vec![&b"in subtree"[..], &b"in child"[..]]);
        assert!(!parsed.has_encrypted_subtree());
    }

    #[test]
    fn test_undecompressable_subtree_is_encrypted() {
        let subtree = NiSubtree {
            version: 1,
            compression: COMPRESSION_FASTLZ,
            raw_size: 4096,
            stored: vec![0xE7; 64],
            depth: 0,
            content: OnceLock::new(),
        };
        let item = NiItem::new(vec![NiDataChunk::subtree(subtree)])
            .with_child(NiChunkType::BinaryChunk, leaf(NiChunkType::PresetChunk, b"visible"));
        let parsed = NiItem::parse(&item.to_bytes()).unwrap();
        assert!(parsed.has_encrypted_subtree());
        // the encrypted part is skipped, the search continues in the children
        assert_eq!(parsed.find(NiChunkType::PresetChunk).and_then(|c| c.data()), Some(&b"visible"[..]));
    }

    #[test]
    fn test_bad_magic_and_sizes() {
        let mut bytes = leaf(NiChunkType::SoundInfo, b"x").to_bytes();
        bytes[MAGIC_OFFSET] = b'X';
        assert!(matches!(NiItem::parse(&bytes), Err(BinaryError::Parse { .. })));

        let mut bytes = leaf(NiChunkType::SoundInfo, b"x").to_bytes();
        bytes[0] = 0xFF;
        assert!(matches!(NiItem::parse(&bytes), Err(BinaryError::Parse { .. })));
    }

    #[test]
    fn test_nesting_depth_is_limited() {
        let nest = |levels: usize| {
            (0..levels).fold(leaf(NiChunkType::SoundInfo, b"x"), |inner, _| {
                NiItem::default().with_child(NiChunkType::BinaryChunk, inner)
            })
        };
        assert!(NiItem::parse(&nest(MAX_DEPTH).to_bytes()).is_ok());
        let err = NiItem::parse(&nest(MAX_DEPTH + 1).to_bytes()).unwrap_err();
        assert!(matches!(err, BinaryError::Parse { ref expected, .. } if expected.contains("nesting")), "{}", err);
    }
}
