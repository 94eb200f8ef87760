//! RIFF and IFF style chunk trees.
//!
//! A chunk is `{fourCC, u32 size, payload}` followed by a pad byte when the size
//! is odd. RIFF files are little-endian and start with `RIFF <size> <form type>`;
//! `LIST` chunks carry a list type followed by nested chunks. Headerless
//! big-endian chunk streams (as used by Korg sample files) are handled by
//! [`parse_chunks`] with [`Endian::Big`].

use crate::error::{BinaryError, Result};
use crate::reader::{printable, ByteReader, Endian};
use crate::writer::ByteWriter;

pub const RIFF_ID: [u8; 4] = *b"RIFF";
pub const LIST_ID: [u8; 4] = *b"LIST";

/// One node of a chunk tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkNode {
    /// A leaf chunk with raw payload.
    Chunk { id: [u8; 4], data: Vec<u8> },
    /// A `LIST` chunk with its list type and children.
    List {
        list_type: [u8; 4],
        children: Vec<ChunkNode>,
    },
}

impl ChunkNode {
    pub fn chunk(id: &[u8; 4], data: Vec<u8>) -> Self {
        Self::Chunk { id: *id, data }
    }

    pub fn list(list_type: &[u8; 4], children: Vec<ChunkNode>) -> Self {
        Self::List {
            list_type: *list_type,
            children,
        }
    }

    /// The chunk ID, `LIST` for lists.
    pub fn id(&self) -> [u8; 4] {
        match self {
            Self::Chunk { id, .. } => *id,
            Self::List { .. } => LIST_ID,
        }
    }

    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Chunk { data, .. } => Some(data),
            Self::List { .. } => None,
        }
    }

    pub fn children(&self) -> &[ChunkNode] {
        match self {
            Self::Chunk { .. } => &[],
            Self::List { children, .. } => children,
        }
    }

    /// Size of the serialized payload, without header and padding.
    fn payload_size(&self) -> usize {
        match self {
            Self::Chunk { data, .. } => data.len(),
            Self::List { children, .. } => 4 + children.iter().map(|c| c.serialized_size()).sum::<usize>(),
        }
    }

    fn serialized_size(&self) -> usize {
        let size = self.payload_size();
        8 + size + (size & 1)
    }
}

/// A parsed RIFF file.
#[derive(Debug, Clone, PartialEq)]
pub struct RiffFile {
    pub form_type: [u8; 4],
    pub chunks: Vec<ChunkNode>,
}

impl RiffFile {
    pub fn new(form_type: &[u8; 4]) -> Self {
        Self {
            form_type: *form_type,
            chunks: Vec::new(),
        }
    }

    /// First top-level leaf chunk with the given ID.
    pub fn find_chunk(&self, id: &[u8; 4]) -> Option<&[u8]> {
        find_chunk(&self.chunks, id)
    }

    /// First top-level list with the given list type.
    pub fn find_list(&self, list_type: &[u8; 4]) -> Option<&[ChunkNode]> {
        find_list(&self.chunks, list_type)
    }
}

/// First leaf chunk with the given ID in `nodes`.
pub fn find_chunk<'a>(nodes: &'a [ChunkNode], id: &[u8; 4]) -> Option<&'a [u8]> {
    nodes.iter().find_map(|node| match node {
        ChunkNode::Chunk { id: chunk_id, data } if chunk_id == id => Some(data.as_slice()),
        _ => None,
    })
}

/// Children of the first list with the given type in `nodes`.
pub fn find_list<'a>(nodes: &'a [ChunkNode], list_type: &[u8; 4]) -> Option<&'a [ChunkNode]> {
    nodes.iter().find_map(|node| match node {
        ChunkNode::List {
            list_type: lt,
            children,
        } if lt == list_type => Some(children.as_slice()),
        _ => None,
    })
}

/// Parse a complete RIFF file and check its form type.
pub fn parse_riff(data: &[u8], expected_form: &[u8; 4]) -> Result<RiffFile> {
    let mut reader = ByteReader::new(data, Endian::Little);
    reader.expect_magic(&RIFF_ID)?;
    let size_offset = reader.offset();
    let size = reader.read_u32()? as usize;
    if size < 4 || size > reader.remaining() {
        return Err(BinaryError::parse(
            size_offset,
            format!("RIFF size between 4 and {}", reader.remaining()),
            size.to_string(),
        ));
    }
    let form_offset = reader.offset();
    let form_type = reader.read_fourcc()?;
    if &form_type != expected_form {
        return Err(BinaryError::parse(
            form_offset,
            format!("form type {}", printable(expected_form)),
            printable(&form_type),
        ));
    }
    let body = reader.take(size - 4)?;
    let chunks = parse_chunks_at(body, Endian::Little, form_offset + 4)?;
    Ok(RiffFile { form_type, chunks })
}

/// Parse a sequence of chunks that fills `data` completely.
pub fn parse_chunks(data: &[u8], endian: Endian) -> Result<Vec<ChunkNode>> {
    parse_chunks_at(data, endian, 0)
}

fn parse_chunks_at(data: &[u8], endian: Endian, base_offset: usize) -> Result<Vec<ChunkNode>> {
    let mut reader = ByteReader::with_base_offset(data, endian, base_offset);
    let mut nodes = Vec::new();

    while reader.remaining() >= 8 {
        let id = reader.read_fourcc()?;
        let size_offset = reader.offset();
        let size = reader.read_u32()? as usize;
        if size > reader.remaining() {
            return Err(BinaryError::parse(
                size_offset,
                format!("chunk {} size of at most {}", printable(&id), reader.remaining()),
                size.to_string(),
            ));
        }
        let payload_offset = reader.offset();
        let payload = reader.take(size)?;
        if size & 1 == 1 && reader.remaining() > 0 {
            reader.skip(1)?;
        }

        if id == LIST_ID {
            if payload.len() < 4 {
                return Err(BinaryError::parse(payload_offset, "LIST type", "truncated list"));
            }
            let list_type = [payload[0], payload[1], payload[2], payload[3]];
            let children = parse_chunks_at(&payload[4..], endian, payload_offset + 4)?;
            nodes.push(ChunkNode::List {
                list_type,
                children,
            });
        } else {
            nodes.push(ChunkNode::Chunk {
                id,
                data: payload.to_vec(),
            });
        }
    }

    if reader.remaining() > 0 {
        log::debug!(
            "Ignoring {} trailing bytes after last chunk at offset {}",
            reader.remaining(),
            reader.offset()
        );
    }

    Ok(nodes)
}

/// Serialize a RIFF file including its header.
pub fn write_riff(file: &RiffFile) -> Vec<u8> {
    let mut writer = ByteWriter::new(Endian::Little);
    writer.write_fourcc(&RIFF_ID);
    let body_size = 4 + file.chunks.iter().map(|c| c.serialized_size()).sum::<usize>();
    writer.write_u32(body_size as u32);
    writer.write_fourcc(&file.form_type);
    write_chunks(&mut writer, &file.chunks);
    writer.into_inner()
}

/// Serialize chunks into `writer` using its byte order.
pub fn write_chunks(writer: &mut ByteWriter, nodes: &[ChunkNode]) {
    for node in nodes {
        write_node(writer, node);
    }
}

fn write_node(writer: &mut ByteWriter, node: &ChunkNode) {
    let size = node.payload_size();
    writer.write_fourcc(&node.id());
    writer.write_u32(size as u32);
    match node {
        ChunkNode::Chunk { data, .. } => writer.write_bytes(data),
        ChunkNode::List {
            list_type,
            children,
        } => {
            writer.write_fourcc(list_type);
            write_chunks(writer, children);
        }
    }
    if size & 1 == 1 {
        writer.write_u8(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file() -> RiffFile {
        RiffFile {
            form_type: *b"TEST",
            chunks: vec![
                ChunkNode::chunk(b"abcd", vec![1, 2, 3]),
                ChunkNode::list(b"INFO", vec![ChunkNode::chunk(b"INAM", b"name\0".to_vec())]),
            ],
        }
    }

    #[test]
    fn test_odd_chunks_are_padded() {
        let bytes = write_riff(&sample_file());
        // 12 header + (8 + 3 + 1) + (8 + 4 + 8 + 5 + 1)
        assert_eq!(bytes.len(), 12 + 12 + 26);
        assert_eq!(&bytes[4..8], &((bytes.len() - 8) as u32).to_le_bytes());
    }

    #[test]
    fn test_parse_written_tree() {
        let file = sample_file();
        let parsed = parse_riff(&write_riff(&file), b"TEST").unwrap();
        assert_eq!(parsed, file);
        assert_eq!(parsed.find_chunk(b"abcd"), Some(&[1u8, 2, 3][..]));
        assert_eq!(find_chunk(parsed.find_list(b"INFO").unwrap(), b"INAM"), Some(&b"name\0"[..]));
    }

    #[test]
    fn test_wrong_form_type_is_rejected() {
        let bytes = write_riff(&sample_file());
        let err = parse_riff(&bytes, b"WAVE").unwrap_err();
        assert!(matches!(err, BinaryError::Parse { offset: 8, .. }));
    }

    #[test]
    fn test_oversized_chunk_is_rejected() {
        let mut writer = ByteWriter::new(Endian::Big);
        writer.write_fourcc(b"SMP1");
        writer.write_u32(100);
        writer.write_bytes(&[0; 10]);
        let err = parse_chunks(writer.as_slice(), Endian::Big).unwrap_err();
        assert!(matches!(err, BinaryError::Parse { offset: 4, .. }));
    }
}
