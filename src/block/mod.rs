//! Metadata block variants.
//!
//! Only VORBIS_COMMENT and PICTURE bodies are interpreted.  Every other
//! type, including the `Invalid` placeholder, is carried as an
//! [`OpaqueBlock`] and reproduced byte-for-byte.
//!
//! Stored headers reflect what was decoded.  The encoder never trusts
//! them: `is_last` is supplied by the caller and `body_length` is
//! recomputed from the current field values on every write.

pub mod comment;
pub mod opaque;
pub mod picture;

use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

use crate::error::{FlacError, Result};
use crate::header::{BlockHeader, BlockType, BLOCK_HEADER_SIZE, MAX_BODY_LENGTH};

pub use comment::CommentBlock;
pub use opaque::OpaqueBlock;
pub use picture::{Picture, PictureBlock, PictureType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataBlock {
    Comment(CommentBlock),
    Picture(PictureBlock),
    Opaque(OpaqueBlock),
}

impl MetadataBlock {
    /// Decode one block body.  `body` must be exactly the bytes delimited
    /// by `header.body_length`.
    pub fn decode(header: BlockHeader, body: &[u8]) -> Result<Self> {
        Ok(match header.block_type {
            BlockType::VorbisComment => MetadataBlock::Comment(CommentBlock::decode(header, body)?),
            BlockType::Picture       => MetadataBlock::Picture(PictureBlock::decode(header, body)?),
            _                        => MetadataBlock::Opaque(OpaqueBlock::new(header, body.to_vec())),
        })
    }

    /// Decode the block at the start of `buf`.
    ///
    /// Returns `Ok(None)` when `buf` does not yet hold the whole block.
    /// An `Invalid` header is returned as an opaque block with an empty
    /// body so callers can stop on it.
    pub fn parse(buf: &[u8]) -> Result<Option<(Self, usize)>> {
        let header = match BlockHeader::peek(buf) {
            Some(h) => h,
            None    => return Ok(None),
        };
        if header.block_type == BlockType::Invalid {
            return Ok(Some((MetadataBlock::Opaque(OpaqueBlock::new(header, Vec::new())), BLOCK_HEADER_SIZE)));
        }
        let total = header.block_length();
        if buf.len() < total {
            return Ok(None);
        }
        let block = Self::decode(header, &buf[BLOCK_HEADER_SIZE..total])?;
        Ok(Some((block, total)))
    }

    pub fn header(&self) -> &BlockHeader {
        match self {
            MetadataBlock::Comment(b) => &b.header,
            MetadataBlock::Picture(b) => &b.header,
            MetadataBlock::Opaque(b)  => &b.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut BlockHeader {
        match self {
            MetadataBlock::Comment(b) => &mut b.header,
            MetadataBlock::Picture(b) => &mut b.header,
            MetadataBlock::Opaque(b)  => &mut b.header,
        }
    }

    pub fn block_type(&self) -> BlockType {
        self.header().block_type
    }

    /// Encoded body size, computed from the current field values.
    pub fn body_len(&self) -> usize {
        match self {
            MetadataBlock::Comment(b) => b.body_len(),
            MetadataBlock::Picture(b) => b.body_len(),
            MetadataBlock::Opaque(b)  => b.body.len(),
        }
    }

    /// Header plus body.
    pub fn encoded_len(&self) -> usize {
        BLOCK_HEADER_SIZE + self.body_len()
    }

    /// The header the encoder will emit for this block.
    pub fn encoded_header(&self, is_last: bool) -> Result<BlockHeader> {
        let body_len = self.body_len();
        if body_len > MAX_BODY_LENGTH as usize {
            return Err(FlacError::BlockTooLarge(body_len));
        }
        Ok(BlockHeader {
            block_type:  self.block_type(),
            body_length: body_len as u32,
            is_last,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W, is_last: bool) -> Result<()> {
        writer.write_all(&self.encoded_header(is_last)?.to_bytes())?;
        match self {
            MetadataBlock::Comment(b) => b.write_body(&mut writer),
            MetadataBlock::Picture(b) => b.write_body(&mut writer),
            MetadataBlock::Opaque(b)  => Ok(writer.write_all(&b.body)?),
        }
    }

    pub fn to_bytes(&self, is_last: bool) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.write(&mut out, is_last)?;
        Ok(out)
    }

    pub fn as_comment(&self) -> Option<&CommentBlock> {
        match self {
            MetadataBlock::Comment(b) => Some(b),
            _                         => None,
        }
    }

    pub fn as_picture(&self) -> Option<&PictureBlock> {
        match self {
            MetadataBlock::Picture(b) => Some(b),
            _                         => None,
        }
    }
}

/// Encode a chain of blocks: `is_last` only on the final element.
pub fn write_chain<W: Write>(blocks: &[MetadataBlock], mut writer: W) -> Result<()> {
    let last = blocks.len().saturating_sub(1);
    for (i, block) in blocks.iter().enumerate() {
        block.write(&mut writer, i == last)?;
    }
    Ok(())
}

/// Refresh every stored header to what [`write_chain`] will emit.
pub fn sync_chain_headers(blocks: &mut [MetadataBlock]) -> Result<()> {
    let last = blocks.len().saturating_sub(1);
    for (i, block) in blocks.iter_mut().enumerate() {
        let header = block.encoded_header(i == last)?;
        *block.header_mut() = header;
    }
    Ok(())
}

// ── Body field readers ───────────────────────────────────────────────────────
//
// Short reads are reported as `Truncated` with the field name instead of a
// bare EOF, and length prefixes are checked against the remaining body
// before anything is allocated.

fn remaining(cursor: &Cursor<&[u8]>) -> usize {
    cursor.get_ref().len().saturating_sub(cursor.position() as usize)
}

pub(crate) fn read_u32_le(cursor: &mut Cursor<&[u8]>, field: &'static str) -> Result<u32> {
    let available = remaining(cursor);
    cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| FlacError::Truncated { field, needed: 4, available })
}

pub(crate) fn read_u32_be(cursor: &mut Cursor<&[u8]>, field: &'static str) -> Result<u32> {
    let available = remaining(cursor);
    cursor
        .read_u32::<BigEndian>()
        .map_err(|_| FlacError::Truncated { field, needed: 4, available })
}

pub(crate) fn read_bytes(cursor: &mut Cursor<&[u8]>, len: u32, field: &'static str) -> Result<Vec<u8>> {
    let needed = len as usize;
    let available = remaining(cursor);
    if needed > available {
        return Err(FlacError::Truncated { field, needed, available });
    }
    let mut out = vec![0u8; needed];
    cursor.read_exact(&mut out)?;
    Ok(out)
}

/// Text fields decode lossily: non-UTF-8 bytes (Latin-1 tags are common)
/// become U+FFFD instead of failing the block.
pub(crate) fn read_string(cursor: &mut Cursor<&[u8]>, len: u32, field: &'static str) -> Result<String> {
    let bytes = read_bytes(cursor, len, field)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub(crate) fn field_len(len: usize, field: &'static str) -> Result<u32> {
    u32::try_from(len).map_err(|_| FlacError::FieldTooLarge { field, len })
}
