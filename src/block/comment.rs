//! VORBIS_COMMENT block.
//!
//! Body layout (all lengths little-endian u32, byte counts not code points):
//!
//! ```text
//! vendor_len | vendor | comment_count | { comment_len | comment }*
//! ```

use std::io::{Cursor, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::block::{field_len, read_string, read_u32_le};
use crate::error::{FlacError, Result};
use crate::header::{BlockHeader, BlockType};
use crate::tags::{TagMap, TagValue};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentBlock {
    pub header:        BlockHeader,
    pub vendor_string: String,
    /// Raw `KEY=VALUE` entries in stored order.
    pub comments:      Vec<String>,
}

impl CommentBlock {
    pub fn new(vendor_string: impl Into<String>, comments: Vec<String>) -> Self {
        Self {
            header: BlockHeader::new(BlockType::VorbisComment),
            vendor_string: vendor_string.into(),
            comments,
        }
    }

    pub fn decode(header: BlockHeader, body: &[u8]) -> Result<Self> {
        if header.block_type != BlockType::VorbisComment {
            return Err(FlacError::UnexpectedBlockType {
                expected: BlockType::VorbisComment,
                found:    header.block_type,
            });
        }
        let mut cursor = Cursor::new(body);

        let vendor_len = read_u32_le(&mut cursor, "vendor length")?;
        let vendor_string = read_string(&mut cursor, vendor_len, "vendor string")?;

        let count = read_u32_le(&mut cursor, "comment count")?;
        // Each entry needs at least its 4-byte length prefix.
        let mut comments = Vec::with_capacity((count as usize).min(body.len() / 4));
        for _ in 0..count {
            let len = read_u32_le(&mut cursor, "comment length")?;
            comments.push(read_string(&mut cursor, len, "comment")?);
        }

        Ok(Self { header, vendor_string, comments })
    }

    pub fn body_len(&self) -> usize {
        4 + self.vendor_string.len()
            + 4 + self.comments.iter().map(|c| 4 + c.len()).sum::<usize>()
    }

    pub fn write_body<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_u32::<LittleEndian>(field_len(self.vendor_string.len(), "vendor string")?)?;
        writer.write_all(self.vendor_string.as_bytes())?;
        writer.write_u32::<LittleEndian>(field_len(self.comments.len(), "comment count")?)?;
        for comment in &self.comments {
            writer.write_u32::<LittleEndian>(field_len(comment.len(), "comment")?)?;
            writer.write_all(comment.as_bytes())?;
        }
        Ok(())
    }

    /// Group entries by upper-cased key.  Entries without `=` are skipped;
    /// the value is everything after the first `=`.
    pub fn to_tag_map(&self) -> TagMap {
        let mut map = TagMap::new();
        for entry in &self.comments {
            if let Some((key, value)) = entry.split_once('=') {
                map.append(key, value);
            }
        }
        map
    }

    /// Flatten a tag map into `KEY=value` entries, one per list element.
    pub fn comments_from_tag_map(map: &TagMap) -> Vec<String> {
        let mut comments = Vec::new();
        for (key, value) in map.iter() {
            match value {
                TagValue::Single(v)   => comments.push(format!("{key}={v}")),
                TagValue::Multiple(v) => comments.extend(v.iter().map(|v| format!("{key}={v}"))),
            }
        }
        comments
    }

    pub fn from_tag_map(vendor_string: impl Into<String>, map: &TagMap) -> Self {
        Self::new(vendor_string, Self::comments_from_tag_map(map))
    }
}
