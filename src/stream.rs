//! Whole-buffer container codec.
//!
//! A [`FlacStream`] is the `fLaC` marker, the metadata block chain and the
//! audio payload that follows the last block.  The payload is never parsed.
//!
//! # Chain termination
//! Decoding stops at the first of:
//! - a block whose header carries the last-block flag (it is kept),
//! - a header with an `Invalid` type (not kept; its bytes start the payload),
//! - a header or body running past the end of the buffer (not kept).
//!
//! The last case is tolerated on purpose: a complete buffer cannot grow, so
//! a short block means the file is damaged past that point.  The incremental
//! tagger in [`crate::tagger`] instead waits for more bytes.

use std::io::{self, Read, Write};

use tracing::{debug, info, warn};

use crate::block::{sync_chain_headers, write_chain, CommentBlock, MetadataBlock, PictureBlock};
use crate::error::{FlacError, Result};
use crate::header::{BlockHeader, BlockType, BLOCK_HEADER_SIZE, MARKER};
use crate::tags::{FlacTags, TagOptions};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlacStream {
    pub blocks:  Vec<MetadataBlock>,
    pub payload: Vec<u8>,
}

impl FlacStream {
    pub fn new(blocks: Vec<MetadataBlock>, payload: Vec<u8>) -> Self {
        Self { blocks, payload }
    }

    // ── Decoding ─────────────────────────────────────────────────────────────

    pub fn from_bytes(buffer: &[u8]) -> Result<Self> {
        check_marker(buffer)?;

        let mut offset = MARKER.len();
        let mut blocks: Vec<MetadataBlock> = Vec::new();

        while !blocks.last().is_some_and(|b| b.header().is_last) {
            let (block, used) = match MetadataBlock::parse(&buffer[offset..])? {
                Some(parsed) => parsed,
                None         => {
                    warn!(offset, "truncated block, treating the rest as payload");
                    break;
                }
            };
            if block.block_type() == BlockType::Invalid {
                warn!(offset, "invalid block type, treating the rest as payload");
                break;
            }
            debug!(offset, block_type = block.block_type().name(), len = used - BLOCK_HEADER_SIZE, "decoded block");
            blocks.push(block);
            offset += used;
        }

        Ok(Self { blocks, payload: buffer[offset..].to_vec() })
    }

    /// Read a whole stream, then decode it as a buffer.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer)?;
        Self::from_bytes(&buffer)
    }

    /// Decode only the metadata chain, leaving the audio frames in `reader`.
    ///
    /// `payload` holds whatever was consumed past the chain: nothing when a
    /// block declared itself last, or the 4 header bytes of an `Invalid`
    /// block.  Unlike [`FlacStream::from_bytes`], running out of input
    /// before the last block is an error.
    pub fn read_metadata<R: Read>(mut reader: R) -> Result<Self> {
        let mut marker = [0u8; 4];
        let got = read_full(&mut reader, &mut marker)?;
        if got < marker.len() {
            return Err(FlacError::TruncatedMarker { got });
        }
        check_marker(&marker)?;

        let mut blocks = Vec::new();
        loop {
            let mut raw = [0u8; BLOCK_HEADER_SIZE];
            if read_full(&mut reader, &mut raw)? < BLOCK_HEADER_SIZE {
                return Err(FlacError::Unterminated);
            }
            let header = BlockHeader::from_bytes(&raw);
            if header.block_type == BlockType::Invalid {
                warn!("invalid block type, stopping metadata read");
                return Ok(Self { blocks, payload: raw.to_vec() });
            }

            let mut body = Vec::new();
            (&mut reader).take(header.body_length as u64).read_to_end(&mut body)?;
            if body.len() < header.body_length as usize {
                return Err(FlacError::Unterminated);
            }
            blocks.push(MetadataBlock::decode(header, &body)?);
            debug!(block_type = header.block_type.name(), len = header.body_length, "read block");

            if header.is_last {
                return Ok(Self { blocks, payload: Vec::new() });
            }
        }
    }

    // ── Encoding ─────────────────────────────────────────────────────────────

    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(MARKER)?;
        write_chain(&self.blocks, &mut writer)?;
        writer.write_all(&self.payload)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.write(&mut out)?;
        Ok(out)
    }

    /// The encoded block chain alone, without marker or payload.
    pub fn metadata_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        write_chain(&self.blocks, &mut out)?;
        Ok(out)
    }

    /// Set every stored header to what the encoder will emit.
    pub fn sync_headers(&mut self) -> Result<()> {
        sync_chain_headers(&mut self.blocks)
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        MARKER.len() + self.blocks.iter().map(MetadataBlock::encoded_len).sum::<usize>() + self.payload.len()
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn comment_block(&self) -> Option<&CommentBlock> {
        self.blocks.iter().find_map(MetadataBlock::as_comment)
    }

    pub fn comment_block_mut(&mut self) -> Option<&mut CommentBlock> {
        self.blocks.iter_mut().find_map(|b| match b {
            MetadataBlock::Comment(c) => Some(c),
            _                         => None,
        })
    }

    pub fn picture_block(&self) -> Option<&PictureBlock> {
        self.blocks.iter().find_map(MetadataBlock::as_picture)
    }

    pub fn tags(&self) -> FlacTags {
        FlacTags::from_blocks(&self.blocks)
    }

    // ── Tag rewrite ──────────────────────────────────────────────────────────

    /// Merge caller tags into the chain.
    ///
    /// - A tag map replaces the comment list of the existing comment block
    ///   in place, or is appended as a new comment block.
    /// - A picture removes every existing picture block and is appended.
    /// - Padding blocks are always dropped.
    pub fn apply_tags(&mut self, tags: &FlacTags, opts: &TagOptions) -> Result<()> {
        // Build the picture first so a sniffing failure leaves `self` untouched.
        let picture = tags.picture.as_ref().map(PictureBlock::from_picture).transpose()?;

        if let Some(map) = &tags.tag_map {
            let comments = CommentBlock::comments_from_tag_map(map);
            match self.comment_block_mut() {
                Some(existing) => existing.comments = comments,
                None           => self.blocks.push(MetadataBlock::Comment(
                    CommentBlock::new(opts.vendor_string.clone(), comments),
                )),
            }
        }

        if let Some(picture) = picture {
            self.blocks.retain(|b| b.block_type() != BlockType::Picture);
            self.blocks.push(MetadataBlock::Picture(picture));
        }

        let before = self.blocks.len();
        self.blocks.retain(|b| b.block_type() != BlockType::Padding);
        info!(
            blocks = self.blocks.len(),
            padding_dropped = before - self.blocks.len(),
            "applied tags"
        );
        Ok(())
    }
}

pub(crate) fn check_marker(buffer: &[u8]) -> Result<()> {
    match buffer.get(..MARKER.len()) {
        None => Err(FlacError::TruncatedMarker { got: buffer.len() }),
        Some(found) if found != MARKER => {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(found);
            Err(FlacError::InvalidMarker { found: bytes })
        }
        Some(_) => Ok(()),
    }
}

/// `read_exact` that reports how much it got instead of failing on EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut got = 0;
    while got < buf.len() {
        match reader.read(&mut buf[got..]) {
            Ok(0) => break,
            Ok(n) => got += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(got)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::block::{OpaqueBlock, Picture, PictureType};
    use crate::tags::{TagMap, TagValue};

    pub(crate) fn opaque(block_type: BlockType, body: &[u8]) -> MetadataBlock {
        MetadataBlock::Opaque(OpaqueBlock::new(BlockHeader::new(block_type), body.to_vec()))
    }

    pub(crate) fn picture(picture_type: PictureType, data: &[u8]) -> MetadataBlock {
        MetadataBlock::Picture(PictureBlock {
            header:       BlockHeader::new(BlockType::Picture),
            picture_type,
            mime:         "image/png".into(),
            description:  String::new(),
            width:        1,
            height:       1,
            color_depth:  24,
            colors:       0,
            data:         data.to_vec(),
        })
    }

    pub(crate) fn comment(entries: &[&str]) -> MetadataBlock {
        MetadataBlock::Comment(CommentBlock::new(
            "reference libFLAC 1.4.3",
            entries.iter().map(|s| s.to_string()).collect(),
        ))
    }

    /// STREAMINFO, SEEKTABLE, comment, front cover, padding.
    pub(crate) fn sample_stream() -> FlacStream {
        FlacStream::new(
            vec![
                opaque(BlockType::StreamInfo, &[0x12; 34]),
                opaque(BlockType::SeekTable, &[0x34; 18]),
                comment(&["TITLE=old", "ARTIST=someone"]),
                picture(PictureType::FrontCover, b"old cover"),
                opaque(BlockType::Padding, &[0; 64]),
            ],
            b"\xFF\xF8audio frames".to_vec(),
        )
    }

    /// STREAMINFO, a comment block holding a Latin-1 entry, and a picture
    /// with the non-standard type code 21.
    pub(crate) fn legacy_stream_bytes() -> Vec<u8> {
        let mut comment_body = Vec::new();
        comment_body.extend_from_slice(&[3, 0, 0, 0]);
        comment_body.extend_from_slice(b"old");
        comment_body.extend_from_slice(&[2, 0, 0, 0]);
        comment_body.extend_from_slice(&[10, 0, 0, 0]);
        comment_body.extend_from_slice(b"TITLE=Caf\xE9");
        comment_body.extend_from_slice(&[8, 0, 0, 0]);
        comment_body.extend_from_slice(b"ARTIST=x");

        let mut bytes = MARKER.to_vec();
        bytes.extend(opaque(BlockType::StreamInfo, &[0; 34]).to_bytes(false).unwrap());
        bytes.extend_from_slice(&[0x04, 0, 0, comment_body.len() as u8]);
        bytes.extend_from_slice(&comment_body);
        bytes.extend(picture(PictureType::Unknown(21), b"odd").to_bytes(true).unwrap());
        bytes.extend_from_slice(b"frames");
        bytes
    }

    fn fully_specified(data: &[u8]) -> Picture {
        Picture {
            mime:   Some("image/jpeg".into()),
            width:  Some(2),
            height: Some(2),
            ..Picture::new(data.to_vec())
        }
    }

    #[test]
    fn round_trip_for_several_chain_lengths() {
        let all = sample_stream().blocks;
        for n in [1usize, 3, 5] {
            let mut stream = FlacStream::new(all[..n].to_vec(), b"payload".to_vec());
            stream.sync_headers().unwrap();
            let bytes = stream.to_bytes().unwrap();
            assert_eq!(bytes.len(), stream.encoded_len());
            assert_eq!(FlacStream::from_bytes(&bytes).unwrap(), stream);
        }
    }

    #[test]
    fn round_trip_with_eight_blocks() {
        let mut blocks = sample_stream().blocks;
        blocks.push(opaque(BlockType::Application, b"ABCDxyz"));
        blocks.push(opaque(BlockType::CueSheet, &[7; 40]));
        blocks.push(picture(PictureType::BackCover, b"back"));
        let mut stream = FlacStream::new(blocks, Vec::new());
        stream.sync_headers().unwrap();
        assert_eq!(stream.blocks.len(), 8);
        assert_eq!(FlacStream::from_bytes(&stream.to_bytes().unwrap()).unwrap(), stream);
    }

    #[test]
    fn rejects_bad_marker() {
        let err = FlacStream::from_bytes(b"OggS\0\0\0\0").unwrap_err();
        assert!(err.is_malformed_container());
        assert!(matches!(err, FlacError::InvalidMarker { found } if &found == b"OggS"));
        assert!(FlacStream::from_bytes(b"fLa").unwrap_err().is_malformed_container());
    }

    #[test]
    fn invalid_type_ends_the_chain() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MARKER);
        bytes.extend(opaque(BlockType::StreamInfo, &[1; 34]).to_bytes(false).unwrap());
        bytes.extend_from_slice(&[0x7F, 0, 0, 2, 0xAA, 0xBB, 0xCC]);

        let stream = FlacStream::from_bytes(&bytes).unwrap();
        assert_eq!(stream.blocks.len(), 1);
        assert_eq!(stream.payload, vec![0x7F, 0, 0, 2, 0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn truncated_body_ends_the_chain() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MARKER);
        bytes.extend(opaque(BlockType::StreamInfo, &[1; 34]).to_bytes(false).unwrap());
        let tail = opaque(BlockType::Padding, &[0; 100]).to_bytes(true).unwrap();
        bytes.extend_from_slice(&tail[..50]);

        let stream = FlacStream::from_bytes(&bytes).unwrap();
        assert_eq!(stream.blocks.len(), 1);
        assert_eq!(stream.payload, &tail[..50]);
    }

    #[test]
    fn encode_forces_single_last_flag() {
        let mut stream = sample_stream();
        for b in stream.blocks.iter_mut() {
            b.header_mut().is_last = true;
        }
        let decoded = FlacStream::from_bytes(&stream.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.blocks.len(), 5);
        let flags: Vec<bool> = decoded.blocks.iter().map(|b| b.header().is_last).collect();
        assert_eq!(flags, vec![false, false, false, false, true]);
        assert_eq!(decoded.payload, stream.payload);
    }

    #[test]
    fn accessors_find_comment_and_picture() {
        let stream = sample_stream();
        assert_eq!(stream.comment_block().unwrap().comments[0], "TITLE=old");
        assert_eq!(stream.picture_block().unwrap().data, b"old cover");
        let tags = stream.tags();
        assert_eq!(tags.tag_map.unwrap().get("artist"), Some(&TagValue::from("someone")));
        assert_eq!(tags.picture.unwrap().picture_type, PictureType::FrontCover);
    }

    #[test]
    fn rewrite_keeps_comment_position_replaces_picture_and_drops_padding() {
        let mut stream = sample_stream();
        let mut map = TagMap::new();
        map.insert("title", "new");
        let tags = FlacTags { tag_map: Some(map), picture: Some(fully_specified(b"new cover")) };
        stream.apply_tags(&tags, &TagOptions::default()).unwrap();

        let types: Vec<BlockType> = stream.blocks.iter().map(MetadataBlock::block_type).collect();
        assert_eq!(types, vec![
            BlockType::StreamInfo,
            BlockType::SeekTable,
            BlockType::VorbisComment,
            BlockType::Picture,
        ]);
        let comment = stream.comment_block().unwrap();
        assert_eq!(comment.comments, vec!["TITLE=new"]);
        assert_eq!(comment.vendor_string, "reference libFLAC 1.4.3");
        assert_eq!(stream.picture_block().unwrap().data, b"new cover");
    }

    #[test]
    fn rewrite_appends_missing_comment_block() {
        let mut stream = FlacStream::new(vec![opaque(BlockType::StreamInfo, &[0; 34])], Vec::new());
        let opts = TagOptions { vendor_string: "test vendor".into(), ..TagOptions::default() };
        let mut map = TagMap::new();
        map.insert("ALBUM", "x");
        stream.apply_tags(&FlacTags::with_tag_map(map), &opts).unwrap();

        assert_eq!(stream.blocks.len(), 2);
        let comment = stream.blocks[1].as_comment().unwrap();
        assert_eq!(comment.vendor_string, "test vendor");
        assert_eq!(comment.comments, vec!["ALBUM=x"]);
    }

    #[test]
    fn rewrite_without_tag_map_keeps_comments() {
        let mut stream = sample_stream();
        let tags = FlacTags { tag_map: None, picture: None };
        stream.apply_tags(&tags, &TagOptions::default()).unwrap();
        assert_eq!(stream.comment_block().unwrap().comments.len(), 2);
        assert_eq!(stream.picture_block().unwrap().data, b"old cover");
        assert!(stream.blocks.iter().all(|b| b.block_type() != BlockType::Padding));
    }

    #[test]
    fn sniffing_failure_leaves_stream_untouched() {
        let mut stream = sample_stream();
        let before = stream.clone();
        let tags = FlacTags { tag_map: Some(TagMap::new()), picture: Some(Picture::new(b"junk".to_vec())) };
        assert!(matches!(stream.apply_tags(&tags, &TagOptions::default()), Err(FlacError::ImageSniff(_))));
        assert_eq!(stream, before);
    }

    #[test]
    fn read_metadata_stops_at_last_block() {
        let bytes = sample_stream().to_bytes().unwrap();
        let mut cursor = io::Cursor::new(&bytes);
        let stream = FlacStream::read_metadata(&mut cursor).unwrap();
        assert_eq!(stream.blocks.len(), 5);
        assert!(stream.payload.is_empty());

        let mut rest = Vec::new();
        cursor.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"\xFF\xF8audio frames");
    }

    #[test]
    fn read_metadata_on_closed_short_stream() {
        let err = FlacStream::read_metadata(&b"fLa"[..]).unwrap_err();
        assert!(matches!(err, FlacError::TruncatedMarker { got: 3 }));
        assert!(err.is_malformed_container());

        let err = FlacStream::read_metadata(&b"fLaC\x00\x00\x00\x22\x01\x02"[..]).unwrap_err();
        assert!(matches!(err, FlacError::Unterminated));
        assert!(err.is_malformed_container());
    }

    #[test]
    fn decodes_latin1_comment_and_nonstandard_picture_type() {
        let bytes = legacy_stream_bytes();
        let stream = FlacStream::from_bytes(&bytes).unwrap();
        assert_eq!(stream.blocks.len(), 3);
        assert_eq!(stream.comment_block().unwrap().comments[0], "TITLE=Caf\u{FFFD}");
        assert_eq!(stream.picture_block().unwrap().picture_type, PictureType::Unknown(21));
        assert_eq!(stream.payload, b"frames");

        let meta = FlacStream::read_metadata(&bytes[..]).unwrap();
        assert_eq!(meta.blocks, stream.blocks);

        let mut map = TagMap::new();
        map.insert("TITLE", "Café");
        let tagged = crate::tags::write_tags_bytes(&FlacTags::with_tag_map(map), &bytes).unwrap();
        let rewritten = FlacStream::from_bytes(&tagged).unwrap();
        assert_eq!(rewritten.comment_block().unwrap().comments, vec!["TITLE=Café"]);
        assert_eq!(rewritten.picture_block().unwrap().picture_type.to_u32(), 21);
    }

    #[test]
    fn from_reader_matches_from_bytes() {
        let bytes = sample_stream().to_bytes().unwrap();
        assert_eq!(
            FlacStream::from_reader(&bytes[..]).unwrap(),
            FlacStream::from_bytes(&bytes).unwrap()
        );
    }

    #[test]
    fn metadata_bytes_excludes_marker_and_payload() {
        let stream = sample_stream();
        let meta = stream.metadata_bytes().unwrap();
        let full = stream.to_bytes().unwrap();
        assert_eq!(&full[4..4 + meta.len()], &meta[..]);
        assert_eq!(full.len(), 4 + meta.len() + stream.payload.len());
    }
}
