//! PICTURE block.
//!
//! Body layout (all integers big-endian u32):
//!
//! ```text
//! picture_type | mime_len | mime | desc_len | desc
//! | width | height | color_depth | color_count | data_len | data
//! ```

use std::io::{Cursor, Write};

use byteorder::{BigEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::block::{field_len, read_bytes, read_string, read_u32_be};
use crate::error::{FlacError, Result};
use crate::header::{BlockHeader, BlockType};

/// Default bits-per-pixel for pictures built without an explicit depth.
pub const DEFAULT_COLOR_DEPTH: u32 = 24;

/// Fixed part of the body: type + two length prefixes + five u32 fields.
const FIXED_BODY_LEN: usize = 4 + 4 + 4 + 4 * 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PictureType {
    Other,
    FileIcon,
    OtherFileIcon,
    #[default]
    FrontCover,
    BackCover,
    LeafletPage,
    Media,
    LeadArtist,
    Artist,
    Conductor,
    Band,
    Composer,
    Lyricist,
    RecordingLocation,
    DuringRecording,
    DuringPerformance,
    MovieScreenCapture,
    BrightColouredFish,
    Illustration,
    BandLogotype,
    PublisherLogotype,
    /// A code outside 0–20, kept as-is so it is written back unchanged.
    Unknown(u32),
}

impl PictureType {
    const ALL: [PictureType; 21] = [
        PictureType::Other,
        PictureType::FileIcon,
        PictureType::OtherFileIcon,
        PictureType::FrontCover,
        PictureType::BackCover,
        PictureType::LeafletPage,
        PictureType::Media,
        PictureType::LeadArtist,
        PictureType::Artist,
        PictureType::Conductor,
        PictureType::Band,
        PictureType::Composer,
        PictureType::Lyricist,
        PictureType::RecordingLocation,
        PictureType::DuringRecording,
        PictureType::DuringPerformance,
        PictureType::MovieScreenCapture,
        PictureType::BrightColouredFish,
        PictureType::Illustration,
        PictureType::BandLogotype,
        PictureType::PublisherLogotype,
    ];

    /// Decode a wire value.  Codes past the standard table become
    /// [`PictureType::Unknown`].
    pub fn from_u32(v: u32) -> Self {
        Self::ALL.get(v as usize).copied().unwrap_or(PictureType::Unknown(v))
    }

    pub fn to_u32(self) -> u32 {
        match self {
            PictureType::Unknown(v) => v,
            known => Self::ALL.iter().position(|t| *t == known).map_or(0, |i| i as u32),
        }
    }
}

/// Strict conversion for caller input: only the standard codes 0–20.
impl TryFrom<u32> for PictureType {
    type Error = FlacError;

    fn try_from(v: u32) -> Result<Self> {
        match Self::from_u32(v) {
            PictureType::Unknown(v) => Err(FlacError::InvalidPictureType(v)),
            known                   => Ok(known),
        }
    }
}

/// Caller-facing picture description.
///
/// `mime`, `width` and `height` may be left unset; they are then derived
/// from `data` when the block is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Picture {
    #[serde(default)]
    pub picture_type: PictureType,
    pub mime:         Option<String>,
    #[serde(default)]
    pub description:  String,
    pub width:        Option<u32>,
    pub height:       Option<u32>,
    pub color_depth:  u32,
    pub colors:       u32,
    #[serde(skip)]
    pub data:         Vec<u8>,
}

impl Picture {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            picture_type: PictureType::FrontCover,
            mime:         None,
            description:  String::new(),
            width:        None,
            height:       None,
            color_depth:  DEFAULT_COLOR_DEPTH,
            colors:       0,
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureBlock {
    pub header:       BlockHeader,
    pub picture_type: PictureType,
    pub mime:         String,
    pub description:  String,
    pub width:        u32,
    pub height:       u32,
    pub color_depth:  u32,
    pub colors:       u32,
    pub data:         Vec<u8>,
}

impl PictureBlock {
    /// Build a block from a caller description, sniffing the image for any
    /// of mime/width/height left unset.
    pub fn from_picture(picture: &Picture) -> Result<Self> {
        let (mime, width, height) = match (&picture.mime, picture.width, picture.height) {
            (Some(mime), Some(w), Some(h)) => (mime.clone(), w, h),
            _ => {
                let sniffed = sniff_image(&picture.data)?;
                (
                    picture.mime.clone().unwrap_or(sniffed.mime),
                    picture.width.unwrap_or(sniffed.width),
                    picture.height.unwrap_or(sniffed.height),
                )
            }
        };
        Ok(Self {
            header:       BlockHeader::new(BlockType::Picture),
            picture_type: picture.picture_type,
            mime,
            description:  picture.description.clone(),
            width,
            height,
            color_depth:  picture.color_depth,
            colors:       picture.colors,
            data:         picture.data.clone(),
        })
    }

    pub fn to_picture(&self) -> Picture {
        Picture {
            picture_type: self.picture_type,
            mime:         Some(self.mime.clone()),
            description:  self.description.clone(),
            width:        Some(self.width),
            height:       Some(self.height),
            color_depth:  self.color_depth,
            colors:       self.colors,
            data:         self.data.clone(),
        }
    }

    pub fn decode(header: BlockHeader, body: &[u8]) -> Result<Self> {
        if header.block_type != BlockType::Picture {
            return Err(FlacError::UnexpectedBlockType {
                expected: BlockType::Picture,
                found:    header.block_type,
            });
        }
        let mut cursor = Cursor::new(body);

        let picture_type = PictureType::from_u32(read_u32_be(&mut cursor, "picture type")?);
        let mime_len     = read_u32_be(&mut cursor, "mime length")?;
        let mime         = read_string(&mut cursor, mime_len, "mime")?;
        let desc_len     = read_u32_be(&mut cursor, "description length")?;
        let description  = read_string(&mut cursor, desc_len, "description")?;
        let width        = read_u32_be(&mut cursor, "width")?;
        let height       = read_u32_be(&mut cursor, "height")?;
        let color_depth  = read_u32_be(&mut cursor, "color depth")?;
        let colors       = read_u32_be(&mut cursor, "color count")?;
        let data_len     = read_u32_be(&mut cursor, "picture data length")?;
        let data         = read_bytes(&mut cursor, data_len, "picture data")?;

        Ok(Self { header, picture_type, mime, description, width, height, color_depth, colors, data })
    }

    pub fn body_len(&self) -> usize {
        FIXED_BODY_LEN + self.mime.len() + self.description.len() + self.data.len()
    }

    pub fn write_body<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_u32::<BigEndian>(self.picture_type.to_u32())?;
        writer.write_u32::<BigEndian>(field_len(self.mime.len(), "mime")?)?;
        writer.write_all(self.mime.as_bytes())?;
        writer.write_u32::<BigEndian>(field_len(self.description.len(), "description")?)?;
        writer.write_all(self.description.as_bytes())?;
        writer.write_u32::<BigEndian>(self.width)?;
        writer.write_u32::<BigEndian>(self.height)?;
        writer.write_u32::<BigEndian>(self.color_depth)?;
        writer.write_u32::<BigEndian>(self.colors)?;
        writer.write_u32::<BigEndian>(field_len(self.data.len(), "picture data")?)?;
        writer.write_all(&self.data)?;
        Ok(())
    }
}

// ── Image sniffing ───────────────────────────────────────────────────────────

struct SniffedImage {
    mime:   String,
    width:  u32,
    height: u32,
}

fn sniff_image(data: &[u8]) -> Result<SniffedImage> {
    let format = image::guess_format(data).map_err(|e| FlacError::ImageSniff(e.to_string()))?;
    let (width, height) = image::ImageReader::with_format(Cursor::new(data), format)
        .into_dimensions()
        .map_err(|e| FlacError::ImageSniff(e.to_string()))?;
    Ok(SniffedImage { mime: format.to_mime_type().to_owned(), width, height })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MetadataBlock;
    use crate::header::BLOCK_HEADER_SIZE;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::new(width, height);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn sample() -> PictureBlock {
        PictureBlock {
            header:       BlockHeader::new(BlockType::Picture),
            picture_type: PictureType::BackCover,
            mime:         "image/jpeg".into(),
            description:  "rückseite".into(),
            width:        640,
            height:       480,
            color_depth:  24,
            colors:       0,
            data:         vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3],
        }
    }

    #[test]
    fn body_round_trip() {
        let block = sample();
        let bytes = MetadataBlock::Picture(block.clone()).to_bytes(true).unwrap();
        let header = BlockHeader::peek(&bytes).unwrap();
        assert_eq!(header.body_length as usize, block.body_len());
        assert_eq!(
            bytes.len(),
            BLOCK_HEADER_SIZE + 4 + 4 + 10 + 4 + "rückseite".len() + 4 * 5 + 7
        );

        let decoded = PictureBlock::decode(header, &bytes[BLOCK_HEADER_SIZE..]).unwrap();
        assert_eq!(decoded, PictureBlock { header, ..block });
    }

    #[test]
    fn fields_are_big_endian() {
        let mut body = Vec::new();
        sample().write_body(&mut body).unwrap();
        assert_eq!(&body[0..4], &[0, 0, 0, 4]);
        assert_eq!(&body[4..8], &[0, 0, 0, 10]);
    }

    #[test]
    fn rejects_wrong_header_type() {
        let header = BlockHeader::new(BlockType::VorbisComment);
        assert!(matches!(
            PictureBlock::decode(header, &[0; 32]),
            Err(FlacError::UnexpectedBlockType { expected: BlockType::Picture, .. })
        ));
    }

    #[test]
    fn truncated_data_is_an_error() {
        let mut body = Vec::new();
        sample().write_body(&mut body).unwrap();
        body.pop();
        let header = BlockHeader::new(BlockType::Picture);
        assert!(matches!(
            PictureBlock::decode(header, &body),
            Err(FlacError::Truncated { field: "picture data", needed: 7, available: 6 })
        ));
    }

    #[test]
    fn caller_picture_type_must_be_standard() {
        assert!(matches!(PictureType::try_from(21), Err(FlacError::InvalidPictureType(21))));
        assert_eq!(PictureType::try_from(20).unwrap(), PictureType::PublisherLogotype);
        assert_eq!(PictureType::FrontCover.to_u32(), 3);
        for code in 0..21 {
            assert_eq!(PictureType::from_u32(code).to_u32(), code);
        }
    }

    #[test]
    fn nonstandard_picture_type_decodes_and_round_trips() {
        let block = PictureBlock { picture_type: PictureType::Unknown(21), ..sample() };
        let bytes = MetadataBlock::Picture(block).to_bytes(true).unwrap();
        assert_eq!(&bytes[BLOCK_HEADER_SIZE..BLOCK_HEADER_SIZE + 4], &[0, 0, 0, 21]);

        let header = BlockHeader::peek(&bytes).unwrap();
        let decoded = PictureBlock::decode(header, &bytes[BLOCK_HEADER_SIZE..]).unwrap();
        assert_eq!(decoded.picture_type, PictureType::Unknown(21));
        assert_eq!(MetadataBlock::Picture(decoded).to_bytes(true).unwrap(), bytes);
    }

    #[test]
    fn non_utf8_description_decodes_lossily() {
        let mut body = Vec::new();
        PictureBlock { description: String::new(), ..sample() }.write_body(&mut body).unwrap();
        // empty description length sits after type(4) + mime len(4) + mime(10)
        body.splice(18..22, [0, 0, 0, 3, b'C', b'a', 0xE9]);
        let decoded = PictureBlock::decode(BlockHeader::new(BlockType::Picture), &body).unwrap();
        assert_eq!(decoded.description, "Ca\u{FFFD}");
        assert_eq!(decoded.width, 640);
    }

    #[test]
    fn sniffs_missing_metadata() {
        let picture = Picture::new(png(5, 3));
        let block = PictureBlock::from_picture(&picture).unwrap();
        assert_eq!(block.mime, "image/png");
        assert_eq!((block.width, block.height), (5, 3));
        assert_eq!(block.picture_type, PictureType::FrontCover);
        assert_eq!(block.color_depth, DEFAULT_COLOR_DEPTH);
        assert_eq!(block.colors, 0);
    }

    #[test]
    fn explicit_fields_win_over_sniffing() {
        let picture = Picture { width: Some(100), ..Picture::new(png(5, 3)) };
        let block = PictureBlock::from_picture(&picture).unwrap();
        assert_eq!((block.width, block.height), (100, 3));
    }

    #[test]
    fn fully_specified_picture_skips_sniffing() {
        let picture = Picture {
            mime:   Some("image/x-custom".into()),
            width:  Some(1),
            height: Some(1),
            ..Picture::new(b"not an image".to_vec())
        };
        assert_eq!(PictureBlock::from_picture(&picture).unwrap().mime, "image/x-custom");
    }

    #[test]
    fn sniffing_failure_fails_construction() {
        let picture = Picture::new(b"not an image".to_vec());
        assert!(matches!(PictureBlock::from_picture(&picture), Err(FlacError::ImageSniff(_))));
    }
}
