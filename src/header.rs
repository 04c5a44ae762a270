//! Stream marker and the 4-byte metadata block header.
//!
//! # Layout
//!
//! | Byte | Bits | Field |
//! |------|------|-------|
//! | 0    | 7    | last-block flag |
//! | 0    | 0–6  | block type |
//! | 1–3  | all  | body length, big-endian u24 |
//!
//! Decoding never fails: a type value outside 0–6 becomes
//! [`BlockType::Invalid`], which callers must check for explicitly.

use serde::Serialize;

/// The 4-byte ASCII marker every FLAC stream starts with.
pub const MARKER: &[u8; 4] = b"fLaC";
/// Size of an encoded block header.
pub const BLOCK_HEADER_SIZE: usize = 4;
/// Largest body length the 24-bit field can carry.
pub const MAX_BODY_LENGTH: u32 = 0x00FF_FFFF;

const LAST_FLAG: u8 = 0b1000_0000;
const TYPE_MASK: u8 = 0b0111_1111;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BlockType {
    StreamInfo,
    Padding,
    Application,
    SeekTable,
    VorbisComment,
    CueSheet,
    Picture,
    /// Any type value this codec cannot place in the chain.
    Invalid,
}

impl BlockType {
    /// Wire value. `Invalid` encodes as the 127 sentinel.
    pub fn to_u8(self) -> u8 {
        match self {
            BlockType::StreamInfo    => 0,
            BlockType::Padding       => 1,
            BlockType::Application   => 2,
            BlockType::SeekTable     => 3,
            BlockType::VorbisComment => 4,
            BlockType::CueSheet      => 5,
            BlockType::Picture       => 6,
            BlockType::Invalid       => 127,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BlockType::StreamInfo    => "STREAMINFO",
            BlockType::Padding       => "PADDING",
            BlockType::Application   => "APPLICATION",
            BlockType::SeekTable     => "SEEKTABLE",
            BlockType::VorbisComment => "VORBIS_COMMENT",
            BlockType::CueSheet      => "CUESHEET",
            BlockType::Picture       => "PICTURE",
            BlockType::Invalid       => "INVALID",
        }
    }
}

impl From<u8> for BlockType {
    fn from(v: u8) -> Self {
        match v & TYPE_MASK {
            0 => BlockType::StreamInfo,
            1 => BlockType::Padding,
            2 => BlockType::Application,
            3 => BlockType::SeekTable,
            4 => BlockType::VorbisComment,
            5 => BlockType::CueSheet,
            6 => BlockType::Picture,
            _ => BlockType::Invalid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub block_type:  BlockType,
    pub body_length: u32,
    pub is_last:     bool,
}

impl BlockHeader {
    pub fn new(block_type: BlockType) -> Self {
        Self { block_type, body_length: 0, is_last: false }
    }

    pub fn from_bytes(bytes: &[u8; BLOCK_HEADER_SIZE]) -> Self {
        Self {
            block_type:  BlockType::from(bytes[0]),
            body_length: u32::from_be_bytes([0, bytes[1], bytes[2], bytes[3]]),
            is_last:     bytes[0] & LAST_FLAG != 0,
        }
    }

    /// Decode the header at the start of `buf`, or `None` if fewer than
    /// [`BLOCK_HEADER_SIZE`] bytes are available.
    pub fn peek(buf: &[u8]) -> Option<Self> {
        let bytes: &[u8; BLOCK_HEADER_SIZE] = buf.get(..BLOCK_HEADER_SIZE)?.try_into().ok()?;
        Some(Self::from_bytes(bytes))
    }

    pub fn to_bytes(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let len = (self.body_length & MAX_BODY_LENGTH).to_be_bytes();
        let flag = if self.is_last { LAST_FLAG } else { 0 };
        [self.block_type.to_u8() | flag, len[1], len[2], len[3]]
    }

    /// Header plus body.
    pub fn block_length(&self) -> usize {
        BLOCK_HEADER_SIZE + self.body_length as usize
    }
}
