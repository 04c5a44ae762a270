//! Error types for the flactag crate.

use std::io;
use thiserror::Error;

use crate::header::BlockType;

#[derive(Error, Debug)]
pub enum FlacError {
    #[error("Invalid stream header: expected \"fLaC\", got {found:?}")]
    InvalidMarker { found: [u8; 4] },

    #[error("Invalid stream header, must be at least 4 bytes long got {got}")]
    TruncatedMarker { got: usize },

    #[error("Truncated {field}: needs {needed} bytes, {available} available")]
    Truncated { field: &'static str, needed: usize, available: usize },

    #[error("Unexpected block type: expected {expected:?}, got {found:?}")]
    UnexpectedBlockType { expected: BlockType, found: BlockType },

    #[error("Invalid picture type: {0}")]
    InvalidPictureType(u32),

    #[error("Block body of {0} bytes does not fit a 24-bit length")]
    BlockTooLarge(usize),

    #[error("Field {field} of {len} bytes does not fit a 32-bit length")]
    FieldTooLarge { field: &'static str, len: usize },

    #[error("Cannot derive picture metadata from image data: {0}")]
    ImageSniff(String),

    #[error("Metadata not finalized yet: no block has declared itself last")]
    NotFinalized,

    #[error("Input ended before any metadata block declared itself last")]
    Unterminated,

    #[error("Tagger aborted: {0}")]
    Aborted(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FlacError {
    /// Marker mismatch, or a closed input that ended before the marker or
    /// before any block declared itself last.
    pub fn is_malformed_container(&self) -> bool {
        matches!(
            self,
            FlacError::InvalidMarker { .. } | FlacError::TruncatedMarker { .. } | FlacError::Unterminated
        )
    }

    pub(crate) fn into_io(self) -> io::Error {
        match self {
            FlacError::Io(e) => e,
            other            => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

pub type Result<T> = std::result::Result<T, FlacError>;
