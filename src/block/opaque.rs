use crate::header::BlockHeader;

/// A block whose body is never interpreted (STREAMINFO, PADDING,
/// APPLICATION, SEEKTABLE, CUESHEET, or an `Invalid` placeholder).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueBlock {
    pub header: BlockHeader,
    pub body:   Vec<u8>,
}

impl OpaqueBlock {
    pub fn new(header: BlockHeader, body: Vec<u8>) -> Self {
        Self { header, body }
    }
}
