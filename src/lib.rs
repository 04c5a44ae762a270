pub mod header;
pub mod error;
pub mod block;
pub mod tags;
pub mod stream;
pub mod tagger;
pub mod io_stream;

pub use header::{BlockHeader, BlockType, MARKER};
pub use error::{FlacError, Result};
pub use block::{CommentBlock, MetadataBlock, OpaqueBlock, Picture, PictureBlock, PictureType};
pub use tags::{read_tags, read_tags_bytes, write_tags_bytes, FlacTags, TagMap, TagOptions, TagValue};
pub use stream::FlacStream;
pub use tagger::{FlacStreamTagger, TaggerState};
pub use io_stream::{TaggedReader, TaggerWriter};
