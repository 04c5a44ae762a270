//! Incremental tagger: rewrites the metadata chain of a chunked byte stream.
//!
//! # States
//!
//! | State | Behaviour |
//! |-------|-----------|
//! | `AwaitingMarker` | buffer until 4 bytes are available, then check `fLaC` |
//! | `AccumulatingBlocks` | decode each block once it is fully buffered |
//! | `Passthrough` | forward every byte untouched, nothing buffered |
//! | `Failed` | terminal; every later call reports the first failure |
//!
//! The transition to `Passthrough` ("finalization") happens when a block
//! carrying the last-block flag is consumed, or when a header with an
//! `Invalid` type is seen.  At that point the rebuilt header region is
//! emitted: marker, caller-supplied blocks (comment, then picture), the
//! retained decoded blocks, and whatever buffered bytes lie past the chain.
//!
//! # Merge policy
//! - A decoded comment block is dropped if the caller supplied a tag map.
//! - A decoded picture block is dropped if it has the same picture type as
//!   the caller's picture.  Differently-typed pictures are kept.
//! - Every other block is kept unchanged.
//!
//! # Read-only mode
//! Built with [`FlacStreamTagger::read_only`].  Each chunk is emitted as-is
//! the moment it arrives.  The header region is still observed so that
//! [`FlacStreamTagger::tags`] can resolve, but an observation failure never
//! fails the stream; it only fails the accessors.  Observation holds at most
//! `TagOptions::observe_limit` bytes; past that the tagger gives up on the
//! tags, drops its buffer and keeps forwarding.
//!
//! Unlike [`crate::stream::FlacStream::from_bytes`], a block whose body is
//! not fully buffered makes the tagger wait: later chunks may complete it.

use std::mem;

use tracing::{debug, info, warn};

use crate::block::{sync_chain_headers, write_chain, CommentBlock, MetadataBlock, PictureBlock, PictureType};
use crate::error::{FlacError, Result};
use crate::header::{BlockType, MARKER};
use crate::stream::check_marker;
use crate::tags::{FlacTags, TagOptions, DEFAULT_OBSERVE_LIMIT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaggerState {
    AwaitingMarker,
    AccumulatingBlocks,
    Passthrough,
    Failed,
}

pub struct FlacStreamTagger {
    state:            TaggerState,
    read_only:        bool,
    /// Unresolved header-region bytes.  Emptied on finalization.
    header_buffer:    Vec<u8>,
    /// Parse position inside `header_buffer`.
    offset:           usize,
    /// Caller blocks first, then retained decoded blocks.
    blocks:           Vec<MetadataBlock>,
    replaces_comment: bool,
    replaces_picture: Option<PictureType>,
    /// Message of the first failure, reported by every later call.
    failure:          Option<String>,
    /// Read-only buffering cap.
    observe_limit:    usize,
}

impl FlacStreamTagger {
    /// Pass every byte through unchanged while observing the tags.
    pub fn read_only() -> Self {
        Self {
            state:            TaggerState::AwaitingMarker,
            read_only:        true,
            header_buffer:    Vec::new(),
            offset:           0,
            blocks:           Vec::new(),
            replaces_comment: false,
            replaces_picture: None,
            failure:          None,
            observe_limit:    DEFAULT_OBSERVE_LIMIT,
        }
    }

    pub fn new(tags: FlacTags) -> Result<Self> {
        Self::with_options(Some(tags), &TagOptions::default())
    }

    /// `None` builds a read-only tagger.  Building the picture block may
    /// sniff the image, so construction can fail.
    pub fn with_options(tags: Option<FlacTags>, opts: &TagOptions) -> Result<Self> {
        let mut tagger = Self::read_only();
        tagger.observe_limit = opts.observe_limit;
        let tags = match tags {
            Some(t) => t,
            None    => return Ok(tagger),
        };
        tagger.read_only = false;

        if let Some(map) = &tags.tag_map {
            tagger.blocks.push(MetadataBlock::Comment(CommentBlock::from_tag_map(opts.vendor_string.clone(), map)));
            tagger.replaces_comment = true;
        }
        if let Some(picture) = &tags.picture {
            let block = PictureBlock::from_picture(picture)?;
            tagger.replaces_picture = Some(block.picture_type);
            tagger.blocks.push(MetadataBlock::Picture(block));
        }
        Ok(tagger)
    }

    pub fn state(&self) -> TaggerState {
        self.state
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// True once input bytes are forwarded without inspection.
    pub fn is_passthrough(&self) -> bool {
        self.state == TaggerState::Passthrough
    }

    // ── Input ────────────────────────────────────────────────────────────────

    /// Feed one chunk; emitted bytes are appended to `out`.
    pub fn process(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> Result<()> {
        if self.read_only {
            out.extend_from_slice(chunk);
            if matches!(self.state, TaggerState::Passthrough | TaggerState::Failed) {
                return Ok(());
            }
            if self.header_buffer.len() + chunk.len() > self.observe_limit {
                warn!(limit = self.observe_limit, "header region exceeds observation limit");
                self.fail_with(format!("header region exceeds {} bytes", self.observe_limit));
                return Ok(());
            }
            // Observation errors are recorded by `step`, never surfaced.
            let _ = self.step(chunk, out);
            return Ok(());
        }

        match self.state {
            TaggerState::Passthrough => {
                out.extend_from_slice(chunk);
                Ok(())
            }
            TaggerState::Failed => Err(self.aborted()),
            _ => self.step(chunk, out),
        }
    }

    /// Signal end of input.
    ///
    /// Fails with `TruncatedMarker` if fewer than 4 bytes ever arrived, and
    /// with `Unterminated` if no block declared itself last.  A read-only
    /// tagger never fails here; the accessors report the problem instead.
    pub fn finish(&mut self) -> Result<()> {
        let err = match self.state {
            TaggerState::Passthrough        => return Ok(()),
            TaggerState::Failed if self.read_only => return Ok(()),
            TaggerState::Failed             => return Err(self.aborted()),
            TaggerState::AwaitingMarker     => FlacError::TruncatedMarker { got: self.header_buffer.len() },
            TaggerState::AccumulatingBlocks => FlacError::Unterminated,
        };
        warn!(state = ?self.state, buffered = self.header_buffer.len(), "input ended before finalization");
        self.fail_with(err.to_string());
        if self.read_only { Ok(()) } else { Err(err) }
    }

    /// Record an upstream failure.  The tagger is terminal afterwards.
    pub fn abort(&mut self, reason: impl ToString) {
        if self.state != TaggerState::Failed {
            self.fail_with(reason.to_string());
        }
    }

    fn fail_with(&mut self, reason: String) {
        self.state = TaggerState::Failed;
        self.header_buffer = Vec::new();
        self.failure = Some(reason);
    }

    fn aborted(&self) -> FlacError {
        FlacError::Aborted(self.failure.clone().unwrap_or_default())
    }

    // ── State machine ────────────────────────────────────────────────────────

    fn step(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.header_buffer.extend_from_slice(chunk);
        match self.advance(out) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.fail_with(e.to_string());
                Err(e)
            }
        }
    }

    fn advance(&mut self, out: &mut Vec<u8>) -> Result<()> {
        if self.state == TaggerState::AwaitingMarker {
            if self.header_buffer.len() < MARKER.len() {
                return Ok(());
            }
            check_marker(&self.header_buffer)?;
            self.offset = MARKER.len();
            self.state = TaggerState::AccumulatingBlocks;
        }

        // `None` means the next header or body is not fully delivered yet.
        while let Some((block, used)) = MetadataBlock::parse(&self.header_buffer[self.offset..])? {
            if block.block_type() == BlockType::Invalid {
                warn!(offset = self.offset, "invalid block type, finalizing");
                return self.finalize(out);
            }
            let is_last = block.header().is_last;
            self.offset += used;
            self.classify(block);

            if is_last {
                return self.finalize(out);
            }
        }
        Ok(())
    }

    fn classify(&mut self, block: MetadataBlock) {
        let keep = match &block {
            MetadataBlock::Comment(_) => !self.replaces_comment,
            MetadataBlock::Picture(p) => self.replaces_picture != Some(p.picture_type),
            MetadataBlock::Opaque(_)  => true,
        };
        debug!(block_type = block.block_type().name(), len = block.body_len(), keep, "consumed block");
        if keep {
            self.blocks.push(block);
        }
    }

    fn finalize(&mut self, out: &mut Vec<u8>) -> Result<()> {
        self.state = TaggerState::Passthrough;
        let buffered = mem::take(&mut self.header_buffer);
        let remainder = &buffered[self.offset..];

        sync_chain_headers(&mut self.blocks)?;
        if !self.read_only {
            out.extend_from_slice(MARKER);
            write_chain(&self.blocks, &mut *out)?;
            out.extend_from_slice(remainder);
        }
        info!(
            blocks = self.blocks.len(),
            payload_head = remainder.len(),
            read_only = self.read_only,
            "metadata finalized"
        );
        self.offset = 0;
        Ok(())
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    fn ready(&self) -> Result<()> {
        match self.state {
            TaggerState::Passthrough => Ok(()),
            TaggerState::Failed      => Err(self.aborted()),
            _                        => Err(FlacError::NotFinalized),
        }
    }

    /// The merged block chain, in emission order.
    pub fn blocks(&self) -> Result<&[MetadataBlock]> {
        self.ready()?;
        Ok(&self.blocks)
    }

    pub fn tags(&self) -> Result<FlacTags> {
        self.ready()?;
        Ok(FlacTags::from_blocks(&self.blocks))
    }

    pub fn into_blocks(self) -> Result<Vec<MetadataBlock>> {
        self.ready()?;
        Ok(self.blocks)
    }
}
