//! `std::io` adapters that drive a [`FlacStreamTagger`].
//!
//! # Reader
//! [`TaggedReader`] wraps a source and yields the tagged stream.  It pulls
//! one chunk of `chunk_size` bytes from the source only after everything
//! emitted so far has been handed to the caller, so a slow consumer never
//! causes unbounded buffering.  Once the tagger reaches passthrough, reads
//! go straight from the source into the caller's buffer.
//!
//! # Writer
//! [`TaggerWriter`] is the push-side equivalent: bytes written to it are
//! tagged and forwarded to the inner writer with blocking `write_all`
//! before `write` returns.
//!
//! Tagger errors surface as `io::ErrorKind::InvalidData`; source and sink
//! errors keep their original kind and abort the tagger.

use std::io::{self, Read, Write};

use tracing::debug;

use crate::error::Result;
use crate::tagger::FlacStreamTagger;
use crate::tags::{FlacTags, TagOptions, DEFAULT_CHUNK_SIZE};

// ── Reader ───────────────────────────────────────────────────────────────────

pub struct TaggedReader<R: Read> {
    inner:      R,
    tagger:     FlacStreamTagger,
    chunk:      Vec<u8>,
    pending:    Vec<u8>,
    pending_at: usize,
    eof:        bool,
}

impl<R: Read> TaggedReader<R> {
    pub fn new(inner: R, tags: Option<FlacTags>) -> Result<Self> {
        Self::with_options(inner, tags, &TagOptions::default())
    }

    pub fn with_options(inner: R, tags: Option<FlacTags>, opts: &TagOptions) -> Result<Self> {
        Ok(Self::from_tagger(inner, FlacStreamTagger::with_options(tags, opts)?, opts.chunk_size))
    }

    pub fn from_tagger(inner: R, tagger: FlacStreamTagger, chunk_size: usize) -> Self {
        Self {
            inner,
            tagger,
            chunk:      vec![0u8; chunk_size.max(1)],
            pending:    Vec::new(),
            pending_at: 0,
            eof:        false,
        }
    }

    pub fn tagger(&self) -> &FlacStreamTagger {
        &self.tagger
    }

    pub fn into_parts(self) -> (R, FlacStreamTagger) {
        (self.inner, self.tagger)
    }

    /// Pull one chunk from the source and run it through the tagger.
    fn fill(&mut self) -> io::Result<()> {
        let n = loop {
            match self.inner.read(&mut self.chunk) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.tagger.abort(&e);
                    return Err(e);
                }
            }
        };
        self.pending.clear();
        self.pending_at = 0;
        if n == 0 {
            self.eof = true;
            debug!("source exhausted");
            return self.tagger.finish().map_err(|e| e.into_io());
        }
        self.tagger
            .process(&self.chunk[..n], &mut self.pending)
            .map_err(|e| e.into_io())
    }
}

impl<R: Read> Read for TaggedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.pending_at < self.pending.len() {
                let n = buf.len().min(self.pending.len() - self.pending_at);
                buf[..n].copy_from_slice(&self.pending[self.pending_at..self.pending_at + n]);
                self.pending_at += n;
                return Ok(n);
            }
            if self.eof {
                return Ok(0);
            }
            if self.tagger.is_passthrough() {
                let n = self.inner.read(buf).inspect_err(|e| self.tagger.abort(e))?;
                if n == 0 {
                    self.eof = true;
                }
                return Ok(n);
            }
            self.fill()?;
        }
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct TaggerWriter<W: Write> {
    inner:   W,
    tagger:  FlacStreamTagger,
    scratch: Vec<u8>,
}

impl<W: Write> TaggerWriter<W> {
    pub fn new(inner: W, tags: Option<FlacTags>) -> Result<Self> {
        Self::with_options(inner, tags, &TagOptions::default())
    }

    pub fn with_options(inner: W, tags: Option<FlacTags>, opts: &TagOptions) -> Result<Self> {
        Ok(Self::from_tagger(inner, FlacStreamTagger::with_options(tags, opts)?))
    }

    pub fn from_tagger(inner: W, tagger: FlacStreamTagger) -> Self {
        Self { inner, tagger, scratch: Vec::new() }
    }

    pub fn tagger(&self) -> &FlacStreamTagger {
        &self.tagger
    }

    /// Signal end of input, flush, and hand back the sink and the tagger.
    pub fn finish(mut self) -> Result<(W, FlacStreamTagger)> {
        self.tagger.finish()?;
        self.inner.flush()?;
        Ok((self.inner, self.tagger))
    }
}

impl<W: Write> Write for TaggerWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.tagger.is_passthrough() {
            return self.inner.write(buf).inspect_err(|e| self.tagger.abort(e));
        }
        self.scratch.clear();
        self.tagger.process(buf, &mut self.scratch).map_err(|e| e.into_io())?;
        if let Err(e) = self.inner.write_all(&self.scratch) {
            self.tagger.abort(&e);
            return Err(e);
        }
        if self.scratch.capacity() > DEFAULT_CHUNK_SIZE * 4 {
            self.scratch = Vec::new();
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
