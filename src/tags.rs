//! Tag mapping, caller-facing tag bundle, and tagging options.
//!
//! ```no_run
//! use flactag::tags::{read_tags_bytes, write_tags_bytes, FlacTags, TagMap};
//!
//! let source = std::fs::read("song.flac")?;
//! let mut map = TagMap::new();
//! map.insert("title", "Song");
//! map.insert("artist", vec!["A", "B"]);
//! let tagged = write_tags_bytes(&FlacTags::with_tag_map(map), &source)?;
//! assert_eq!(read_tags_bytes(&tagged)?.tag_map.unwrap().get("TITLE").unwrap().first(), "Song");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fmt;
use std::io::Read;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::block::{MetadataBlock, Picture};
use crate::error::Result;
use crate::stream::FlacStream;

/// Default read size for the streaming adapters: 64 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Header-region bytes a read-only tagger holds while observing: two
/// maximum-size blocks.
pub const DEFAULT_OBSERVE_LIMIT: usize = 32 * 1024 * 1024;

/// Vendor string written into freshly created comment blocks.
pub const DEFAULT_VENDOR_STRING: &str = concat!("flactag ", env!("CARGO_PKG_VERSION"));

// ── TagValue ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Single(String),
    Multiple(Vec<String>),
}

impl TagValue {
    /// First value, or `""` for an empty list.
    pub fn first(&self) -> &str {
        match self {
            TagValue::Single(v)   => v,
            TagValue::Multiple(v) => v.first().map(String::as_str).unwrap_or(""),
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            TagValue::Single(v)   => vec![v.as_str()],
            TagValue::Multiple(v) => v.iter().map(String::as_str).collect(),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            TagValue::Single(existing) => {
                let first = std::mem::take(existing);
                *self = TagValue::Multiple(vec![first, value]);
            }
            TagValue::Multiple(v) => v.push(value),
        }
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self { TagValue::Single(v.to_owned()) }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self { TagValue::Single(v) }
}

impl From<Vec<String>> for TagValue {
    fn from(v: Vec<String>) -> Self { TagValue::Multiple(v) }
}

impl From<Vec<&str>> for TagValue {
    fn from(v: Vec<&str>) -> Self { TagValue::Multiple(v.into_iter().map(str::to_owned).collect()) }
}

// ── TagMap ────────────────────────────────────────────────────────────────────

/// Insertion-ordered map whose keys are upper-cased on every read and write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMap {
    entries: Vec<(String, TagValue)>,
}

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(key: &str) -> String {
        key.to_uppercase()
    }

    fn position(&self, key: &str) -> Option<usize> {
        let key = Self::normalize(key);
        self.entries.iter().position(|(k, _)| *k == key)
    }

    pub fn get(&self, key: &str) -> Option<&TagValue> {
        self.position(key).map(|i| &self.entries[i].1)
    }

    /// Set `key`, replacing any previous value in place.
    pub fn insert(&mut self, key: &str, value: impl Into<TagValue>) -> Option<TagValue> {
        let value = value.into();
        match self.position(key) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None    => {
                self.entries.push((Self::normalize(key), value));
                None
            }
        }
    }

    /// Add one value under `key`, turning a single value into a list.
    pub fn append(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.position(key) {
            Some(i) => self.entries[i].1.push(value),
            None    => self.entries.push((Self::normalize(key), TagValue::Single(value))),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<TagValue> {
        self.position(key).map(|i| self.entries.remove(i).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<TagValue>> FromIterator<(K, V)> for TagMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = TagMap::new();
        for (k, v) in iter {
            map.insert(k.as_ref(), v);
        }
        map
    }
}

impl Serialize for TagMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TagMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TagMapVisitor;

        impl<'de> Visitor<'de> for TagMapVisitor {
            type Value = TagMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of tag names to a string or a list of strings")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<TagMap, A::Error> {
                let mut map = TagMap::new();
                while let Some((k, v)) = access.next_entry::<String, TagValue>()? {
                    map.insert(&k, v);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(TagMapVisitor)
    }
}

// ── FlacTags ──────────────────────────────────────────────────────────────────

/// Tags to write, or tags read back from a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlacTags {
    pub tag_map: Option<TagMap>,
    pub picture: Option<Picture>,
}

impl FlacTags {
    pub fn with_tag_map(tag_map: TagMap) -> Self {
        Self { tag_map: Some(tag_map), picture: None }
    }

    /// First comment block → tag map, first picture block → picture.
    pub fn from_blocks(blocks: &[MetadataBlock]) -> Self {
        Self {
            tag_map: blocks.iter().find_map(MetadataBlock::as_comment).map(|c| c.to_tag_map()),
            picture: blocks.iter().find_map(MetadataBlock::as_picture).map(|p| p.to_picture()),
        }
    }
}

// ── TagOptions ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TagOptions {
    /// Vendor string for comment blocks created from scratch.  Existing
    /// comment blocks keep their own.
    pub vendor_string: String,
    /// Bytes pulled from the source per read by the streaming adapters.
    pub chunk_size:    usize,
    /// Read-only taggers stop observing (and `tags()` fails) once the
    /// unresolved header region grows past this many bytes.
    pub observe_limit: usize,
}

impl Default for TagOptions {
    fn default() -> Self {
        Self {
            vendor_string: DEFAULT_VENDOR_STRING.to_owned(),
            chunk_size:    DEFAULT_CHUNK_SIZE,
            observe_limit: DEFAULT_OBSERVE_LIMIT,
        }
    }
}

// ── Convenience entry points ─────────────────────────────────────────────────

pub fn read_tags_bytes(buffer: &[u8]) -> Result<FlacTags> {
    Ok(FlacStream::from_bytes(buffer)?.tags())
}

/// Read tags from the metadata chain only; the audio frames are not consumed.
pub fn read_tags<R: Read>(reader: R) -> Result<FlacTags> {
    Ok(FlacStream::read_metadata(reader)?.tags())
}

pub fn write_tags_bytes(tags: &FlacTags, source: &[u8]) -> Result<Vec<u8>> {
    write_tags_bytes_with_options(tags, source, &TagOptions::default())
}

pub fn write_tags_bytes_with_options(tags: &FlacTags, source: &[u8], opts: &TagOptions) -> Result<Vec<u8>> {
    let mut stream = FlacStream::from_bytes(source)?;
    stream.apply_tags(tags, opts)?;
    stream.to_bytes()
}
