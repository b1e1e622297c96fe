//! Content block model shared by the extractor and the restorer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator placed between blocks in the combined text sent for translation
pub const BLOCK_DELIMITER: &str = "\n\n";

/// `raw_metadata` key holding the content that markers were scanned in
pub const RAW_CONTENT_KEY: &str = "_raw_content";

const GAP_SEGMENT: &str = "gap";

/// Origin encoding of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockFormat {
    /// PHP-serialized builder tree stored in entity metadata
    SerializedTree,
    /// JSON builder tree stored in entity metadata
    JsonTree,
    /// `<!-- wp:name -->` delimited blocks inside the content
    RichBlock,
    /// `[tag]...[/tag]` shortcodes inside the content
    Shortcode,
    /// Content not claimed by any structured encoding
    Plain,
}

impl BlockFormat {
    /// Formats whose payload lives in entity metadata rather than content
    pub fn is_metadata_format(&self) -> bool {
        matches!(self, BlockFormat::SerializedTree | BlockFormat::JsonTree)
    }
}

impl fmt::Display for BlockFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockFormat::SerializedTree => write!(f, "serialized_tree"),
            BlockFormat::JsonTree => write!(f, "json_tree"),
            BlockFormat::RichBlock => write!(f, "rich_block"),
            BlockFormat::Shortcode => write!(f, "shortcode"),
            BlockFormat::Plain => write!(f, "plain"),
        }
    }
}

/// One step inside a decoded tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "{}", i),
            PathSegment::Key(k) => write!(f, "{}", k),
        }
    }
}

/// Location of a block inside its structural document
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn key(key: impl Into<String>) -> Self {
        Self(vec![PathSegment::Key(key.into())])
    }

    pub fn ordinal(index: usize) -> Self {
        Self(vec![PathSegment::Index(index)])
    }

    /// Plain text between marker pairs, by position among the gaps
    pub fn gap(index: usize) -> Self {
        Self(vec![PathSegment::Key(GAP_SEGMENT.to_string()), PathSegment::Index(index)])
    }

    /// New path with one more segment appended
    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    pub fn with_key(&self, key: &str) -> Self {
        self.child(PathSegment::Key(key.to_string()))
    }

    pub fn with_index(&self, index: usize) -> Self {
        self.child(PathSegment::Index(index))
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// First segment as a metadata key, for metadata-level formats
    pub fn meta_key(&self) -> Option<&str> {
        match self.0.first() {
            Some(PathSegment::Key(k)) => Some(k.as_str()),
            _ => None,
        }
    }

    /// Marker ordinal, for content-level formats
    pub fn as_ordinal(&self) -> Option<usize> {
        match self.0.as_slice() {
            [PathSegment::Index(i)] => Some(*i),
            _ => None,
        }
    }

    pub fn as_gap(&self) -> Option<usize> {
        match self.0.as_slice() {
            [PathSegment::Key(k), PathSegment::Index(i)] if k == GAP_SEGMENT => Some(*i),
            _ => None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Path without its first segment
    pub fn tail(&self) -> &[PathSegment] {
        self.0.get(1..).unwrap_or(&[])
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
        write!(f, "/{}", parts.join("/"))
    }
}

/// One translatable fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub format: BlockFormat,
    pub text: String,
    pub path: FieldPath,
}

/// Persisted position of a block, consumed at restoration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub index: usize,
    pub format: BlockFormat,
    pub path: FieldPath,
    pub original_text: String,
}

/// Everything needed to splice translated text back into place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockMetadata {
    pub primary_format: BlockFormat,
    pub blocks: Vec<BlockRecord>,
    /// Untouched structural payloads keyed by metadata key, plus the raw
    /// content under [`RAW_CONTENT_KEY`] when markers claimed it
    #[serde(default)]
    pub raw_metadata: serde_json::Value,
}

impl BlockMetadata {
    /// Metadata describing a document with nothing to translate
    pub fn empty() -> Self {
        Self {
            primary_format: BlockFormat::Plain,
            blocks: Vec::new(),
            raw_metadata: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    /// Original payload for a metadata key, if one was captured
    pub fn raw_payload(&self, key: &str) -> Option<&str> {
        self.raw_metadata.get(key).and_then(|v| v.as_str())
    }

    /// Content the marker blocks were extracted from
    pub fn raw_content(&self) -> Option<&str> {
        self.raw_payload(RAW_CONTENT_KEY)
    }

    fn ends_with_plain(&self) -> bool {
        self.blocks.len() > 1
            && self
                .blocks
                .last()
                .map(|b| b.format == BlockFormat::Plain && b.path.is_root())
                .unwrap_or(false)
    }

    /// Split translated flat text into one segment per block.
    ///
    /// A trailing whole-document plain block keeps any paragraph breaks of
    /// its own.
    pub fn split_segments<'a>(&self, translated: &'a str) -> Vec<&'a str> {
        if self.ends_with_plain() {
            translated.splitn(self.blocks.len(), BLOCK_DELIMITER).collect()
        } else {
            translated.split(BLOCK_DELIMITER).collect()
        }
    }
}

/// Join block texts the way the provider receives them
pub fn combine_blocks(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join(BLOCK_DELIMITER)
}

/// Trim a structured fragment and collapse blank-line runs so the block
/// delimiter never occurs inside it
pub fn normalize_block_text(text: &str) -> String {
    text.trim()
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
