//! Content extraction: structured encodings to an ordered list of blocks

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::errors::ParseError;
use crate::core::models::EntityMeta;
use crate::processors::blocks::{
    combine_blocks, normalize_block_text, BlockFormat, BlockMetadata, BlockRecord, ContentBlock,
    FieldPath, RAW_CONTENT_KEY,
};
use crate::processors::filter::ServiceContentFilter;
use crate::processors::markup::{has_rich_blocks, rich_block_scan, shortcode_scan, MarkerScan};
use crate::processors::php_serialize;
use crate::processors::table::promote_aligned_tables;
use crate::processors::tree::{collect_json_settings, collect_php_fields, FoundText};

/// Metadata keys holding a PHP-serialized builder tree
pub const SERIALIZED_BUILDER_KEYS: &[&str] = &["_fl_builder_data", "_fl_builder_draft"];

/// Metadata keys holding a JSON builder tree
pub const JSON_BUILDER_KEYS: &[&str] = &["_elementor_data"];

/// Result of decomposing one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub primary_format: BlockFormat,
    pub blocks: Vec<ContentBlock>,
    pub block_metadata: BlockMetadata,
}

impl Extraction {
    /// Text sent to the provider: blocks joined by the block delimiter
    pub fn combined_text(&self) -> String {
        combine_blocks(&self.blocks)
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Extracts translatable blocks from entity content and metadata
#[derive(Debug, Clone, Default)]
pub struct ContentExtractor {
    filter: ServiceContentFilter,
}

impl ContentExtractor {
    pub fn new(filter: ServiceContentFilter) -> Self {
        Self { filter }
    }

    /// Decompose a document into blocks.
    ///
    /// Metadata-level encodings come first, then the content in document
    /// order: marker leaves interleaved with the plain text between marker
    /// pairs, or the whole content as one plain block when no markers claim
    /// it. A payload that fails to parse contributes no blocks; the other
    /// encodings are still extracted.
    pub fn extract(&self, raw_content: &str, meta: &EntityMeta) -> Extraction {
        let mut blocks = Vec::new();
        let mut raw_metadata = serde_json::Map::new();

        for key in SERIALIZED_BUILDER_KEYS {
            let Some(payload) = meta.get(*key) else {
                continue;
            };
            match self.extract_serialized(key, payload) {
                Ok(found) if !found.is_empty() => {
                    debug!("Extracted {} serialized blocks from {}", found.len(), key);
                    raw_metadata.insert(key.to_string(), payload.clone().into());
                    blocks.extend(found);
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping serialized payload {}: {}", key, e),
            }
        }

        for key in JSON_BUILDER_KEYS {
            let Some(payload) = meta.get(*key) else {
                continue;
            };
            match self.extract_json(key, payload) {
                Ok(found) if !found.is_empty() => {
                    debug!("Extracted {} JSON tree blocks from {}", found.len(), key);
                    raw_metadata.insert(key.to_string(), payload.clone().into());
                    blocks.extend(found);
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping JSON payload {}: {}", key, e),
            }
        }

        let mut claimed = false;
        if let Some((format, scan)) = claim_markers(raw_content) {
            claimed = true;
            raw_metadata.insert(RAW_CONTENT_KEY.to_string(), raw_content.into());
            blocks.extend(self.marker_blocks(raw_content, &scan, format));
        }

        if !claimed && self.filter.accept(raw_content) {
            // Whole-document text keeps its own spacing
            let text = promote_aligned_tables(raw_content).unwrap_or_else(|| raw_content.to_string());
            blocks.push(ContentBlock {
                format: BlockFormat::Plain,
                text,
                path: FieldPath::root(),
            });
        }

        let primary_format = blocks
            .iter()
            .map(|b| b.format)
            .find(|f| *f != BlockFormat::Plain)
            .unwrap_or(BlockFormat::Plain);

        let records = blocks
            .iter()
            .enumerate()
            .map(|(index, block)| BlockRecord {
                index,
                format: block.format,
                path: block.path.clone(),
                original_text: block.text.clone(),
            })
            .collect();

        debug!(
            "Extraction finished: {} blocks, primary format {}",
            blocks.len(),
            primary_format
        );

        Extraction {
            primary_format,
            blocks,
            block_metadata: BlockMetadata {
                primary_format,
                blocks: records,
                raw_metadata: serde_json::Value::Object(raw_metadata),
            },
        }
    }

    fn accepted(&self, format: BlockFormat, found: Vec<FoundText>) -> Vec<ContentBlock> {
        found
            .into_iter()
            .filter(|f| self.filter.accept(&f.text))
            .map(|f| ContentBlock {
                format,
                text: normalize_block_text(&f.text),
                path: f.path,
            })
            .collect()
    }

    fn extract_serialized(&self, key: &str, payload: &str) -> Result<Vec<ContentBlock>, ParseError> {
        let (tree, _) = php_serialize::decode_payload(payload)?;
        let found = collect_php_fields(&tree, &FieldPath::key(key));
        Ok(self.accepted(BlockFormat::SerializedTree, found))
    }

    fn extract_json(&self, key: &str, payload: &str) -> Result<Vec<ContentBlock>, ParseError> {
        let tree: serde_json::Value =
            serde_json::from_str(payload).map_err(|e| ParseError::Json(e.to_string()))?;
        if !(tree.is_array() || tree.is_object()) {
            return Err(ParseError::Json("payload is not a node tree".to_string()));
        }
        let found = collect_json_settings(&tree, &FieldPath::key(key));
        Ok(self.accepted(BlockFormat::JsonTree, found))
    }

    fn marker_blocks(&self, content: &str, scan: &MarkerScan, format: BlockFormat) -> Vec<ContentBlock> {
        let leaves = scan
            .leaves
            .iter()
            .enumerate()
            .map(|(ordinal, leaf)| (leaf.trimmed_inner(content), format, FieldPath::ordinal(ordinal)));
        let gaps = scan
            .gaps(content)
            .into_iter()
            .enumerate()
            .map(|(ordinal, range)| (range, BlockFormat::Plain, FieldPath::gap(ordinal)));

        let mut spans: Vec<_> = leaves.chain(gaps).collect();
        spans.sort_by_key(|(range, _, _)| range.start);

        spans
            .into_iter()
            .filter(|(range, _, _)| self.filter.accept(&content[range.clone()]))
            .map(|(range, format, path)| ContentBlock {
                format,
                text: fragment_text(&content[range]),
                path,
            })
            .collect()
    }
}

/// Markers that claim the content, if any: block comments when they parse,
/// otherwise shortcodes when at least one pair closes
pub(crate) fn claim_markers(content: &str) -> Option<(BlockFormat, MarkerScan)> {
    if has_rich_blocks(content) {
        match rich_block_scan(content) {
            Ok(scan) => return Some((BlockFormat::RichBlock, scan)),
            Err(e) => warn!("Skipping rich block markers: {}", e),
        }
    }
    let scan = shortcode_scan(content);
    if scan.leaves.is_empty() {
        None
    } else {
        Some((BlockFormat::Shortcode, scan))
    }
}

/// Block text for a span of marked-up content
pub(crate) fn fragment_text(raw: &str) -> String {
    let text = normalize_block_text(raw);
    promote_aligned_tables(&text).unwrap_or(text)
}

/// Extract with the default filter
pub fn extract(raw_content: &str, meta: &EntityMeta) -> Extraction {
    ContentExtractor::default().extract(raw_content, meta)
}
