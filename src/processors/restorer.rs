//! Content restoration: translated flat text back into the original structure

use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, warn};

use crate::core::errors::RestoreError;
use crate::core::models::EntityMeta;
use crate::processors::blocks::{BlockFormat, BlockMetadata, BlockRecord};
use crate::processors::extractor::{claim_markers, fragment_text};
use crate::processors::markup::{splice, MarkerScan};
use crate::processors::php_serialize;
use crate::processors::table::ensure_balanced_tables;
use crate::processors::tree::set_json_string;

/// Rebuilt entity content and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoredContent {
    pub content: String,
    pub meta: EntityMeta,
    /// Why structured substitution was abandoned for the flat text, if it was
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<RestoreError>,
}

impl RestoredContent {
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Restore translated text into the structure described by `metadata`.
///
/// The original content and metadata are never modified; substitution
/// happens on copies. When the translated text does not split into exactly
/// one segment per block, or a structured payload cannot be rebuilt, the
/// flat translated text becomes the plain content and the original
/// metadata is kept. Content edited since extraction takes the same
/// fallback.
pub fn restore(
    original_content: &str,
    original_meta: &EntityMeta,
    translated: &str,
    metadata: &BlockMetadata,
) -> Result<RestoredContent, RestoreError> {
    ensure_balanced_tables(translated)?;

    if metadata.blocks.is_empty() {
        return Ok(RestoredContent {
            content: original_content.to_string(),
            meta: original_meta.clone(),
            fallback: None,
        });
    }

    if metadata.blocks.len() == 1
        && metadata.blocks[0].format == BlockFormat::Plain
        && metadata.blocks[0].path.is_root()
    {
        return Ok(RestoredContent {
            content: translated.to_string(),
            meta: original_meta.clone(),
            fallback: None,
        });
    }

    let segments = metadata.split_segments(translated);
    if segments.len() != metadata.blocks.len() {
        let err = RestoreError::SegmentMismatch {
            expected: metadata.blocks.len(),
            actual: segments.len(),
        };
        warn!("{}; publishing flat translated text", err);
        return Ok(fallback(translated, original_meta, err));
    }

    match substitute(original_content, original_meta, &segments, metadata) {
        Ok((content, meta)) => {
            debug!("Restored {} blocks into {}", segments.len(), metadata.primary_format);
            Ok(RestoredContent {
                content,
                meta,
                fallback: None,
            })
        }
        Err(err) => {
            warn!("{}; publishing flat translated text", err);
            Ok(fallback(translated, original_meta, err))
        }
    }
}

fn fallback(translated: &str, original_meta: &EntityMeta, err: RestoreError) -> RestoredContent {
    RestoredContent {
        content: translated.to_string(),
        meta: original_meta.clone(),
        fallback: Some(err),
    }
}

fn rebuild_error(format: BlockFormat, message: impl Into<String>) -> RestoreError {
    RestoreError::Rebuild {
        format: format.to_string(),
        message: message.into(),
    }
}

/// Pair each record with its segment and rebuild every touched encoding
fn substitute(
    original_content: &str,
    original_meta: &EntityMeta,
    segments: &[&str],
    metadata: &BlockMetadata,
) -> Result<(String, EntityMeta), RestoreError> {
    let mut meta = original_meta.clone();
    let mut content = original_content.to_string();
    let pairs: Vec<(&BlockRecord, &str)> = metadata
        .blocks
        .iter()
        .zip(segments.iter().map(|s| s.trim()))
        .collect();

    let mut meta_keys: Vec<(BlockFormat, &str)> = Vec::new();
    for (record, _) in &pairs {
        if record.format.is_metadata_format() {
            let key = record
                .path
                .meta_key()
                .ok_or_else(|| rebuild_error(record.format, format!("path {} has no metadata key", record.path)))?;
            if !meta_keys.iter().any(|(_, k)| *k == key) {
                meta_keys.push((record.format, key));
            }
        }
    }

    for (format, key) in meta_keys {
        let payload = metadata
            .raw_payload(key)
            .or_else(|| original_meta.get(key).map(String::as_str))
            .ok_or_else(|| rebuild_error(format, format!("metadata key {} missing", key)))?;
        let entries: Vec<&(&BlockRecord, &str)> = pairs
            .iter()
            .filter(|(r, _)| r.format == format && r.path.meta_key() == Some(key))
            .collect();

        let rebuilt = match format {
            BlockFormat::SerializedTree => rebuild_serialized(payload, &entries)?,
            BlockFormat::JsonTree => rebuild_json(payload, &entries)?,
            _ => unreachable!("only metadata formats are collected"),
        };
        meta.insert(key.to_string(), rebuilt);
    }

    let marked: Vec<&(&BlockRecord, &str)> = pairs
        .iter()
        .filter(|(r, _)| is_content_level(r))
        .collect();
    if let Some((first, _)) = marked.first() {
        if metadata
            .raw_content()
            .is_some_and(|captured| captured != original_content)
        {
            return Err(rebuild_error(first.format, "content changed since extraction"));
        }
        let (format, scan) = claim_markers(original_content)
            .ok_or_else(|| rebuild_error(first.format, "content no longer carries markers"))?;
        content = rebuild_markers(original_content, &scan, &marked, format)?;
    }

    if let Some((_, text)) = pairs
        .iter()
        .find(|(r, _)| r.format == BlockFormat::Plain && r.path.is_root())
    {
        content = text.to_string();
    }

    Ok((content, meta))
}

fn rebuild_serialized(payload: &str, entries: &[&(&BlockRecord, &str)]) -> Result<String, RestoreError> {
    let (mut tree, encoding) = php_serialize::decode_payload(payload)?;
    for (record, text) in entries {
        if !tree.set_string(record.path.tail(), text) {
            return Err(rebuild_error(
                BlockFormat::SerializedTree,
                format!("no string at {}", record.path),
            ));
        }
    }
    Ok(php_serialize::encode_payload(&tree, encoding))
}

fn rebuild_json(payload: &str, entries: &[&(&BlockRecord, &str)]) -> Result<String, RestoreError> {
    let mut tree: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| rebuild_error(BlockFormat::JsonTree, e.to_string()))?;
    for (record, text) in entries {
        if !set_json_string(&mut tree, record.path.tail(), text) {
            return Err(rebuild_error(
                BlockFormat::JsonTree,
                format!("no string at {}", record.path),
            ));
        }
    }
    serde_json::to_string(&tree).map_err(|e| rebuild_error(BlockFormat::JsonTree, e.to_string()))
}

fn is_content_level(record: &BlockRecord) -> bool {
    match record.format {
        BlockFormat::RichBlock | BlockFormat::Shortcode => true,
        BlockFormat::Plain => record.path.as_gap().is_some(),
        _ => false,
    }
}

/// Splice marker leaves and the text between them. Every located span must
/// still read as the text that was extracted from it.
fn rebuild_markers(
    content: &str,
    scan: &MarkerScan,
    entries: &[&(&BlockRecord, &str)],
    format: BlockFormat,
) -> Result<String, RestoreError> {
    let gaps = scan.gaps(content);
    let mut replacements: Vec<(Range<usize>, &str)> = Vec::with_capacity(entries.len());
    for (record, text) in entries {
        let range = match (record.format, record.path.as_gap(), record.path.as_ordinal()) {
            (BlockFormat::Plain, Some(gap), _) => gaps.get(gap).cloned(),
            (f, None, Some(ordinal)) if f == format => {
                scan.leaves.get(ordinal).map(|leaf| leaf.trimmed_inner(content))
            }
            _ => None,
        }
        .ok_or_else(|| rebuild_error(format, format!("no {} span at {}", record.format, record.path)))?;

        if fragment_text(&content[range.clone()]) != record.original_text {
            return Err(rebuild_error(
                format,
                format!("{} no longer matches the extracted text", record.path),
            ));
        }
        replacements.push((range, *text));
    }
    replacements.sort_by_key(|(range, _)| range.start);
    Ok(splice(content, &replacements))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::blocks::FieldPath;
    use crate::processors::extractor::extract;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    fn meta(pairs: &[(&str, &str)]) -> EntityMeta {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_hello_world_tree() {
        let tree = json!([
            {"id": "1a", "elType": "widget", "settings": {"title": "Hello", "align": "center"}, "elements": []},
            {"id": "2b", "elType": "section", "settings": {"_element_id": "intro"}, "elements": [
                {"id": "3c", "elType": "widget", "settings": {"editor": "World", "categories": [4, 9]}, "elements": []}
            ]}
        ]);
        let original_meta = meta(&[("_elementor_data", &tree.to_string()), ("_edit_lock", "1700000000:1")]);
        let extraction = extract("", &original_meta);
        assert_eq!(extraction.combined_text(), "Hello\n\nWorld");

        let restored = restore("", &original_meta, "Bonjour\n\nMonde", &extraction.block_metadata).unwrap();
        assert!(!restored.is_fallback());
        assert_eq!(restored.meta["_edit_lock"], "1700000000:1");

        let rebuilt: serde_json::Value = serde_json::from_str(&restored.meta["_elementor_data"]).unwrap();
        let mut expected = tree.clone();
        expected[0]["settings"]["title"] = json!("Bonjour");
        expected[1]["elements"][0]["settings"]["editor"] = json!("Monde");
        assert_json_eq!(rebuilt, expected);

        // The caller's metadata is untouched
        assert_eq!(original_meta["_elementor_data"], tree.to_string());
    }

    #[test]
    fn test_plain_round_trip_is_exact() {
        let docs = [
            "<p>Visit <a href=\"https://example.com\">our shop</a>.</p>\n\n<table><tr><td>Open</td></tr></table>",
            "Just one line of text",
            "First paragraph.\n\nSecond paragraph.\n\n\nThird after extra spacing.",
        ];
        for doc in docs {
            let extraction = extract(doc, &EntityMeta::new());
            let restored = restore(doc, &EntityMeta::new(), &extraction.combined_text(), &extraction.block_metadata).unwrap();
            assert_eq!(restored.content, doc);
            assert!(restored.meta.is_empty());
        }
    }

    #[test]
    fn test_rich_block_restore_keeps_markers() {
        let content = "<!-- wp:heading {\"level\":3,\"className\":\"big\"} -->\n<h3 class=\"big\">Our story</h3>\n<!-- /wp:heading -->\n<!-- wp:separator /-->\n<!-- wp:paragraph -->\n<p>Founded in a garage.</p>\n<!-- /wp:paragraph -->";
        let extraction = extract(content, &EntityMeta::new());
        let translated = "<h3 class=\"big\">Notre histoire</h3>\n\n<p>Fondée dans un garage.</p>";
        let restored = restore(content, &EntityMeta::new(), translated, &extraction.block_metadata).unwrap();
        assert_eq!(
            restored.content,
            "<!-- wp:heading {\"level\":3,\"className\":\"big\"} -->\n<h3 class=\"big\">Notre histoire</h3>\n<!-- /wp:heading -->\n<!-- wp:separator /-->\n<!-- wp:paragraph -->\n<p>Fondée dans un garage.</p>\n<!-- /wp:paragraph -->"
        );
    }

    #[test]
    fn test_shortcode_restore_keeps_attributes() {
        let content = "[et_pb_row][et_pb_text admin_label=\"Intro\" _builder_version=\"4.9\"]Good morning[/et_pb_text][et_pb_text]Good night[/et_pb_text][/et_pb_row]";
        let extraction = extract(content, &EntityMeta::new());
        let restored = restore(content, &EntityMeta::new(), "Bonjour\n\nBonne nuit", &extraction.block_metadata).unwrap();
        assert_eq!(
            restored.content,
            "[et_pb_row][et_pb_text admin_label=\"Intro\" _builder_version=\"4.9\"]Bonjour[/et_pb_text][et_pb_text]Bonne nuit[/et_pb_text][/et_pb_row]"
        );
    }

    #[test]
    fn test_shortcode_restore_skips_filtered_leaf() {
        let content = "[et_pb_row][et_pb_text]Good morning[/et_pb_text][et_pb_button]Menu[/et_pb_button][et_pb_text]Good night[/et_pb_text][/et_pb_row]";
        let extraction = extract(content, &EntityMeta::new());
        assert_eq!(extraction.blocks.len(), 2);
        assert_eq!(extraction.blocks[1].path, FieldPath::ordinal(2));

        let restored = restore(content, &EntityMeta::new(), "Bonjour\n\nBonne nuit", &extraction.block_metadata).unwrap();
        assert!(!restored.is_fallback());
        assert_eq!(
            restored.content,
            "[et_pb_row][et_pb_text]Bonjour[/et_pb_text][et_pb_button]Menu[/et_pb_button][et_pb_text]Bonne nuit[/et_pb_text][/et_pb_row]"
        );
    }

    #[test]
    fn test_text_between_markers_restored_in_place() {
        let content = "<p>Intro paragraph before any block.</p>\n<!-- wp:paragraph -->\n<p>Inside the block</p>\n<!-- /wp:paragraph -->\n<!-- wp:spacer /-->\n<p>Closing words after the block.</p>\n";
        let extraction = extract(content, &EntityMeta::new());
        assert_eq!(extraction.blocks.len(), 3);

        let translated = "<p>Introduction avant tout bloc.</p>\n\n<p>Dans le bloc</p>\n\n<p>Mots de la fin.</p>";
        let restored = restore(content, &EntityMeta::new(), translated, &extraction.block_metadata).unwrap();
        assert!(!restored.is_fallback());
        assert_eq!(
            restored.content,
            "<p>Introduction avant tout bloc.</p>\n<!-- wp:paragraph -->\n<p>Dans le bloc</p>\n<!-- /wp:paragraph -->\n<!-- wp:spacer /-->\n<p>Mots de la fin.</p>\n"
        );
    }

    #[test]
    fn test_text_around_shortcodes_restored() {
        let content = "Welcome to our shop, browse the new arrivals.\n[caption]A caption here[/caption]\nThanks for visiting us today.";
        let extraction = extract(content, &EntityMeta::new());
        let translated = "Bienvenue dans notre boutique.\n\nUne légende\n\nMerci de votre visite.";
        let restored = restore(content, &EntityMeta::new(), translated, &extraction.block_metadata).unwrap();
        assert_eq!(
            restored.content,
            "Bienvenue dans notre boutique.\n[caption]Une légende[/caption]\nMerci de votre visite."
        );
    }

    #[test]
    fn test_edited_content_falls_back() {
        let content = "<!-- wp:paragraph --><p>First thing</p><!-- /wp:paragraph --><!-- wp:paragraph --><p>Second thing</p><!-- /wp:paragraph -->";
        let extraction = extract(content, &EntityMeta::new());
        let edited = format!("<!-- wp:paragraph --><p>A new lead</p><!-- /wp:paragraph -->{}", content);
        let translated = "<p>Premier</p>\n\n<p>Second</p>";

        let restored = restore(&edited, &EntityMeta::new(), translated, &extraction.block_metadata).unwrap();
        assert_eq!(restored.content, translated);
        assert!(matches!(restored.fallback, Some(RestoreError::Rebuild { .. })));
    }

    #[test]
    fn test_edited_content_detected_without_capture() {
        let content = "<!-- wp:paragraph --><p>First thing</p><!-- /wp:paragraph --><!-- wp:paragraph --><p>Second thing</p><!-- /wp:paragraph -->";
        let mut extraction = extract(content, &EntityMeta::new());
        extraction.block_metadata.raw_metadata = json!({});
        let edited = format!("<!-- wp:paragraph --><p>A new lead</p><!-- /wp:paragraph -->{}", content);

        let restored = restore(&edited, &EntityMeta::new(), "<p>Premier</p>\n\n<p>Second</p>", &extraction.block_metadata).unwrap();
        assert!(restored.is_fallback());
        assert!(!restored.content.contains("Second thing"));
    }

    #[test]
    fn test_serialized_restore_recomputes_lengths() {
        let payload = r#"a:1:{s:2:"n1";O:8:"stdClass":2:{s:4:"type";s:6:"module";s:8:"settings";O:8:"stdClass":2:{s:7:"heading";s:11:"Coffee shop";s:5:"width";i:80;}}}"#;
        let original_meta = meta(&[("_fl_builder_data", payload)]);
        let extraction = extract("", &original_meta);
        let restored = restore("", &original_meta, "Café", &extraction.block_metadata).unwrap();
        assert_eq!(
            restored.meta["_fl_builder_data"],
            r#"a:1:{s:2:"n1";O:8:"stdClass":2:{s:4:"type";s:6:"module";s:8:"settings";O:8:"stdClass":2:{s:7:"heading";s:5:"Café";s:5:"width";i:80;}}}"#
        );
    }

    #[test]
    fn test_segment_mismatch_falls_back_to_flat_text() {
        let content = "<!-- wp:paragraph --><p>One thing</p><!-- /wp:paragraph --><!-- wp:paragraph --><p>Another thing</p><!-- /wp:paragraph -->";
        let extraction = extract(content, &EntityMeta::new());
        assert_eq!(extraction.blocks.len(), 2);

        let translated = "<p>Une chose</p>\n\n<p>Une autre</p>\n\n<p>Et encore</p>";
        let restored = restore(content, &EntityMeta::new(), translated, &extraction.block_metadata).unwrap();
        assert_eq!(restored.content, translated);
        assert_eq!(
            restored.fallback,
            Some(RestoreError::SegmentMismatch { expected: 2, actual: 3 })
        );
    }

    #[test]
    fn test_mixed_structured_and_plain_tail() {
        let tree = r#"[{"id":"a","settings":{"title":"Welcome"},"elements":[]}]"#;
        let original_meta = meta(&[("_elementor_data", tree)]);
        let content = "Rendered intro.\n\nRendered details.";
        let extraction = extract(content, &original_meta);
        assert_eq!(extraction.blocks.len(), 2);

        let restored = restore(
            content,
            &original_meta,
            "Bienvenue\n\nIntro rendue.\n\nDétails rendus.",
            &extraction.block_metadata,
        )
        .unwrap();
        assert!(!restored.is_fallback());
        assert_eq!(restored.content, "Intro rendue.\n\nDétails rendus.");
        assert!(restored.meta["_elementor_data"].contains("\"title\":\"Bienvenue\""));
    }

    #[test]
    fn test_unbalanced_table_rejected() {
        let extraction = extract("<p>Plain words</p>", &EntityMeta::new());
        let result = restore(
            "<p>Plain words</p>",
            &EntityMeta::new(),
            "<table><tr><td>Mots</td></tr>",
            &extraction.block_metadata,
        );
        assert_eq!(result, Err(RestoreError::UnbalancedTable { opening: 1, closing: 0 }));
    }

    #[test]
    fn test_missing_path_falls_back() {
        let tree = r#"[{"id":"a","settings":{"title":"Welcome"},"elements":[]}]"#;
        let original_meta = meta(&[("_elementor_data", tree)]);
        let mut extraction = extract("", &original_meta);
        extraction.block_metadata.raw_metadata = json!({
            "_elementor_data": r#"[{"id":"a","settings":{},"elements":[]}]"#
        });

        let restored = restore("", &original_meta, "Bienvenue", &extraction.block_metadata).unwrap();
        assert!(restored.is_fallback());
        assert_eq!(restored.content, "Bienvenue");
        assert_eq!(restored.meta, original_meta);
    }

    #[test]
    fn test_nothing_to_restore() {
        let extraction = extract("", &EntityMeta::new());
        let restored = restore("", &EntityMeta::new(), "", &extraction.block_metadata).unwrap();
        assert_eq!(restored.content, "");
        assert!(!restored.is_fallback());
    }
}
