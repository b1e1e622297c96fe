//! Inline marker scanners for block-comment and shortcode content
//!
//! Both encodings wrap content in open/close markers that may nest. Only
//! leaf pairs (nothing paired nested inside) carry translatable text; the
//! containers around them are layout.

use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

use crate::core::errors::ParseError;

/// A matched open/close pair with no paired marker inside
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafSpan {
    pub name: String,
    /// Byte range between the end of the open marker and the start of the close marker
    pub inner: Range<usize>,
}

impl LeafSpan {
    /// Inner range with surrounding whitespace excluded
    pub fn trimmed_inner(&self, content: &str) -> Range<usize> {
        trim_range(content, self.inner.clone())
    }
}

/// Marker pairs found in one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerScan {
    pub leaves: Vec<LeafSpan>,
    /// Outermost marker ranges, markers included, in document order
    pub claimed: Vec<Range<usize>>,
}

impl MarkerScan {
    /// Non-blank text outside every claimed range, trimmed, in document order
    pub fn gaps(&self, content: &str) -> Vec<Range<usize>> {
        let mut gaps = Vec::new();
        let mut cursor = 0;
        let end = content.len()..content.len();
        for range in self.claimed.iter().chain(std::iter::once(&end)) {
            if range.start > cursor {
                let gap = trim_range(content, cursor..range.start);
                if !gap.is_empty() {
                    gaps.push(gap);
                }
            }
            cursor = cursor.max(range.end);
        }
        gaps
    }
}

fn trim_range(content: &str, range: Range<usize>) -> Range<usize> {
    let text = &content[range.clone()];
    let start = range.start + (text.len() - text.trim_start().len());
    let end = range.end - (text.len() - text.trim_end().len());
    if start > end {
        start..start
    } else {
        start..end
    }
}

/// Drop ranges nested inside an earlier one. Closed pairs never overlap partially.
fn outermost(mut ranges: Vec<Range<usize>>) -> Vec<Range<usize>> {
    ranges.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
    let mut kept: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
    for range in ranges {
        if kept.last().map_or(true, |last| range.start >= last.end) {
            kept.push(range);
        }
    }
    kept
}

fn rich_block_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(
            r"(?s)<!--\s+(/)?wp:([a-z][a-z0-9_-]*(?:/[a-z][a-z0-9_-]*)?)(?:\s+\{.*?\})?\s*(/)?-->",
        )
        .expect("valid block marker pattern")
    })
}

fn shortcode_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r#"\[(/)?([A-Za-z][A-Za-z0-9_-]*)((?:\s+[^\]]*)?)\]"#)
            .expect("valid shortcode pattern")
    })
}

/// Whether content carries block-comment markers at all
pub fn has_rich_blocks(content: &str) -> bool {
    content.contains("<!-- wp:")
}

struct OpenFrame {
    name: String,
    open_start: usize,
    inner_start: usize,
    has_child: bool,
}

/// Leaf block-comment pairs in document order.
///
/// Self-closing blocks (`<!-- wp:spacer /-->`) carry no content but still
/// claim their range. A closing marker that does not match the innermost
/// open block is a parse error.
pub fn rich_block_scan(content: &str) -> Result<MarkerScan, ParseError> {
    let mut stack: Vec<OpenFrame> = Vec::new();
    let mut leaves = Vec::new();
    let mut pairs = Vec::new();

    for caps in rich_block_marker().captures_iter(content) {
        let marker = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        let name = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let closing = caps.get(1).is_some();
        let self_closing = caps.get(3).is_some();

        if self_closing {
            pairs.push(marker);
            continue;
        }

        if !closing {
            stack.push(OpenFrame {
                name: name.to_string(),
                open_start: marker.start,
                inner_start: marker.end,
                has_child: false,
            });
            continue;
        }

        let frame = stack.pop().ok_or_else(|| ParseError::Markers {
            format: "rich block",
            message: format!("closing wp:{} at byte {} without opener", name, marker.start),
        })?;
        if frame.name != name {
            return Err(ParseError::Markers {
                format: "rich block",
                message: format!(
                    "wp:{} closed by /wp:{} at byte {}",
                    frame.name, name, marker.start
                ),
            });
        }

        pairs.push(frame.open_start..marker.end);
        if !frame.has_child {
            leaves.push(LeafSpan {
                name: frame.name,
                inner: frame.inner_start..marker.start,
            });
        }
        if let Some(parent) = stack.last_mut() {
            parent.has_child = true;
        }
    }

    if let Some(frame) = stack.last() {
        return Err(ParseError::Markers {
            format: "rich block",
            message: format!("wp:{} never closed", frame.name),
        });
    }

    Ok(MarkerScan {
        leaves,
        claimed: outermost(pairs),
    })
}

/// Leaf shortcode pairs in document order.
///
/// Shortcodes without a closing tag are treated as self-closing and do not
/// make their parent a container. Stray closing tags are ignored, and
/// neither claims any range.
pub fn shortcode_scan(content: &str) -> MarkerScan {
    let mut stack: Vec<OpenFrame> = Vec::new();
    let mut leaves = Vec::new();
    let mut pairs = Vec::new();

    for caps in shortcode_marker().captures_iter(content) {
        let marker = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        let name = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let closing = caps.get(1).is_some();

        if !closing {
            stack.push(OpenFrame {
                name: name.to_string(),
                open_start: marker.start,
                inner_start: marker.end,
                has_child: false,
            });
            continue;
        }

        let Some(position) = stack.iter().rposition(|f| f.name == name) else {
            continue;
        };
        // Anything opened after the matching tag never closed: self-closing
        stack.truncate(position + 1);
        let Some(frame) = stack.pop() else {
            continue;
        };

        pairs.push(frame.open_start..marker.end);
        if !frame.has_child {
            leaves.push(LeafSpan {
                name: frame.name,
                inner: frame.inner_start..marker.start,
            });
        }
        if let Some(parent) = stack.last_mut() {
            parent.has_child = true;
        }
    }

    MarkerScan {
        leaves,
        claimed: outermost(pairs),
    }
}

/// Replace ranges of `content`. Ranges must be sorted and non-overlapping.
pub fn splice(content: &str, replacements: &[(Range<usize>, &str)]) -> String {
    let mut out = String::with_capacity(content.len());
    let mut cursor = 0;
    for (range, text) in replacements {
        out.push_str(&content[cursor..range.start]);
        out.push_str(text);
        cursor = range.end;
    }
    out.push_str(&content[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUTENBERG: &str = "<!-- wp:heading {\"level\":2} -->\n<h2>Welcome</h2>\n<!-- /wp:heading -->\n\n<!-- wp:columns -->\n<div class=\"wp-block-columns\"><!-- wp:column -->\n<div class=\"wp-block-column\"><!-- wp:paragraph -->\n<p>First column</p>\n<!-- /wp:paragraph --></div>\n<!-- /wp:column --></div>\n<!-- /wp:columns -->\n\n<!-- wp:spacer {\"height\":\"40px\"} /-->";

    #[test]
    fn test_rich_block_leaves() {
        let leaves = rich_block_scan(GUTENBERG).unwrap().leaves;
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].name, "heading");
        assert_eq!(leaves[1].name, "paragraph");

        let first = leaves[0].trimmed_inner(GUTENBERG);
        assert_eq!(&GUTENBERG[first], "<h2>Welcome</h2>");
        let second = leaves[1].trimmed_inner(GUTENBERG);
        assert_eq!(&GUTENBERG[second], "<p>First column</p>");
    }

    #[test]
    fn test_rich_block_namespaced_names() {
        let content = "<!-- wp:acme/notice {\"tone\":\"info\"} --><p>Heads up</p><!-- /wp:acme/notice -->";
        let leaves = rich_block_scan(content).unwrap().leaves;
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].name, "acme/notice");
    }

    #[test]
    fn test_rich_block_mismatch_is_error() {
        let content = "<!-- wp:paragraph --><p>x</p><!-- /wp:heading -->";
        assert!(matches!(
            rich_block_scan(content),
            Err(ParseError::Markers { .. })
        ));
        assert!(rich_block_scan("<!-- wp:paragraph --><p>x</p>").is_err());
    }

    #[test]
    fn test_rich_block_claimed_ranges() {
        let scan = rich_block_scan(GUTENBERG).unwrap();
        // heading, columns container, spacer
        assert_eq!(scan.claimed.len(), 3);
        assert_eq!(scan.claimed[0].start, 0);
        assert_eq!(scan.claimed[2].end, GUTENBERG.len());
        assert!(scan.gaps(GUTENBERG).is_empty());
    }

    #[test]
    fn test_gaps_between_claimed_ranges() {
        let content = "<p>Before</p>\n<!-- wp:paragraph -->\n<p>Inside</p>\n<!-- /wp:paragraph -->\n\n<p>After</p>\n";
        let scan = rich_block_scan(content).unwrap();
        let gaps: Vec<&str> = scan.gaps(content).into_iter().map(|r| &content[r]).collect();
        assert_eq!(gaps, vec!["<p>Before</p>", "<p>After</p>"]);
    }

    #[test]
    fn test_shortcode_leaves() {
        let content = "[et_pb_section][et_pb_row][et_pb_text admin_label=\"Intro\"]<p>Hello there</p>[/et_pb_text][et_pb_image src=\"a.png\"][et_pb_text]Second text[/et_pb_text][/et_pb_row][/et_pb_section]";
        let scan = shortcode_scan(content);
        assert_eq!(scan.claimed, vec![0..content.len()]);
        let leaves = scan.leaves;
        assert_eq!(leaves.len(), 2);
        assert_eq!(&content[leaves[0].inner.clone()], "<p>Hello there</p>");
        assert_eq!(&content[leaves[1].inner.clone()], "Second text");
    }

    #[test]
    fn test_unpaired_shortcode_inside_leaf() {
        let content = "[box]Call us [phone] today[/box]";
        let leaves = shortcode_scan(content).leaves;
        assert_eq!(leaves.len(), 1);
        assert_eq!(&content[leaves[0].inner.clone()], "Call us [phone] today");
    }

    #[test]
    fn test_unclosed_shortcode_does_not_hide_pairs() {
        let content = "[phone] Call us. [box]Open late[/box] Thanks!";
        let scan = shortcode_scan(content);
        assert_eq!(scan.leaves.len(), 1);
        let gaps: Vec<&str> = scan.gaps(content).into_iter().map(|r| &content[r]).collect();
        assert_eq!(gaps, vec!["[phone] Call us.", "Thanks!"]);
    }

    #[test]
    fn test_splice() {
        let out = splice("abcdef", &[(1..2, "X"), (4..6, "YZW")]);
        assert_eq!(out, "aXcdYZW");
    }
}
