//! Bounded iterative walks over decoded builder trees

use serde_json::Value;
use tracing::warn;

use crate::processors::blocks::{FieldPath, PathSegment};
use crate::processors::php_serialize::{PhpKey, PhpValue};

/// Deepest nesting the walkers descend into
pub const MAX_TREE_DEPTH: usize = 64;

/// Upper bound on visited nodes per payload
pub const MAX_TREE_NODES: usize = 100_000;

/// Field names that hold translatable text in builder payloads.
///
/// The order is significant for JSON trees: settings fields are emitted in
/// this order, not in payload key order.
pub const FIELD_ALLOW_LIST: &[&str] = &[
    "title",
    "heading",
    "sub_heading",
    "subtitle",
    "text",
    "content",
    "editor",
    "description",
    "caption",
    "label",
    "button_text",
    "link_text",
    "alt",
    "title_text",
    "description_text",
    "tab_title",
    "tab_content",
    "item_title",
    "item_description",
    "testimonial_content",
    "testimonial_name",
    "testimonial_job",
    "prefix",
    "suffix",
    "placeholder",
];

pub fn is_allowed_field(name: &str) -> bool {
    FIELD_ALLOW_LIST.contains(&name)
}

/// A string found during a walk, with its location
#[derive(Debug, Clone, PartialEq)]
pub struct FoundText {
    pub path: FieldPath,
    pub text: String,
}

/// Collect every allow-listed string in a PHP tree, pre-order.
///
/// Sub-trees past [`MAX_TREE_DEPTH`] are skipped; the walk stops after
/// [`MAX_TREE_NODES`] nodes.
pub fn collect_php_fields(root: &PhpValue, base: &FieldPath) -> Vec<FoundText> {
    let mut found = Vec::new();
    let mut stack: Vec<(FieldPath, Option<&str>, &PhpValue)> = vec![(base.clone(), None, root)];
    let mut visited = 0usize;

    while let Some((path, key, node)) = stack.pop() {
        visited += 1;
        if visited > MAX_TREE_NODES {
            warn!("Serialized tree exceeds {} nodes, truncating walk", MAX_TREE_NODES);
            break;
        }

        match node {
            PhpValue::Str(text) => {
                if key.map(is_allowed_field).unwrap_or(false) {
                    found.push(FoundText {
                        path,
                        text: text.clone(),
                    });
                }
            }
            PhpValue::Array(_) | PhpValue::Object { .. } => {
                if path.depth() > MAX_TREE_DEPTH {
                    warn!("Serialized tree deeper than {} at {}, skipping", MAX_TREE_DEPTH, path);
                    continue;
                }
                let entries = node.entries().unwrap_or(&[]);
                // Reverse so the first entry is popped first
                for (k, child) in entries.iter().rev() {
                    let name = match k {
                        PhpKey::Str(s) => Some(s.as_str()),
                        PhpKey::Int(_) => None,
                    };
                    stack.push((path.child(k.to_segment()), name, child));
                }
            }
            _ => {}
        }
    }

    found
}

/// Collect allow-listed settings text from a JSON builder tree.
///
/// Nodes are visited pre-order through their `elements` arrays. For every
/// node carrying a `settings` object, allow-listed settings are emitted in
/// allow-list order, followed by allow-listed fields of repeater items
/// (arrays of objects inside `settings`).
pub fn collect_json_settings(root: &Value, base: &FieldPath) -> Vec<FoundText> {
    let mut found = Vec::new();
    let mut stack: Vec<(FieldPath, &Value)> = Vec::new();
    let mut visited = 0usize;

    match root {
        Value::Array(nodes) => {
            for (i, node) in nodes.iter().enumerate().rev() {
                stack.push((base.with_index(i), node));
            }
        }
        other => stack.push((base.clone(), other)),
    }

    while let Some((path, node)) = stack.pop() {
        visited += 1;
        if visited > MAX_TREE_NODES {
            warn!("JSON tree exceeds {} nodes, truncating walk", MAX_TREE_NODES);
            break;
        }
        if path.depth() > MAX_TREE_DEPTH {
            warn!("JSON tree deeper than {} at {}, skipping", MAX_TREE_DEPTH, path);
            continue;
        }

        let Some(object) = node.as_object() else {
            continue;
        };

        if let Some(settings) = object.get("settings").and_then(Value::as_object) {
            let settings_path = path.with_key("settings");
            for field in FIELD_ALLOW_LIST {
                if let Some(Value::String(text)) = settings.get(*field) {
                    found.push(FoundText {
                        path: settings_path.with_key(field),
                        text: text.clone(),
                    });
                }
            }

            for (key, value) in settings {
                let Value::Array(items) = value else {
                    continue;
                };
                for (i, item) in items.iter().enumerate() {
                    let Some(item) = item.as_object() else {
                        continue;
                    };
                    for field in FIELD_ALLOW_LIST {
                        if let Some(Value::String(text)) = item.get(*field) {
                            found.push(FoundText {
                                path: settings_path.with_key(key).with_index(i).with_key(field),
                                text: text.clone(),
                            });
                        }
                    }
                }
            }
        }

        if let Some(children) = object.get("elements").and_then(Value::as_array) {
            let elements_path = path.with_key("elements");
            for (i, child) in children.iter().enumerate().rev() {
                stack.push((elements_path.with_index(i), child));
            }
        }
    }

    found
}

/// Replace the string at `path` inside a JSON tree
pub fn set_json_string(root: &mut Value, path: &[PathSegment], text: &str) -> bool {
    let mut node = root;
    for segment in path {
        let next = match (segment, node) {
            (PathSegment::Key(k), Value::Object(map)) => map.get_mut(k),
            (PathSegment::Index(i), Value::Array(items)) => items.get_mut(*i),
            _ => None,
        };
        match next {
            Some(child) => node = child,
            None => return false,
        }
    }
    match node {
        Value::String(s) => {
            *s = text.to_string();
            true
        }
        _ => false,
    }
}
