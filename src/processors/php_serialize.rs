//! Codec for PHP `serialize()` payloads stored in builder metadata
//!
//! Decoding is lossless: floats keep their original spelling and entry
//! order is preserved, so an untouched tree re-encodes byte for byte.
//! String lengths are byte counts and are recomputed on encode.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt::Write as _;

use crate::core::errors::ParseError;
use crate::processors::blocks::PathSegment;
use crate::processors::tree::MAX_TREE_DEPTH;

/// Array or property key
#[derive(Debug, Clone, PartialEq)]
pub enum PhpKey {
    Int(i64),
    Str(String),
}

impl PhpKey {
    pub fn to_segment(&self) -> PathSegment {
        match self {
            PhpKey::Int(i) if *i >= 0 => PathSegment::Index(*i as usize),
            PhpKey::Int(i) => PathSegment::Key(i.to_string()),
            PhpKey::Str(s) => PathSegment::Key(s.clone()),
        }
    }

    fn matches(&self, segment: &PathSegment) -> bool {
        match (self, segment) {
            (PhpKey::Int(i), PathSegment::Index(j)) => *i >= 0 && *i as usize == *j,
            (PhpKey::Int(i), PathSegment::Key(k)) => i.to_string() == *k,
            (PhpKey::Str(s), PathSegment::Key(k)) => s == k,
            (PhpKey::Str(s), PathSegment::Index(j)) => *s == j.to_string(),
        }
    }
}

/// Decoded PHP value
#[derive(Debug, Clone, PartialEq)]
pub enum PhpValue {
    Null,
    Bool(bool),
    Int(i64),
    /// Original textual form, e.g. `0.5` or `INF`
    Float(String),
    Str(String),
    Array(Vec<(PhpKey, PhpValue)>),
    Object {
        class: String,
        properties: Vec<(PhpKey, PhpValue)>,
    },
}

impl PhpValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PhpValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Entries of an array or object
    pub fn entries(&self) -> Option<&[(PhpKey, PhpValue)]> {
        match self {
            PhpValue::Array(entries) => Some(entries),
            PhpValue::Object { properties, .. } => Some(properties),
            _ => None,
        }
    }

    fn entries_mut(&mut self) -> Option<&mut Vec<(PhpKey, PhpValue)>> {
        match self {
            PhpValue::Array(entries) => Some(entries),
            PhpValue::Object { properties, .. } => Some(properties),
            _ => None,
        }
    }

    /// Replace the string at `path`. Returns false if the path does not
    /// lead to an existing string.
    pub fn set_string(&mut self, path: &[PathSegment], text: &str) -> bool {
        let mut node = self;
        for segment in path {
            let Some(entries) = node.entries_mut() else {
                return false;
            };
            match entries.iter_mut().find(|(k, _)| k.matches(segment)) {
                Some((_, child)) => node = child,
                None => return false,
            }
        }
        match node {
            PhpValue::Str(s) => {
                *s = text.to_string();
                true
            }
            _ => false,
        }
    }
}

/// Quick signature check before attempting a full decode
pub fn looks_serialized(payload: &str) -> bool {
    let p = payload.trim_start();
    p == "N;" || ["a:", "O:", "s:", "i:", "b:", "d:"].iter().any(|t| p.starts_with(t))
}

/// Decode a complete payload; trailing bytes are an error
pub fn decode(payload: &str) -> Result<PhpValue, ParseError> {
    let mut parser = Parser {
        input: payload.as_bytes(),
        pos: 0,
    };
    let value = parser.value(0)?;
    if parser.pos != parser.input.len() {
        return Err(parser.error("trailing data after value"));
    }
    Ok(value)
}

/// How a serialized payload was stored in metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    Raw,
    Base64,
}

/// Decode a metadata payload that is either serialized text or base64 of it
pub fn decode_payload(payload: &str) -> Result<(PhpValue, PayloadEncoding), ParseError> {
    if looks_serialized(payload) {
        return decode(payload).map(|v| (v, PayloadEncoding::Raw));
    }

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| ParseError::Serialized {
            offset: 0,
            message: format!("neither serialized nor base64: {}", e),
        })?;
    let text = String::from_utf8(bytes).map_err(|_| ParseError::Serialized {
        offset: 0,
        message: "base64 payload is not UTF-8".to_string(),
    })?;
    if !looks_serialized(&text) {
        return Err(ParseError::Serialized {
            offset: 0,
            message: "base64 payload does not hold a serialized value".to_string(),
        });
    }
    decode(&text).map(|v| (v, PayloadEncoding::Base64))
}

/// Encode a value in the same storage form it was read from
pub fn encode_payload(value: &PhpValue, encoding: PayloadEncoding) -> String {
    match encoding {
        PayloadEncoding::Raw => encode(value),
        PayloadEncoding::Base64 => STANDARD.encode(encode(value)),
    }
}

/// Encode a value back to PHP `serialize()` form
pub fn encode(value: &PhpValue) -> String {
    let mut out = String::new();
    encode_into(value, &mut out);
    out
}

fn encode_key(key: &PhpKey, out: &mut String) {
    match key {
        PhpKey::Int(i) => {
            let _ = write!(out, "i:{};", i);
        }
        PhpKey::Str(s) => {
            let _ = write!(out, "s:{}:\"{}\";", s.len(), s);
        }
    }
}

fn encode_entries(entries: &[(PhpKey, PhpValue)], out: &mut String) {
    let _ = write!(out, "{}:{{", entries.len());
    for (key, value) in entries {
        encode_key(key, out);
        encode_into(value, out);
    }
    out.push('}');
}

fn encode_into(value: &PhpValue, out: &mut String) {
    match value {
        PhpValue::Null => out.push_str("N;"),
        PhpValue::Bool(b) => {
            let _ = write!(out, "b:{};", u8::from(*b));
        }
        PhpValue::Int(i) => {
            let _ = write!(out, "i:{};", i);
        }
        PhpValue::Float(raw) => {
            let _ = write!(out, "d:{};", raw);
        }
        PhpValue::Str(s) => {
            let _ = write!(out, "s:{}:\"{}\";", s.len(), s);
        }
        PhpValue::Array(entries) => {
            out.push_str("a:");
            encode_entries(entries, out);
        }
        PhpValue::Object { class, properties } => {
            let _ = write!(out, "O:{}:\"{}\":", class.len(), class);
            encode_entries(properties, out);
        }
    }
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::Serialized {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), ParseError> {
        match self.input.get(self.pos) {
            Some(b) if *b == byte => {
                self.pos += 1;
                Ok(())
            }
            Some(b) => Err(self.error(format!(
                "expected '{}', found '{}'",
                byte as char, *b as char
            ))),
            None => Err(self.error(format!("expected '{}', found end of input", byte as char))),
        }
    }

    /// Bytes up to (not including) `delim`, consuming the delimiter
    fn until(&mut self, delim: u8) -> Result<&'a str, ParseError> {
        let input = self.input;
        let start = self.pos;
        let len = input[start..]
            .iter()
            .position(|b| *b == delim)
            .ok_or_else(|| self.error(format!("missing '{}'", delim as char)))?;
        self.pos = start + len + 1;
        std::str::from_utf8(&input[start..start + len])
            .map_err(|_| ParseError::Serialized {
                offset: start,
                message: "invalid UTF-8".to_string(),
            })
    }

    fn number<T: std::str::FromStr>(&mut self, delim: u8) -> Result<T, ParseError> {
        let start = self.pos;
        let raw = self.until(delim)?;
        raw.parse::<T>().map_err(|_| ParseError::Serialized {
            offset: start,
            message: format!("invalid number '{}'", raw),
        })
    }

    fn quoted(&mut self, len: usize) -> Result<String, ParseError> {
        self.expect(b'"')?;
        let input = self.input;
        let start = self.pos;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= input.len())
            .ok_or_else(|| self.error("string length runs past end of input"))?;
        let text = std::str::from_utf8(&input[start..end]).map_err(|_| {
            ParseError::Serialized {
                offset: start,
                message: "string length splits a UTF-8 sequence".to_string(),
            }
        })?;
        self.pos = end;
        self.expect(b'"')?;
        Ok(text.to_string())
    }

    fn key(&mut self) -> Result<PhpKey, ParseError> {
        match self.value(MAX_TREE_DEPTH)? {
            PhpValue::Int(i) => Ok(PhpKey::Int(i)),
            PhpValue::Str(s) => Ok(PhpKey::Str(s)),
            _ => Err(self.error("array key must be int or string")),
        }
    }

    fn entries(&mut self, depth: usize) -> Result<Vec<(PhpKey, PhpValue)>, ParseError> {
        let count: usize = self.number(b':')?;
        self.expect(b'{')?;
        let mut entries = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let key = self.key()?;
            let value = self.value(depth + 1)?;
            entries.push((key, value));
        }
        self.expect(b'}')?;
        Ok(entries)
    }

    fn value(&mut self, depth: usize) -> Result<PhpValue, ParseError> {
        if depth > MAX_TREE_DEPTH {
            return Err(ParseError::DepthExceeded {
                limit: MAX_TREE_DEPTH,
            });
        }

        let tag = *self
            .input
            .get(self.pos)
            .ok_or_else(|| self.error("unexpected end of input"))?;
        self.pos += 1;

        match tag {
            b'N' => {
                self.expect(b';')?;
                Ok(PhpValue::Null)
            }
            b'b' => {
                self.expect(b':')?;
                match self.until(b';')? {
                    "0" => Ok(PhpValue::Bool(false)),
                    "1" => Ok(PhpValue::Bool(true)),
                    other => Err(self.error(format!("invalid bool '{}'", other))),
                }
            }
            b'i' => {
                self.expect(b':')?;
                Ok(PhpValue::Int(self.number(b';')?))
            }
            b'd' => {
                self.expect(b':')?;
                Ok(PhpValue::Float(self.until(b';')?.to_string()))
            }
            b's' => {
                self.expect(b':')?;
                let len: usize = self.number(b':')?;
                let text = self.quoted(len)?;
                self.expect(b';')?;
                Ok(PhpValue::Str(text))
            }
            b'a' => {
                self.expect(b':')?;
                Ok(PhpValue::Array(self.entries(depth)?))
            }
            b'O' => {
                self.expect(b':')?;
                let len: usize = self.number(b':')?;
                let class = self.quoted(len)?;
                self.expect(b':')?;
                Ok(PhpValue::Object {
                    class,
                    properties: self.entries(depth)?,
                })
            }
            other => {
                self.pos -= 1;
                Err(self.error(format!("unknown type tag '{}'", other as char)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUILDER_PAYLOAD: &str = r#"a:2:{s:13:"5f1a2b3c4d5e6";O:8:"stdClass":4:{s:4:"node";s:13:"5f1a2b3c4d5e6";s:4:"type";s:6:"module";s:8:"position";i:0;s:8:"settings";O:8:"stdClass":3:{s:4:"type";s:7:"heading";s:7:"heading";s:5:"Hello";s:10:"font_scale";d:1.25;}}s:13:"6a7b8c9d0e1f2";O:8:"stdClass":3:{s:4:"node";s:13:"6a7b8c9d0e1f2";s:4:"type";s:6:"module";s:8:"settings";O:8:"stdClass":2:{s:4:"text";s:12:"<p>World</p>";s:7:"visible";b:1;}}}"#;

    #[test]
    fn test_round_trip_is_byte_identical() {
        let value = decode(BUILDER_PAYLOAD).unwrap();
        assert_eq!(encode(&value), BUILDER_PAYLOAD);
    }

    #[test]
    fn test_set_string_recomputes_byte_length() {
        let mut value = decode(BUILDER_PAYLOAD).unwrap();
        let path = vec![
            PathSegment::Key("5f1a2b3c4d5e6".to_string()),
            PathSegment::Key("settings".to_string()),
            PathSegment::Key("heading".to_string()),
        ];
        assert!(value.set_string(&path, "Café"));

        let encoded = encode(&value);
        assert!(encoded.contains(r#"s:7:"heading";s:5:"Café";"#));
        assert_eq!(decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_set_string_rejects_non_string_targets() {
        let mut value = decode(BUILDER_PAYLOAD).unwrap();
        let path = vec![
            PathSegment::Key("5f1a2b3c4d5e6".to_string()),
            PathSegment::Key("position".to_string()),
        ];
        assert!(!value.set_string(&path, "x"));
        assert!(!value.set_string(&[PathSegment::Key("missing".to_string())], "x"));
    }

    #[test]
    fn test_integer_keys() {
        let value = decode(r#"a:2:{i:0;s:3:"one";i:1;s:3:"two";}"#).unwrap();
        let entries = value.entries().unwrap();
        assert_eq!(entries[1].0.to_segment(), PathSegment::Index(1));
        assert_eq!(entries[1].1.as_str(), Some("two"));
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(decode(r#"a:1:{s:4:"text";s:10:"short";}"#).is_err());
        assert!(decode(r#"a:2:{i:0;N;}"#).is_err());
        assert!(decode(r#"s:5:"hello";extra"#).is_err());
        assert!(decode("x:1;").is_err());
        assert!(decode("").is_err());
    }

    #[test]
    fn test_depth_limit() {
        let depth = MAX_TREE_DEPTH + 5;
        let mut payload = String::new();
        for _ in 0..depth {
            payload.push_str("a:1:{i:0;");
        }
        payload.push_str("N;");
        for _ in 0..depth {
            payload.push('}');
        }
        assert_eq!(
            decode(&payload),
            Err(ParseError::DepthExceeded {
                limit: MAX_TREE_DEPTH
            })
        );
    }

    #[test]
    fn test_base64_payload_keeps_its_encoding() {
        let stored = STANDARD.encode(BUILDER_PAYLOAD);
        let (value, encoding) = decode_payload(&stored).unwrap();
        assert_eq!(encoding, PayloadEncoding::Base64);
        assert_eq!(encode_payload(&value, encoding), stored);

        let (_, encoding) = decode_payload(BUILDER_PAYLOAD).unwrap();
        assert_eq!(encoding, PayloadEncoding::Raw);
        assert!(decode_payload("not a payload at all").is_err());
    }

    #[test]
    fn test_signature() {
        assert!(looks_serialized(BUILDER_PAYLOAD));
        assert!(!looks_serialized("[{\"id\":\"1\"}]"));
        assert!(!looks_serialized("plain text"));
    }
}
