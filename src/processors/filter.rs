//! Service-content filter: drops boilerplate that should never be translated

use regex::Regex;
use std::sync::OnceLock;

/// Minimum visible length of a fragment worth translating
pub const MIN_TEXT_LENGTH: usize = 3;

/// Single-word interface labels emitted by page builders
const UI_LABELS: &[&str] = &[
    "menu", "search", "close", "open", "submit", "send", "next", "previous", "prev", "back",
    "home", "more", "share", "login", "logout", "register", "loading", "toggle", "skip",
    "cart", "checkout", "download", "subscribe", "reply", "edit", "delete", "cancel", "ok",
    "yes", "no", "button", "image", "icon", "divider", "spacer",
];

/// "Read more" style links across the locales we publish to
const READ_MORE_PHRASES: &[&str] = &[
    "read more",
    "continue reading",
    "learn more",
    "view more",
    "see more",
    "en savoir plus",
    "lire la suite",
    "leer más",
    "seguir leyendo",
    "ver más",
    "weiterlesen",
    "mehr erfahren",
    "mehr lesen",
    "leggi di più",
    "continua a leggere",
    "leia mais",
    "saiba mais",
    "lees meer",
    "czytaj więcej",
    "подробнее",
    "читать далее",
    "читать дальше",
    "了解更多",
    "阅读更多",
    "閱讀更多",
    "続きを読む",
    "もっと見る",
    "더 보기",
    "devamını oku",
];

struct Patterns {
    tags: Regex,
    shortcodes: Regex,
    entities: Regex,
    whitespace: Regex,
    decorative: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        tags: Regex::new(r"(?s)<[^>]*>").expect("valid tag pattern"),
        shortcodes: Regex::new(r"\[/?[A-Za-z][A-Za-z0-9_-]*[^\]]*\]").expect("valid shortcode pattern"),
        entities: Regex::new(r"&(?:nbsp|amp|quot|apos|lt|gt|#\d+|#x[0-9a-fA-F]+);").expect("valid entity pattern"),
        whitespace: Regex::new(r"\s+").expect("valid whitespace pattern"),
        decorative: Regex::new(r"^[\s\p{P}\p{S}\p{N}]*$").expect("valid decorative pattern"),
    })
}

/// Text a reader would actually see: markup, shortcodes and entities removed
pub fn visible_text(raw: &str) -> String {
    let p = patterns();
    let text = p.tags.replace_all(raw, " ");
    let text = p.shortcodes.replace_all(&text, " ");
    let text = p.entities.replace_all(&text, |caps: &regex::Captures| match &caps[0] {
        "&amp;" => "&",
        "&quot;" => "\"",
        "&apos;" => "'",
        "&lt;" => "<",
        "&gt;" => ">",
        _ => " ",
    });
    p.whitespace.replace_all(text.trim(), " ").into_owned()
}

/// Decides which extracted strings are real content
#[derive(Debug, Clone)]
pub struct ServiceContentFilter {
    min_length: usize,
}

impl Default for ServiceContentFilter {
    fn default() -> Self {
        Self {
            min_length: MIN_TEXT_LENGTH,
        }
    }
}

impl ServiceContentFilter {
    pub fn new(min_length: usize) -> Self {
        Self { min_length }
    }

    /// Check whether a raw fragment (markup allowed) should be translated
    pub fn accept(&self, raw: &str) -> bool {
        let visible = visible_text(raw);
        if visible.is_empty() || patterns().decorative.is_match(&visible) {
            return false;
        }

        let phrase = visible
            .trim_end_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if READ_MORE_PHRASES.contains(&phrase.as_str()) {
            return false;
        }

        if !visible.contains(' ') && UI_LABELS.contains(&phrase.as_str()) {
            return false;
        }

        if visible.chars().count() < self.min_length && !is_all_caps(&visible) {
            return false;
        }

        true
    }
}

fn is_all_caps(text: &str) -> bool {
    let mut letters = text.chars().filter(|c| c.is_alphabetic()).peekable();
    letters.peek().is_some() && letters.all(|c| c.is_uppercase())
}
