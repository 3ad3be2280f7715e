//! HTML-to-text normalization.
//!
//! Turns arbitrary raw strings (article bodies, headlines, taxonomy labels)
//! into plain text. Input is parsed as an HTML fragment with `scraper`
//! (html5ever), so unclosed tags and stray markup never fail.
//!
//! Output rules:
//! - text of `script`, `style`, `template` and `noscript` is dropped
//! - block-level element boundaries (`p`, `div`, `br`, `li`, headings, ...)
//!   and literal newlines become line breaks (`\n`)
//! - other whitespace runs collapse to a single space
//! - every line is trimmed, empty lines are dropped, and the result is trimmed

use ego_tree::iter::Edge;
use scraper::node::Node;
use scraper::{ElementRef, Html};
use serde_json::Value;

/// Elements whose boundaries start a new line.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "caption", "dd", "details", "dialog",
    "div", "dl", "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3",
    "h4", "h5", "h6", "header", "hgroup", "hr", "li", "main", "nav", "ol", "p", "pre", "section",
    "summary", "table", "tbody", "td", "tfoot", "th", "thead", "tr", "ul",
];

/// Elements whose content is never visible text.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "template", "noscript"];

/// Inline and embedded elements that, alongside [`BLOCK_ELEMENTS`], count as markup.
const INLINE_ELEMENTS: &[&str] = &[
    "a", "abbr", "audio", "b", "bdi", "bdo", "cite", "code", "data", "del", "dfn", "em", "i",
    "iframe", "img", "ins", "kbd", "label", "mark", "picture", "q", "s", "samp", "small",
    "source", "span", "strong", "sub", "sup", "time", "u", "var", "video", "wbr",
];

/// Result of normalizing a fragment, plus whether it carried any markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    pub text: String,
    /// `true` if the input contained at least one recognized HTML element.
    pub has_markup: bool,
}

/// Strip markup from `raw` and return its visible text.
pub fn strip_to_text(raw: &str) -> String {
    normalize(raw).text
}

/// Like [`strip_to_text`], but also reports whether `raw` contained a
/// recognized HTML tag.
pub fn normalize(raw: &str) -> NormalizedText {
    if raw.is_empty() {
        return NormalizedText {
            text: String::new(),
            has_markup: false,
        };
    }

    let fragment = Html::parse_fragment(raw);
    let root = fragment.root_element();
    let mut collector = TextCollector::default();
    walk(root, &mut collector);

    NormalizedText {
        text: collector.finish(),
        has_markup: has_recognized_markup(root),
    }
}

/// Normalize an untyped JSON value.
///
/// `null` yields an empty string, strings are normalized as-is, and any other
/// value is first rendered with [`coerce_to_string`].
pub fn value_to_text(raw: &Value) -> String {
    match raw {
        Value::Null => String::new(),
        Value::String(s) => strip_to_text(s),
        other => strip_to_text(&coerce_to_string(other)),
    }
}

/// Render a JSON value as a plain string: strings verbatim, numbers and
/// booleans via `Display`, `null` as empty, containers as compact JSON.
pub fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn is_block(name: &str) -> bool {
    BLOCK_ELEMENTS.contains(&name)
}

fn is_recognized(name: &str) -> bool {
    is_block(name) || INLINE_ELEMENTS.contains(&name) || HIDDEN_ELEMENTS.contains(&name)
}

fn has_recognized_markup(root: ElementRef<'_>) -> bool {
    root.descendants()
        .skip(1)
        .filter_map(|node| match node.value() {
            Node::Element(el) => Some(el.name()),
            _ => None,
        })
        .any(is_recognized)
}

/// Collect visible text from `root` without recursion, so nesting depth is
/// bounded by the parser and never by the call stack.
fn walk(root: ElementRef<'_>, out: &mut TextCollector) {
    // Open hidden elements enclosing the current node.
    let mut hidden = 0usize;
    for edge in root.traverse() {
        match edge {
            Edge::Open(node) => match node.value() {
                Node::Text(text) if hidden == 0 => out.push_text(text),
                Node::Element(el) => {
                    let name = el.name();
                    if HIDDEN_ELEMENTS.contains(&name) {
                        hidden += 1;
                    } else if hidden == 0 && is_block(name) {
                        out.break_line();
                    }
                }
                _ => {}
            },
            Edge::Close(node) => {
                if let Node::Element(el) = node.value() {
                    let name = el.name();
                    if HIDDEN_ELEMENTS.contains(&name) {
                        hidden -= 1;
                    } else if hidden == 0 && is_block(name) {
                        out.break_line();
                    }
                }
            }
        }
    }
}

#[derive(Default)]
struct TextCollector {
    lines: Vec<String>,
    line: String,
    pending_space: bool,
}

impl TextCollector {
    fn push_text(&mut self, text: &str) {
        for (i, segment) in text.split('\n').enumerate() {
            if i > 0 {
                self.break_line();
            }
            for ch in segment.chars() {
                if ch.is_whitespace() {
                    self.pending_space = true;
                    continue;
                }
                if self.pending_space && !self.line.is_empty() {
                    self.line.push(' ');
                }
                self.pending_space = false;
                self.line.push(ch);
            }
        }
    }

    fn break_line(&mut self) {
        if !self.line.is_empty() {
            self.lines.push(std::mem::take(&mut self.line));
        }
        self.pending_space = false;
    }

    fn finish(&mut self) -> String {
        self.break_line();
        self.lines.join("\n")
    }
}
