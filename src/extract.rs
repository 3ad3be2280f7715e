//! Field extraction from raw article records.
//!
//! Every extractor is a pure function over an untyped [`RawRecord`]. Missing
//! keys, `null`s and wrong types all degrade to `None` (or an empty list);
//! nothing here panics on unexpected shapes.
//!
//! Source fields read from the content-management export:
//!
//! | Canonical field | Raw path |
//! |-----------------|----------|
//! | external id | `_id` |
//! | url | `canonical_website` + `website_url`, else `website_url`, else `canonical_url` |
//! | text | `content_elements[type = "text"].content` |
//! | title | `headlines.basic` |
//! | dates | `publish_date`, `first_publish_date`, `last_updated_date` |
//! | website | `canonical_website` |
//! | sections | `taxonomy.sections[].name` |
//! | categories | `taxonomy.categories[]` (`name`, `score`, `classifier`) |
//! | tags | `taxonomy.tags[].slug` |
//! | thumb | `promo_items.basic.additional_properties.resizeUrl` |

use std::cmp::Ordering;

use indexmap::IndexSet;
use serde_json::Value;

use crate::html;
use crate::models::RawRecord;
use crate::schema::{MAX_CATEGORIES, MAX_TAGS};

/// Classifier that marks the categories worth keeping.
pub const CATEGORY_CLASSIFIER: &str = "iab_content_taxonomy";

/// Stable identifier from the source system, stringified.
pub fn external_id(record: &RawRecord) -> Option<String> {
    match record.get("_id")? {
        Value::Null => None,
        value => Some(html::coerce_to_string(value)),
    }
}

/// Resolve the article's absolute URL.
///
/// In order:
/// 1. `https://www.{canonical_website}.com{website_url}` when the site is
///    non-blank and `website_url` starts with `/`
/// 2. `website_url` when it is already absolute `http(s)`
/// 3. `canonical_url` when it is absolute `http(s)`
pub fn url(record: &RawRecord) -> Option<String> {
    let site = record
        .get("canonical_website")
        .filter(|v| !v.is_null())
        .map(html::coerce_to_string)
        .filter(|s| !s.trim().is_empty());
    let path = record.get("website_url").and_then(Value::as_str);

    if let (Some(site), Some(path)) = (&site, path) {
        if path.starts_with('/') {
            return Some(format!("https://www.{site}.com{path}"));
        }
    }
    if let Some(path) = path.filter(|p| is_http(p)) {
        return Some(path.to_string());
    }
    record
        .get("canonical_url")
        .and_then(Value::as_str)
        .filter(|u| is_http(u))
        .map(str::to_string)
}

/// Assemble the plain-text body from the `text` content elements.
///
/// Fragments are appended to one raw buffer and the whole buffer is
/// re-normalized after each append, so block breaks are reconciled across
/// fragment edges. A fragment carrying markup is preceded by a line break;
/// a plain-text fragment by a single space, so run-on sentences split across
/// elements stay in one paragraph.
pub fn text(record: &RawRecord) -> Option<String> {
    let elements = record.get("content_elements")?.as_array()?;

    let mut raw = String::new();
    let mut text = String::new();
    for element in elements {
        if element.get("type").and_then(Value::as_str) != Some("text") {
            continue;
        }
        let content = match element.get("content") {
            None | Some(Value::Null) => continue,
            Some(value) => html::coerce_to_string(value),
        };
        let separator = if html::normalize(&content).has_markup {
            '\n'
        } else {
            ' '
        };
        raw.push(separator);
        raw.push_str(&content);
        text = html::strip_to_text(&raw);
    }

    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Headline as plain text.
///
/// A missing or blank headline yields `None`, so `title` is left out of the
/// metadata instead of being stored as an empty string.
pub fn title(record: &RawRecord) -> Option<String> {
    let headline = record.pointer("/headlines/basic")?;
    let title = html::value_to_text(headline);
    (!title.is_empty()).then_some(title)
}

pub fn publish_date(record: &RawRecord) -> Option<String> {
    utc_timestamp(record, "publish_date")
}

pub fn first_publish_date(record: &RawRecord) -> Option<String> {
    utc_timestamp(record, "first_publish_date")
}

/// Freshest timestamp: `last_updated_date` if usable, else `publish_date`.
pub fn datetime(record: &RawRecord) -> Option<String> {
    utc_timestamp(record, "last_updated_date").or_else(|| publish_date(record))
}

/// Source site identifier.
pub fn website(record: &RawRecord) -> Option<String> {
    match record.get("canonical_website")? {
        Value::Null => None,
        value => Some(html::coerce_to_string(value)).filter(|s| !s.trim().is_empty()),
    }
}

/// Section names in order of appearance, de-duplicated.
pub fn sections(record: &RawRecord) -> Vec<String> {
    let names = taxonomy(record, "sections")
        .iter()
        .filter_map(|entry| entry.get("name").and_then(Value::as_str))
        .map(str::trim);
    dedup(names, None)
}

/// Categories from the [`CATEGORY_CLASSIFIER`] scheme, highest score first.
///
/// Missing or non-numeric scores count as `0`; equal scores keep their input
/// order. Names are cleaned of markup before de-duplication, and at most
/// [`MAX_CATEGORIES`] are kept.
pub fn categories(record: &RawRecord) -> Vec<String> {
    let mut matching: Vec<(&Value, f64)> = taxonomy(record, "categories")
        .iter()
        .filter(|entry| {
            entry.get("classifier").and_then(Value::as_str) == Some(CATEGORY_CLASSIFIER)
        })
        .map(|entry| {
            let score = entry.get("score").and_then(Value::as_f64).unwrap_or(0.0);
            (entry, score)
        })
        .collect();
    matching.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(Ordering::Equal));

    let names: Vec<String> = matching
        .into_iter()
        .map(|(entry, _)| html::value_to_text(entry.get("name").unwrap_or(&Value::Null)))
        .collect();
    dedup(names.iter().map(String::as_str), Some(MAX_CATEGORIES))
}

/// Tag slugs in order of appearance, de-duplicated, at most [`MAX_TAGS`].
pub fn tags(record: &RawRecord) -> Vec<String> {
    let slugs = taxonomy(record, "tags")
        .iter()
        .filter_map(|entry| entry.get("slug").and_then(Value::as_str))
        .map(str::trim);
    dedup(slugs, Some(MAX_TAGS))
}

/// Thumbnail URL rebuilt from the promo image's resize path and the site.
pub fn thumb(record: &RawRecord) -> Option<String> {
    let path = record
        .pointer("/promo_items/basic/additional_properties/resizeUrl")
        .and_then(Value::as_str)
        .filter(|p| !p.trim().is_empty())?;
    let site = record
        .get("canonical_website")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())?;
    Some(format!("https://www.{}.com{}", site.to_lowercase(), path))
}

fn utc_timestamp(record: &RawRecord, key: &str) -> Option<String> {
    record
        .get(key)
        .and_then(Value::as_str)
        .filter(|ts| ts.ends_with('Z'))
        .map(str::to_string)
}

fn taxonomy<'a>(record: &'a RawRecord, key: &str) -> &'a [Value] {
    record
        .get("taxonomy")
        .and_then(|t| t.get(key))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn is_http(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Keep the first occurrence of each non-empty value, up to `cap` entries.
fn dedup<'a>(values: impl Iterator<Item = &'a str>, cap: Option<usize>) -> Vec<String> {
    let mut seen: IndexSet<&str> = IndexSet::new();
    for value in values.filter(|v| !v.is_empty()) {
        if cap.is_some_and(|cap| seen.len() >= cap) {
            break;
        }
        seen.insert(value);
    }
    seen.into_iter().map(str::to_string).collect()
}
