//! Schema checks for canonical documents.
//!
//! A document is valid when:
//! - `text` is non-empty after trimming
//! - `metadata.external_id` is non-blank
//! - `metadata.url` (and `metadata.thumb`, when present) is an absolute
//!   `http`/`https` URL with a host
//! - every timestamp field, when present, ends with the UTC marker `Z`
//! - `sections`, `categories` and `tags` hold non-blank, unique entries;
//!   `categories` and `tags` hold at most [`MAX_CATEGORIES`] / [`MAX_TAGS`]
//!
//! Timestamps are checked only for the trailing `Z`; the rest of
//! the string is passed through untouched.

use std::collections::HashSet;

use url::Url;

use crate::models::CanonicalMetadata;

pub const MAX_CATEGORIES: usize = 5;
pub const MAX_TAGS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("text must not be empty")]
    EmptyText,
    #[error("external_id must not be blank")]
    BlankExternalId,
    #[error("{field} is not an absolute http(s) URL: {value}")]
    InvalidUrl { field: &'static str, value: String },
    #[error("{field} is not a UTC timestamp: {value}")]
    InvalidTimestamp { field: &'static str, value: String },
    #[error("{field} holds {len} entries, at most {max} allowed")]
    TooManyEntries {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("{field} contains a blank entry")]
    BlankEntry { field: &'static str },
    #[error("{field} contains duplicate entry: {value}")]
    DuplicateEntry { field: &'static str, value: String },
}

/// Check `text` and `metadata` against the canonical document schema.
pub fn validate(text: &str, metadata: &CanonicalMetadata) -> Result<(), SchemaError> {
    if text.trim().is_empty() {
        return Err(SchemaError::EmptyText);
    }
    if metadata.external_id.trim().is_empty() {
        return Err(SchemaError::BlankExternalId);
    }

    check_url("url", &metadata.url)?;
    if let Some(thumb) = &metadata.thumb {
        check_url("thumb", thumb)?;
    }

    check_timestamp("publish_date", metadata.publish_date.as_deref())?;
    check_timestamp("first_publish_date", metadata.first_publish_date.as_deref())?;
    check_timestamp("datetime", metadata.datetime.as_deref())?;

    check_list("sections", &metadata.sections, None)?;
    check_list("categories", &metadata.categories, Some(MAX_CATEGORIES))?;
    check_list("tags", &metadata.tags, Some(MAX_TAGS))?;

    Ok(())
}

/// `true` if `value` parses as an absolute `http`/`https` URL with a host.
pub fn is_absolute_http_url(value: &str) -> bool {
    match Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.has_host(),
        Err(_) => false,
    }
}

fn check_url(field: &'static str, value: &str) -> Result<(), SchemaError> {
    if is_absolute_http_url(value) {
        Ok(())
    } else {
        Err(SchemaError::InvalidUrl {
            field,
            value: value.to_string(),
        })
    }
}

fn check_timestamp(field: &'static str, value: Option<&str>) -> Result<(), SchemaError> {
    match value {
        Some(ts) if !ts.ends_with('Z') => Err(SchemaError::InvalidTimestamp {
            field,
            value: ts.to_string(),
        }),
        _ => Ok(()),
    }
}

fn check_list(
    field: &'static str,
    entries: &[String],
    max: Option<usize>,
) -> Result<(), SchemaError> {
    if let Some(max) = max {
        if entries.len() > max {
            return Err(SchemaError::TooManyEntries {
                field,
                len: entries.len(),
                max,
            });
        }
    }
    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        if entry.trim().is_empty() {
            return Err(SchemaError::BlankEntry { field });
        }
        if !seen.insert(entry.as_str()) {
            return Err(SchemaError::DuplicateEntry {
                field,
                value: entry.clone(),
            });
        }
    }
    Ok(())
}
