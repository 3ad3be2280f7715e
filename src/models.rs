//! Core data models used throughout Article Harness.
//!
//! These types represent the raw records, canonical documents, audit reports
//! and search hits that flow through the normalization and retrieval pipeline.

use serde::{Deserialize, Deserializer, Serialize};

use crate::schema::{self, SchemaError};

/// An untrusted record from a content-management export. No shape is
/// guaranteed; every access must tolerate absence, nulls and wrong types.
pub type RawRecord = serde_json::Value;

/// Validated metadata attached to a [`CanonicalDocument`].
///
/// Optional fields are omitted from the serialized form when absent; the
/// taxonomy lists are always present, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub url: String,
    pub external_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_publish_date: Option<String>,
    /// Freshest known timestamp: last update, else publish date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,
}

/// A validated `{ text, metadata }` document, ready to be embedded.
///
/// Can only be obtained through [`CanonicalDocument::new`] (or by
/// deserializing, which runs the same checks), so every instance satisfies
/// the schema in [`crate::schema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedDocument")]
pub struct CanonicalDocument {
    text: String,
    metadata: CanonicalMetadata,
}

#[derive(Deserialize)]
struct UncheckedDocument {
    text: String,
    metadata: CanonicalMetadata,
}

impl TryFrom<UncheckedDocument> for CanonicalDocument {
    type Error = SchemaError;

    fn try_from(value: UncheckedDocument) -> Result<Self, Self::Error> {
        CanonicalDocument::new(value.text, value.metadata)
    }
}

impl CanonicalDocument {
    /// Validate and build a document.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] found in `text` or `metadata`.
    pub fn new(text: String, metadata: CanonicalMetadata) -> Result<Self, SchemaError> {
        schema::validate(&text, &metadata)?;
        Ok(Self { text, metadata })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn metadata(&self) -> &CanonicalMetadata {
        &self.metadata
    }

    pub fn external_id(&self) -> &str {
        &self.metadata.external_id
    }

    pub fn into_parts(self) -> (String, CanonicalMetadata) {
        (self.text, self.metadata)
    }
}

/// Outcome of processing one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessStatus {
    Success,
    Skipped,
}

/// One audit entry per input record, emitted whatever the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingReport {
    pub id: String,
    pub status: ProcessStatus,
    pub reason: String,
}

impl ProcessingReport {
    pub fn success(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ProcessStatus::Success,
            reason: "OK".to_string(),
        }
    }

    pub fn skipped(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ProcessStatus::Skipped,
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ProcessStatus::Success
    }
}

/// A rejected input, kept with its reason for offline inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub id: String,
    pub reason: String,
    pub raw_doc: RawRecord,
}

/// A canonical document with its embedding vector attached.
///
/// Serializes flat: `{ "text", "metadata", "vector" }`. A missing or
/// non-list `vector` deserializes as empty, and such documents are skipped
/// at indexing time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedDocument {
    #[serde(flatten)]
    pub document: CanonicalDocument,
    #[serde(default, deserialize_with = "lenient_vector")]
    pub vector: Vec<f32>,
}

fn lenient_vector<'de, D>(deserializer: D) -> Result<Vec<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let Some(items) = value.as_array() else {
        return Ok(Vec::new());
    };
    let vector: Option<Vec<f32>> = items.iter().map(|v| v.as_f64().map(|f| f as f32)).collect();
    Ok(vector.unwrap_or_default())
}

/// A search result: the stored payload plus its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub text: String,
    pub metadata: serde_json::Value,
    pub score: f32,
}
