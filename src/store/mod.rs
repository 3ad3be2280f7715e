//! Vector storage abstraction.
//!
//! The [`VectorStore`] trait is the narrow contract the pipeline needs from a
//! vector database: reset a collection, upsert embedded documents, and run a
//! nearest-neighbour query. Backends:
//!
//! - [`memory::InMemoryStore`]: brute-force cosine search, for tests and
//!   single-process use
//! - [`qdrant::QdrantStore`]: a Qdrant server over gRPC
//!
//! Every backend stores the same payload per point:
//! `{ "text": ..., "metadata": { ... } }`.

pub mod memory;
pub mod qdrant;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::VectorStoreConfig;
use crate::models::{EmbeddedDocument, SearchHit};

/// Abstract vector storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ensure_collection`](VectorStore::ensure_collection) | Drop and recreate a collection |
/// | [`upsert`](VectorStore::upsert) | Store embedded documents under positional ids |
/// | [`search`](VectorStore::search) | Cosine nearest-neighbour query |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Drop `name` if it exists, then create it empty with `dims`-sized
    /// cosine vectors. Calling it twice discards everything indexed between.
    async fn ensure_collection(&self, name: &str, dims: usize) -> Result<()>;

    /// Store `documents` in `name`.
    ///
    /// Point ids are the documents' positions in `documents`, so ids are only
    /// stable within one call. Documents with an empty vector or empty text
    /// are skipped. Returns the number of points written.
    async fn upsert(&self, name: &str, documents: &[EmbeddedDocument]) -> Result<usize>;

    /// Up to `limit` stored payloads closest to `vector`, best first.
    /// A missing collection yields an empty list.
    async fn search(&self, name: &str, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>>;
}

/// Create the configured [`VectorStore`].
///
/// | Config Value | Store |
/// |-------------|-------|
/// | `"memory"` | [`memory::InMemoryStore`] |
/// | `"qdrant"` | [`qdrant::QdrantStore`] (`QDRANT_API_KEY` is read from the environment) |
pub fn create_store(config: &VectorStoreConfig) -> Result<Arc<dyn VectorStore>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(memory::InMemoryStore::new())),
        "qdrant" => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("vector_store.url required for qdrant backend"))?;
            let api_key = std::env::var("QDRANT_API_KEY").ok();
            Ok(Arc::new(qdrant::QdrantStore::new(url, api_key)?))
        }
        other => bail!("Unknown vector store backend: {}", other),
    }
}

/// Documents worth indexing, paired with their positional point id.
pub(crate) fn indexable(
    documents: &[EmbeddedDocument],
) -> impl Iterator<Item = (u64, &EmbeddedDocument)> {
    documents
        .iter()
        .enumerate()
        .filter(|(_, doc)| !doc.vector.is_empty() && !doc.document.text().trim().is_empty())
        .map(|(i, doc)| (i as u64, doc))
}

/// The stored payload for one document.
pub(crate) fn payload(doc: &EmbeddedDocument) -> Result<Value> {
    Ok(json!({
        "text": doc.document.text(),
        "metadata": serde_json::to_value(doc.document.metadata())?,
    }))
}

/// Rebuild a hit from a stored payload.
pub(crate) fn hit_from_payload(payload: Value, score: f32) -> SearchHit {
    let mut payload = match payload {
        Value::Object(map) => map,
        _ => Default::default(),
    };
    let text = match payload.remove("text") {
        Some(Value::String(s)) => s,
        _ => String::new(),
    };
    let metadata = payload
        .remove("metadata")
        .unwrap_or_else(|| Value::Object(Default::default()));
    SearchHit {
        text,
        metadata,
        score,
    }
}
