//! End-to-end orchestration: transform, embed, index, search.
//!
//! A [`Pipeline`] owns one of each collaborator: the batch transformer (with
//! its dead-letter sink), an embedding provider and a vector store. It is
//! built once per process and shared by the CLI and the HTTP server.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::config::Config;
use crate::dead_letter::JsonlDeadLetterSink;
use crate::embedding::{self, EmbeddingProvider};
use crate::models::{CanonicalDocument, EmbeddedDocument, RawRecord, SearchHit};
use crate::progress::{BatchProgressReporter, NoProgress};
use crate::store::{self, VectorStore};
use crate::transform::{BatchOutcome, BatchTransformer, InputError};

pub const DEFAULT_COLLECTION: &str = "capitol_assessment";
pub const DEFAULT_DIMS: usize = 384;

/// Counts from a full run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Documents produced by the transform step (after merging by id).
    pub processed_count: usize,
    /// Points written to the vector store.
    pub indexed_count: usize,
    /// Records rejected and dead-lettered.
    pub skipped_count: usize,
}

pub struct Pipeline {
    transformer: BatchTransformer,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    collection: String,
    default_dims: usize,
}

impl Pipeline {
    pub fn new(
        transformer: BatchTransformer,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            transformer,
            embedder,
            store,
            collection: DEFAULT_COLLECTION.to_string(),
            default_dims: DEFAULT_DIMS,
        }
    }

    /// Target `collection`, sized `default_dims` when nothing else is known.
    pub fn with_collection(mut self, collection: impl Into<String>, default_dims: usize) -> Self {
        self.collection = collection.into();
        self.default_dims = default_dims;
        self
    }

    /// Build the pipeline described by `config`.
    ///
    /// Creates the dead-letter file's parent directory, the embedding
    /// provider and the vector store client.
    pub fn from_config(config: &Config, progress: Arc<dyn BatchProgressReporter>) -> Result<Self> {
        let dead_letter_path = &config.pipeline.dead_letter_path;
        ensure_parent_dir(dead_letter_path)?;

        let transformer = BatchTransformer::new(Arc::new(JsonlDeadLetterSink::new(
            dead_letter_path.clone(),
        )))
        .with_progress(progress)
        .parallel(config.pipeline.parallel);

        let embedder = embedding::create_provider(&config.embedding)?;
        let store = store::create_store(&config.vector_store)?;

        Ok(Self::new(transformer, embedder, store).with_collection(
            config.vector_store.collection.clone(),
            config.vector_store.default_dims,
        ))
    }

    /// Like [`Pipeline::from_config`] with progress reporting off.
    pub fn from_config_quiet(config: &Config) -> Result<Self> {
        Self::from_config(config, Arc::new(NoProgress))
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Transform raw records; rejected ones go to the dead-letter sink.
    pub fn transform(&self, raws: &[RawRecord]) -> BatchOutcome {
        self.transformer.run(raws)
    }

    /// Transform a request body that must be a JSON array.
    pub fn transform_input(&self, input: &Value) -> Result<BatchOutcome, InputError> {
        self.transformer.run_input(input)
    }

    /// Attach vectors. Documents with empty text are dropped; embedding
    /// failures leave an empty vector.
    pub async fn embed(&self, documents: Vec<CanonicalDocument>) -> Vec<EmbeddedDocument> {
        let embedded = embedding::embed_documents(self.embedder.as_ref(), documents).await;
        info!(
            count = embedded.len(),
            missing = embedded.iter().filter(|d| d.vector.is_empty()).count(),
            model = self.embedder.model_name(),
            "documents embedded"
        );
        embedded
    }

    /// Reset the collection and write `documents` into it.
    ///
    /// An empty slice is a no-op and leaves the collection untouched.
    /// Returns the number of points written.
    pub async fn index(&self, documents: &[EmbeddedDocument]) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        let dims = self.collection_dims(documents);
        self.store
            .ensure_collection(&self.collection, dims)
            .await
            .with_context(|| format!("Failed to prepare collection '{}'", self.collection))?;
        let written = self.store.upsert(&self.collection, documents).await?;
        info!(
            collection = %self.collection,
            dims,
            received = documents.len(),
            written,
            "documents indexed"
        );
        Ok(written)
    }

    /// Transform, embed and index `raws` in one go.
    ///
    /// When no record survives the transform step, nothing is embedded and
    /// the collection is left untouched.
    pub async fn run_full(&self, raws: &[RawRecord]) -> Result<RunSummary> {
        let outcome = self.transform(raws);
        self.finish(outcome).await
    }

    /// Embed and index an already transformed batch.
    pub async fn finish(&self, outcome: BatchOutcome) -> Result<RunSummary> {
        let skipped_count = outcome.skipped_count();
        let documents = outcome.into_documents();
        let processed_count = documents.len();
        if processed_count == 0 {
            return Ok(RunSummary {
                processed_count,
                indexed_count: 0,
                skipped_count,
            });
        }

        let embedded = self.embed(documents).await;
        let indexed_count = self.index(&embedded).await?;
        Ok(RunSummary {
            processed_count,
            indexed_count,
            skipped_count,
        })
    }

    /// Embed `query` and return the `limit` closest stored documents.
    ///
    /// If the query cannot be embedded the result is empty.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let vector = embedding::embed(self.embedder.as_ref(), query).await;
        if vector.is_empty() {
            return Ok(Vec::new());
        }
        self.store.search(&self.collection, &vector, limit).await
    }

    /// First non-empty vector length of the first document, else the
    /// provider's dimensions, else the configured default.
    fn collection_dims(&self, documents: &[EmbeddedDocument]) -> usize {
        documents
            .first()
            .map(|d| d.vector.len())
            .filter(|&len| len > 0)
            .or_else(|| Some(self.embedder.dims()).filter(|&d| d > 0))
            .unwrap_or(self.default_dims)
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}
