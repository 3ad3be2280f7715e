//! [`VectorStore`] backed by a Qdrant server.
//!
//! Talks gRPC through `qdrant-client`. Payloads are converted from
//! `serde_json` on the way in and back through the protobuf value kinds on
//! the way out, so nested `metadata` objects and lists survive intact.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    value::Kind, CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::Value;
use tracing::debug;

use crate::models::{EmbeddedDocument, SearchHit};

use super::{hit_from_payload, indexable, payload, VectorStore};

type Payload = HashMap<String, qdrant_client::qdrant::Value>;

/// Qdrant-backed vector store.
pub struct QdrantStore {
    client: Qdrant,
}

impl std::fmt::Debug for QdrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantStore").finish_non_exhaustive()
    }
}

impl QdrantStore {
    /// Connect to the Qdrant gRPC endpoint at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built (e.g. malformed URL).
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .api_key(api_key)
            .build()
            .with_context(|| format!("Failed to create Qdrant client for {}", url))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, name: &str, dims: usize) -> Result<()> {
        if self.client.collection_exists(name).await? {
            debug!(collection = name, "dropping existing collection");
            self.client
                .delete_collection(name)
                .await
                .with_context(|| format!("Failed to delete collection '{}'", name))?;
        }
        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dims as u64, Distance::Cosine)),
            )
            .await
            .with_context(|| format!("Failed to create collection '{}'", name))?;
        Ok(())
    }

    async fn upsert(&self, name: &str, documents: &[EmbeddedDocument]) -> Result<usize> {
        let mut points = Vec::new();
        for (id, doc) in indexable(documents) {
            let payload: Payload = serde_json::from_value(payload(doc)?)?;
            points.push(PointStruct::new(id, doc.vector.clone(), payload));
        }
        if points.is_empty() {
            return Ok(0);
        }

        let written = points.len();
        self.client
            .upsert_points(UpsertPointsBuilder::new(name, points).wait(true))
            .await
            .with_context(|| format!("Failed to upsert into collection '{}'", name))?;
        Ok(written)
    }

    async fn search(&self, name: &str, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        if !self.client.collection_exists(name).await? {
            return Ok(Vec::new());
        }
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(name, vector.to_vec(), limit as u64).with_payload(true),
            )
            .await
            .with_context(|| format!("Failed to search collection '{}'", name))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| hit_from_payload(payload_to_json(point.payload), point.score))
            .collect())
    }
}

fn payload_to_json(payload: Payload) -> Value {
    Value::Object(
        payload
            .into_iter()
            .map(|(k, v)| (k, value_to_json(v)))
            .collect(),
    )
}

fn value_to_json(value: qdrant_client::qdrant::Value) -> Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::from(i),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(st)) => payload_to_json(st.fields),
    }
}
