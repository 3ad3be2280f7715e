//! In-memory [`VectorStore`] implementation.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`. Search is
//! brute-force cosine similarity over every point of the collection.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::models::{EmbeddedDocument, SearchHit};

use super::{hit_from_payload, indexable, payload, VectorStore};

struct StoredPoint {
    vector: Vec<f32>,
    payload: Value,
}

struct Collection {
    dims: usize,
    points: BTreeMap<u64, StoredPoint>,
}

/// In-memory vector store for tests and single-process deployments.
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Number of points in `name`, or `None` if the collection does not exist.
    pub fn point_count(&self, name: &str) -> Option<usize> {
        let collections = self.collections.read().ok()?;
        collections.get(name).map(|c| c.points.len())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow::anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn ensure_collection(&self, name: &str, dims: usize) -> Result<()> {
        if dims == 0 {
            bail!("collection '{}' needs a vector size > 0", name);
        }
        let mut collections = self.collections.write().map_err(poisoned)?;
        collections.insert(
            name.to_string(),
            Collection {
                dims,
                points: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, name: &str, documents: &[EmbeddedDocument]) -> Result<usize> {
        let mut points = Vec::new();
        for (id, doc) in indexable(documents) {
            points.push((
                id,
                StoredPoint {
                    vector: doc.vector.clone(),
                    payload: payload(doc)?,
                },
            ));
        }

        let mut collections = self.collections.write().map_err(poisoned)?;
        let Some(collection) = collections.get_mut(name) else {
            bail!("collection '{}' does not exist", name);
        };
        if let Some((id, point)) = points.iter().find(|(_, p)| p.vector.len() != collection.dims) {
            bail!(
                "point {} has {} dimensions, collection '{}' expects {}",
                id,
                point.vector.len(),
                name,
                collection.dims
            );
        }

        let written = points.len();
        collection.points.extend(points);
        Ok(written)
    }

    async fn search(&self, name: &str, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        let collections = self.collections.read().map_err(poisoned)?;
        let Some(collection) = collections.get(name) else {
            return Ok(Vec::new());
        };
        if vector.len() != collection.dims {
            bail!(
                "query has {} dimensions, collection '{}' expects {}",
                vector.len(),
                name,
                collection.dims
            );
        }

        let mut scored: Vec<(f32, &StoredPoint)> = collection
            .points
            .values()
            .map(|p| (cosine_sim(vector, &p.vector), p))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, p)| hit_from_payload(p.payload.clone(), score))
            .collect())
    }
}
