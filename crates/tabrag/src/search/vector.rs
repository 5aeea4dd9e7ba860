//! In-memory cosine-similarity vector index.
//!
//! The default `VectorIndex` implementation: a brute-force scan over owned
//! chunk embeddings with metadata filtering. Deployments with large corpora
//! swap in an external store behind the same trait.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::RagError;
use crate::processing::chunker::cosine_similarity;
use crate::providers::{VectorHit, VectorIndex};
use crate::types::{Chunk, MetadataFilter};

#[derive(Default)]
pub struct InMemoryVectorIndex {
    chunks: RwLock<HashMap<String, Chunk>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, chunks: Vec<Chunk>) -> Result<(), RagError> {
        let mut store = self.chunks.write();
        for chunk in chunks {
            if chunk.embedding.is_none() {
                return Err(RagError::Validation(format!(
                    "chunk {} has no embedding",
                    chunk.id
                )));
            }
            store.insert(chunk.id.to_string(), chunk);
        }
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorHit>, RagError> {
        let store = self.chunks.read();
        let mut hits: Vec<VectorHit> = store
            .values()
            .filter(|chunk| filter.map_or(true, |f| f.matches(chunk)))
            .filter_map(|chunk| {
                chunk.embedding.as_ref().map(|embedding| VectorHit {
                    id: chunk.id.to_string(),
                    score: cosine_similarity(vector, embedding),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn get(&self, id: &str) -> Result<Option<Chunk>, RagError> {
        Ok(self.chunks.read().get(id).cloned())
    }

    async fn delete_by_source(&self, source_id: &str) -> Result<usize, RagError> {
        let mut store = self.chunks.write();
        let before = store.len();
        store.retain(|_, chunk| chunk.source_id != source_id);
        Ok(before - store.len())
    }

    async fn count(&self) -> Result<usize, RagError> {
        Ok(self.chunks.read().len())
    }
}
