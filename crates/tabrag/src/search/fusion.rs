//! Retrieval fusion: reciprocal-rank fusion, the score-threshold gate, and
//! the post-fusion authority boost pass.
//!
//! Fusion weights are keyed by retriever identity, not list position, so
//! the result is commutative in retriever order. Authority/recency/
//! structured-content boosting is a separate multiplicative pass applied
//! after fusion, keeping the two independently testable.

use std::collections::HashMap;

use chrono::Datelike;

use crate::config::RankingConfig;
use crate::types::{sort_ranked, RankedResult};

/// Identity of a retrieval strategy; weights attach to this, never to the
/// position of a result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetrieverId {
    Bm25,
    Embedding,
    /// Results from an expanded (paraphrased) sub-query.
    Expansion,
}

/// One retriever's ranked output: (chunk id, native score) in rank order.
/// The native score is kept for diagnostics; fusion uses ranks only.
#[derive(Debug, Clone)]
pub struct RetrieverOutput {
    pub retriever: RetrieverId,
    pub hits: Vec<(String, f32)>,
}

#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub bm25: f32,
    pub embedding: f32,
    pub expansion: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            bm25: 0.5,
            embedding: 0.5,
            expansion: 0.3,
        }
    }
}

impl FusionWeights {
    fn for_retriever(&self, id: RetrieverId) -> f32 {
        match id {
            RetrieverId::Bm25 => self.bm25,
            RetrieverId::Embedding => self.embedding,
            RetrieverId::Expansion => self.expansion,
        }
    }
}

/// Reciprocal-rank fusion: score_i(doc) = 1/(rank_i + 1), final score is
/// the weight_i-scaled sum over retrievers that returned the document.
/// Documents present in only one list are included (no AND-semantics).
///
/// When the same retriever identity appears more than once (expanded
/// sub-queries), each document keeps its best rank per identity, so
/// duplicates across sub-queries do not stack.
pub fn reciprocal_rank_fusion(
    outputs: &[RetrieverOutput],
    weights: &FusionWeights,
) -> Vec<(String, f32)> {
    // (doc, retriever) -> best rank
    let mut best_rank: HashMap<(String, RetrieverId), usize> = HashMap::new();
    for output in outputs {
        for (rank, (id, _score)) in output.hits.iter().enumerate() {
            best_rank
                .entry((id.clone(), output.retriever))
                .and_modify(|r| *r = (*r).min(rank))
                .or_insert(rank);
        }
    }

    let mut scores: HashMap<String, f32> = HashMap::new();
    for ((id, retriever), rank) in best_rank {
        let rrf = 1.0 / (rank as f32 + 1.0);
        *scores.entry(id).or_insert(0.0) += weights.for_retriever(retriever) * rrf;
    }

    let mut fused: Vec<(String, f32)> = scores.into_iter().collect();
    // Ties broken by id so the ordering is deterministic and independent
    // of retriever order.
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    fused
}

/// Drop fused results below `threshold`, but never all of them: when every
/// candidate falls below, the single best survives. Retrieval must not
/// report "no results" while candidates exist.
pub fn apply_score_threshold(fused: Vec<(String, f32)>, threshold: f32) -> Vec<(String, f32)> {
    if fused.is_empty() {
        return fused;
    }
    let surviving: Vec<(String, f32)> = fused
        .iter()
        .filter(|(_, score)| *score >= threshold)
        .cloned()
        .collect();
    if surviving.is_empty() {
        tracing::debug!(
            threshold = threshold,
            "all candidates below threshold, keeping best"
        );
        return fused.into_iter().take(1).collect();
    }
    surviving
}

/// Secondary rerank pass: multiplicative boosts for authoritative origins,
/// recent documents, and structured content. Applied after fusion, before
/// the table-aware ranker.
pub fn authority_rerank(
    results: &mut Vec<RankedResult>,
    config: &RankingConfig,
    authoritative_origins: &[String],
) {
    let current_year = chrono::Utc::now().year();
    for result in results.iter_mut() {
        let chunk = &result.chunk;
        let origin = chunk
            .extra
            .get("origin")
            .map(String::as_str)
            .unwrap_or(chunk.source_id.as_str());
        if authoritative_origins
            .iter()
            .any(|domain| origin.contains(domain.as_str()))
        {
            result.score *= config.authority_boost;
        }
        if let Some(year) = chunk.year {
            if year >= current_year - 1 {
                result.score *= config.recency_boost;
            }
        }
        if chunk.content_type.is_tabular() {
            result.score *= config.structured_boost;
        }
    }
    sort_ranked(results);
}
