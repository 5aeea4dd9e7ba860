//! Answer synthesis and source attribution.
//!
//! The builder never fails a query: when no completion provider is
//! configured, or the provider errors, it degrades to an extractive
//! answer assembled from the top-ranked chunks.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::providers::CompletionProvider;
use crate::types::RankedResult;

const MAX_SOURCES: usize = 5;
const PREVIEW_CHARS: usize = 200;
const CONTEXT_CHUNKS: usize = 5;
const SYNTHESIS_MAX_TOKENS: usize = 512;

#[derive(Debug, Clone, Serialize)]
pub struct SourceAttribution {
    pub source_id: String,
    pub preview: String,
    pub confidence: f32,
    pub table_title: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub confidence: f32,
    pub sources: Vec<SourceAttribution>,
    /// True when the text came from the completion provider rather than
    /// the extractive fallback.
    pub synthesized: bool,
}

pub struct AnswerBuilder {
    target_k: usize,
}

impl AnswerBuilder {
    pub fn new(target_k: usize) -> Self {
        Self {
            target_k: target_k.max(1),
        }
    }

    /// Assemble the final answer. An empty result set short-circuits to a
    /// fixed zero-confidence response with no sources.
    pub async fn build(
        &self,
        llm: Option<Arc<dyn CompletionProvider>>,
        query: &str,
        results: &[RankedResult],
        expansion_used: bool,
    ) -> Answer {
        if results.is_empty() {
            return Answer {
                text: "No relevant information found.".to_string(),
                confidence: 0.0,
                sources: Vec::new(),
                synthesized: false,
            };
        }

        let confidence = self.answer_confidence(results, expansion_used);
        let sources = build_sources(results);

        let (text, synthesized) = match llm {
            Some(provider) => {
                let prompt = synthesis_prompt(query, results);
                match provider.complete(&prompt, SYNTHESIS_MAX_TOKENS).await {
                    Ok(text) if !text.trim().is_empty() => (text.trim().to_string(), true),
                    Ok(_) => (extractive_answer(results), false),
                    Err(err) => {
                        warn!(error = %err, "answer synthesis failed, using extractive fallback");
                        (extractive_answer(results), false)
                    }
                }
            }
            None => (extractive_answer(results), false),
        };

        Answer {
            text,
            confidence,
            sources,
            synthesized,
        }
    }

    /// Four weighted signals, each in [0, 1]: mean ranked score (clamped),
    /// result-count adequacy against the requested k, source diversity
    /// saturating at three distinct sources, and a retrieval-mode prior.
    pub fn answer_confidence(&self, results: &[RankedResult], expansion_used: bool) -> f32 {
        if results.is_empty() {
            return 0.0;
        }

        let mean_score = results.iter().map(|r| r.score.clamp(0.0, 1.0)).sum::<f32>()
            / results.len() as f32;
        let count_factor = (results.len() as f32 / self.target_k as f32).min(1.0);
        let unique_sources = results
            .iter()
            .map(|r| r.chunk.source_id.as_str())
            .collect::<HashSet<_>>()
            .len();
        let diversity = (unique_sources as f32 / 3.0).min(1.0);
        let mode_prior = if expansion_used { 0.8 } else { 0.7 };

        let confidence =
            0.4 * mean_score + 0.2 * count_factor + 0.2 * diversity + 0.2 * mode_prior;
        (confidence * 100.0).round() / 100.0
    }
}

/// At most five attributions, one per distinct source. The highest-ranked
/// chunk for a source wins its slot.
pub fn build_sources(results: &[RankedResult]) -> Vec<SourceAttribution> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut sources = Vec::new();
    for result in results {
        if sources.len() >= MAX_SOURCES {
            break;
        }
        if !seen.insert(result.chunk.source_id.as_str()) {
            continue;
        }
        sources.push(SourceAttribution {
            source_id: result.chunk.source_id.clone(),
            preview: preview(&result.chunk.text),
            confidence: source_confidence(result),
            table_title: result.chunk.table_title.clone(),
        });
    }
    sources
}

fn source_confidence(result: &RankedResult) -> f32 {
    let score = result.score.clamp(0.0, 1.0);
    let credibility = result.chunk.credibility.clamp(0.0, 1.0);
    let length_adequacy =
        (result.chunk.text.chars().count() as f32 / PREVIEW_CHARS as f32).min(1.0);
    let confidence = (score + credibility + length_adequacy) / 3.0;
    (confidence * 100.0).round() / 100.0
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= PREVIEW_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", cut.trim_end())
}

fn synthesis_prompt(query: &str, results: &[RankedResult]) -> String {
    let mut context = String::new();
    for (i, result) in results.iter().take(CONTEXT_CHUNKS).enumerate() {
        context.push_str(&format!("[{}] ", i + 1));
        if let Some(title) = &result.chunk.table_title {
            context.push_str(title);
            context.push_str(": ");
        }
        context.push_str(result.chunk.text.trim());
        context.push_str("\n\n");
    }
    format!(
        "Answer the question using only the context below. Preserve exact \
         figures and units from tables. If the context does not contain the \
         answer, say so.\n\nContext:\n{context}\nQuestion: {query}\n\nAnswer:"
    )
}

fn extractive_answer(results: &[RankedResult]) -> String {
    let mut parts = Vec::new();
    for result in results.iter().take(CONTEXT_CHUNKS.min(3)) {
        match &result.chunk.table_title {
            Some(title) => parts.push(format!("{}: {}", title, preview(&result.chunk.text))),
            None => parts.push(preview(&result.chunk.text)),
        }
    }
    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use crate::types::{Chunk, RankedResult};
    use async_trait::async_trait;

    struct CannedLlm(String);

    #[async_trait]
    impl CompletionProvider for CannedLlm {
        async fn complete(&self, _prompt: &str, _max_tokens: usize) -> Result<String, RagError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenLlm;

    #[async_trait]
    impl CompletionProvider for BrokenLlm {
        async fn complete(&self, _prompt: &str, _max_tokens: usize) -> Result<String, RagError> {
            Err(RagError::Provider("model unavailable".to_string()))
        }
    }

    fn result(text: &str, source: &str, score: f32) -> RankedResult {
        RankedResult {
            chunk: Chunk::new(text, source),
            score,
        }
    }

    #[tokio::test]
    async fn test_empty_results_give_zero_confidence() {
        let builder = AnswerBuilder::new(10);
        let answer = builder.build(None, "anything", &[], false).await;
        assert_eq!(answer.confidence, 0.0);
        assert!(answer.sources.is_empty());
        assert!(!answer.synthesized);
    }

    #[tokio::test]
    async fn test_llm_failure_falls_back_to_extractive() {
        let builder = AnswerBuilder::new(10);
        let results = vec![result("The breakfast rate is $25.65 per day.", "a", 0.9)];
        let answer = builder
            .build(Some(Arc::new(BrokenLlm)), "breakfast rate", &results, false)
            .await;
        assert!(!answer.synthesized);
        assert!(answer.text.contains("$25.65"));
        assert!(answer.confidence > 0.0);
    }

    #[tokio::test]
    async fn test_synthesized_answer_uses_provider_text() {
        let builder = AnswerBuilder::new(10);
        let results = vec![result("The breakfast rate is $25.65.", "a", 0.9)];
        let answer = builder
            .build(
                Some(Arc::new(CannedLlm("The rate is $25.65.".to_string()))),
                "breakfast rate",
                &results,
                false,
            )
            .await;
        assert!(answer.synthesized);
        assert_eq!(answer.text, "The rate is $25.65.");
    }

    #[test]
    fn test_sources_deduped_by_source_id() {
        let results = vec![
            result("first chunk from a", "a", 0.9),
            result("second chunk from a", "a", 0.8),
            result("chunk from b", "b", 0.7),
        ];
        let sources = build_sources(&results);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].source_id, "a");
        assert!(sources[0].preview.contains("first"));
    }

    #[test]
    fn test_sources_capped_at_five() {
        let results: Vec<RankedResult> = (0..8)
            .map(|i| result("text", &format!("source-{i}"), 1.0 - i as f32 * 0.1))
            .collect();
        assert_eq!(build_sources(&results).len(), 5);
    }

    #[test]
    fn test_preview_truncates_with_ellipsis() {
        let long = "word ".repeat(100);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert!(p.chars().count() <= PREVIEW_CHARS + 3);
    }

    #[test]
    fn test_confidence_rewards_diversity_and_expansion() {
        let builder = AnswerBuilder::new(3);
        let diverse = vec![
            result("t", "a", 1.0),
            result("t", "b", 1.0),
            result("t", "c", 1.0),
        ];
        let narrow = vec![
            result("t", "a", 1.0),
            result("t", "a", 1.0),
            result("t", "a", 1.0),
        ];
        let base = builder.answer_confidence(&diverse, false);
        assert!(base > builder.answer_confidence(&narrow, false));
        assert!(builder.answer_confidence(&diverse, true) > base);
        // Fully saturated signals without expansion: 0.4 + 0.2 + 0.2 + 0.14.
        assert!((base - 0.94).abs() < 1e-6);
    }
}
