//! LLM-driven multi-query expansion.
//!
//! Produces 3-5 paraphrased sub-queries for a user question so each can be
//! retrieved independently before fusion. Falls back to the original query
//! alone on any failure (LLM unavailable, timeout, unusable output) — the
//! expansion is an optimization, not a requirement.

use std::collections::HashSet;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::providers::CompletionProvider;

const EXPANSION_TIMEOUT: Duration = Duration::from_secs(10);
const EXPANSION_OUTPUT_TOKENS: usize = 256;

/// Generate paraphrased sub-queries. The original query is always first in
/// the returned list; paraphrases identical to it (after normalization) are
/// dropped.
pub async fn expand_query(
    llm: &dyn CompletionProvider,
    query: &str,
    count: usize,
) -> Vec<String> {
    let count = count.clamp(3, 5);
    let prompt = format!(
        "Rewrite the following search query as {} alternative phrasings that \
         preserve its meaning. Use different wording in each. Return one \
         phrasing per line with no numbering and no extra text.\n\nQuery: {}",
        count, query
    );

    let raw = match tokio::time::timeout(
        EXPANSION_TIMEOUT,
        llm.complete(&prompt, EXPANSION_OUTPUT_TOKENS),
    )
    .await
    {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "query expansion failed, using original query only");
            return vec![query.to_string()];
        }
        Err(_) => {
            tracing::warn!("query expansion timed out, using original query only");
            return vec![query.to_string()];
        }
    };

    let mut seen: HashSet<[u8; 32]> = HashSet::new();
    let mut queries = vec![query.to_string()];
    seen.insert(content_hash(query));

    for line in raw.lines() {
        let candidate = line
            .trim()
            .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')' || c == '-')
            .trim();
        if candidate.is_empty() || candidate.split_whitespace().count() < 2 {
            continue;
        }
        if seen.insert(content_hash(candidate)) {
            queries.push(candidate.to_string());
        }
        if queries.len() > count {
            break;
        }
    }

    tracing::debug!(
        original = query,
        expanded = queries.len() - 1,
        "query expansion complete"
    );
    queries
}

/// Normalized content hash used to deduplicate paraphrases.
fn content_hash(text: &str) -> [u8; 32] {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    Sha256::digest(normalized.as_bytes()).into()
}
