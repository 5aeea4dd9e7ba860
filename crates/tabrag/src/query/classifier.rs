//! Deterministic, keyword-driven query classification.
//!
//! Intersects disjoint indicator sets with the lowercased, tokenized query.
//! Priority: table > analytical > factual > general. Classification is
//! advisory — it selects the retrieval configuration, not a hard gate, and
//! downstream components behave correctly on misclassification.

use std::collections::HashSet;
use std::sync::LazyLock;

use crate::config::VocabularyConfig;
use crate::types::{QueryCharacteristics, QueryClassification, QueryType};

static VALUE_PATTERN_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\s?\d{1,3}(,\d{3})*(\.\d+)?|\d+(\.\d+)?\s?%|\b\d+\.\d+\b")
        .expect("value pattern regex is valid")
});

pub struct QueryClassifier {
    vocab: VocabularyConfig,
}

impl QueryClassifier {
    pub fn new(vocab: VocabularyConfig) -> Self {
        Self { vocab }
    }

    pub fn classify(&self, query: &str) -> QueryClassification {
        let lower = query.to_lowercase();
        let tokens: HashSet<&str> = lower.split_whitespace().collect();

        let table_matches = matched_keywords(&self.vocab.table_indicators, &lower, &tokens);
        let analytical_matches =
            matched_keywords(&self.vocab.analytical_indicators, &lower, &tokens);
        let factual_matches = matched_keywords(&self.vocab.factual_indicators, &lower, &tokens);

        let characteristics = QueryCharacteristics {
            requires_tables: !table_matches.is_empty(),
            is_comparative: !matched_keywords(&self.vocab.comparative_markers, &lower, &tokens)
                .is_empty(),
            is_numerical: !matched_keywords(&self.vocab.numeric_markers, &lower, &tokens)
                .is_empty()
                || lower.chars().any(|c| c.is_ascii_digit()),
            is_specific_lookup: !matched_keywords(&self.vocab.lookup_markers, &lower, &tokens)
                .is_empty(),
        };

        let (query_type, confidence, matched_keywords) = if !table_matches.is_empty() {
            let confidence = (0.5 + 0.1 * table_matches.len() as f32).min(0.9);
            (QueryType::TableQuery, confidence, table_matches)
        } else if !analytical_matches.is_empty() {
            (QueryType::AnalyticalQuery, 0.7, analytical_matches)
        } else if !factual_matches.is_empty() {
            (QueryType::FactualQuery, 0.6, factual_matches)
        } else {
            (QueryType::GeneralQuery, 0.5, Vec::new())
        };

        QueryClassification {
            query_type,
            confidence,
            matched_keywords,
            characteristics,
        }
    }
}

/// Single-word indicators must match a whole token; multi-word indicators
/// match as substrings of the lowercased query.
fn matched_keywords(
    indicators: &[String],
    lower_query: &str,
    tokens: &HashSet<&str>,
) -> Vec<String> {
    indicators
        .iter()
        .filter(|kw| {
            if kw.contains(' ') || !kw.chars().all(|c| c.is_alphanumeric()) {
                lower_query.contains(kw.as_str())
            } else {
                tokens.contains(kw.as_str())
            }
        })
        .cloned()
        .collect()
}

/// Pull exact value tokens (currency, percentages, decimals) out of a query
/// for the ranker's exact-match factor.
pub fn extract_value_patterns(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    VALUE_PATTERN_RE
        .find_iter(query)
        .map(|m| m.as_str().to_string())
        .filter(|v| seen.insert(v.clone()))
        .collect()
}
