//! Post-retrieval table-aware scoring.
//!
//! Strictly a total reordering: every input document comes back, rescored.
//! The ten multiplicative factors apply sequentially to a running score
//! that starts at 1.0, in a fixed order — later penalties (continuation)
//! apply after earlier boosts, so the order is part of the contract. The
//! constants are empirically tuned and preserved as-is; a learned reranker
//! would replace this behind the same signature.

use std::collections::HashSet;

use crate::processing::table::{contains_numeric_value, count_dollar_amounts};
use crate::types::{
    sort_ranked, Chunk, ContentType, QueryClassification, QueryType, RankedResult,
};

pub struct TableRanker {
    meal_terms: Vec<String>,
    location_terms: Vec<String>,
}

impl TableRanker {
    pub fn new(meal_terms: Vec<String>, location_terms: Vec<String>) -> Self {
        Self {
            meal_terms,
            location_terms,
        }
    }

    pub fn from_vocabulary(vocab: &crate::config::VocabularyConfig) -> Self {
        Self::new(vocab.meal_terms.clone(), vocab.location_terms.clone())
    }

    /// Rescore and reorder documents for a query. `len(output) == len(input)`
    /// always; ties keep the input (retrieval) order.
    pub fn rank(
        &self,
        documents: Vec<Chunk>,
        query: &str,
        classification: &QueryClassification,
        value_patterns: &[String],
    ) -> Vec<RankedResult> {
        let query_lower = query.to_lowercase();
        let query_tokens: Vec<String> = tokenize(&query_lower);
        let table_seeking = classification.query_type == QueryType::TableQuery
            || classification.characteristics.requires_tables;

        let mut results: Vec<RankedResult> = documents
            .into_iter()
            .map(|chunk| {
                let score = self.score_document(
                    &chunk,
                    &query_lower,
                    &query_tokens,
                    classification,
                    table_seeking,
                    value_patterns,
                );
                RankedResult { chunk, score }
            })
            .collect();

        sort_ranked(&mut results);
        results
    }

    fn score_document(
        &self,
        chunk: &Chunk,
        query_lower: &str,
        query_tokens: &[String],
        classification: &QueryClassification,
        table_seeking: bool,
        value_patterns: &[String],
    ) -> f32 {
        let content_lower = chunk.text.to_lowercase();
        let mut score: f32 = 1.0;

        // (1) tabular content for a table-seeking query
        if chunk.content_type.is_tabular() && table_seeking {
            score *= 2.0;
        }

        // (2) exact value-pattern matches, stacking per distinct pattern
        for pattern in value_patterns {
            if chunk.text.contains(pattern.as_str()) {
                score *= 3.0;
            }
        }

        // (3) dollar-amount density for meal-related queries
        let query_has_meal_term = self
            .meal_terms
            .iter()
            .any(|term| query_lower.contains(term.as_str()));
        if query_has_meal_term {
            let dollar_count = count_dollar_amounts(&chunk.text);
            score *= 1.5 + 0.1 * dollar_count.min(10) as f32;
            let content_has_meal_term = self
                .meal_terms
                .iter()
                .any(|term| content_lower.contains(term.as_str()));
            if content_has_meal_term && dollar_count > 0 {
                score *= 1.5;
            }
        }

        // (4) query-token overlap with declared table headers
        let header_tokens: HashSet<String> = chunk
            .headers
            .iter()
            .flat_map(|h| tokenize(&h.to_lowercase()))
            .collect();
        let header_overlap = query_tokens
            .iter()
            .filter(|t| header_tokens.contains(t.as_str()))
            .count();
        if header_overlap > 0 {
            score *= 1.5 * header_overlap as f32;
        }

        // (5) location matches, extra when the location names the table
        let title_lower = chunk
            .table_title
            .as_deref()
            .unwrap_or("")
            .to_lowercase();
        for location in &self.location_terms {
            if query_lower.contains(location.as_str()) && content_lower.contains(location.as_str())
            {
                score *= 1.5;
                if title_lower.contains(location.as_str()) {
                    score *= 1.5;
                }
            }
        }

        // (6) query-token overlap with the table title
        if !title_lower.is_empty() {
            let title_tokens: HashSet<String> = tokenize(&title_lower).into_iter().collect();
            let title_overlap = query_tokens
                .iter()
                .filter(|t| title_tokens.contains(t.as_str()))
                .count();
            if title_overlap > 0 {
                score *= 1.2 * title_overlap as f32;
            }
        }

        // (7) numeric content for a numeric query
        if classification.characteristics.is_numerical && contains_numeric_value(&chunk.text) {
            score *= 1.3;
        }

        // (8) query-term density
        if !query_tokens.is_empty() {
            let matched = query_tokens
                .iter()
                .filter(|t| content_lower.contains(t.as_str()))
                .count();
            let density = matched as f32 / query_tokens.len() as f32;
            score *= 1.0 + density;
        }

        // (9) continuation penalty, applied after the boosts
        if chunk.is_continuation {
            score *= 0.8;
        }

        // (10) content-type nudges
        match chunk.content_type {
            ContentType::TableKeyValue if !value_patterns.is_empty() => score *= 1.2,
            ContentType::TableJson => score *= 1.1,
            _ => {}
        }

        score
    }
}

/// Lowercased alphanumeric tokens of at least three characters; short
/// function words carry no ranking signal.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3)
        .map(|t| t.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VocabularyConfig;
    use crate::query::classifier::{extract_value_patterns, QueryClassifier};

    fn ranker() -> TableRanker {
        TableRanker::from_vocabulary(&VocabularyConfig::default())
    }

    fn classify(query: &str) -> QueryClassification {
        QueryClassifier::new(VocabularyConfig::default()).classify(query)
    }

    fn hardship_table() -> Chunk {
        let mut chunk = Chunk::new(
            "Hardship Allowance\n\
             | Level | Description | Monthly Rate |\n\
             |---|---|---|\n\
             | 3 | Moderate Hardship | $400 |",
            "directive",
        );
        chunk.content_type = ContentType::TableMarkdown;
        chunk.table_title = Some("Hardship Allowance".to_string());
        chunk.headers = vec![
            "Level".to_string(),
            "Description".to_string(),
            "Monthly Rate".to_string(),
        ];
        chunk.row_count = 1;
        chunk
    }

    #[test]
    fn test_ranker_never_drops_documents() {
        let docs = vec![
            Chunk::new("one", "s"),
            Chunk::new("two", "s"),
            Chunk::new("three", "s"),
        ];
        let ranked = ranker().rank(docs, "anything at all", &classify("anything at all"), &[]);
        assert_eq!(ranked.len(), 3);
    }

    #[test]
    fn test_hardship_table_outranks_prose_mention() {
        let query = "hardship allowance level 3";
        let classification = classify(query);

        let table = hardship_table();
        let prose = Chunk::new(
            "Members experiencing hardship should contact their administrator \
             for guidance on available support programs.",
            "guide",
        );

        let ranked = ranker().rank(vec![prose, table], query, &classification, &[]);
        assert_eq!(ranked[0].chunk.content_type, ContentType::TableMarkdown);
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn test_exact_value_pattern_dominates() {
        let query = "what is the breakfast rate of $25.65";
        let classification = classify(query);
        let patterns = extract_value_patterns(query);
        assert_eq!(patterns, vec!["$25.65".to_string()]);

        let exact = Chunk::new("Breakfast in Ontario is reimbursed at $25.65 daily.", "a");
        let near = Chunk::new("Breakfast in Ontario is reimbursed at $22.50 daily.", "b");

        let ranked = ranker().rank(vec![near, exact], query, &classification, &patterns);
        assert!(ranked[0].chunk.text.contains("$25.65"));
        assert!(ranked[0].score > ranked[1].score * 2.9);
    }

    #[test]
    fn test_value_patterns_stack_multiplicatively() {
        let classification = classify("rates of $25.65 and $61.45");
        let patterns = vec!["$25.65".to_string(), "$61.45".to_string()];

        let both = Chunk::new("breakfast $25.65, dinner $61.45", "a");
        let one = Chunk::new("breakfast $25.65 only", "b");

        let ranked = ranker().rank(
            vec![one, both],
            "rates of $25.65 and $61.45",
            &classification,
            &patterns,
        );
        assert!(ranked[0].chunk.text.contains("$61.45"));
        // One extra matched pattern means at least a 3x gap.
        assert!(ranked[0].score >= ranked[1].score * 2.0);
    }

    #[test]
    fn test_meal_query_dollar_density_boost() {
        let query = "meal allowance amounts";
        let classification = classify(query);

        let dense = Chunk::new(
            "Meals: breakfast $25.65, lunch $22.50, dinner $61.45, incidentals $17.30",
            "a",
        );
        let sparse = Chunk::new("Meal claims are made through the travel system.", "b");

        let ranked = ranker().rank(vec![sparse, dense], query, &classification, &[]);
        assert!(ranked[0].chunk.text.contains("$25.65"));
    }

    #[test]
    fn test_meal_query_boost_applies_without_dollar_amounts() {
        let query = "breakfast";
        let classification = classify(query);

        let chunk = Chunk::new("breakfast guidance", "a");
        let ranked = ranker().rank(vec![chunk], query, &classification, &[]);
        // 1.5 base meal boost at zero dollar amounts, doubled by full
        // query-term density.
        assert!((ranked[0].score - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_continuation_penalized_after_boosts() {
        let query = "hardship allowance level 3";
        let classification = classify(query);

        let head = hardship_table();
        let mut continuation = hardship_table();
        continuation.is_continuation = true;
        continuation.table_title = Some("Hardship Allowance (continued - part 2)".to_string());

        let ranked = ranker().rank(
            vec![continuation, head],
            query,
            &classification,
            &[],
        );
        assert!(!ranked[0].chunk.is_continuation);
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn test_location_in_title_gets_double_boost() {
        let query = "meal rate in ottawa";
        let classification = classify(query);

        let mut titled = Chunk::new("| City | Rate |\n| Ottawa | $95 |", "a");
        titled.content_type = ContentType::TableMarkdown;
        titled.table_title = Some("Ottawa Meal Rates".to_string());
        let untitled = Chunk::new("Rates for Ottawa are published quarterly.", "b");

        let ranked = ranker().rank(vec![untitled, titled], query, &classification, &[]);
        assert_eq!(ranked[0].chunk.table_title.as_deref(), Some("Ottawa Meal Rates"));
    }

    #[test]
    fn test_key_value_nudge_with_patterns() {
        let classification = classify("incidental rate of $17.30");
        let patterns = vec!["$17.30".to_string()];

        let mut key_value = Chunk::new("incidental: $17.30", "a");
        key_value.content_type = ContentType::TableKeyValue;
        let mut json_table = Chunk::new("{\"incidental\": \"$17.30\"}", "b");
        json_table.content_type = ContentType::TableJson;

        let ranked = ranker().rank(
            vec![json_table, key_value],
            "incidental rate of $17.30",
            &classification,
            &patterns,
        );
        // Key-value ×1.2 beats JSON ×1.1 on otherwise comparable chunks.
        assert_eq!(ranked[0].chunk.content_type, ContentType::TableKeyValue);
    }

    #[test]
    fn test_ties_preserve_retrieval_order() {
        let first = Chunk::new("identical text", "s");
        let second = Chunk::new("identical text", "s");
        let first_id = first.id;
        let ranked = ranker().rank(
            vec![first, second],
            "unrelated query words",
            &classify("unrelated query words"),
            &[],
        );
        assert_eq!(ranked[0].chunk.id, first_id);
    }
}
