use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub data_dir: PathBuf,
    pub chunking: ChunkingConfig,
    pub search: SearchConfig,
    pub ranking: RankingConfig,
    pub dedup: DedupConfig,
    pub ingest: IngestConfig,
    pub vocabulary: VocabularyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Which splitter the engine uses. Explicit enum, not a string key.
    pub strategy: SplitStrategy,
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
    pub overlap_words: usize,
    /// Row cap before a table is split with replicated headers.
    pub max_table_rows: usize,
    /// Percentile of sentence-distance distribution used as the semantic
    /// break threshold (0-100).
    pub semantic_break_percentile: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    FixedSize,
    SemanticBoundary,
    Proposition,
    TableAware,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub default_k: usize,
    /// Candidates fetched per retriever = k * candidate_multiplier.
    pub candidate_multiplier: usize,
    pub min_score_threshold: f32,
    pub bm25_weight: f32,
    pub embedding_weight: f32,
    /// Weight applied to results from expanded sub-queries.
    pub expansion_weight: f32,
    /// Number of LLM paraphrases for multi-query expansion (3-5).
    pub expansion_queries: usize,
    /// Per-retriever timeout; slow retrievers are abandoned and fusion
    /// proceeds with whatever returned.
    pub retriever_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Multiplier for authoritative origins in the post-fusion boost pass.
    pub authority_boost: f32,
    /// Multiplier for documents from the current or previous year.
    pub recency_boost: f32,
    /// Multiplier for chunks carrying structured (tabular) content.
    pub structured_boost: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Blended-similarity threshold for the tier-3 duplicate verdict.
    pub similarity_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Cap on concurrent embedding calls during batch ingestion.
    pub embedding_concurrency: usize,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
}

/// Domain keyword lists. The classification and ranking logic is
/// domain-agnostic; these defaults match the travel-directive corpus the
/// system was tuned on and can be replaced wholesale via the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyConfig {
    pub table_indicators: Vec<String>,
    pub analytical_indicators: Vec<String>,
    pub factual_indicators: Vec<String>,
    pub comparative_markers: Vec<String>,
    pub numeric_markers: Vec<String>,
    pub lookup_markers: Vec<String>,
    pub meal_terms: Vec<String>,
    pub location_terms: Vec<String>,
    pub header_indicators: Vec<String>,
    pub authoritative_origins: Vec<String>,
}

impl RagConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunking.min_chunk_size == 0 {
            return Err("chunking.min_chunk_size must be > 0".into());
        }
        if self.chunking.max_chunk_size <= self.chunking.min_chunk_size {
            return Err("chunking.max_chunk_size must exceed min_chunk_size".into());
        }
        if self.chunking.max_table_rows == 0 {
            return Err("chunking.max_table_rows must be > 0".into());
        }
        if !(0.0..=100.0).contains(&self.chunking.semantic_break_percentile) {
            return Err("chunking.semantic_break_percentile must be in [0, 100]".into());
        }
        if self.search.default_k == 0 {
            return Err("search.default_k must be > 0".into());
        }
        if self.search.candidate_multiplier == 0 {
            return Err("search.candidate_multiplier must be > 0".into());
        }
        if !(3..=5).contains(&self.search.expansion_queries) {
            return Err("search.expansion_queries must be in [3, 5]".into());
        }
        if !(0.0..=1.0).contains(&self.dedup.similarity_threshold) {
            return Err("dedup.similarity_threshold must be in [0.0, 1.0]".into());
        }
        if self.ingest.embedding_concurrency == 0 {
            return Err("ingest.embedding_concurrency must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, validating after parse.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self =
            serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tabrag");

        Self {
            data_dir,
            chunking: ChunkingConfig {
                strategy: SplitStrategy::TableAware,
                min_chunk_size: 40,
                max_chunk_size: 400,
                overlap_words: 30,
                max_table_rows: 20,
                semantic_break_percentile: 75.0,
            },
            search: SearchConfig {
                default_k: 10,
                candidate_multiplier: 3,
                min_score_threshold: 0.05,
                bm25_weight: 0.5,
                embedding_weight: 0.5,
                expansion_weight: 0.3,
                expansion_queries: 3,
                retriever_timeout_secs: 8,
            },
            ranking: RankingConfig {
                authority_boost: 1.3,
                recency_boost: 1.15,
                structured_boost: 1.1,
            },
            dedup: DedupConfig {
                similarity_threshold: 0.85,
            },
            ingest: IngestConfig {
                embedding_concurrency: 4,
                retry_max_attempts: 3,
                retry_base_delay_ms: 200,
            },
            vocabulary: VocabularyConfig::default(),
        }
    }
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        let owned = |words: &[&str]| words.iter().map(|w| w.to_string()).collect();
        Self {
            table_indicators: owned(&[
                "rate", "rates", "allowance", "allowances", "amount", "level", "table", "cost",
                "price", "daily", "monthly", "kilometric", "incidental", "hardship", "benefit",
                "per diem",
            ]),
            analytical_indicators: owned(&[
                "compare", "comparison", "difference", "analyze", "analysis", "why", "impact",
                "trend", "relationship", "explain", "evaluate",
            ]),
            factual_indicators: owned(&[
                "what", "when", "where", "who", "which", "definition", "define",
            ]),
            comparative_markers: owned(&[
                "compare", "versus", "vs", "higher", "lower", "more", "less", "between",
                "difference", "better",
            ]),
            numeric_markers: owned(&[
                "how much", "how many", "rate", "amount", "cost", "number", "total", "percent",
                "percentage", "$",
            ]),
            lookup_markers: owned(&[
                "specific", "exact", "particular", "lookup", "find", "level", "for",
            ]),
            meal_terms: owned(&[
                "meal", "meals", "breakfast", "lunch", "dinner", "food", "incidental",
            ]),
            location_terms: owned(&[
                "ottawa", "toronto", "vancouver", "montreal", "halifax", "edmonton", "winnipeg",
                "calgary", "yukon", "nunavut", "ontario", "quebec", "alberta", "canada", "usa",
            ]),
            header_indicators: owned(&[
                "rate", "amount", "price", "location", "category", "name", "description", "item",
                "benefit", "allowance", "type", "level", "date", "cost", "total", "value",
            ]),
            authoritative_origins: owned(&["canada.ca", "gc.ca", "njc-cnm.gc.ca"]),
        }
    }
}
