use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// The closed set of content shapes a chunk can carry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Prose,
    TableMarkdown,
    TableKeyValue,
    TableJson,
    TableSummary,
}

impl ContentType {
    pub fn is_tabular(&self) -> bool {
        !matches!(self, ContentType::Prose)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Prose => "prose",
            ContentType::TableMarkdown => "table_markdown",
            ContentType::TableKeyValue => "table_key_value",
            ContentType::TableJson => "table_json",
            ContentType::TableSummary => "table_summary",
        }
    }
}

impl Default for ContentType {
    fn default() -> Self {
        ContentType::Prose
    }
}

/// A retrievable unit of content with structural and provenance metadata.
///
/// The embedding is owned by the chunk once computed; the retrieval score
/// is per-query and lives on `RankedResult`, never here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub text: String,
    pub source_id: String,
    pub content_type: ContentType,
    pub table_title: Option<String>,
    pub headers: Vec<String>,
    pub row_count: usize,
    pub is_continuation: bool,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub credibility: f32,
    pub document_type: String,
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub extra: HashMap<String, String>,
    pub created_at: i64,
}

impl Chunk {
    pub fn new(text: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            source_id: source_id.into(),
            content_type: ContentType::Prose,
            table_title: None,
            headers: Vec::new(),
            row_count: 0,
            is_continuation: false,
            chunk_index: 0,
            total_chunks: 1,
            credibility: 0.5,
            document_type: String::new(),
            year: None,
            embedding: None,
            extra: HashMap::new(),
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Continuation chunks must carry the parent table title.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.is_continuation && self.table_title.is_none() {
            return Err(format!(
                "chunk {} is a continuation without a parent table_title",
                self.id
            ));
        }
        Ok(())
    }
}

/// Canonical parsed table: every row has exactly `headers.len()` cells.
/// Malformed rows are dropped during extraction, never padded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStructure {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub title: Option<String>,
    pub caption: Option<String>,
    pub footnotes: Vec<String>,
}

impl TableStructure {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            headers,
            rows,
            title: None,
            caption: None,
            footnotes: Vec::new(),
        }
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }
}

/// The logical document a set of chunks derives from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: String,
    pub title: String,
    pub origin: String,
    pub content_type: ContentType,
    pub chunk_count: usize,
    pub created_at: i64,
    pub metadata: HashMap<String, String>,
}

/// Query intent categories driving retrieval configuration downstream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    TableQuery,
    AnalyticalQuery,
    FactualQuery,
    GeneralQuery,
}

/// Independently computed query traits. A table query can also be
/// comparative; these are not mutually exclusive with the type.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueryCharacteristics {
    pub requires_tables: bool,
    pub is_comparative: bool,
    pub is_numerical: bool,
    pub is_specific_lookup: bool,
}

/// Per-query classification. Ephemeral — consumed immediately to pick the
/// retrieval configuration, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryClassification {
    pub query_type: QueryType,
    pub confidence: f32,
    pub matched_keywords: Vec<String>,
    pub characteristics: QueryCharacteristics,
}

/// A scored chunk produced by the ranker. Ordering is by descending score
/// with ties broken by original retrieval rank (stable sort).
#[derive(Debug, Clone)]
pub struct RankedResult {
    pub chunk: Chunk,
    pub score: f32,
}

/// Sort ranked results descending by score, preserving input order on ties.
pub fn sort_ranked(results: &mut [RankedResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Filter predicate applied in both vector and keyword search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub source_id: Option<String>,
    pub content_type: Option<ContentType>,
    pub document_type: Option<String>,
    pub date_from: Option<i64>,
    pub date_to: Option<i64>,
}

impl MetadataFilter {
    pub fn matches(&self, chunk: &Chunk) -> bool {
        if let Some(ref source_id) = self.source_id {
            if &chunk.source_id != source_id {
                return false;
            }
        }
        if let Some(content_type) = self.content_type {
            if chunk.content_type != content_type {
                return false;
            }
        }
        if let Some(ref document_type) = self.document_type {
            if &chunk.document_type != document_type {
                return false;
            }
        }
        if let Some(from) = self.date_from {
            if chunk.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if chunk.created_at > to {
                return false;
            }
        }
        true
    }
}

/// Receipt returned from `RagEngine::index`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexReceipt {
    pub source_id: String,
    pub chunks_created: usize,
}

/// Result of a query: ranked chunks plus the classification that drove
/// the retrieval path.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub ranked_results: Vec<RankedResult>,
    pub classification: QueryClassification,
}

/// How the retrieval pipeline is composed for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// BM25 + embedding fusion, classification picks boosts.
    Hybrid,
    /// Hybrid plus LLM multi-query expansion.
    Expanded,
    /// Embedding similarity only.
    VectorOnly,
    /// BM25 only.
    KeywordOnly,
}

impl Default for RetrievalMode {
    fn default() -> Self {
        RetrievalMode::Hybrid
    }
}
