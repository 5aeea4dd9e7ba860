//! Document splitter family.
//!
//! Four interchangeable strategies behind the `Splitter` trait, selected by
//! `SplitStrategy` in the config. All strategies respect the configured
//! min/max token band, except that atomic tables may exceed the max rather
//! than being corrupted mid-row.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ChunkingConfig;
use crate::error::RagError;
use crate::processing::detector::{ContentDetector, RegionKind};
use crate::processing::table::{self, Extracted, RawTable, TableExtractor};
use crate::providers::EmbeddingProvider;
use crate::types::{Chunk, ContentType};

/// A document handed to a splitter: raw text plus identity.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub source_id: String,
    pub title: Option<String>,
    pub document_type: String,
    pub text: String,
}

impl RawDocument {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            title: None,
            document_type: String::new(),
            text: text.into(),
        }
    }
}

#[async_trait]
pub trait Splitter: Send + Sync {
    async fn split(&self, doc: &RawDocument) -> Result<Vec<Chunk>, RagError>;
}

fn base_chunk(doc: &RawDocument, text: String) -> Chunk {
    let mut chunk = Chunk::new(text, doc.source_id.clone());
    chunk.document_type = doc.document_type.clone();
    chunk
}

/// Assign chunk_index/total_chunks after a strategy has produced its list.
fn finalize_positions(chunks: &mut [Chunk]) {
    let total = chunks.len();
    for (i, chunk) in chunks.iter_mut().enumerate() {
        chunk.chunk_index = i;
        chunk.total_chunks = total;
    }
}

// ── Fixed-size ─────────────────────────────────────────────────────────────

/// Sliding word-count windows with configurable overlap. Also the fail-safe
/// fallback for the semantic strategy.
pub struct FixedSizeSplitter {
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
    pub overlap_words: usize,
}

impl FixedSizeSplitter {
    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self {
            min_chunk_size: config.min_chunk_size,
            max_chunk_size: config.max_chunk_size,
            overlap_words: config.overlap_words,
        }
    }

    pub fn split_text(&self, doc: &RawDocument, text: &str) -> Vec<Chunk> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }
        if words.len() <= self.max_chunk_size {
            return vec![base_chunk(doc, words.join(" "))];
        }

        let step = self.max_chunk_size.saturating_sub(self.overlap_words).max(1);
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut start = 0;
        while start < words.len() {
            let end = (start + self.max_chunk_size).min(words.len());
            let window = words[start..end].join(" ");
            let window_len = end - start;
            if window_len < self.min_chunk_size {
                // Trailing remainder below the band: fold into the previous
                // chunk instead of emitting a fragment.
                if let Some(last) = chunks.last_mut() {
                    last.text.push(' ');
                    last.text.push_str(&window);
                } else {
                    chunks.push(base_chunk(doc, window));
                }
            } else {
                chunks.push(base_chunk(doc, window));
            }
            if end == words.len() {
                break;
            }
            start += step;
        }
        chunks
    }
}

#[async_trait]
impl Splitter for FixedSizeSplitter {
    async fn split(&self, doc: &RawDocument) -> Result<Vec<Chunk>, RagError> {
        let mut chunks = self.split_text(doc, &doc.text);
        finalize_positions(&mut chunks);
        Ok(chunks)
    }
}

// ── Proposition ────────────────────────────────────────────────────────────

/// Sentence-unit packing that never crosses paragraph boundaries. Each
/// chunk is a run of whole sentences from a single paragraph, greedily
/// packed into the size band.
pub struct PropositionSplitter {
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
}

impl PropositionSplitter {
    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self {
            min_chunk_size: config.min_chunk_size,
            max_chunk_size: config.max_chunk_size,
        }
    }
}

#[async_trait]
impl Splitter for PropositionSplitter {
    async fn split(&self, doc: &RawDocument) -> Result<Vec<Chunk>, RagError> {
        let mut chunks: Vec<Chunk> = Vec::new();

        for paragraph in doc.text.split("\n\n") {
            let sentences = split_sentences(paragraph);
            if sentences.is_empty() {
                continue;
            }

            let mut current: Vec<&str> = Vec::new();
            let mut current_words = 0usize;
            for sentence in sentences {
                let words = sentence.split_whitespace().count();
                if current_words + words > self.max_chunk_size && !current.is_empty() {
                    chunks.push(base_chunk(doc, current.join(" ")));
                    current.clear();
                    current_words = 0;
                }
                current.push(sentence);
                current_words += words;
            }
            if !current.is_empty() {
                let text = current.join(" ");
                if current_words < self.min_chunk_size {
                    if let Some(last) = chunks.last_mut() {
                        last.text.push(' ');
                        last.text.push_str(&text);
                    } else {
                        chunks.push(base_chunk(doc, text));
                    }
                } else {
                    chunks.push(base_chunk(doc, text));
                }
            }
        }

        finalize_positions(&mut chunks);
        Ok(chunks)
    }
}

// ── Semantic boundary ──────────────────────────────────────────────────────

/// Topic-coherent chunks: embed every sentence, compute cosine distance
/// between consecutive sentences, and break where the distance exceeds the
/// configured percentile of the document's distance distribution. Any
/// embedding failure falls back to fixed-size splitting for the whole
/// document (fail-safe, not fail-fatal).
pub struct SemanticSplitter {
    embedder: Arc<dyn EmbeddingProvider>,
    break_percentile: f32,
    fallback: FixedSizeSplitter,
}

impl SemanticSplitter {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, config: &ChunkingConfig) -> Self {
        Self {
            embedder,
            break_percentile: config.semantic_break_percentile,
            fallback: FixedSizeSplitter::from_config(config),
        }
    }

    async fn split_semantic(&self, doc: &RawDocument) -> Result<Vec<Chunk>, RagError> {
        let sentences = split_sentences(&doc.text);
        if sentences.len() < 3 {
            return Ok(self.fallback.split_text(doc, &doc.text));
        }

        let embeddings = self.embedder.embed_documents(&sentences).await?;
        if embeddings.len() != sentences.len() {
            return Err(RagError::Provider(format!(
                "embedding count mismatch: {} sentences, {} vectors",
                sentences.len(),
                embeddings.len()
            )));
        }

        let distances: Vec<f32> = embeddings
            .windows(2)
            .map(|pair| 1.0 - cosine_similarity(&pair[0], &pair[1]))
            .collect();
        let threshold = percentile(&distances, self.break_percentile);

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut current: Vec<&str> = vec![sentences[0]];
        for (i, distance) in distances.iter().enumerate() {
            if *distance > threshold {
                chunks.push(base_chunk(doc, current.join(" ")));
                current = Vec::new();
            }
            current.push(sentences[i + 1]);
        }
        if !current.is_empty() {
            chunks.push(base_chunk(doc, current.join(" ")));
        }
        Ok(chunks)
    }
}

#[async_trait]
impl Splitter for SemanticSplitter {
    async fn split(&self, doc: &RawDocument) -> Result<Vec<Chunk>, RagError> {
        let mut chunks = match self.split_semantic(doc).await {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::warn!(
                    source_id = %doc.source_id,
                    error = %e,
                    "semantic splitting failed, falling back to fixed-size"
                );
                self.fallback.split_text(doc, &doc.text)
            }
        };
        finalize_positions(&mut chunks);
        Ok(chunks)
    }
}

// ── Table-aware ────────────────────────────────────────────────────────────

/// Detects table regions, extracts them as self-contained chunks (splitting
/// only oversized tables, with replicated headers), and chunks surrounding
/// prose independently by word count with overlap.
pub struct TableAwareSplitter {
    detector: ContentDetector,
    extractor: TableExtractor,
    prose: FixedSizeSplitter,
    max_table_rows: usize,
}

impl TableAwareSplitter {
    pub fn new(extractor: TableExtractor, config: &ChunkingConfig) -> Self {
        Self {
            detector: ContentDetector::new(),
            extractor,
            prose: FixedSizeSplitter::from_config(config),
            max_table_rows: config.max_table_rows,
        }
    }

    fn table_chunks(&self, doc: &RawDocument, region_text: &str) -> Vec<Chunk> {
        match self
            .extractor
            .validate_table_structure(RawTable::Markdown(region_text))
        {
            Extracted::Structured(structure) => {
                if structure.rows.len() <= self.max_table_rows {
                    vec![chunk_from_table(doc, &structure, None, false)]
                } else {
                    table::chunk_table(&structure, self.max_table_rows)
                        .into_iter()
                        .map(|slice| {
                            chunk_from_table(
                                doc,
                                &slice.structure,
                                slice.title,
                                slice.is_continuation,
                            )
                        })
                        .collect()
                }
            }
            // Never drop content: unparseable regions are kept verbatim.
            Extracted::Raw(raw) => {
                if raw.trim().is_empty() {
                    Vec::new()
                } else {
                    vec![base_chunk(doc, raw)]
                }
            }
        }
    }
}

fn chunk_from_table(
    doc: &RawDocument,
    structure: &crate::types::TableStructure,
    title_override: Option<String>,
    is_continuation: bool,
) -> Chunk {
    let mut chunk = base_chunk(doc, table::to_markdown(structure));
    chunk.content_type = ContentType::TableMarkdown;
    chunk.headers = structure.headers.clone();
    chunk.row_count = structure.rows.len();
    chunk.is_continuation = is_continuation;
    chunk.table_title = title_override
        .or_else(|| structure.title.clone())
        .or_else(|| doc.title.clone())
        .or_else(|| Some("Table".to_string()));
    chunk
}

#[async_trait]
impl Splitter for TableAwareSplitter {
    async fn split(&self, doc: &RawDocument) -> Result<Vec<Chunk>, RagError> {
        let detection = self.detector.detect(&doc.text);
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut cursor = 0usize;

        for region in &detection.regions {
            if region.start > cursor {
                let prose = &doc.text[cursor..region.start];
                chunks.extend(self.prose.split_text(doc, prose));
            }
            let region_text = &doc.text[region.start..region.end];
            match region.kind {
                RegionKind::Table(_) => chunks.extend(self.table_chunks(doc, region_text)),
                // Code blocks stay intact as single chunks.
                RegionKind::Code => chunks.push(base_chunk(doc, region_text.to_string())),
            }
            cursor = region.end;
        }
        if cursor < doc.text.len() {
            chunks.extend(self.prose.split_text(doc, &doc.text[cursor..]));
        }

        finalize_positions(&mut chunks);
        Ok(chunks)
    }
}

// ── Shared helpers ─────────────────────────────────────────────────────────

/// Naive sentence splitting on terminal punctuation followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if matches!(bytes[i], b'.' | b'!' | b'?')
            && bytes.get(i + 1).map_or(true, |b| b.is_ascii_whitespace())
        {
            let sentence = text[start..=i].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = i + 1;
        }
        i += 1;
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn percentile(values: &[f32], pct: f32) -> f32 {
    if values.is_empty() {
        return f32::MAX;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (pct / 100.0 * (sorted.len() - 1) as f32).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

/// Build the configured splitter. Strategy selection is an explicit enum
/// dispatch, not a string-keyed registry.
pub fn build_splitter(
    config: &crate::config::RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Arc<dyn Splitter> {
    use crate::config::SplitStrategy;
    let extractor = TableExtractor::new(config.vocabulary.header_indicators.clone());
    match config.chunking.strategy {
        SplitStrategy::FixedSize => Arc::new(FixedSizeSplitter::from_config(&config.chunking)),
        SplitStrategy::Proposition => Arc::new(PropositionSplitter::from_config(&config.chunking)),
        SplitStrategy::SemanticBoundary => {
            Arc::new(SemanticSplitter::new(embedder, &config.chunking))
        }
        SplitStrategy::TableAware => {
            Arc::new(TableAwareSplitter::new(extractor, &config.chunking))
        }
    }
}
