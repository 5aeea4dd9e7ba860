//! The engine: ingestion, hybrid retrieval, and answer generation.
//!
//! Ingestion is idempotent per source: existing chunks for the source are
//! deleted before the new ones land, under a per-source lock so concurrent
//! re-ingestions of the same source serialize while different sources
//! proceed in parallel. Retrieval degrades rather than fails: a timed-out
//! or errored sub-retriever is logged and fused around.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::answer::{Answer, AnswerBuilder};
use crate::config::RagConfig;
use crate::dedup::{content_hash, deduplicate_chunks, DedupStrategy};
use crate::error::{retry_with_backoff, RagError, RetryPolicy};
use crate::processing::{build_splitter, RawDocument, Splitter};
use crate::providers::{CompletionProvider, EmbeddingProvider, VectorIndex};
use crate::query::{expand_query, extract_value_patterns, QueryClassifier};
use crate::ranking::TableRanker;
use crate::search::{
    apply_score_threshold, authority_rerank, reciprocal_rank_fusion, FusionWeights, KeywordIndex,
    RetrieverId, RetrieverOutput,
};
use crate::types::{
    IndexReceipt, MetadataFilter, QueryOutcome, RankedResult, RetrievalMode, SourceRecord,
};

/// A document submitted for indexing, with its provenance.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub source_id: String,
    pub title: String,
    /// Origin domain or URL, matched against the authoritative-origin list.
    pub origin: String,
    pub document_type: String,
    pub credibility: f32,
    pub year: Option<i32>,
    pub text: String,
    /// Caller-supplied key-value pairs, carried onto the source record and
    /// every chunk.
    pub metadata: HashMap<String, String>,
    /// Reprocess even when the content hash matches the stored source.
    pub force_refresh: bool,
}

impl IngestRequest {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            title: String::new(),
            origin: String::new(),
            document_type: String::new(),
            credibility: 0.5,
            year: None,
            text: text.into(),
            metadata: HashMap::new(),
            force_refresh: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub source_count: usize,
    pub chunk_count: usize,
    pub keyword_doc_count: usize,
}

pub struct RagEngine {
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Option<Arc<dyn CompletionProvider>>,
    vector_index: Arc<dyn VectorIndex>,
    keyword_index: Arc<KeywordIndex>,
    splitter: Arc<dyn Splitter>,
    classifier: QueryClassifier,
    ranker: TableRanker,
    answer_builder: AnswerBuilder,
    sources: DashMap<String, SourceRecord>,
    ingest_locks: DashMap<String, Arc<Mutex<()>>>,
    embed_permits: Arc<Semaphore>,
    retry: RetryPolicy,
}

impl RagEngine {
    pub fn new(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Option<Arc<dyn CompletionProvider>>,
        vector_index: Arc<dyn VectorIndex>,
    ) -> Result<Self, RagError> {
        config.validate().map_err(RagError::Validation)?;
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| RagError::Storage(format!("creating data dir: {e}")))?;
        let keyword_index = Arc::new(
            KeywordIndex::new(&config.data_dir)
                .map_err(|e| RagError::Storage(format!("opening keyword index: {e}")))?,
        );

        let splitter = build_splitter(&config, Arc::clone(&embedder));
        let classifier = QueryClassifier::new(config.vocabulary.clone());
        let ranker = TableRanker::from_vocabulary(&config.vocabulary);
        let answer_builder = AnswerBuilder::new(config.search.default_k);
        let retry = RetryPolicy {
            max_attempts: config.ingest.retry_max_attempts,
            base_delay: Duration::from_millis(config.ingest.retry_base_delay_ms),
            ..RetryPolicy::default()
        };
        let embed_permits = Arc::new(Semaphore::new(config.ingest.embedding_concurrency.max(1)));

        Ok(Self {
            config,
            embedder,
            llm,
            vector_index,
            keyword_index,
            splitter,
            classifier,
            ranker,
            answer_builder,
            sources: DashMap::new(),
            ingest_locks: DashMap::new(),
            embed_permits,
            retry,
        })
    }

    fn ingest_lock(&self, source_id: &str) -> Arc<Mutex<()>> {
        self.ingest_locks
            .entry(source_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Index a document. Re-ingesting the same source replaces its chunks
    /// wholesale; indexing the same content twice leaves the chunk count
    /// unchanged.
    pub async fn index(&self, request: IngestRequest) -> Result<IndexReceipt, RagError> {
        if request.source_id.trim().is_empty() {
            return Err(RagError::Validation("source_id must not be empty".into()));
        }
        if request.text.trim().is_empty() {
            return Err(RagError::Validation(format!(
                "document {} has no content",
                request.source_id
            )));
        }

        let lock = self.ingest_lock(&request.source_id);
        let _guard = lock.lock().await;

        let doc_hash = content_hash(&request.text);
        if !request.force_refresh {
            if let Some(existing) = self.sources.get(&request.source_id) {
                if existing.metadata.get("content_hash") == Some(&doc_hash) {
                    debug!(source = %request.source_id, "content unchanged, skipping reindex");
                    return Ok(IndexReceipt {
                        source_id: request.source_id.clone(),
                        chunks_created: existing.chunk_count,
                    });
                }
            }
        }

        let mut raw = RawDocument::new(request.source_id.clone(), request.text.clone());
        raw.title = if request.title.is_empty() {
            None
        } else {
            Some(request.title.clone())
        };
        raw.document_type = request.document_type.clone();

        let mut chunks = self.splitter.split(&raw).await?;
        for chunk in &mut chunks {
            chunk.credibility = request.credibility;
            chunk.year = request.year;
            if !request.origin.is_empty() {
                chunk
                    .extra
                    .insert("origin".to_string(), request.origin.clone());
            }
            for (key, value) in &request.metadata {
                chunk
                    .extra
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
            chunk
                .check_invariants()
                .map_err(RagError::Validation)?;
        }

        let (mut chunks, report) = deduplicate_chunks(
            chunks,
            self.config.dedup.similarity_threshold,
            DedupStrategy::KeepFirst,
        );
        if !report.pairs.is_empty() {
            debug!(
                source = %request.source_id,
                removed = report.pairs.len(),
                "dropped duplicate chunks during ingestion"
            );
        }

        self.embed_chunks(&mut chunks).await?;

        // Replace-then-insert keeps re-ingestion idempotent.
        self.keyword_index
            .delete_by_source(&request.source_id)
            .map_err(|e| RagError::Storage(e.to_string()))?;
        self.vector_index.delete_by_source(&request.source_id).await?;

        self.keyword_index
            .index_chunks(&chunks)
            .map_err(|e| RagError::Storage(e.to_string()))?;
        self.keyword_index
            .commit()
            .map_err(|e| RagError::Storage(e.to_string()))?;
        self.vector_index.upsert(chunks.clone()).await?;

        let content_type = chunks
            .iter()
            .find(|c| c.content_type.is_tabular())
            .map(|c| c.content_type)
            .unwrap_or_default();
        let mut metadata = request.metadata;
        metadata.insert("content_hash".to_string(), doc_hash);
        let record = SourceRecord {
            id: request.source_id.clone(),
            title: request.title,
            origin: request.origin,
            content_type,
            chunk_count: chunks.len(),
            created_at: chrono::Utc::now().timestamp(),
            metadata,
        };
        self.sources.insert(request.source_id.clone(), record);

        info!(
            source = %request.source_id,
            chunks = chunks.len(),
            "indexed document"
        );
        Ok(IndexReceipt {
            source_id: request.source_id,
            chunks_created: chunks.len(),
        })
    }

    /// Embed chunks concurrently, bounded by the configured permit count,
    /// retrying transient provider failures per chunk.
    async fn embed_chunks(&self, chunks: &mut [crate::types::Chunk]) -> Result<(), RagError> {
        let tasks = chunks.iter().map(|chunk| {
            let permits = Arc::clone(&self.embed_permits);
            let embedder = Arc::clone(&self.embedder);
            let retry = self.retry.clone();
            let text = chunk.text.clone();
            async move {
                let _permit = permits
                    .acquire()
                    .await
                    .map_err(|_| RagError::Storage("embedding semaphore closed".into()))?;
                retry_with_backoff(&retry, || embedder.embed_document(&text)).await
            }
        });
        let embeddings = futures::future::try_join_all(tasks).await?;
        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = Some(embedding);
        }
        Ok(())
    }

    /// Hybrid retrieval. Both retrievers run concurrently under the
    /// per-retriever timeout; whichever side fails or times out is skipped
    /// and fusion proceeds with the rest.
    pub async fn query(
        &self,
        query: &str,
        k: usize,
        mode: RetrievalMode,
        filter: Option<&MetadataFilter>,
    ) -> Result<QueryOutcome, RagError> {
        if query.trim().is_empty() {
            return Err(RagError::Validation("query must not be empty".into()));
        }
        let k = if k == 0 { self.config.search.default_k } else { k };
        let candidates = k * self.config.search.candidate_multiplier;

        let classification = self.classifier.classify(query);
        let value_patterns = extract_value_patterns(query);
        debug!(
            query_type = ?classification.query_type,
            confidence = classification.confidence,
            patterns = value_patterns.len(),
            "classified query"
        );

        let mut outputs: Vec<RetrieverOutput> = Vec::new();
        let mut expansion_used = false;

        match mode {
            RetrievalMode::KeywordOnly => {
                if let Some(output) =
                    self.run_bm25(query, candidates, filter, RetrieverId::Bm25).await
                {
                    outputs.push(output);
                }
            }
            RetrievalMode::VectorOnly => {
                if let Some(output) = self
                    .run_vector(query, candidates, filter, RetrieverId::Embedding)
                    .await
                {
                    outputs.push(output);
                }
            }
            RetrievalMode::Hybrid | RetrievalMode::Expanded => {
                let (bm25, vector) = tokio::join!(
                    self.run_bm25(query, candidates, filter, RetrieverId::Bm25),
                    self.run_vector(query, candidates, filter, RetrieverId::Embedding),
                );
                outputs.extend(bm25);
                outputs.extend(vector);

                if mode == RetrievalMode::Expanded {
                    if let Some(llm) = &self.llm {
                        let expanded = expand_query(
                            llm.as_ref(),
                            query,
                            self.config.search.expansion_queries,
                        )
                        .await;
                        // First entry is always the original query.
                        let paraphrases = &expanded[1..];
                        expansion_used = !paraphrases.is_empty();
                        let sub_runs = paraphrases.iter().map(|sub| async move {
                            let (b, v) = tokio::join!(
                                self.run_bm25(sub, candidates, filter, RetrieverId::Expansion),
                                self.run_vector(sub, candidates, filter, RetrieverId::Expansion),
                            );
                            [b, v]
                        });
                        for pair in futures::future::join_all(sub_runs).await {
                            outputs.extend(pair.into_iter().flatten());
                        }
                    }
                }
            }
        }

        if outputs.is_empty() {
            warn!("every retriever failed or returned nothing");
            return Ok(QueryOutcome {
                ranked_results: Vec::new(),
                classification,
            });
        }

        let weights = FusionWeights {
            bm25: self.config.search.bm25_weight,
            embedding: self.config.search.embedding_weight,
            expansion: self.config.search.expansion_weight,
        };
        let fused = reciprocal_rank_fusion(&outputs, &weights);
        let fused = apply_score_threshold(fused, self.config.search.min_score_threshold);

        let mut results = self.hydrate(fused, filter).await;
        authority_rerank(
            &mut results,
            &self.config.ranking,
            &self.config.vocabulary.authoritative_origins,
        );

        let chunks: Vec<_> = results.into_iter().map(|r| r.chunk).collect();
        let mut ranked = self
            .ranker
            .rank(chunks, query, &classification, &value_patterns);
        ranked.truncate(k);

        if expansion_used {
            debug!(results = ranked.len(), "expanded retrieval complete");
        }
        Ok(QueryOutcome {
            ranked_results: ranked,
            classification,
        })
    }

    /// Retrieve and synthesize an answer with attributed sources.
    pub async fn answer(&self, query: &str, k: usize) -> Result<Answer, RagError> {
        let mode = if self.llm.is_some() {
            RetrievalMode::Expanded
        } else {
            RetrievalMode::Hybrid
        };
        let outcome = self.query(query, k, mode, None).await?;
        let expansion_used = mode == RetrievalMode::Expanded;
        Ok(self
            .answer_builder
            .build(
                self.llm.clone(),
                query,
                &outcome.ranked_results,
                expansion_used,
            )
            .await)
    }

    /// Remove a source and everything derived from it.
    pub async fn delete_source(&self, source_id: &str) -> Result<usize, RagError> {
        let lock = self.ingest_lock(source_id);
        let _guard = lock.lock().await;

        self.keyword_index
            .delete_by_source(source_id)
            .map_err(|e| RagError::Storage(e.to_string()))?;
        let removed = self.vector_index.delete_by_source(source_id).await?;
        self.sources.remove(source_id);
        info!(source = %source_id, chunks = removed, "deleted source");
        Ok(removed)
    }

    pub fn list_sources(&self) -> Vec<SourceRecord> {
        self.sources.iter().map(|e| e.value().clone()).collect()
    }

    pub async fn statistics(&self) -> Result<EngineStats, RagError> {
        Ok(EngineStats {
            source_count: self.sources.len(),
            chunk_count: self.vector_index.count().await?,
            keyword_doc_count: self
                .keyword_index
                .count()
                .map_err(|e| RagError::Storage(e.to_string()))?,
        })
    }

    async fn run_bm25(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
        id: RetrieverId,
    ) -> Option<RetrieverOutput> {
        let timeout = Duration::from_secs(self.config.search.retriever_timeout_secs);
        let source_filter = filter.and_then(|f| f.source_id.clone());
        // Tantivy searches are synchronous; run them off the async runtime
        // so the timeout can actually fire.
        let index = Arc::clone(&self.keyword_index);
        let query = query.to_string();
        let handle =
            tokio::task::spawn_blocking(move || index.search(&query, k, source_filter.as_deref()));
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(Ok(hits))) => Some(RetrieverOutput {
                retriever: id,
                hits,
            }),
            Ok(Ok(Err(err))) => {
                warn!(error = %err, "keyword retriever failed, fusing around it");
                None
            }
            Ok(Err(err)) => {
                warn!(error = %err, "keyword retriever task panicked");
                None
            }
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "keyword retriever timed out");
                None
            }
        }
    }

    async fn run_vector(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
        id: RetrieverId,
    ) -> Option<RetrieverOutput> {
        let timeout = Duration::from_secs(self.config.search.retriever_timeout_secs);
        let search = async {
            let vector = self.embedder.embed_query(query).await?;
            let hits = self.vector_index.search(&vector, k, filter).await?;
            Ok::<_, RagError>(
                hits.into_iter()
                    .map(|h| (h.id, h.score))
                    .collect::<Vec<_>>(),
            )
        };
        match tokio::time::timeout(timeout, search).await {
            Ok(Ok(hits)) => Some(RetrieverOutput {
                retriever: id,
                hits,
            }),
            Ok(Err(err)) => {
                warn!(error = %err, "vector retriever failed, fusing around it");
                None
            }
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "vector retriever timed out");
                None
            }
        }
    }

    /// Resolve fused chunk ids to chunks, dropping ids the store no longer
    /// has and near-duplicate texts (first occurrence wins).
    async fn hydrate(
        &self,
        fused: Vec<(String, f32)>,
        filter: Option<&MetadataFilter>,
    ) -> Vec<RankedResult> {
        let mut results = Vec::with_capacity(fused.len());
        let mut seen_hashes = std::collections::HashSet::new();
        for (id, score) in fused {
            match self.vector_index.get(&id).await {
                Ok(Some(chunk)) => {
                    if let Some(f) = filter {
                        if !f.matches(&chunk) {
                            continue;
                        }
                    }
                    if !seen_hashes.insert(content_hash(&chunk.text)) {
                        continue;
                    }
                    results.push(RankedResult { chunk, score });
                }
                Ok(None) => debug!(id = %id, "fused id missing from vector store"),
                Err(err) => warn!(id = %id, error = %err, "chunk lookup failed"),
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SplitStrategy;
    use crate::providers::EmbeddingProvider;
    use crate::search::InMemoryVectorIndex;
    use async_trait::async_trait;

    /// Deterministic embedder: direction set by trigger-word counts, so
    /// texts sharing vocabulary land near each other.
    struct WordCountEmbedder;

    const TRIGGERS: [&str; 4] = ["meal", "rate", "hardship", "travel"];

    #[async_trait]
    impl EmbeddingProvider for WordCountEmbedder {
        async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
            self.embed_document(text).await
        }

        async fn embed_document(&self, text: &str) -> Result<Vec<f32>, RagError> {
            let lower = text.to_lowercase();
            let mut v: Vec<f32> = TRIGGERS
                .iter()
                .map(|t| lower.matches(t).count() as f32)
                .collect();
            v.push(1.0); // never a zero vector
            Ok(v)
        }

        fn dimension(&self) -> usize {
            TRIGGERS.len() + 1
        }
    }

    /// Counts embed_document calls on top of `WordCountEmbedder`.
    struct CountingEmbedder {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
            WordCountEmbedder.embed_query(text).await
        }

        async fn embed_document(&self, text: &str) -> Result<Vec<f32>, RagError> {
            self.calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            WordCountEmbedder.embed_document(text).await
        }

        fn dimension(&self) -> usize {
            WordCountEmbedder.dimension()
        }
    }

    fn test_engine() -> (RagEngine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RagConfig::default();
        config.data_dir = dir.path().to_path_buf();
        config.chunking.strategy = SplitStrategy::TableAware;
        let engine = RagEngine::new(
            config,
            Arc::new(WordCountEmbedder),
            None,
            Arc::new(InMemoryVectorIndex::new()),
        )
        .unwrap();
        (engine, dir)
    }

    fn rates_doc() -> IngestRequest {
        let mut req = IngestRequest::new(
            "meal-rates",
            "Meal Rates\n\
             | Meal | Rate |\n\
             |---|---|\n\
             | Breakfast | $25.65 |\n\
             | Dinner | $61.45 |",
        );
        req.title = "Meal Rates".to_string();
        req.origin = "njc-cnm.gc.ca".to_string();
        req.credibility = 0.9;
        req
    }

    #[tokio::test]
    async fn test_index_then_query_finds_table() {
        let (engine, _dir) = test_engine();
        let receipt = engine.index(rates_doc()).await.unwrap();
        assert!(receipt.chunks_created >= 1);

        let outcome = engine
            .query("breakfast meal rate", 5, RetrievalMode::Hybrid, None)
            .await
            .unwrap();
        assert!(!outcome.ranked_results.is_empty());
        assert!(outcome.ranked_results[0].chunk.text.contains("$25.65"));
    }

    #[tokio::test]
    async fn test_reingest_same_source_is_idempotent() {
        let (engine, _dir) = test_engine();
        let first = engine.index(rates_doc()).await.unwrap();
        let second = engine.index(rates_doc()).await.unwrap();
        assert_eq!(first.chunks_created, second.chunks_created);

        let stats = engine.statistics().await.unwrap();
        assert_eq!(stats.chunk_count, first.chunks_created);
        assert_eq!(stats.source_count, 1);
    }

    #[tokio::test]
    async fn test_delete_source_cascades() {
        let (engine, _dir) = test_engine();
        engine.index(rates_doc()).await.unwrap();
        let removed = engine.delete_source("meal-rates").await.unwrap();
        assert!(removed >= 1);

        let stats = engine.statistics().await.unwrap();
        assert_eq!(stats.chunk_count, 0);
        assert_eq!(stats.source_count, 0);

        let outcome = engine
            .query("breakfast meal rate", 5, RetrievalMode::Hybrid, None)
            .await
            .unwrap();
        assert!(outcome.ranked_results.is_empty());
    }

    #[tokio::test]
    async fn test_empty_inputs_are_rejected() {
        let (engine, _dir) = test_engine();
        assert!(matches!(
            engine.index(IngestRequest::new("s", "   ")).await,
            Err(RagError::Validation(_))
        ));
        assert!(matches!(
            engine.query("  ", 5, RetrievalMode::Hybrid, None).await,
            Err(RagError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_source_filter_restricts_results() {
        let (engine, _dir) = test_engine();
        engine.index(rates_doc()).await.unwrap();
        let mut other = IngestRequest::new(
            "travel-guide",
            "Travel approval is required before any trip. Meal rates apply \
             to approved travel only.",
        );
        other.document_type = "guide".to_string();
        engine.index(other).await.unwrap();

        let filter = MetadataFilter {
            source_id: Some("travel-guide".to_string()),
            ..Default::default()
        };
        let outcome = engine
            .query("meal rate travel", 10, RetrievalMode::Hybrid, Some(&filter))
            .await
            .unwrap();
        assert!(!outcome.ranked_results.is_empty());
        assert!(outcome
            .ranked_results
            .iter()
            .all(|r| r.chunk.source_id == "travel-guide"));
    }

    #[tokio::test]
    async fn test_keyword_retriever_timeout_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RagConfig::default();
        config.data_dir = dir.path().to_path_buf();
        config.chunking.strategy = SplitStrategy::TableAware;
        config.search.retriever_timeout_secs = 0;
        let engine = RagEngine::new(
            config,
            Arc::new(WordCountEmbedder),
            None,
            Arc::new(InMemoryVectorIndex::new()),
        )
        .unwrap();
        engine.index(rates_doc()).await.unwrap();

        // The blocking search cannot complete within a zero deadline; the
        // retriever is fused around rather than erroring out.
        let outcome = engine
            .query("breakfast meal rate", 5, RetrievalMode::KeywordOnly, None)
            .await
            .unwrap();
        assert!(outcome.ranked_results.is_empty());
    }

    #[tokio::test]
    async fn test_request_metadata_reaches_chunks_and_source() {
        let (engine, _dir) = test_engine();
        let mut req = rates_doc();
        req.metadata
            .insert("fiscal_year".to_string(), "2026".to_string());
        engine.index(req).await.unwrap();

        let sources = engine.list_sources();
        assert_eq!(sources.len(), 1);
        assert_eq!(
            sources[0].metadata.get("fiscal_year").map(String::as_str),
            Some("2026")
        );
        assert!(sources[0].metadata.contains_key("content_hash"));

        let outcome = engine
            .query("breakfast meal rate", 5, RetrievalMode::Hybrid, None)
            .await
            .unwrap();
        assert!(!outcome.ranked_results.is_empty());
        assert_eq!(
            outcome.ranked_results[0]
                .chunk
                .extra
                .get("fiscal_year")
                .map(String::as_str),
            Some("2026")
        );
    }

    #[tokio::test]
    async fn test_unchanged_content_skips_reembedding() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RagConfig::default();
        config.data_dir = dir.path().to_path_buf();
        config.chunking.strategy = SplitStrategy::TableAware;
        let embedder = Arc::new(CountingEmbedder {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let engine = RagEngine::new(
            config,
            Arc::clone(&embedder) as Arc<dyn EmbeddingProvider>,
            None,
            Arc::new(InMemoryVectorIndex::new()),
        )
        .unwrap();

        let first = engine.index(rates_doc()).await.unwrap();
        let after_first = embedder.calls.load(std::sync::atomic::Ordering::SeqCst);
        assert!(after_first >= 1);

        let second = engine.index(rates_doc()).await.unwrap();
        assert_eq!(second.chunks_created, first.chunks_created);
        assert_eq!(
            embedder.calls.load(std::sync::atomic::Ordering::SeqCst),
            after_first
        );

        let mut forced = rates_doc();
        forced.force_refresh = true;
        engine.index(forced).await.unwrap();
        assert!(embedder.calls.load(std::sync::atomic::Ordering::SeqCst) > after_first);
    }

    #[tokio::test]
    async fn test_answer_without_llm_is_extractive() {
        let (engine, _dir) = test_engine();
        engine.index(rates_doc()).await.unwrap();
        let answer = engine.answer("breakfast meal rate", 5).await.unwrap();
        assert!(!answer.synthesized);
        assert!(answer.text.contains("$25.65"));
        assert_eq!(answer.sources.len(), 1);
    }
}
