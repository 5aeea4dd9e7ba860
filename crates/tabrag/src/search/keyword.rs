//! BM25 keyword retrieval over a tantivy index.

use anyhow::{Context, Result};
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{self, Schema, Value as TantivyValue, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};

use crate::types::Chunk;

pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    writer: parking_lot::Mutex<IndexWriter>,
    id_field: schema::Field,
    text_field: schema::Field,
    title_field: schema::Field,
    source_field: schema::Field,
    content_type_field: schema::Field,
}

impl KeywordIndex {
    /// Build the canonical schema. `id` and `source_id` are STRING (indexed,
    /// untokenized) so `delete_term` and exact filtering work.
    fn build_schema() -> (
        Schema,
        schema::Field,
        schema::Field,
        schema::Field,
        schema::Field,
        schema::Field,
    ) {
        let mut sb = Schema::builder();
        let id_field = sb.add_text_field("id", STRING | STORED);
        let text_field = sb.add_text_field("text", TEXT | STORED);
        let title_field = sb.add_text_field("table_title", TEXT);
        let source_field = sb.add_text_field("source_id", STRING | STORED);
        let content_type_field = sb.add_text_field("content_type", STRING | STORED);
        (
            sb.build(),
            id_field,
            text_field,
            title_field,
            source_field,
            content_type_field,
        )
    }

    pub fn new(data_dir: &Path) -> Result<Self> {
        let index_path = data_dir.join("keyword_index");
        std::fs::create_dir_all(&index_path).ok();

        let (schema, id_field, text_field, title_field, source_field, content_type_field) =
            Self::build_schema();

        let dir = tantivy::directory::MmapDirectory::open(&index_path)
            .context("Failed to open keyword index directory")?;
        let index = if Index::exists(&dir)? {
            Index::open_in_dir(&index_path)?
        } else {
            Index::create_in_dir(&index_path, schema)?
        };

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .context("Failed to create keyword index reader")?;

        let writer = index
            .writer(50_000_000)
            .context("Failed to create keyword index writer")?;

        Ok(Self {
            index,
            reader,
            writer: parking_lot::Mutex::new(writer),
            id_field,
            text_field,
            title_field,
            source_field,
            content_type_field,
        })
    }

    pub fn index_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let writer = self.writer.lock();
        for chunk in chunks {
            writer.add_document(doc!(
                self.id_field => chunk.id.to_string(),
                self.text_field => chunk.text.as_str(),
                self.title_field => chunk.table_title.as_deref().unwrap_or(""),
                self.source_field => chunk.source_id.as_str(),
                self.content_type_field => chunk.content_type.as_str(),
            ))?;
        }
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.commit().context("keyword index commit failed")?;
        self.reader.reload()?;
        Ok(())
    }

    /// BM25 search over chunk text and table titles. Returns (chunk id,
    /// BM25 score) pairs in descending score order.
    pub fn search(
        &self,
        query: &str,
        k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<(String, f32)>> {
        let searcher = self.reader.searcher();
        let query_parser =
            QueryParser::for_index(&self.index, vec![self.text_field, self.title_field]);

        let parsed_query = match query_parser.parse_query(query) {
            Ok(q) => q,
            Err(_) => {
                // Queries with unbalanced quotes or operators: retry as a
                // quoted phrase over the text field only.
                let escaped = query.replace('"', "");
                let fallback = QueryParser::for_index(&self.index, vec![self.text_field]);
                fallback.parse_query(&format!("\"{}\"", escaped))?
            }
        };

        // Over-fetch when filtering so post-filter counts stay symmetric
        // with the vector retriever.
        let fetch_limit = if source_filter.is_some() { k * 3 } else { k };
        let top_docs = searcher.search(&parsed_query, &TopDocs::with_limit(fetch_limit.max(1)))?;

        let mut results = Vec::with_capacity(k);
        for (score, doc_address) in top_docs {
            let Ok(doc) = searcher.doc::<TantivyDocument>(doc_address) else {
                continue;
            };
            if let Some(filter) = source_filter {
                let source = doc
                    .get_first(self.source_field)
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                if source != filter {
                    continue;
                }
            }
            if let Some(id) = doc.get_first(self.id_field).and_then(|v| v.as_str()) {
                results.push((id.to_string(), score));
                if results.len() >= k {
                    break;
                }
            }
        }
        Ok(results)
    }

    pub fn delete_by_id(&self, id: &str) -> Result<()> {
        let writer = self.writer.lock();
        writer.delete_term(tantivy::Term::from_field_text(self.id_field, id));
        Ok(())
    }

    /// Delete every chunk of a source. `source_id` is an untokenized STRING
    /// field, so a single delete_term covers the whole source.
    pub fn delete_by_source(&self, source_id: &str) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.delete_term(tantivy::Term::from_field_text(self.source_field, source_id));
        writer.commit().context("keyword index delete commit failed")?;
        drop(writer);
        self.reader.reload()?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.delete_all_documents()?;
        writer.commit()?;
        drop(writer);
        self.reader.reload()?;
        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.reader.searcher().num_docs() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContentType;

    fn chunk(text: &str, source: &str) -> Chunk {
        Chunk::new(text, source)
    }

    #[test]
    fn test_index_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let index = KeywordIndex::new(dir.path()).unwrap();

        index
            .index_chunks(&[
                chunk("hardship allowance level three monthly rate", "a"),
                chunk("completely unrelated gardening notes", "b"),
            ])
            .unwrap();
        index.commit().unwrap();

        let hits = index.search("hardship allowance", 5, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(index.count().unwrap(), 2);
    }

    #[test]
    fn test_source_filter() {
        let dir = tempfile::tempdir().unwrap();
        let index = KeywordIndex::new(dir.path()).unwrap();

        index
            .index_chunks(&[
                chunk("meal rate ottawa", "src-a"),
                chunk("meal rate toronto", "src-b"),
            ])
            .unwrap();
        index.commit().unwrap();

        let hits = index.search("meal rate", 5, Some("src-a")).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_delete_by_source() {
        let dir = tempfile::tempdir().unwrap();
        let index = KeywordIndex::new(dir.path()).unwrap();

        index
            .index_chunks(&[
                chunk("meal rate ottawa", "src-a"),
                chunk("meal rate toronto", "src-b"),
            ])
            .unwrap();
        index.commit().unwrap();

        index.delete_by_source("src-a").unwrap();
        let hits = index.search("meal rate", 5, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(index.count().unwrap(), 1);
    }

    #[test]
    fn test_table_title_is_searchable() {
        let dir = tempfile::tempdir().unwrap();
        let index = KeywordIndex::new(dir.path()).unwrap();

        let mut table = chunk("| 3 | $400 |", "a");
        table.content_type = ContentType::TableMarkdown;
        table.table_title = Some("Hardship Allowance Rates".to_string());
        index.index_chunks(&[table]).unwrap();
        index.commit().unwrap();

        let hits = index.search("hardship", 5, None).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_malformed_query_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let index = KeywordIndex::new(dir.path()).unwrap();
        index
            .index_chunks(&[chunk("quoted \"value\" here", "a")])
            .unwrap();
        index.commit().unwrap();

        // Unbalanced quote would fail the primary parser.
        let result = index.search("quoted \"value", 5, None);
        assert!(result.is_ok());
    }
}
