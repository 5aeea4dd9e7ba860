//! Post-retrieval scoring.

pub mod table_ranker;

pub use table_ranker::TableRanker;
