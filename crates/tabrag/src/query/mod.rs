//! Query-side analysis: classification into intent categories and
//! LLM-backed query expansion.

pub mod classifier;
pub mod expansion;

pub use classifier::{extract_value_patterns, QueryClassifier};
pub use expansion::expand_query;
