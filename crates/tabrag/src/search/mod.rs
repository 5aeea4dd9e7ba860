//! Retrieval backends and the fusion layer that combines them.

pub mod fusion;
pub mod keyword;
pub mod vector;

pub use fusion::{
    apply_score_threshold, authority_rerank, reciprocal_rank_fusion, FusionWeights, RetrieverId,
    RetrieverOutput,
};
pub use keyword::KeywordIndex;
pub use vector::InMemoryVectorIndex;
