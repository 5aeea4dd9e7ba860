//! Document processing: content detection, table structure extraction,
//! and the splitter family that turns raw documents into chunks.

pub mod chunker;
pub mod detector;
pub mod table;

pub use chunker::{
    build_splitter, FixedSizeSplitter, PropositionSplitter, RawDocument, SemanticSplitter,
    Splitter, TableAwareSplitter,
};
pub use detector::{ContentDetector, ContentRegion, RegionKind, TableKind};
pub use table::{Extracted, RawTable, TableExtractor};
