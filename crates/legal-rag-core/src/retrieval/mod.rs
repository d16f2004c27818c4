//! Vector index (component B).

pub mod index;
pub mod similarity;

pub use index::{Filters, ScoredChunk, VectorIndex};
pub use similarity::cosine_similarity;
