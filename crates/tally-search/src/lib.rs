//! # tally-search
//!
//! Semantic search over audit records.
//!
//! Queries run against the embeddings stored by the enrichment pipeline.
//! Every query passes through the trail's access policy, applies the
//! tenant predicate in storage before ranking, and is meta-audited.

pub mod error;
pub mod semantic;

pub use error::SearchError;
pub use semantic::{SearchFilters, SearchHit, search, search_text, similar_to_record};
