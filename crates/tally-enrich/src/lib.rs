//! # tally-enrich
//!
//! Asynchronous enrichment of audit records: embeddings, anomaly scores,
//! categories, risk levels, and tags.
//!
//! Workers read pending records from the trail, call the external
//! [`Embedder`](tally_embeddings::Embedder) and [`Scorer`] under a timeout on
//! the blocking pool, and write results to the enrichment side-table. They
//! never touch a record's chained fields and never block the writers that
//! append them.
//!
//! Records whose score exceeds the configured threshold are flagged and
//! handed to an [`AlertSink`].

pub mod alert;
pub mod error;
pub mod pipeline;
pub mod scorer;

pub use alert::{AlertSink, AnomalyAlert, TracingAlertSink};
pub use error::EnrichError;
pub use pipeline::{EnrichmentPipeline, JobOutcome, PipelineSettings, RunReport};
pub use scorer::{Classification, HeuristicScorer, Scorer};
pub use tally_db::repos::{Coverage, EnrichmentScope};
