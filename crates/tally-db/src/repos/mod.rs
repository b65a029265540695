//! Repository methods on [`crate::service::TallyService`], one module per concern.

pub mod access_log;
pub mod chain;
pub mod enrichment;
pub mod entities;
pub mod exports;
pub mod records;

pub use access_log::AccessLogFilter;
pub use enrichment::{Coverage, EmbeddedCandidate, EmbeddingScan, EnrichmentScope, ScoreUpdate};
pub use exports::{ExportDownload, ExportRequest};
pub use records::{ChainTail, RecordFilter};
