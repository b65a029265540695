//! Entity structs for the Tally audit trail.
//!
//! Each entity maps to a table in the libSQL database (see `tally-db` migrations).
//! All structs derive `Serialize`, `Deserialize`, and `JsonSchema` for JSON roundtrip
//! and schema validation.

mod access;
mod enrichment;
mod entity;
mod grant;
mod record;

pub use access::AccessLogEntry;
pub use enrichment::Enrichment;
pub use entity::{EntityRow, TrackedEntity};
pub use grant::ExportGrant;
pub use record::{AuditRecord, MAX_IDENT_LEN, RecordCandidate};
