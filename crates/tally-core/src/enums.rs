//! Severity, role, lifecycle, and reason enums for Tally.
//!
//! All enums use `snake_case` serialization via `#[serde(rename_all = "snake_case")]`.
//! `as_str()` returns the representation stored in SQL columns.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Severity of an audited event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Role of an authenticated caller within its tenant.
///
/// Ordered by privilege: `viewer < member < auditor < admin`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Member,
    Auditor,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Member => "member",
            Self::Auditor => "auditor",
            Self::Admin => "admin",
        }
    }

    /// Whether this role may create records.
    #[must_use]
    pub const fn can_write(self) -> bool {
        !matches!(self, Self::Viewer)
    }

    /// Whether this role may export, review anomalies, and inspect the access log.
    #[must_use]
    pub const fn is_oversight(self) -> bool {
        matches!(self, Self::Auditor | Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// An operation evaluated by the access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Point lookup or range query.
    Read,
    /// Append a record.
    Write,
    /// Mutate an existing record.
    Update,
    /// Remove an existing record.
    Delete,
    /// Semantic similarity search.
    Search,
    /// Chain verification.
    Verify,
    /// Export generation and grant management.
    Export,
    /// Enrichment annotation (worker writes, regenerate, review).
    Annotate,
    /// Reading the meta-audit access log.
    InspectAccessLog,
}

impl Operation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Search => "search",
            Self::Verify => "verify",
            Self::Export => "export",
            Self::Annotate => "annotate",
            Self::InspectAccessLog => "inspect_access_log",
        }
    }

    /// Operations that only observe the trail.
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(
            self,
            Self::Read | Self::Search | Self::Verify | Self::InspectAccessLog
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RiskLevel
// ---------------------------------------------------------------------------

/// Risk classification attached by the scoring stage.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Bucket an anomaly score in `[0, 1]`.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            Self::Critical
        } else if score >= 0.7 {
            Self::High
        } else if score >= 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EnrichmentState
// ---------------------------------------------------------------------------

/// Enrichment lifecycle of a record.
///
/// ```text
/// unenriched → embedded → scored → reviewed
/// ```
///
/// A record whose attempts keep failing stays `unenriched`; the failure is
/// recorded next to it so it is distinguishable from "never attempted".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentState {
    Unenriched,
    Embedded,
    Scored,
    Reviewed,
}

impl EnrichmentState {
    #[must_use]
    pub const fn allowed_next_states(self) -> &'static [Self] {
        match self {
            Self::Unenriched => &[Self::Embedded],
            Self::Embedded => &[Self::Scored, Self::Unenriched],
            Self::Scored => &[Self::Reviewed, Self::Unenriched],
            Self::Reviewed => &[Self::Unenriched],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.allowed_next_states().contains(&next)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unenriched => "unenriched",
            Self::Embedded => "embedded",
            Self::Scored => "scored",
            Self::Reviewed => "reviewed",
        }
    }
}

impl fmt::Display for EnrichmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ReviewStatus
// ---------------------------------------------------------------------------

/// Human review outcome for a flagged record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    FalsePositive,
}

impl ReviewStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FalsePositive => "false_positive",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ExportFormat
// ---------------------------------------------------------------------------

/// Artifact format of a generated export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Json,
    Jsonl,
    Csv,
}

impl ExportFormat {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Jsonl => "jsonl",
            Self::Csv => "csv",
        }
    }

    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Jsonl => "application/x-ndjson",
            Self::Csv => "text/csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SecurityLevel
// ---------------------------------------------------------------------------

/// Handling level of an export artifact.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// Any export-capable caller may create it.
    Standard,
    /// Requires an auditor or admin to create.
    Confidential,
    /// Requires an auditor or admin and a non-empty allowlist.
    Restricted,
}

impl SecurityLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Confidential => "confidential",
            Self::Restricted => "restricted",
        }
    }

    #[must_use]
    pub const fn requires_oversight_role(self) -> bool {
        matches!(self, Self::Confidential | Self::Restricted)
    }

    #[must_use]
    pub const fn requires_allowlist(self) -> bool {
        matches!(self, Self::Restricted)
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ExportDenial
// ---------------------------------------------------------------------------

/// Why an export download was refused.
///
/// `Denied` is the generic answer for callers that may not learn whether the
/// token exists (malformed, unknown, foreign tenant, not on the allowlist).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExportDenial {
    Expired,
    DownloadLimitExceeded,
    Revoked,
    Denied,
}

impl ExportDenial {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::DownloadLimitExceeded => "download_limit_exceeded",
            Self::Revoked => "revoked",
            Self::Denied => "denied",
        }
    }
}

impl fmt::Display for ExportDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AccessAction / AccessOutcome
// ---------------------------------------------------------------------------

/// What kind of access a meta-audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccessAction {
    Lookup,
    Query,
    Verify,
    Search,
    ExportCreate,
    ExportDownload,
    ExportRevoke,
    AccessLogRead,
    ScopeViolation,
}

impl AccessAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lookup => "lookup",
            Self::Query => "query",
            Self::Verify => "verify",
            Self::Search => "search",
            Self::ExportCreate => "export_create",
            Self::ExportDownload => "export_download",
            Self::ExportRevoke => "export_revoke",
            Self::AccessLogRead => "access_log_read",
            Self::ScopeViolation => "scope_violation",
        }
    }
}

impl fmt::Display for AccessAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the access a meta-audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccessOutcome {
    Allowed,
    Denied,
}

impl AccessOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Denied => "denied",
        }
    }
}

impl fmt::Display for AccessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! test_serde_roundtrip {
        ($name:ident, $ty:ty, $variant:expr, $expected_str:expr) => {
            #[test]
            fn $name() {
                let val = $variant;
                let json = serde_json::to_string(&val).unwrap();
                assert_eq!(json, format!("\"{}\"", $expected_str));
                let recovered: $ty = serde_json::from_str(&json).unwrap();
                assert_eq!(recovered, val);
            }
        };
    }

    test_serde_roundtrip!(severity_critical, Severity, Severity::Critical, "critical");
    test_serde_roundtrip!(role_auditor, Role, Role::Auditor, "auditor");
    test_serde_roundtrip!(
        operation_inspect,
        Operation,
        Operation::InspectAccessLog,
        "inspect_access_log"
    );
    test_serde_roundtrip!(risk_high, RiskLevel, RiskLevel::High, "high");
    test_serde_roundtrip!(
        review_false_positive,
        ReviewStatus,
        ReviewStatus::FalsePositive,
        "false_positive"
    );
    test_serde_roundtrip!(format_jsonl, ExportFormat, ExportFormat::Jsonl, "jsonl");
    test_serde_roundtrip!(
        level_restricted,
        SecurityLevel,
        SecurityLevel::Restricted,
        "restricted"
    );
    test_serde_roundtrip!(
        denial_limit,
        ExportDenial,
        ExportDenial::DownloadLimitExceeded,
        "download_limit_exceeded"
    );
    test_serde_roundtrip!(
        access_export_download,
        AccessAction,
        AccessAction::ExportDownload,
        "export_download"
    );

    #[test]
    fn role_privileges() {
        assert!(!Role::Viewer.can_write());
        assert!(Role::Member.can_write());
        assert!(!Role::Member.is_oversight());
        assert!(Role::Auditor.is_oversight());
        assert!(Role::Admin.is_oversight());
        assert!(Role::Viewer < Role::Admin);
    }

    #[test]
    fn risk_level_buckets() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.4), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.75), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.95), RiskLevel::Critical);
    }

    #[test]
    fn enrichment_transitions() {
        assert!(EnrichmentState::Unenriched.can_transition_to(EnrichmentState::Embedded));
        assert!(EnrichmentState::Embedded.can_transition_to(EnrichmentState::Scored));
        assert!(EnrichmentState::Scored.can_transition_to(EnrichmentState::Reviewed));
        assert!(!EnrichmentState::Unenriched.can_transition_to(EnrichmentState::Scored));
        assert!(!EnrichmentState::Unenriched.can_transition_to(EnrichmentState::Reviewed));
    }

    #[test]
    fn security_level_requirements() {
        assert!(!SecurityLevel::Standard.requires_oversight_role());
        assert!(SecurityLevel::Confidential.requires_oversight_role());
        assert!(!SecurityLevel::Confidential.requires_allowlist());
        assert!(SecurityLevel::Restricted.requires_allowlist());
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(format!("{}", Severity::Warning), "warning");
        assert_eq!(format!("{}", Operation::Annotate), "annotate");
        assert_eq!(format!("{}", ExportFormat::Csv), "csv");
        assert_eq!(format!("{}", AccessOutcome::Denied), "denied");
        assert_eq!(format!("{}", EnrichmentState::Scored), "scored");
    }
}
