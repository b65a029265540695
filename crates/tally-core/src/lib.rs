//! # tally-core
//!
//! Core types, canonical hashing, and error types for Tally.
//!
//! This crate provides the foundational types shared across all Tally crates:
//! - Entity structs for the audit trail (records, enrichment, export grants, access log)
//! - Severity, role, and lifecycle enums
//! - Caller identity supplied by the external identity provider
//! - Canonical serialization and the per-tenant hash chain
//! - ID prefix constants and token format checks
//! - Cross-cutting error types
//! - Audit detail payloads for system-generated events

pub mod audit_detail;
pub mod chain;
pub mod entities;
pub mod enums;
pub mod errors;
pub mod identity;
pub mod ids;
