//! ID prefixes and token formats.
//!
//! Record and log IDs are `{prefix}-{16 hex}` and are generated by the
//! database (`randomblob`). Export tokens are `xgt-{48 hex}`.

/// Audit record IDs (`evt-…`).
pub const PREFIX_RECORD: &str = "evt";

/// Meta-audit access log IDs (`acc-…`).
pub const PREFIX_ACCESS: &str = "acc";

/// Export grant tokens (`xgt-…`).
pub const PREFIX_GRANT: &str = "xgt";

/// All prefixes handed to `generate_id`.
pub const ALL_PREFIXES: &[&str] = &[PREFIX_RECORD, PREFIX_ACCESS];

/// Number of random bytes behind a record or log ID.
pub const ID_RANDOM_BYTES: usize = 8;

/// Number of random bytes behind an export token.
pub const TOKEN_RANDOM_BYTES: usize = 24;

/// Check that `token` has the shape of an export grant token.
///
/// Shape only: a well-formed token may still be unknown to the store.
#[must_use]
pub fn is_well_formed_token(token: &str) -> bool {
    token
        .strip_prefix(PREFIX_GRANT)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|hex| {
            hex.len() == TOKEN_RANDOM_BYTES * 2
                && hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        })
}
