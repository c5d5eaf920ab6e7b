//! Savepoint name validation.
//!
//! Savepoint names are interpolated into SQL text — the engine forbids
//! binding identifiers as parameters — so a strict allow-list grammar,
//! enforced before any SQL is built, is the sole mitigation. This is a
//! deliberate exception to "always use bound parameters".

use std::sync::LazyLock;

use regex::Regex;

use crate::error::SqlBridgeError;

pub(crate) const MAX_NAME_LEN: usize = 64;

static NAME_GRAMMAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A[A-Za-z_][A-Za-z0-9_]*\z").unwrap_or_else(|e| panic!("savepoint grammar: {e}"))
});

/// Check `name` against the allow-list grammar: ASCII letters, digits, and
/// underscores; no leading digit; 1 to 64 characters.
///
/// # Errors
///
/// Returns [`SqlBridgeError::InvalidIdentifier`] with a descriptive reason.
/// Nothing reaches the engine for a rejected name.
pub(crate) fn validate_name(name: &str) -> Result<(), SqlBridgeError> {
    if name.is_empty() {
        return Err(SqlBridgeError::InvalidIdentifier(
            "savepoint name must not be empty".into(),
        ));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(SqlBridgeError::InvalidIdentifier(format!(
            "savepoint name exceeds {MAX_NAME_LEN} characters"
        )));
    }
    if !NAME_GRAMMAR.is_match(name) {
        return Err(SqlBridgeError::InvalidIdentifier(format!(
            "savepoint name {name:?} must match [A-Za-z_][A-Za-z0-9_]*"
        )));
    }
    Ok(())
}
