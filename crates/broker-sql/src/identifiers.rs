//! Safe construction of SQL identifiers for binding users. `sqlx` only
//! parameterizes values, never identifiers, so every identifier used here is
//! either a compile-time literal or built from output that is already
//! alphanumeric-only (see `password::derive`).

/// Every user this broker creates is tagged with this prefix so
/// `ResetState` can find and drop them without touching the master user or
/// anything a human created by hand.
pub const BINDING_USER_PREFIX: &str = "bnd_";

pub fn binding_user_name(username: &str) -> String {
    format!("{BINDING_USER_PREFIX}{username}")
}

/// Defensive check: every identifier this crate passes into raw SQL must
/// pass this before being interpolated. The derivation functions already
/// guarantee it; this is the second line of defense.
pub fn is_safe_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
