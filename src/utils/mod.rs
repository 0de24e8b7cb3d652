//! Utility types and functions used throughout the codebase.

pub mod sync;

/// Parses a boolean-ish environment value the same way every `DISPOSE_RS_*` switch does.
pub fn env_flag(value: &str) -> bool {
    matches!(value, "1" | "true" | "yes" | "on")
}
