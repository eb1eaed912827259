//! Debug formatting helpers for [`custom_debug_derive`].

use std::fmt;

/// Formats a secret by printing a short prefix followed by `***`.
///
/// Use with `#[debug(with = "crate::fmt::masked")]` on credential fields so
/// config dumps stay safe to log.
pub fn masked(value: &String, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if value.is_empty() {
        return f.write_str("\"\"");
    }
    let prefix: String = value.chars().take(4).collect();
    write!(f, "\"{prefix}***\"")
}
