//! Package naming rules.
//!
//! The normalized name is the uniqueness key for packages and the directory
//! name used in the generated index. Two spellings that normalize identically
//! refer to the same package.

pub mod dist;
pub mod version;

pub use dist::{DistKind, ParsedDist, parse_dist_filename};
pub use version::{Version, compare_version_strings};

/// Normalize a package name per the index naming rules (PEP 503).
///
/// Lowercases the name and collapses every run of `-`, `_` and `.` into a
/// single `-`. The function is total and idempotent: any input produces a
/// normalized form, and normalizing twice changes nothing.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for ch in name.chars() {
        if matches!(ch, '-' | '_' | '.') {
            pending_sep = true;
        } else {
            if pending_sep && !out.is_empty() {
                out.push('-');
            }
            pending_sep = false;
            out.extend(ch.to_lowercase());
        }
    }
    out
}
