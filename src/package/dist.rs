//! Recognition of distribution artifact filenames.
//!
//! Release assets are matched against the two standard packaging filename
//! grammars: wheels (`name-version[-build]-python-abi-platform.whl`) and
//! source distributions (`name-version.tar.gz` / `.zip` / `.tar.bz2`).
//! Parsing returns a tagged result instead of an error so the importer can
//! route unrecognized assets to warnings without exception-driven flow.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Distribution format of a recorded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistKind {
    BdistWheel,
    Sdist,
}

impl DistKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistKind::BdistWheel => "bdist_wheel",
            DistKind::Sdist => "sdist",
        }
    }
}

impl fmt::Display for DistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of matching an asset filename against the packaging grammars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedDist {
    Recognized {
        /// Declared package name, exactly as spelled in the filename.
        name: String,
        /// Declared version, exactly as spelled in the filename.
        version: String,
        kind: DistKind,
        /// Python tag for wheels (e.g. `py3`, `cp311`), absent for sdists.
        python_tag: Option<String>,
    },
    Unrecognized,
}

/// Parse a release asset filename.
///
/// This is the package-name derivation for the whole importer: the name and
/// version recorded in the store come from the artifact's own filename, never
/// from the release tag or the repository name.
pub fn parse_dist_filename(filename: &str) -> ParsedDist {
    if let Some(stem) = filename.strip_suffix(".whl") {
        return parse_wheel(stem);
    }
    for ext in [".tar.gz", ".tar.bz2", ".zip"] {
        if let Some(stem) = filename.strip_suffix(ext) {
            return parse_sdist(stem);
        }
    }
    ParsedDist::Unrecognized
}

/// Wheel stems have exactly 5 or 6 dash-separated fields; the wheel spec
/// escapes dashes inside the name to underscores, so a field count outside
/// that range means the filename is not a well-formed wheel.
fn parse_wheel(stem: &str) -> ParsedDist {
    let parts: Vec<&str> = stem.split('-').collect();
    let (name, version, python_tag) = match parts.as_slice() {
        [name, version, py, _abi, _plat] => (*name, *version, *py),
        // Optional build tag, which must start with a digit.
        [name, version, build, py, _abi, _plat]
            if build.starts_with(|c: char| c.is_ascii_digit()) =>
        {
            (*name, *version, *py)
        }
        _ => return ParsedDist::Unrecognized,
    };
    if name.is_empty() || !version.starts_with(|c: char| c.is_ascii_digit()) {
        return ParsedDist::Unrecognized;
    }
    ParsedDist::Recognized {
        name: name.to_string(),
        version: version.to_string(),
        kind: DistKind::BdistWheel,
        python_tag: Some(python_tag.to_string()),
    }
}

/// Sdist stems are `name-version`; the version is everything after the last
/// dash and must start with a digit, so names containing dashes survive.
fn parse_sdist(stem: &str) -> ParsedDist {
    let Some((name, version)) = stem.rsplit_once('-') else {
        return ParsedDist::Unrecognized;
    };
    if name.is_empty() || !version.starts_with(|c: char| c.is_ascii_digit()) {
        return ParsedDist::Unrecognized;
    }
    ParsedDist::Recognized {
        name: name.to_string(),
        version: version.to_string(),
        kind: DistKind::Sdist,
        python_tag: None,
    }
}
