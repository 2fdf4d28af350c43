//! Version parsing and ordering for package releases.
//!
//! Implements the subset of the standard Python version ordering rules that
//! release tags actually use: numeric release segments compare numerically,
//! pre-releases (`1.0a1`, `1.0rc2`) order before the final release,
//! post-releases (`1.0.post1`) after it, and dev releases (`1.0.dev1`)
//! before everything else at the same release number.

use std::cmp::Ordering;
use std::fmt;

/// Pre-release cycle, in ordering position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PreKind {
    Alpha,
    Beta,
    Rc,
}

/// Position of a version relative to the final release with the same
/// numeric segments: `1.0.dev1 < 1.0a1 < 1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    Dev,
    Pre(PreKind, u64),
    Final,
}

/// A parsed, order-comparable version.
///
/// Parsing is total in practice: tags that do not follow the version grammar
/// are still representable (see [`Version::parse`] returning `None` and the
/// caller-side fallback in [`compare_version_strings`]).
#[derive(Debug, Clone)]
pub struct Version {
    epoch: u64,
    release: Vec<u64>,
    phase: Phase,
    post: Option<u64>,
    dev: Option<u64>,
}

impl Version {
    /// Parse a version string. A leading `v` (common in release tags) is
    /// stripped. Returns `None` if the string does not follow the grammar.
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim().strip_prefix(['v', 'V']).unwrap_or(raw.trim());
        let s = s.to_ascii_lowercase();
        if s.is_empty() {
            return None;
        }

        // Optional epoch: "N!"
        let (epoch, rest) = match s.split_once('!') {
            Some((e, rest)) => (e.parse::<u64>().ok()?, rest),
            None => (0, s.as_str()),
        };

        // Numeric release segments up to the first non-numeric suffix.
        let mut release = Vec::new();
        let bytes = rest.as_bytes();
        let mut idx = 0;
        loop {
            let start = idx;
            while idx < bytes.len() && bytes[idx].is_ascii_digit() {
                idx += 1;
            }
            if start == idx {
                return None;
            }
            release.push(rest[start..idx].parse().ok()?);
            // Another dotted numeric segment continues the release; anything
            // else ("a1", "post1", ...) belongs to the suffix scanner.
            if bytes.get(idx) == Some(&b'.')
                && bytes.get(idx + 1).is_some_and(u8::is_ascii_digit)
            {
                idx += 1;
                continue;
            }
            break;
        }
        let remainder = &rest[idx..];

        let mut phase = Phase::Final;
        let mut post = None;
        let mut dev = None;
        let mut tail = remainder.trim_start_matches(['.', '-', '_']);
        while !tail.is_empty() {
            let (word, number, rest) = split_suffix(tail)?;
            match word {
                "a" | "alpha" => phase = Phase::Pre(PreKind::Alpha, number),
                "b" | "beta" => phase = Phase::Pre(PreKind::Beta, number),
                "rc" | "c" => phase = Phase::Pre(PreKind::Rc, number),
                "post" | "rev" | "r" => post = Some(number),
                "dev" => dev = Some(number),
                _ => return None,
            }
            tail = rest.trim_start_matches(['.', '-', '_']);
        }
        if dev.is_some() && matches!(phase, Phase::Final) && post.is_none() {
            phase = Phase::Dev;
        }

        Some(Self { epoch, release, phase, post, dev })
    }

    fn release_segment(&self, i: usize) -> u64 {
        self.release.get(i).copied().unwrap_or(0)
    }
}

/// Split one alphanumeric suffix like "a1", "rc2", "post3" off the front.
fn split_suffix(s: &str) -> Option<(&str, u64, &str)> {
    let alpha = s.chars().take_while(|c| c.is_ascii_alphabetic()).count();
    if alpha == 0 {
        return None;
    }
    let rest = &s[alpha..];
    let rest = rest.strip_prefix(['.', '-', '_']).unwrap_or(rest);
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    let number = if digits == 0 { 0 } else { rest[..digits].parse().ok()? };
    Some((&s[..alpha], number, &rest[digits..]))
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.epoch != other.epoch {
            return self.epoch.cmp(&other.epoch);
        }
        // Zero-padded segment comparison: 1.0 == 1.0.0.
        let len = self.release.len().max(other.release.len());
        for i in 0..len {
            let ord = self.release_segment(i).cmp(&other.release_segment(i));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.phase
            .cmp(&other.phase)
            .then(self.post.cmp(&other.post))
            // A dev marker orders before its absence: 1.0.post1.dev1 < 1.0.post1.
            .then_with(|| match (self.dev, other.dev) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let segments: Vec<String> = self.release.iter().map(u64::to_string).collect();
        write!(f, "{}", segments.join("."))?;
        match self.phase {
            Phase::Pre(PreKind::Alpha, n) => write!(f, "a{}", n)?,
            Phase::Pre(PreKind::Beta, n) => write!(f, "b{}", n)?,
            Phase::Pre(PreKind::Rc, n) => write!(f, "rc{}", n)?,
            Phase::Dev | Phase::Final => {}
        }
        if let Some(n) = self.post {
            write!(f, ".post{}", n)?;
        }
        if let Some(n) = self.dev {
            write!(f, ".dev{}", n)?;
        }
        Ok(())
    }
}

/// Compare two raw version strings for listing order.
///
/// Parsable versions order by version rules; anything unparsable sorts after
/// every parsable version, by raw string, so listings stay deterministic.
pub fn compare_version_strings(a: &str, b: &str) -> Ordering {
    match (Version::parse(a), Version::parse(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap_or_else(|| panic!("failed to parse {:?}", s))
    }

    #[test]
    fn test_parse_simple() {
        assert_eq!(v("1.2.3").to_string(), "1.2.3");
        assert_eq!(v("v1.2.3").to_string(), "1.2.3");
        assert_eq!(v("0.1").to_string(), "0.1");
    }

    #[test]
    fn test_parse_prerelease() {
        assert_eq!(v("1.0a1").to_string(), "1.0a1");
        assert_eq!(v("1.0b2").to_string(), "1.0b2");
        assert_eq!(v("1.0rc1").to_string(), "1.0rc1");
        assert_eq!(v("1.0.alpha.1").to_string(), "1.0a1");
    }

    #[test]
    fn test_parse_post_and_dev() {
        assert_eq!(v("1.0.post1").to_string(), "1.0.post1");
        assert_eq!(v("1.0.dev3").to_string(), "1.0.dev3");
        assert_eq!(v("1.0-post1").to_string(), "1.0.post1");
    }

    #[test]
    fn test_parse_epoch() {
        assert!(v("2!1.0") > v("999.0"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Version::parse("").is_none());
        assert!(Version::parse("nightly").is_none());
        assert!(Version::parse("1.0-weird1").is_none());
    }

    #[test]
    fn test_ordering_contract() {
        // The canonical listing order.
        let mut versions = vec![v("1.0"), v("1.0.1"), v("1.0a1"), v("2.0")];
        versions.sort();
        let rendered: Vec<String> = versions.iter().map(Version::to_string).collect();
        assert_eq!(rendered, ["1.0a1", "1.0", "1.0.1", "2.0"]);
    }

    #[test]
    fn test_ordering_phases() {
        assert!(v("1.0.dev1") < v("1.0a1"));
        assert!(v("1.0a1") < v("1.0b1"));
        assert!(v("1.0b1") < v("1.0rc1"));
        assert!(v("1.0rc1") < v("1.0"));
        assert!(v("1.0") < v("1.0.post1"));
        assert!(v("1.0.post1") < v("1.0.1"));
    }

    #[test]
    fn test_zero_padding_equality() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("1"), v("1.0"));
    }

    #[test]
    fn test_numeric_not_lexicographic() {
        assert!(v("1.9") < v("1.10"));
        assert!(v("0.9.9") < v("0.10.0"));
    }

    #[test]
    fn test_compare_version_strings_fallback() {
        assert_eq!(compare_version_strings("1.0", "2.0"), Ordering::Less);
        // Unparsable sorts last.
        assert_eq!(compare_version_strings("nightly", "0.0.1"), Ordering::Greater);
        assert_eq!(compare_version_strings("abc", "abd"), Ordering::Less);
    }
}
