//! npm-style version ranges on top of the `semver` crate.
//!
//! `semver` speaks Cargo's requirement dialect, which differs from npm's in a
//! handful of ways that matter for range keys written by JavaScript tooling:
//!
//! | npm                | Cargo equivalent        |
//! |--------------------|-------------------------|
//! | `1.2.3` (exact)    | `=1.2.3`                |
//! | `>=1.0.0 <2.0.0`   | `>=1.0.0, <2.0.0`       |
//! | `1.0.0 - 2.3`      | `>=1.0.0, <=2.3`        |
//! | `a \|\| b`         | (no equivalent)         |
//! | `1.x`, `>=1.x`     | `1.*`, `>=1`            |
//!
//! Each `||` alternative becomes its own [`VersionReq`]; a version satisfies
//! the range if it satisfies any alternative. Pre-release handling is the
//! same in both dialects.

use crate::error::{ErrorKind, Result};
use semver::{Version, VersionReq};
use std::fmt;
use std::str::FromStr;

const OPERATOR_CHARS: &[char] = &['<', '>', '=', '~', '^'];

#[derive(Debug, Clone)]
pub struct NpmRange {
    source: String,
    alternatives: Vec<VersionReq>,
}

impl NpmRange {
    pub fn parse(range: &str) -> Result<Self> {
        let alternatives = range
            .split("||")
            .map(|alternative| {
                let translated = translate(alternative).ok_or_else(|| ErrorKind::InvalidRange(range.to_string()))?;
                VersionReq::parse(&translated).map_err(|_| ErrorKind::InvalidRange(range.to_string()))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { source: range.to_string(), alternatives })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|requirement| requirement.matches(version))
    }

    /// Like [`matches`](Self::matches), for a version that hasn't been
    /// parsed yet. An unparsable version satisfies nothing.
    pub fn satisfied_by(&self, version: &str) -> bool {
        let version = version.trim().trim_start_matches(['=', 'v']);
        Version::parse(version).is_ok_and(|version| self.matches(&version))
    }
}

impl FromStr for NpmRange {
    type Err = crate::error::Error;

    fn from_str(range: &str) -> Result<Self> {
        Self::parse(range)
    }
}

impl fmt::Display for NpmRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Translate one `||` alternative into Cargo requirement syntax.
fn translate(alternative: &str) -> Option<String> {
    let tokens: Vec<&str> = alternative.split_whitespace().collect();
    match tokens.as_slice() {
        [] => Some("*".to_string()),
        [low, "-", high] => Some(format!(">={}, <={}", bound(low)?, bound(high)?)),
        _ => {
            let mut comparators = Vec::with_capacity(tokens.len());
            let mut pending: Option<&str> = None;
            for token in tokens {
                // `>= 1.2.3` is the same comparator as `>=1.2.3`.
                if token.chars().all(|c| OPERATOR_CHARS.contains(&c)) {
                    if pending.replace(token).is_some() {
                        return None;
                    }
                    continue;
                }
                let comparator = match pending.take() {
                    Some(operator) => comparator(&format!("{operator}{token}"))?,
                    None => comparator(token)?,
                };
                comparators.push(comparator);
            }
            match pending {
                Some(_) => None,
                None => Some(comparators.join(", ")),
            }
        },
    }
}

fn comparator(token: &str) -> Option<String> {
    let split = token.find(|c| !OPERATOR_CHARS.contains(&c)).unwrap_or(token.len());
    let (operator, version) = token.split_at(split);
    let version = version.strip_prefix(['v', 'V']).unwrap_or(version);
    if version.is_empty() {
        return None;
    }
    if !is_wildcard(version) {
        return Some(match operator {
            "" => format!("={version}"),
            _ => format!("{operator}{version}"),
        });
    }
    match operator {
        // `1.x` and `=1.x` both mean "any 1.y.z".
        "" | "=" => Some(wildcard(version)),
        _ => {
            let partial = bound(version)?;
            Some(match partial.as_str() {
                "*" => partial,
                _ => format!("{operator}{partial}"),
            })
        },
    }
}

/// Version segments before the pre-release/build suffix.
fn core(version: &str) -> &str {
    version.split(['-', '+']).next().unwrap_or(version)
}

fn is_wildcard_segment(segment: &str) -> bool {
    matches!(segment, "x" | "X" | "*")
}

fn is_wildcard(version: &str) -> bool {
    core(version).split('.').any(is_wildcard_segment)
}

/// `1.x.x` → `1.*`, `x` → `*`.
fn wildcard(version: &str) -> String {
    let fixed: Vec<&str> = core(version).split('.').take_while(|segment| !is_wildcard_segment(segment)).collect();
    match fixed.is_empty() {
        true => "*".to_string(),
        false => format!("{}.*", fixed.join(".")),
    }
}

/// A partial version usable after a comparison operator: `1.x` → `1`, bare
/// `x` → `*`. Anything else passes through unchanged.
fn bound(version: &str) -> Option<String> {
    let version = version.strip_prefix(['v', 'V']).unwrap_or(version);
    if version.is_empty() || version.contains(OPERATOR_CHARS) {
        return None;
    }
    if !is_wildcard(version) {
        return Some(version.to_string());
    }
    let fixed: Vec<&str> = core(version).split('.').take_while(|segment| !is_wildcard_segment(segment)).collect();
    match fixed.is_empty() {
        true => Some("*".to_string()),
        false => Some(fixed.join(".")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    // Caret and tilde
    #[case("^1.2.0", "1.5.0", true)]
    #[case("^1.2.0", "2.0.0", false)]
    #[case("^0.2.3", "0.2.9", true)]
    #[case("^0.2.3", "0.3.0", false)]
    #[case("~1.2.0", "1.2.9", true)]
    #[case("~1.2.0", "1.3.0", false)]
    // Bare versions are exact, partial bare versions are wildcards
    #[case("1.2.3", "1.2.3", true)]
    #[case("1.2.3", "1.2.4", false)]
    #[case("=1.2.3", "1.2.3", true)]
    #[case("v1.2.3", "1.2.3", true)]
    #[case("1.2", "1.2.9", true)]
    #[case("1", "1.9.0", true)]
    #[case("1", "2.0.0", false)]
    // Comparator sets
    #[case(">=1.0.0 <2.0.0", "1.5.0", true)]
    #[case(">=1.0.0 <2.0.0", "2.0.0", false)]
    #[case(">= 1.0.0 < 2.0.0", "1.0.0", true)]
    #[case(">1.0.0 <=1.2.0", "1.0.0", false)]
    // Hyphen ranges
    #[case("1.0.0 - 2.0.0", "2.0.0", true)]
    #[case("1.0.0 - 2.0.0", "2.0.1", false)]
    #[case("1.0.0 - 2.3", "2.3.9", true)]
    #[case("1.0.0 - 2.3", "2.4.0", false)]
    #[case("1.2 - 2", "1.1.9", false)]
    // Alternatives
    #[case("<1.0.0 || >=3.0.0", "0.9.0", true)]
    #[case("<1.0.0 || >=3.0.0", "2.0.0", false)]
    #[case("<1.0.0 || >=3.0.0", "3.1.0", true)]
    #[case("1.0.0 - 1.5.0 || ^3", "3.9.9", true)]
    // Wildcards
    #[case("1.x", "1.4.0", true)]
    #[case("1.x", "2.0.0", false)]
    #[case("1.2.X", "1.2.7", true)]
    #[case("1.2.x", "1.3.0", false)]
    #[case("x", "5.0.0", true)]
    #[case("*", "0.0.1", true)]
    #[case("", "1.0.0", true)]
    #[case(">=1.x", "1.0.0", true)]
    #[case("<2.x", "2.0.0", false)]
    #[case("^1.x", "1.9.0", true)]
    // Pre-releases only match comparators on the same release
    #[case("^1.0.0", "1.1.0-beta.1", false)]
    #[case(">=1.1.0-beta.0", "1.1.0-beta.1", true)]
    #[case("*", "1.0.0-rc.1", false)]
    // Unparsable versions satisfy nothing
    #[case("*", "not-a-version", false)]
    #[case("^1.0.0", "1.0", false)]
    fn npm_semantics(#[case] range: &str, #[case] version: &str, #[case] expected: bool) {
        let parsed = NpmRange::parse(range).unwrap();
        assert_eq!(parsed.satisfied_by(version), expected, "{range} vs {version}");
    }

    #[rstest]
    #[case("not a range")]
    #[case(">=")]
    #[case(">= >= 1.0.0")]
    #[case("1.0.0 -")]
    #[case("^1.2.3.4")]
    #[case("1.0.0 || banana")]
    fn rejects_invalid_ranges(#[case] range: &str) {
        let err = NpmRange::parse(range).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidRange(source) if source == range));
    }

    #[test]
    fn keeps_source_text() {
        let range: NpmRange = ">= 1.0.0 < 2.0.0".parse().unwrap();
        assert_eq!(range.as_str(), ">= 1.0.0 < 2.0.0");
        assert_eq!(range.to_string(), ">= 1.0.0 < 2.0.0");
    }
}
