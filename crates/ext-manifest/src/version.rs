//! Version range parsing, matching, and intersection.
//!
//! Supports four range forms for extension dependencies:
//!
//! - **Exact**: `1.2.3` or `=1.2.3`
//! - **Caret** (compatible): `^1.2.3` means `>=1.2.3, <2.0.0`; for `0.x`
//!   the left-most non-zero component is the compatibility boundary
//! - **Tilde** (patch-level): `~1.2.3` means `>=1.2.3, <1.3.0`
//! - **Interval**: one or two comparators from `>=`, `>`, `<=`, `<`,
//!   comma-separated (`>=1.0.0, <2.0.0`), or `*` for any version
//!
//! Caret and tilde accept partial versions (`^1.2`, `~1`), padded with zeros.
//!
//! Ranges have a total order ([`Ord`]) used whenever several constraints on
//! the same extension must be combined: exact before caret before tilde
//! before interval, then by lower bound, upper bound, and source text.
//!
//! # Examples
//!
//! ```
//! use ext_manifest::version::VersionRange;
//!
//! let caret = VersionRange::parse("^1.2.0").unwrap();
//! assert!(caret.matches(&semver::Version::new(1, 9, 0)));
//! assert!(!caret.matches(&semver::Version::new(2, 0, 0)));
//!
//! let tilde = VersionRange::parse("~1.3.0").unwrap();
//! let both = caret.intersect(&tilde).unwrap();
//! assert!(both.matches(&semver::Version::new(1, 3, 7)));
//! assert!(!both.matches(&semver::Version::new(1, 4, 0)));
//! ```

use std::cmp::Ordering;
use std::fmt;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The syntactic form a range was written in.
///
/// Declaration order is precedence order: exact binds tightest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeKind {
    Exact,
    Caret,
    Tilde,
    Interval,
}

/// One end of an interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bound {
    pub version: Version,
    pub inclusive: bool,
}

impl Bound {
    fn inclusive(version: Version) -> Self {
        Self {
            version,
            inclusive: true,
        }
    }

    fn exclusive(version: Version) -> Self {
        Self {
            version,
            inclusive: false,
        }
    }
}

/// A parsed version range: a (possibly unbounded) interval of versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    kind: RangeKind,
    lower: Option<Bound>,
    upper: Option<Bound>,
    raw: String,
}

impl VersionRange {
    /// Parse a range expression.
    pub fn parse(expr: &str) -> Result<Self> {
        let raw = expr.trim().to_string();
        let invalid = |reason: String| Error::InvalidRange {
            range: raw.clone(),
            reason,
        };

        let overflow = || invalid("version component overflows".to_string());

        if raw.is_empty() {
            return Err(invalid("empty range".to_string()));
        }
        if raw == "*" {
            return Ok(Self {
                kind: RangeKind::Interval,
                lower: None,
                upper: None,
                raw,
            });
        }

        if let Some(rest) = raw.strip_prefix('^') {
            let (version, parts) = parse_partial(rest).map_err(invalid)?;
            let upper = caret_upper(&version, parts).ok_or_else(overflow)?;
            return Ok(Self {
                kind: RangeKind::Caret,
                lower: Some(Bound::inclusive(version)),
                upper: Some(Bound::exclusive(upper)),
                raw,
            });
        }

        if let Some(rest) = raw.strip_prefix('~') {
            let (version, parts) = parse_partial(rest).map_err(invalid)?;
            let upper = if parts == 1 {
                version.major.checked_add(1).map(|major| Version::new(major, 0, 0))
            } else {
                version.minor.checked_add(1).map(|minor| Version::new(version.major, minor, 0))
            }
            .ok_or_else(overflow)?;
            return Ok(Self {
                kind: RangeKind::Tilde,
                lower: Some(Bound::inclusive(version)),
                upper: Some(Bound::exclusive(upper)),
                raw,
            });
        }

        if raw.starts_with(['>', '<']) {
            return parse_interval(&raw).map_err(invalid);
        }

        let exact = raw.strip_prefix('=').unwrap_or(&raw).trim();
        let version = Version::parse(exact)
            .map_err(|e| invalid(format!("exact ranges need a full version: {e}")))?;
        Ok(Self {
            kind: RangeKind::Exact,
            lower: Some(Bound::inclusive(version.clone())),
            upper: Some(Bound::inclusive(version)),
            raw,
        })
    }

    /// Check whether `version` lies inside this range.
    ///
    /// Pre-release versions only match when a bound of the range is itself a
    /// pre-release of the same `major.minor.patch`.
    pub fn matches(&self, version: &Version) -> bool {
        if !version.pre.is_empty() && !self.admits_prerelease_of(version) {
            return false;
        }
        let above_lower = match &self.lower {
            None => true,
            Some(b) if b.inclusive => version >= &b.version,
            Some(b) => version > &b.version,
        };
        let below_upper = match &self.upper {
            None => true,
            Some(b) if b.inclusive => version <= &b.version,
            Some(b) => version < &b.version,
        };
        above_lower && below_upper
    }

    fn admits_prerelease_of(&self, version: &Version) -> bool {
        [&self.lower, &self.upper].into_iter().flatten().any(|b| {
            !b.version.pre.is_empty()
                && (b.version.major, b.version.minor, b.version.patch)
                    == (version.major, version.minor, version.patch)
        })
    }

    /// Intersect two ranges.
    ///
    /// Returns `None` when no version can satisfy both. The result keeps the
    /// tighter of each bound; its kind is the higher-precedence of the two,
    /// and its source text joins both expressions.
    pub fn intersect(&self, other: &VersionRange) -> Option<VersionRange> {
        let lower = tighter_lower(self.lower.as_ref(), other.lower.as_ref());
        let upper = tighter_upper(self.upper.as_ref(), other.upper.as_ref());
        if let (Some(lo), Some(hi)) = (&lower, &upper) {
            match lo.version.cmp(&hi.version) {
                Ordering::Greater => return None,
                Ordering::Equal if !(lo.inclusive && hi.inclusive) => return None,
                _ => {}
            }
        }
        Some(VersionRange {
            kind: self.kind.min(other.kind),
            lower,
            upper,
            raw: format!("{}, {}", self.raw, other.raw),
        })
    }

    pub fn kind(&self) -> RangeKind {
        self.kind
    }

    pub fn lower(&self) -> Option<&Bound> {
        self.lower.as_ref()
    }

    pub fn upper(&self) -> Option<&Bound> {
        self.upper.as_ref()
    }

    /// Return the original range expression.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Ord for VersionRange {
    fn cmp(&self, other: &Self) -> Ordering {
        self.kind
            .cmp(&other.kind)
            .then_with(|| cmp_lower(self.lower.as_ref(), other.lower.as_ref()))
            .then_with(|| cmp_upper(self.upper.as_ref(), other.upper.as_ref()))
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for VersionRange {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for VersionRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for VersionRange {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Unbounded lower ends sort first; at equal versions inclusive sorts first.
fn cmp_lower(a: Option<&Bound>, b: Option<&Bound>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a
            .version
            .cmp(&b.version)
            .then_with(|| b.inclusive.cmp(&a.inclusive)),
    }
}

/// Unbounded upper ends sort last; at equal versions exclusive sorts first.
fn cmp_upper(a: Option<&Bound>, b: Option<&Bound>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => a
            .version
            .cmp(&b.version)
            .then_with(|| a.inclusive.cmp(&b.inclusive)),
    }
}

fn tighter_lower(a: Option<&Bound>, b: Option<&Bound>) -> Option<Bound> {
    match (a, b) {
        (None, None) => None,
        (Some(x), None) | (None, Some(x)) => Some(x.clone()),
        (Some(x), Some(y)) => Some(if cmp_lower(Some(x), Some(y)) == Ordering::Greater {
            x.clone()
        } else {
            y.clone()
        }),
    }
}

fn tighter_upper(a: Option<&Bound>, b: Option<&Bound>) -> Option<Bound> {
    match (a, b) {
        (None, None) => None,
        (Some(x), None) | (None, Some(x)) => Some(x.clone()),
        (Some(x), Some(y)) => Some(if cmp_upper(Some(x), Some(y)) == Ordering::Less {
            x.clone()
        } else {
            y.clone()
        }),
    }
}

/// Exclusive upper bound of a caret range; `None` if a component overflows.
fn caret_upper(version: &Version, parts: usize) -> Option<Version> {
    if version.major > 0 || parts == 1 {
        Some(Version::new(version.major.checked_add(1)?, 0, 0))
    } else if version.minor > 0 || parts == 2 {
        Some(Version::new(0, version.minor.checked_add(1)?, 0))
    } else {
        Some(Version::new(0, 0, version.patch.checked_add(1)?))
    }
}

/// Parse `1`, `1.2`, or a full semantic version. Returns the version and the
/// number of components written.
fn parse_partial(s: &str) -> std::result::Result<(Version, usize), String> {
    let s = s.trim();
    if let Ok(v) = Version::parse(s) {
        return Ok((v, 3));
    }
    let parts: Vec<&str> = s.split('.').collect();
    if parts.is_empty() || parts.len() > 2 {
        return Err(format!("invalid version '{s}'"));
    }
    let mut numbers = [0u64; 2];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| format!("invalid version component '{part}' in '{s}'"))?;
    }
    Ok((Version::new(numbers[0], numbers[1], 0), parts.len()))
}

/// Parse `>=1.0.0`, `<2.0.0`, or both, comma-separated.
fn parse_interval(raw: &str) -> std::result::Result<VersionRange, String> {
    let mut lower: Option<Bound> = None;
    let mut upper: Option<Bound> = None;

    for part in raw.split(',').map(str::trim) {
        if part.is_empty() {
            return Err("empty comparator".to_string());
        }
        let (is_lower, inclusive, rest) = if let Some(rest) = part.strip_prefix(">=") {
            (true, true, rest)
        } else if let Some(rest) = part.strip_prefix("<=") {
            (false, true, rest)
        } else if let Some(rest) = part.strip_prefix('>') {
            (true, false, rest)
        } else if let Some(rest) = part.strip_prefix('<') {
            (false, false, rest)
        } else {
            return Err(format!("comparator '{part}' must start with >=, >, <=, or <"));
        };
        let (version, _) = parse_partial(rest)?;
        let bound = Bound { version, inclusive };
        let slot = if is_lower { &mut lower } else { &mut upper };
        if slot.is_some() {
            return Err(format!(
                "more than one {} bound",
                if is_lower { "lower" } else { "upper" }
            ));
        }
        *slot = Some(bound);
    }

    let range = VersionRange {
        kind: RangeKind::Interval,
        lower,
        upper,
        raw: raw.to_string(),
    };
    // An interval that excludes everything is a typo, not a constraint.
    if range.intersect(&range).is_none() {
        return Err("interval is empty".to_string());
    }
    Ok(range)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    // --- parse ---

    #[test]
    fn test_parse_kinds() {
        assert_eq!(VersionRange::parse("1.2.3").unwrap().kind(), RangeKind::Exact);
        assert_eq!(VersionRange::parse("=1.2.3").unwrap().kind(), RangeKind::Exact);
        assert_eq!(VersionRange::parse("^1.2.3").unwrap().kind(), RangeKind::Caret);
        assert_eq!(VersionRange::parse("~1.2.3").unwrap().kind(), RangeKind::Tilde);
        assert_eq!(
            VersionRange::parse(">=1.0.0, <2.0.0").unwrap().kind(),
            RangeKind::Interval
        );
        assert_eq!(VersionRange::parse("*").unwrap().kind(), RangeKind::Interval);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "abc", "^x.y", "1.2", ">=1.0.0,>=1.1.0", "!=1.0.0", ">2.0.0,<1.0.0", "~1.2.3.4"] {
            assert!(VersionRange::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_parse_rejects_overflowing_bounds() {
        for bad in [
            "^18446744073709551615.0.0",
            "~1.18446744073709551615.0",
            "^0.0.18446744073709551615",
            "^0.18446744073709551615",
            "~18446744073709551615",
        ] {
            match VersionRange::parse(bad) {
                Err(Error::InvalidRange { reason, .. }) => assert_eq!(reason, "version component overflows"),
                other => panic!("{bad:?}: expected overflow, got {other:?}"),
            }
        }
    }

    // --- matches ---

    #[test]
    fn test_caret_matches() {
        let r = VersionRange::parse("^1.2.0").unwrap();
        assert!(r.matches(&v("1.2.0")));
        assert!(r.matches(&v("1.9.9")));
        assert!(!r.matches(&v("1.1.9")));
        assert!(!r.matches(&v("2.0.0")));
    }

    #[test]
    fn test_caret_zero_major() {
        let r = VersionRange::parse("^0.2.3").unwrap();
        assert!(r.matches(&v("0.2.9")));
        assert!(!r.matches(&v("0.3.0")));

        let r = VersionRange::parse("^0.0.3").unwrap();
        assert!(r.matches(&v("0.0.3")));
        assert!(!r.matches(&v("0.0.4")));
    }

    #[test]
    fn test_caret_partial() {
        let r = VersionRange::parse("^1").unwrap();
        assert!(r.matches(&v("1.0.0")));
        assert!(r.matches(&v("1.99.0")));
        assert!(!r.matches(&v("2.0.0")));
    }

    #[test]
    fn test_tilde_matches() {
        let r = VersionRange::parse("~1.3.0").unwrap();
        assert!(r.matches(&v("1.3.0")));
        assert!(r.matches(&v("1.3.5")));
        assert!(!r.matches(&v("1.4.0")));

        let r = VersionRange::parse("~1").unwrap();
        assert!(r.matches(&v("1.7.0")));
        assert!(!r.matches(&v("2.0.0")));
    }

    #[test]
    fn test_exact_matches() {
        let r = VersionRange::parse("=1.2.3").unwrap();
        assert!(r.matches(&v("1.2.3")));
        assert!(!r.matches(&v("1.2.4")));
    }

    #[test]
    fn test_interval_matches() {
        let r = VersionRange::parse(">=1.0.0, <2.0.0").unwrap();
        assert!(r.matches(&v("1.0.0")));
        assert!(r.matches(&v("1.5.0")));
        assert!(!r.matches(&v("2.0.0")));

        let r = VersionRange::parse(">1.0.0").unwrap();
        assert!(!r.matches(&v("1.0.0")));
        assert!(r.matches(&v("100.0.0")));
    }

    #[test]
    fn test_prerelease_excluded_unless_bound_is_prerelease() {
        let r = VersionRange::parse("^1.0.0").unwrap();
        assert!(!r.matches(&v("1.5.0-beta.1")));

        let r = VersionRange::parse("^1.5.0-beta.1").unwrap();
        assert!(r.matches(&v("1.5.0-beta.2")));
        assert!(!r.matches(&v("1.6.0-beta.1")));
    }

    // --- intersect ---

    #[test]
    fn test_intersect_caret_and_tilde() {
        let caret = VersionRange::parse("^1.2.0").unwrap();
        let tilde = VersionRange::parse("~1.3.0").unwrap();
        let both = caret.intersect(&tilde).unwrap();
        assert_eq!(both.kind(), RangeKind::Caret);
        assert_eq!(both.lower().unwrap().version, v("1.3.0"));
        assert_eq!(both.upper().unwrap().version, v("1.4.0"));
        assert!(!both.matches(&v("1.2.5")));
    }

    #[test]
    fn test_intersect_disjoint() {
        let a = VersionRange::parse("^1.0.0").unwrap();
        let b = VersionRange::parse("^2.0.0").unwrap();
        assert!(a.intersect(&b).is_none());

        let a = VersionRange::parse("<1.0.0").unwrap();
        let b = VersionRange::parse(">=1.0.0").unwrap();
        assert!(a.intersect(&b).is_none());
    }

    #[test]
    fn test_intersect_touching_inclusive_bounds() {
        let a = VersionRange::parse("<=1.0.0").unwrap();
        let b = VersionRange::parse(">=1.0.0").unwrap();
        let both = a.intersect(&b).unwrap();
        assert!(both.matches(&v("1.0.0")));
    }

    #[test]
    fn test_intersect_with_any() {
        let any = VersionRange::parse("*").unwrap();
        let exact = VersionRange::parse("1.4.0").unwrap();
        let both = any.intersect(&exact).unwrap();
        assert_eq!(both.kind(), RangeKind::Exact);
        assert!(both.matches(&v("1.4.0")));
        assert!(!both.matches(&v("1.4.1")));
    }

    // --- ordering ---

    #[test]
    fn test_total_order_by_precedence() {
        let mut ranges: Vec<VersionRange> = [">=1.0.0", "~1.3.0", "^1.2.0", "1.3.1", "^1.1.0"]
            .iter()
            .map(|s| VersionRange::parse(s).unwrap())
            .collect();
        ranges.sort();
        let order: Vec<&str> = ranges.iter().map(|r| r.as_str()).collect();
        assert_eq!(order, vec!["1.3.1", "^1.1.0", "^1.2.0", "~1.3.0", ">=1.0.0"]);
    }

    // --- serde ---

    #[test]
    fn test_serde_as_string() {
        let r = VersionRange::parse("^1.0.0").unwrap();
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, "\"^1.0.0\"");
        let back: VersionRange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
        assert!(serde_json::from_str::<VersionRange>("\"nonsense\"").is_err());
    }
}
