//! Version ranges in interval notation.
//!
//! Direct dependencies declare ranges such as `1.2.0` (minimum, inclusive,
//! unbounded above), `[1.2.0]` (exact) or `[1.0.0,2.0.0)` (half-open
//! interval). Resolution always prefers the lowest version that satisfies a
//! range, so restores stay stable as new versions are published.

use crate::{Error, Result};
use semver::Version;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Parse a version string, padding partial versions (`1`, `1.0`) to a full
/// `major.minor.patch` triple.
pub fn parse_version(input: &str) -> Result<Version> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidVersion {
            value: input.to_string(),
            message: "empty version".to_string(),
        });
    }

    let padded = match trimmed.split('.').count() {
        1 => format!("{trimmed}.0.0"),
        2 => format!("{trimmed}.0"),
        _ => trimmed.to_string(),
    };

    Version::parse(&padded).map_err(|e| Error::InvalidVersion {
        value: input.to_string(),
        message: e.to_string(),
    })
}

/// A version range over [`semver::Version`] in interval notation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    min: Option<Version>,
    min_inclusive: bool,
    max: Option<Version>,
    max_inclusive: bool,
}

impl VersionRange {
    /// The unbounded range, satisfied by every version.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            min: None,
            min_inclusive: true,
            max: None,
            max_inclusive: false,
        }
    }

    /// A range matching exactly one version.
    #[must_use]
    pub const fn exact(version: Version) -> Self {
        Self {
            min: Some(version),
            min_inclusive: true,
            max: None,
            max_inclusive: true,
        }
    }

    /// A minimum-inclusive, unbounded-above range.
    #[must_use]
    pub const fn at_least(version: Version) -> Self {
        Self {
            min: Some(version),
            min_inclusive: true,
            max: None,
            max_inclusive: false,
        }
    }

    /// Whether this range places no constraint at all.
    #[must_use]
    pub const fn is_all(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// Whether this range pins a single exact version.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.max_inclusive && self.min.is_some() && self.max.is_none() && self.min_inclusive
    }

    /// The lower bound, if any.
    #[must_use]
    pub const fn min_version(&self) -> Option<&Version> {
        self.min.as_ref()
    }

    /// Check whether `version` falls inside the range.
    #[must_use]
    pub fn satisfies(&self, version: &Version) -> bool {
        if let Some(min) = &self.min {
            if self.is_exact() {
                return version == min;
            }
            match version.cmp(min) {
                std::cmp::Ordering::Less => return false,
                std::cmp::Ordering::Equal if !self.min_inclusive => return false,
                _ => {}
            }
        }
        if let Some(max) = &self.max {
            match version.cmp(max) {
                std::cmp::Ordering::Greater => return false,
                std::cmp::Ordering::Equal if !self.max_inclusive => return false,
                _ => {}
            }
        }
        true
    }

    /// Select the lowest candidate satisfying the range.
    ///
    /// Restore resolves to the minimum applicable version so that newly
    /// published packages never change an existing resolution.
    pub fn best_match<'a, I>(&self, candidates: I) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        candidates
            .into_iter()
            .filter(|v| self.satisfies(v))
            .min()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exact() {
            if let Some(min) = &self.min {
                return write!(f, "[{min}]");
            }
        }
        match (&self.min, &self.max) {
            (Some(min), None) if self.min_inclusive => write!(f, "{min}"),
            (min, max) => {
                write!(f, "{}", if self.min_inclusive { '[' } else { '(' })?;
                if let Some(min) = min {
                    write!(f, "{min}")?;
                }
                write!(f, ",")?;
                if let Some(max) = max {
                    write!(f, "{max}")?;
                }
                write!(f, "{}", if self.max_inclusive { ']' } else { ')' })
            }
        }
    }
}

impl FromStr for VersionRange {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidRange {
                value: input.to_string(),
                message: "empty range".to_string(),
            });
        }

        let first = trimmed.as_bytes()[0];
        if first != b'[' && first != b'(' {
            // Bare version: minimum inclusive, unbounded above.
            return Ok(Self::at_least(parse_version(trimmed)?));
        }

        let last = trimmed.as_bytes()[trimmed.len() - 1];
        if last != b']' && last != b')' {
            return Err(Error::InvalidRange {
                value: input.to_string(),
                message: "unterminated interval".to_string(),
            });
        }

        let min_inclusive = first == b'[';
        let max_inclusive = last == b']';
        let inner = &trimmed[1..trimmed.len() - 1];

        let Some((lo, hi)) = inner.split_once(',') else {
            // Single version inside brackets: exact pin, e.g. [1.2.3].
            if !min_inclusive || !max_inclusive {
                return Err(Error::InvalidRange {
                    value: input.to_string(),
                    message: "exact ranges require inclusive brackets".to_string(),
                });
            }
            return Ok(Self::exact(parse_version(inner)?));
        };

        let min = if lo.trim().is_empty() {
            None
        } else {
            Some(parse_version(lo)?)
        };
        let max = if hi.trim().is_empty() {
            None
        } else {
            Some(parse_version(hi)?)
        };

        if min.is_none() && max.is_none() {
            return Err(Error::InvalidRange {
                value: input.to_string(),
                message: "interval has no bounds".to_string(),
            });
        }

        if let (Some(min), Some(max)) = (&min, &max) {
            if min > max {
                return Err(Error::InvalidRange {
                    value: input.to_string(),
                    message: "lower bound exceeds upper bound".to_string(),
                });
            }
        }

        Ok(Self {
            min,
            min_inclusive,
            // An inclusive-but-absent upper bound would be indistinguishable
            // from an exact pin, so normalize it away.
            max_inclusive: max_inclusive && max.is_some(),
            max,
        })
    }
}

impl Serialize for VersionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        parse_version(s).unwrap()
    }

    fn r(s: &str) -> VersionRange {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_version_pads_partial() {
        assert_eq!(v("1"), Version::new(1, 0, 0));
        assert_eq!(v("1.2"), Version::new(1, 2, 0));
        assert_eq!(v("1.2.3"), Version::new(1, 2, 3));
    }

    #[test]
    fn test_bare_version_is_min_inclusive() {
        let range = r("1.2.0");
        assert!(range.satisfies(&v("1.2.0")));
        assert!(range.satisfies(&v("9.0.0")));
        assert!(!range.satisfies(&v("1.1.9")));
    }

    #[test]
    fn test_exact_range() {
        let range = r("[1.2.3]");
        assert!(range.is_exact());
        assert!(range.satisfies(&v("1.2.3")));
        assert!(!range.satisfies(&v("1.2.4")));
    }

    #[test]
    fn test_half_open_interval() {
        let range = r("[1.0.0,2.0.0)");
        assert!(range.satisfies(&v("1.0.0")));
        assert!(range.satisfies(&v("1.9.9")));
        assert!(!range.satisfies(&v("2.0.0")));
    }

    #[test]
    fn test_exclusive_lower_bound() {
        let range = r("(1.0.0,2.0.0]");
        assert!(!range.satisfies(&v("1.0.0")));
        assert!(range.satisfies(&v("2.0.0")));
    }

    #[test]
    fn test_unbounded_below() {
        let range = r("(,2.0.0]");
        assert!(range.satisfies(&v("0.1.0")));
        assert!(!range.satisfies(&v("2.0.1")));
    }

    #[test]
    fn test_best_match_picks_lowest() {
        let range = r("1.0.0");
        let candidates = vec![v("2.0.0"), v("1.0.0"), v("1.5.0"), v("0.9.0")];
        assert_eq!(range.best_match(&candidates), Some(&v("1.0.0")));
    }

    #[test]
    fn test_best_match_none_when_unsatisfied() {
        let range = r("[3.0.0,)");
        let candidates = vec![v("1.0.0"), v("2.0.0")];
        assert_eq!(range.best_match(&candidates), None);
    }

    #[test]
    fn test_display_roundtrip() {
        for input in ["1.2.0", "[1.2.3]", "[1.0.0,2.0.0)", "(,2.0.0]", "(1.0.0,)"] {
            let range = r(input);
            assert_eq!(range, r(&range.to_string()));
        }
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        assert!("".parse::<VersionRange>().is_err());
        assert!("[1.0.0".parse::<VersionRange>().is_err());
        assert!("[,)".parse::<VersionRange>().is_err());
        assert!("[2.0.0,1.0.0]".parse::<VersionRange>().is_err());
        assert!("(1.2.3)".parse::<VersionRange>().is_err());
    }
}
