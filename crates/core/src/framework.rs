//! Target frameworks and framework/runtime pairs.
//!
//! A framework string such as `net8.0` or `netstandard2.0` names an
//! alphabetic identifier followed by a `major.minor` version. The special
//! framework `any` matches everything. Compatibility is same-identifier,
//! lower-or-equal version: an asset group built for `net6.0` is usable from
//! a `net8.0` target, never the other way around.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A parsed target framework.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Framework {
    identifier: String,
    major: u32,
    minor: u32,
}

impl Framework {
    /// The wildcard framework, compatible with every target.
    #[must_use]
    pub fn any() -> Self {
        Self {
            identifier: "any".to_string(),
            major: 0,
            minor: 0,
        }
    }

    /// Whether this is the wildcard framework.
    #[must_use]
    pub fn is_any(&self) -> bool {
        self.identifier == "any"
    }

    /// The framework family identifier (e.g. `net`, `netstandard`).
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// `(major, minor)` framework version.
    #[must_use]
    pub const fn version(&self) -> (u32, u32) {
        (self.major, self.minor)
    }

    /// Whether the platform version is present when a platform is implied.
    ///
    /// A zero version on a non-wildcard framework indicates the original
    /// string carried no usable version digits.
    #[must_use]
    pub const fn has_version(&self) -> bool {
        self.major > 0 || self.minor > 0
    }

    /// Whether an asset built for `self` can be consumed by `target`.
    #[must_use]
    pub fn is_usable_from(&self, target: &Self) -> bool {
        if self.is_any() {
            return true;
        }
        self.identifier.eq_ignore_ascii_case(&target.identifier)
            && (self.major, self.minor) <= (target.major, target.minor)
    }
}

impl FromStr for Framework {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidFramework {
                value: input.to_string(),
            });
        }
        if trimmed.eq_ignore_ascii_case("any") {
            return Ok(Self::any());
        }

        let split = trimmed
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (identifier, version) = trimmed.split_at(split);

        if identifier.is_empty() || !identifier.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(Error::InvalidFramework {
                value: input.to_string(),
            });
        }

        let (major, minor) = if version.is_empty() {
            (0, 0)
        } else {
            let mut parts = version.splitn(2, '.');
            let major = parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| Error::InvalidFramework {
                    value: input.to_string(),
                })?;
            let minor = match parts.next() {
                Some(p) => p.parse().map_err(|_| Error::InvalidFramework {
                    value: input.to_string(),
                })?,
                None => 0,
            };
            (major, minor)
        };

        Ok(Self {
            identifier: identifier.to_lowercase(),
            major,
            minor,
        })
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            write!(f, "any")
        } else {
            write!(f, "{}{}.{}", self.identifier, self.major, self.minor)
        }
    }
}

impl Serialize for Framework {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Framework {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One (framework, runtime identifier) restore target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameworkRuntimePair {
    /// The target framework.
    pub framework: Framework,
    /// Runtime identifier (e.g. `linux-x64`), or `None` for the
    /// compile-time-only graph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
}

impl FrameworkRuntimePair {
    /// A framework-only pair.
    #[must_use]
    pub const fn new(framework: Framework) -> Self {
        Self {
            framework,
            runtime: None,
        }
    }

    /// A framework + runtime pair.
    #[must_use]
    pub fn with_runtime(framework: Framework, runtime: impl Into<String>) -> Self {
        Self {
            framework,
            runtime: Some(runtime.into()),
        }
    }

    /// Canonical target name used in artifacts and diagnostics:
    /// `net8.0` or `net8.0/linux-x64`.
    #[must_use]
    pub fn target_name(&self) -> String {
        match &self.runtime {
            Some(rid) => format!("{}/{rid}", self.framework),
            None => self.framework.to_string(),
        }
    }
}

impl fmt::Display for FrameworkRuntimePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.target_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fw(s: &str) -> Framework {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_common_frameworks() {
        assert_eq!(fw("net8.0").identifier(), "net");
        assert_eq!(fw("net8.0").version(), (8, 0));
        assert_eq!(fw("netstandard2.0").identifier(), "netstandard");
        assert_eq!(fw("netstandard2.0").version(), (2, 0));
        assert!(fw("any").is_any());
    }

    #[test]
    fn test_compatibility_same_family_lower_or_equal() {
        assert!(fw("net6.0").is_usable_from(&fw("net8.0")));
        assert!(fw("net8.0").is_usable_from(&fw("net8.0")));
        assert!(!fw("net8.0").is_usable_from(&fw("net6.0")));
        assert!(!fw("netstandard2.0").is_usable_from(&fw("net8.0")));
        assert!(fw("any").is_usable_from(&fw("net8.0")));
    }

    #[test]
    fn test_invalid_frameworks_rejected() {
        assert!("".parse::<Framework>().is_err());
        assert!("8.0".parse::<Framework>().is_err());
        assert!("net8.x".parse::<Framework>().is_err());
    }

    #[test]
    fn test_target_name() {
        let pair = FrameworkRuntimePair::with_runtime(fw("net8.0"), "linux-x64");
        assert_eq!(pair.target_name(), "net8.0/linux-x64");
        assert_eq!(FrameworkRuntimePair::new(fw("net8.0")).target_name(), "net8.0");
    }

    #[test]
    fn test_display_roundtrip() {
        for s in ["net8.0", "netstandard2.1", "any"] {
            assert_eq!(fw(s).to_string(), s);
        }
    }
}
