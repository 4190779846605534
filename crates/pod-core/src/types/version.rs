//! Component versions.
//!
//! A version is a numeric `major.minor.micro` triple with an optional
//! qualifier. The triple is compared numerically first and the qualifier
//! lexically as a tiebreak, so `1.0.0` sorts before `1.0.0.v2024`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Component version (major.minor.micro.qualifier)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub micro: u64,
    pub qualifier: String,
}

/// Version and version range parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version format: '{input}'")]
    InvalidFormat { input: String },

    #[error("Invalid number in version: '{component}'")]
    InvalidNumber { component: String },

    #[error("Invalid version qualifier: '{qualifier}'")]
    InvalidQualifier { qualifier: String },

    #[error("Invalid version range '{input}': {reason}")]
    InvalidRange { input: String, reason: String },

    #[error("Version '{version}' is declared without a match policy")]
    MissingMatchPolicy { version: String },

    #[error("Unknown match policy '{policy}'")]
    UnknownMatchPolicy { policy: String },
}

impl Version {
    /// The empty version, used as the lower bound of an unconstrained range
    pub const EMPTY: Version = Version {
        major: 0,
        minor: 0,
        micro: 0,
        qualifier: String::new(),
    };

    /// Create a new version without qualifier
    pub fn new(major: u64, minor: u64, micro: u64) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }

    /// Create a new version with a qualifier
    pub fn with_qualifier(major: u64, minor: u64, micro: u64, qualifier: impl Into<String>) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: qualifier.into(),
        }
    }

    /// Parse a version string, failing on malformed input
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        input.parse()
    }

    /// Check if this is the empty version 0.0.0
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Check if this version carries a qualifier
    pub fn has_qualifier(&self) -> bool {
        !self.qualifier.is_empty()
    }
}

fn is_qualifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Err(VersionError::InvalidFormat {
                input: s.to_string(),
            });
        }

        // At most three numeric segments; everything after the third dot is the qualifier
        let parts: Vec<&str> = input.splitn(4, '.').collect();

        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(parts.iter()) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(VersionError::InvalidNumber {
                    component: part.to_string(),
                });
            }
            *slot = part.parse().map_err(|_| VersionError::InvalidNumber {
                component: part.to_string(),
            })?;
        }

        let qualifier = match parts.get(3) {
            Some(q) if !q.is_empty() && q.chars().all(is_qualifier_char) => q.to_string(),
            Some(q) => {
                return Err(VersionError::InvalidQualifier {
                    qualifier: q.to_string(),
                })
            },
            None => String::new(),
        };

        Ok(Version {
            major: numbers[0],
            minor: numbers[1],
            micro: numbers[2],
            qualifier,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;

        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }

        Ok(())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.micro)
            .cmp(&(other.major, other.minor, other.micro))
            .then_with(|| self.qualifier.cmp(&other.qualifier))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parsing() {
        let v = Version::from_str("1.2.3").unwrap();
        assert_eq!(v.major, 1);
        assert_eq!(v.minor, 2);
        assert_eq!(v.micro, 3);
        assert!(!v.has_qualifier());
    }

    #[test]
    fn test_version_short_forms() {
        assert_eq!(Version::parse("1").unwrap(), Version::new(1, 0, 0));
        assert_eq!(Version::parse("1.5").unwrap(), Version::new(1, 5, 0));
        assert_eq!(Version::parse(" 2.0.1 ").unwrap(), Version::new(2, 0, 1));
    }

    #[test]
    fn test_version_with_qualifier() {
        let v = Version::from_str("1.2.3.v20240101-1200").unwrap();
        assert_eq!(v, Version::with_qualifier(1, 2, 3, "v20240101-1200"));
        assert_eq!(v.to_string(), "1.2.3.v20240101-1200");
    }

    #[test]
    fn test_malformed_versions_are_rejected() {
        for input in ["", "   ", "a.b.c", "1..2", "1.2.", "-1.0.0", "1.2.x", "1.2.3.", "1.2.3.q.r", "1.2.3.q!"] {
            assert!(Version::parse(input).is_err(), "'{}' should not parse", input);
        }
        assert!(matches!(
            Version::parse("1.2.3.bad+q"),
            Err(VersionError::InvalidQualifier { .. })
        ));
        assert!(matches!(
            Version::parse("99999999999999999999.0.0"),
            Err(VersionError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_version_comparison() {
        let v1 = Version::new(1, 0, 0);
        let v2 = Version::new(2, 0, 0);
        let v3 = Version::new(1, 1, 0);
        let v4 = Version::with_qualifier(1, 0, 0, "a");
        let v5 = Version::with_qualifier(1, 0, 0, "b");

        assert!(v1 < v2);
        assert!(v1 < v3);
        assert!(v3 < v2);
        // qualifier only breaks ties between equal triples
        assert!(v1 < v4);
        assert!(v4 < v5);
        assert!(v5 < v3);
    }

    #[test]
    fn test_empty_version() {
        assert!(Version::EMPTY.is_empty());
        assert!(Version::parse("0.0.0").unwrap().is_empty());
        assert!(!Version::with_qualifier(0, 0, 0, "q").is_empty());
    }

    #[test]
    fn test_serde_as_string() {
        let v = Version::with_qualifier(3, 1, 4, "beta");
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"3.1.4.beta\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
        assert!(serde_json::from_str::<Version>("\"not-a-version\"").is_err());
    }
}
