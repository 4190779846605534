//! Version ranges and match policies.
//!
//! Ranges use interval notation: `[1.0,2.0)` includes 1.0 and excludes 2.0.
//! A bare version `1.0` means "1.0 or anything newer". The unconstrained
//! range `[0.0.0, +inf)` matches every version.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::version::{Version, VersionError};

/// Interval of accepted versions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    pub min: Version,
    pub min_inclusive: bool,
    /// Upper bound; `None` is +infinity
    pub max: Option<Version>,
    pub max_inclusive: bool,
}

/// How a declared base version widens into a range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchPolicy {
    /// Exactly the base version
    Perfect,
    /// Same major and minor
    Equivalent,
    /// Same major
    Compatible,
    /// The base version or anything newer
    GreaterOrEqual,
}

impl VersionRange {
    /// The range that matches every version
    pub const UNCONSTRAINED: VersionRange = VersionRange {
        min: Version::EMPTY,
        min_inclusive: true,
        max: None,
        max_inclusive: true,
    };

    /// Create a bounded range, rejecting intervals that cannot contain any version
    pub fn new(
        min: Version,
        min_inclusive: bool,
        max: Option<Version>,
        max_inclusive: bool,
    ) -> Result<Self, VersionError> {
        if let Some(upper) = &max {
            let empty = match min.cmp(upper) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Equal => !(min_inclusive && max_inclusive),
                std::cmp::Ordering::Less => false,
            };
            if empty {
                return Err(VersionError::InvalidRange {
                    input: format!("{}{},{}{}", if min_inclusive { '[' } else { '(' }, min, upper, if max_inclusive { ']' } else { ')' }),
                    reason: "lower bound is above upper bound".to_string(),
                });
            }
        }

        Ok(Self {
            min,
            min_inclusive,
            max,
            max_inclusive,
        })
    }

    /// Range containing exactly one version
    pub fn exact(version: Version) -> Self {
        Self {
            min: version.clone(),
            min_inclusive: true,
            max: Some(version),
            max_inclusive: true,
        }
    }

    /// Range containing `version` and everything newer
    pub fn at_least(version: Version) -> Self {
        Self {
            min: version,
            min_inclusive: true,
            max: None,
            max_inclusive: true,
        }
    }

    /// Widen a base version into a range according to a match policy.
    ///
    /// Fails when the exclusive upper bound would overflow the base's
    /// major or minor component.
    pub fn from_base(base: &Version, policy: MatchPolicy) -> Result<Self, VersionError> {
        let overflow = || VersionError::InvalidRange {
            input: base.to_string(),
            reason: format!("no upper bound for {} match: component overflows", policy),
        };

        let range = match policy {
            MatchPolicy::Perfect => Self::exact(base.clone()),
            MatchPolicy::Equivalent => Self {
                min: base.clone(),
                min_inclusive: true,
                max: Some(Version::new(base.major, base.minor.checked_add(1).ok_or_else(overflow)?, 0)),
                max_inclusive: false,
            },
            MatchPolicy::Compatible => Self {
                min: base.clone(),
                min_inclusive: true,
                max: Some(Version::new(base.major.checked_add(1).ok_or_else(overflow)?, 0, 0)),
                max_inclusive: false,
            },
            MatchPolicy::GreaterOrEqual => Self::at_least(base.clone()),
        };
        Ok(range)
    }

    /// Build the range for a declared dependency version and optional match policy.
    ///
    /// An absent or empty version means no constraint. A non-empty version
    /// without a policy is rejected rather than turned into a range that can
    /// never match.
    pub fn from_declaration(
        version: Option<&str>,
        policy: Option<MatchPolicy>,
    ) -> Result<Self, VersionError> {
        let Some(text) = version else {
            return Ok(Self::UNCONSTRAINED);
        };

        let base = Version::parse(text)?;
        if base.is_empty() {
            return Ok(Self::UNCONSTRAINED);
        }

        match policy {
            Some(policy) => Self::from_base(&base, policy),
            None => Err(VersionError::MissingMatchPolicy {
                version: text.trim().to_string(),
            }),
        }
    }

    /// Parse interval notation or a bare lower bound
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        input.parse()
    }

    /// Check if a version lies inside this range
    pub fn contains(&self, version: &Version) -> bool {
        let above_min = if self.min_inclusive {
            version >= &self.min
        } else {
            version > &self.min
        };

        let below_max = match &self.max {
            None => true,
            Some(max) if self.max_inclusive => version <= max,
            Some(max) => version < max,
        };

        above_min && below_max
    }

    /// Check if this range accepts every version
    pub fn is_unconstrained(&self) -> bool {
        *self == Self::UNCONSTRAINED
    }

    /// Check if this range accepts exactly one version
    pub fn is_exact(&self) -> bool {
        self.min_inclusive && self.max_inclusive && self.max.as_ref() == Some(&self.min)
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::UNCONSTRAINED
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let invalid = |reason: &str| VersionError::InvalidRange {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let min_inclusive = match input.chars().next() {
            Some('[') => true,
            Some('(') => false,
            Some(_) => return Ok(Self::at_least(Version::parse(input)?)),
            None => return Err(invalid("range is empty")),
        };

        let max_inclusive = match input.chars().last() {
            Some(']') if input.len() > 1 => true,
            Some(')') if input.len() > 1 => false,
            _ => return Err(invalid("missing closing ']' or ')'")),
        };

        let body = &input[1..input.len() - 1];
        let (lower, upper) = body
            .split_once(',')
            .ok_or_else(|| invalid("expected two bounds separated by ','"))?;

        let min = Version::parse(lower)?;
        let max = if upper.trim().is_empty() {
            None
        } else {
            Some(Version::parse(upper)?)
        };

        Self::new(min, min_inclusive, max, max_inclusive).map_err(|_| invalid("lower bound is above upper bound"))
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.max {
            None if self.min_inclusive => write!(f, "{}", self.min),
            None => write!(f, "({},)", self.min),
            Some(max) => write!(
                f,
                "{}{},{}{}",
                if self.min_inclusive { '[' } else { '(' },
                self.min,
                max,
                if self.max_inclusive { ']' } else { ')' }
            ),
        }
    }
}

impl Serialize for VersionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

impl FromStr for MatchPolicy {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "perfect" => Ok(MatchPolicy::Perfect),
            "equivalent" => Ok(MatchPolicy::Equivalent),
            "compatible" => Ok(MatchPolicy::Compatible),
            "greaterOrEqual" => Ok(MatchPolicy::GreaterOrEqual),
            other => Err(VersionError::UnknownMatchPolicy {
                policy: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchPolicy::Perfect => "perfect",
            MatchPolicy::Equivalent => "equivalent",
            MatchPolicy::Compatible => "compatible",
            MatchPolicy::GreaterOrEqual => "greaterOrEqual",
        };
        f.write_str(name)
    }
}
