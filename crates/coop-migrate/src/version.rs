use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Version assumed when no marker has been persisted yet.
pub const INITIAL_VERSION: &str = "1.0.0";

/// Error parsing a dotted version string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    /// The input was empty.
    #[error("version string is empty")]
    Empty,
    /// Two dots in a row, or a leading/trailing dot.
    #[error("version {input:?} has an empty segment at position {position}")]
    EmptySegment { input: String, position: usize },
    /// A segment that is not a non-negative integer fitting in `u64`.
    #[error("version {input:?} has an invalid segment {segment:?}")]
    InvalidSegment { input: String, segment: String },
}

/// A dot-separated version such as `1.0.2`.
///
/// Comparison is numeric, segment by segment, with missing trailing
/// segments treated as `0`, so `1.2` and `1.2.0` are equal. The original
/// text is kept verbatim and is what gets persisted and displayed.
///
/// ```
/// use coop_migrate::SchemaVersion;
///
/// let a: SchemaVersion = "1.2".parse().unwrap();
/// let b: SchemaVersion = "1.2.0".parse().unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "1.2");
/// assert!("1.10.0".parse::<SchemaVersion>().unwrap() > b);
/// ```
#[derive(Debug, Clone)]
pub struct SchemaVersion {
    raw: String,
    segments: Vec<u64>,
}

impl SchemaVersion {
    /// Parse a version string. Every segment must be a run of ASCII digits.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        if input.is_empty() {
            return Err(VersionError::Empty);
        }

        let mut segments = Vec::new();
        for (position, segment) in input.split('.').enumerate() {
            if segment.is_empty() {
                return Err(VersionError::EmptySegment {
                    input: input.to_string(),
                    position,
                });
            }
            let invalid = || VersionError::InvalidSegment {
                input: input.to_string(),
                segment: segment.to_string(),
            };
            if !segment.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            segments.push(segment.parse::<u64>().map_err(|_| invalid())?);
        }

        Ok(Self {
            raw: input.to_string(),
            segments,
        })
    }

    /// The version a fresh store starts at (`1.0.0`).
    pub fn initial() -> Self {
        Self {
            raw: INITIAL_VERSION.to_string(),
            segments: vec![1, 0, 0],
        }
    }

    /// The text this version was parsed from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Numeric segments, as written (no padding).
    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    /// Segments with trailing zeros removed; equal versions share this form.
    fn significant(&self) -> &[u64] {
        let len = self
            .segments
            .iter()
            .rposition(|&s| s != 0)
            .map_or(0, |i| i + 1);
        &self.segments[..len]
    }
}

/// Compare two version strings numerically.
///
/// Fails if either side is not a well-formed version.
///
/// ```
/// use std::cmp::Ordering;
/// use coop_migrate::compare;
///
/// assert_eq!(compare("2.1", "2.1.0").unwrap(), Ordering::Equal);
/// assert_eq!(compare("1.0.10", "1.0.9").unwrap(), Ordering::Greater);
/// assert!(compare("1.x", "1.0").is_err());
/// ```
pub fn compare(a: &str, b: &str) -> Result<Ordering, VersionError> {
    Ok(SchemaVersion::parse(a)?.cmp(&SchemaVersion::parse(b)?))
}

impl Ord for SchemaVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let a = self.segments.get(i).copied().unwrap_or(0);
            let b = other.segments.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for SchemaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SchemaVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SchemaVersion {}

impl Hash for SchemaVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl FromStr for SchemaVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for SchemaVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for SchemaVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn v(s: &str) -> SchemaVersion {
        SchemaVersion::parse(s).unwrap()
    }

    #[test]
    fn padding_equivalence() {
        assert_eq!(compare("2.1", "2.1.0").unwrap(), Ordering::Equal);
        assert_eq!(compare("1.2", "1.2.0").unwrap(), Ordering::Equal);
        assert_eq!(compare("1", "1.0.0.0").unwrap(), Ordering::Equal);
    }

    #[test]
    fn numeric_not_lexicographic() {
        assert_eq!(compare("1.0.10", "1.0.9").unwrap(), Ordering::Greater);
        assert_eq!(compare("1.2.0", "1.10.0").unwrap(), Ordering::Less);
        assert_eq!(compare("2", "1.99.99").unwrap(), Ordering::Greater);
    }

    #[test]
    fn first_difference_wins() {
        assert_eq!(compare("1.0.1", "1.0.2").unwrap(), Ordering::Less);
        assert_eq!(compare("1.1", "1.0.5").unwrap(), Ordering::Greater);
        assert_eq!(compare("1.0.0.1", "1.0").unwrap(), Ordering::Greater);
    }

    #[test]
    fn leading_zeros_are_numeric() {
        assert_eq!(compare("01.002", "1.2").unwrap(), Ordering::Equal);
        assert_eq!(v("01.002").as_str(), "01.002");
    }

    #[test]
    fn malformed_inputs_fail() {
        assert_eq!(SchemaVersion::parse(""), Err(VersionError::Empty));
        assert!(matches!(
            SchemaVersion::parse("1..2"),
            Err(VersionError::EmptySegment { position: 1, .. })
        ));
        assert!(matches!(
            SchemaVersion::parse(".1"),
            Err(VersionError::EmptySegment { position: 0, .. })
        ));
        assert!(matches!(
            SchemaVersion::parse("1.0."),
            Err(VersionError::EmptySegment { position: 2, .. })
        ));
        assert!(matches!(
            SchemaVersion::parse("1.0.0-beta"),
            Err(VersionError::InvalidSegment { .. })
        ));
        assert!(matches!(
            SchemaVersion::parse("v1.0"),
            Err(VersionError::InvalidSegment { .. })
        ));
        assert!(matches!(
            SchemaVersion::parse("1.+2"),
            Err(VersionError::InvalidSegment { .. })
        ));
        assert!(matches!(
            SchemaVersion::parse(" 1.0"),
            Err(VersionError::InvalidSegment { .. })
        ));
        assert!(matches!(
            SchemaVersion::parse("1.99999999999999999999999"),
            Err(VersionError::InvalidSegment { .. })
        ));
        assert!(compare("1.0", "abc").is_err());
    }

    #[test]
    fn initial_version() {
        assert_eq!(SchemaVersion::initial(), v("1.0.0"));
        assert_eq!(SchemaVersion::initial().as_str(), INITIAL_VERSION);
    }

    #[test]
    fn hash_consistent_with_eq() {
        let mut set = HashSet::new();
        set.insert(v("1.2"));
        assert!(set.contains(&v("1.2.0")));
        assert!(set.contains(&v("1.2.0.0")));
        assert!(!set.contains(&v("1.2.1")));
    }

    #[test]
    fn serde_as_plain_string() {
        let json = serde_json::to_string(&v("1.0.2")).unwrap();
        assert_eq!(json, "\"1.0.2\"");
        let back: SchemaVersion = serde_json::from_str("\"1.0\"").unwrap();
        assert_eq!(back.as_str(), "1.0");
        assert!(serde_json::from_str::<SchemaVersion>("\"one\"").is_err());
    }

    fn version_string() -> impl Strategy<Value = String> {
        prop::collection::vec(0u64..20, 1..5).prop_map(|segs| {
            segs.iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(".")
        })
    }

    proptest! {
        #[test]
        fn antisymmetric(a in version_string(), b in version_string()) {
            let ab = compare(&a, &b).unwrap();
            let ba = compare(&b, &a).unwrap();
            prop_assert_eq!(ab, ba.reverse());
        }

        #[test]
        fn reflexive(a in version_string()) {
            prop_assert_eq!(compare(&a, &a).unwrap(), Ordering::Equal);
        }

        #[test]
        fn zero_padding_is_neutral(a in version_string(), zeros in 0usize..4) {
            let padded = format!("{a}{}", ".0".repeat(zeros));
            prop_assert_eq!(compare(&a, &padded).unwrap(), Ordering::Equal);
        }

        #[test]
        fn transitive(a in version_string(), b in version_string(), c in version_string()) {
            let (a, b, c) = (v(&a), v(&b), v(&c));
            if a <= b && b <= c {
                prop_assert!(a <= c);
            }
        }
    }
}
