//! Version Compatibility Matcher
//!
//! Decides whether an installed client-library version satisfies a list of
//! declarative version patterns such as `2.0.*` or `1.0.[0-9]`.
//!
//! Matching is position-anchored at the start of the version string only,
//! so a pattern that matches a prefix of the version is a match (`1.0.1`
//! matches `1.0.15`). Bracketed ranges are passed to the regex engine as a
//! character class: `[0-9]` behaves like a numeric range, while `[0-10]`
//! only matches the single characters `0` and `1`. Existing allow-lists rely
//! on this behavior, so it is kept as is.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Grammar for a concrete `MAJOR.MINOR.PATCH` version
static VERSION_FORMAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+$").unwrap());

/// Grammar for a version pattern: three segments of `*`, `N` or `[LO-HI]`
static PATTERN_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\*|\d+|\[\d+-\d+\])\.(\*|\d+|\[\d+-\d+\])\.(\*|\d+|\[\d+-\d+\])$").unwrap()
});

// =============================================================================
// SDK Version
// =============================================================================

/// A validated three-segment dotted version string
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SdkVersion(String);

impl SdkVersion {
    /// Parse a `major.minor.patch` version string
    pub fn parse(value: &str) -> Result<Self> {
        if !VERSION_FORMAT.is_match(value) {
            return Err(Error::InvalidVersionFormat {
                value: value.to_string(),
            });
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SdkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SdkVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SdkVersion {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SdkVersion> for String {
    fn from(version: SdkVersion) -> Self {
        version.0
    }
}

// =============================================================================
// Version Pattern
// =============================================================================

/// A declarative version pattern compiled into a start-anchored matcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionPattern {
    source: String,
    matcher: Regex,
}

impl VersionPattern {
    /// Parse and compile a pattern
    pub fn parse(pattern: &str) -> Result<Self> {
        if !PATTERN_FORMAT.is_match(pattern) {
            return Err(Error::InvalidVersionFormat {
                value: pattern.to_string(),
            });
        }

        let body = pattern
            .split('.')
            .map(|segment| match segment {
                "*" => "[^.]+".to_string(),
                s if s.starts_with('[') => s.to_string(),
                s => regex::escape(s),
            })
            .collect::<Vec<_>>()
            .join(r"\.");

        // reversed bounds such as [5-1] are rejected by the regex engine
        let matcher = Regex::new(&format!("^{}", body)).map_err(|_| Error::InvalidVersionFormat {
            value: pattern.to_string(),
        })?;

        Ok(Self {
            source: pattern.to_string(),
            matcher,
        })
    }

    /// Check whether the pattern matches a version
    #[inline]
    pub fn matches(&self, version: &SdkVersion) -> bool {
        self.matcher.is_match(version.as_str())
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl PartialEq for VersionPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for VersionPattern {}

impl fmt::Display for VersionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl FromStr for VersionPattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionPattern {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<VersionPattern> for String {
    fn from(pattern: VersionPattern) -> Self {
        pattern.source
    }
}

// =============================================================================
// Matching
// =============================================================================

/// Check whether `version` satisfies any of `patterns`
///
/// The version is validated first. Patterns are validated lazily in order,
/// so a malformed pattern after the first match is never inspected.
pub fn is_sdk_compatible<S: AsRef<str>>(version: &str, patterns: &[S]) -> Result<bool> {
    let version = SdkVersion::parse(version)?;

    for pattern in patterns {
        let pattern = VersionPattern::parse(pattern.as_ref())?;
        if pattern.matches(&version) {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Check a validated version against precompiled patterns
pub fn matches_any(version: &SdkVersion, patterns: &[VersionPattern]) -> bool {
    patterns.iter().any(|pattern| pattern.matches(version))
}
