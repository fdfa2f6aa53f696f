//! Dotted attribute paths.
//!
//! Segment 0 names a declared field; any further segments are dynamic keys
//! inside that field's mapping value (`vars.os`, `comments.<id>`).

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A parsed, non-empty attribute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AttributePath {
    segments: Vec<String>,
}

impl AttributePath {
    /// Parses a dotted path. Empty paths and empty segments are rejected.
    pub fn parse(s: &str) -> Result<Self, Error> {
        if s.is_empty() {
            return Err(Error::InvalidPath {
                path: s.to_string(),
                reason: "path is empty",
            });
        }

        let segments: Vec<String> = s.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(Error::InvalidPath {
                path: s.to_string(),
                reason: "path contains an empty segment",
            });
        }

        Ok(Self { segments })
    }

    /// Builds a path from a root field and nested keys.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        let joined = segments.join(".");
        if segments.is_empty() || segments.iter().any(|s| s.is_empty() || s.contains('.')) {
            return Err(Error::InvalidPath {
                path: joined,
                reason: "segments must be non-empty and must not contain '.'",
            });
        }
        Ok(Self { segments })
    }

    /// The declared field this path starts at.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.segments[0]
    }

    /// Keys below the root field (empty for a plain field path).
    #[must_use]
    pub fn nested(&self) -> &[String] {
        &self.segments[1..]
    }

    /// Whether the path addresses something below the root field.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.segments.len() > 1
    }

    /// All segments, root first.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether `self` equals `other` or lies underneath it.
    #[must_use]
    pub fn starts_with(&self, other: &AttributePath) -> bool {
        self.segments.len() >= other.segments.len()
            && self.segments[..other.segments.len()] == other.segments[..]
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl FromStr for AttributePath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AttributePath {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<AttributePath> for String {
    fn from(path: AttributePath) -> Self {
        path.to_string()
    }
}
