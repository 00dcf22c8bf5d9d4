//! File-name filter for watched paths.
//!
//! The filter is a single glob matched against the file name only (never the
//! directory part), e.g. `*.log`, `*.*` or `data_?.csv`. Matching is case-sensitive, the same
//! as the underlying file systems on Linux.

use std::path::Path;

use globset::{GlobBuilder, GlobMatcher};

use crate::error::ConfigError;

/// Pattern that matches every file.
pub const MATCH_ALL: &str = "*";

/// A validated single-glob file-name filter.
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    pattern: String,
    matcher: GlobMatcher,
}

impl ExtensionFilter {
    /// Parses and validates a filter pattern.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidFilter`] if the pattern is empty, contains
    /// a path separator, or is not a valid glob.
    pub fn parse(pattern: &str) -> Result<Self, ConfigError> {
        let pattern = pattern.trim();
        let invalid = |reason: &str| ConfigError::InvalidFilter {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if pattern.is_empty() {
            return Err(invalid("pattern is empty"));
        }
        if pattern.contains('/') || pattern.contains('\\') {
            return Err(invalid("pattern must not contain a path separator"));
        }

        let matcher = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| invalid(&e.to_string()))?
            .compile_matcher();

        Ok(Self {
            pattern: pattern.to_string(),
            matcher,
        })
    }

    /// A filter that accepts every file.
    #[must_use]
    pub fn match_all() -> Self {
        Self::parse(MATCH_ALL).unwrap_or_else(|_| unreachable!("'*' is a valid glob"))
    }

    /// The pattern as given (trimmed).
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether the file name of `path` matches.
    ///
    /// Paths without a file name (`/`, `..`) never match.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| self.matcher.is_match(Path::new(name)))
    }
}

impl Default for ExtensionFilter {
    fn default() -> Self {
        Self::match_all()
    }
}

impl std::str::FromStr for ExtensionFilter {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for ExtensionFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.pattern)
    }
}
