//! Watch pattern parsing and matching.
//!
//! A pattern such as `static/**/*.*` is split into a literal base directory
//! (`static`), which is what gets registered with the OS watcher, and the
//! glob remainder (`**/*.*`), which filters the events.

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern, PatternError};

const GLOB_META: [char; 3] = ['*', '?', '['];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// One watched glob, rooted at a base directory.
#[derive(Debug, Clone)]
pub struct WatchPattern {
    raw: String,
    base: PathBuf,
    remainder: String,
    matcher: Pattern,
}

impl WatchPattern {
    /// Parse `pattern` relative to `root`.
    pub fn new(root: &Path, pattern: &str) -> Result<Self, PatternError> {
        let normalized = pattern.replace('\\', "/");
        let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty() && *s != ".").collect();

        let literal = segments
            .iter()
            .take_while(|s| !s.contains(&GLOB_META[..]))
            .count();
        // A fully literal pattern names a file: watch its directory.
        let split = if literal == segments.len() {
            literal.saturating_sub(1)
        } else {
            literal
        };

        let base = segments[..split]
            .iter()
            .fold(root.to_path_buf(), |acc, s| acc.join(s));
        let remainder = segments[split..].join("/");

        Self::with_base(pattern, base, remainder)
    }

    fn with_base(raw: &str, base: PathBuf, remainder: String) -> Result<Self, PatternError> {
        let full = format!(
            "{}/{}",
            Pattern::escape(&base.to_string_lossy()).trim_end_matches('/'),
            remainder
        );
        Ok(Self {
            raw: raw.to_string(),
            matcher: Pattern::new(&full)?,
            base,
            remainder,
        })
    }

    /// Same pattern anchored at a different (e.g. canonicalized) base.
    pub fn rebase(&self, base: PathBuf) -> Result<Self, PatternError> {
        Self::with_base(&self.raw, base, self.remainder.clone())
    }

    /// The pattern as configured.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Directory registered with the OS watcher.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Whether events below the base's immediate children can match.
    pub fn is_recursive(&self) -> bool {
        self.remainder.contains('/') || self.remainder.contains("**")
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.matcher.matches_path_with(path, MATCH_OPTIONS)
    }
}
