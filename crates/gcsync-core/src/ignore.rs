//! Ignore patterns
//!
//! Compiles the glob-style `ignore` entries of a sync rule into anchored
//! regular expressions and answers whether a rule-relative path is ignored.
//!
//! ## Glob syntax
//!
//! | Glob  | Meaning                                               |
//! |-------|-------------------------------------------------------|
//! | `**/` | zero or more leading path segments                    |
//! | `**`  | anything, including `/`                               |
//! | `*`   | zero or more characters, excluding `/`                |
//! | `?`   | exactly one character (any character, `/` included)   |
//!
//! Every other character is matched literally. Patterns match the whole
//! relative path, never a substring, and always use `/` as the separator.
//!
//! The compiled expressions are also handed to the transfer tool as its
//! exclusion list, so the watcher and the transfer agree on what is ignored.

use regex::Regex;
use thiserror::Error;

use crate::paths::{clean_slashes, to_slash};

/// Errors produced while compiling ignore patterns
#[derive(Debug, Error)]
pub enum PatternError {
    /// The pattern was empty (or only whitespace)
    #[error("Empty ignore pattern")]
    Empty,

    /// The translated expression was rejected by the regex engine
    #[error("Invalid ignore pattern '{pattern}': {source}")]
    Invalid {
        /// The glob as written in the configuration
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A single compiled ignore entry
#[derive(Debug, Clone)]
struct CompiledPattern {
    glob: String,
    regex: Regex,
}

// ============================================================================
// IgnoreSet
// ============================================================================

/// Ordered set of compiled ignore predicates
///
/// Built once from a rule's `ignore` list and read-only afterwards. A path is
/// ignored when *any* pattern matches; there is no negation or precedence.
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    patterns: Vec<CompiledPattern>,
}

impl IgnoreSet {
    /// Compiles every glob in `patterns`, preserving their order
    ///
    /// # Errors
    /// Returns [`PatternError`] for the first pattern that is empty or does
    /// not translate into a valid expression.
    pub fn compile<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut compiled = Vec::new();
        for raw in patterns {
            let raw = raw.as_ref();
            if raw.trim().is_empty() {
                return Err(PatternError::Empty);
            }

            let glob = clean_slashes(&to_slash(raw));
            let expr = glob_to_regex(&glob);
            let regex = Regex::new(&expr).map_err(|source| PatternError::Invalid {
                pattern: raw.to_string(),
                source,
            })?;

            compiled.push(CompiledPattern { glob, regex });
        }

        Ok(Self { patterns: compiled })
    }

    /// Returns true if `relative` matches any compiled pattern
    ///
    /// `relative` must already use `/` separators.
    pub fn is_match(&self, relative: &str) -> bool {
        self.patterns.iter().any(|p| p.regex.is_match(relative))
    }

    /// The anchored expressions, in configuration order
    pub fn expressions(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.regex.as_str())
    }

    /// The normalised globs, in configuration order
    pub fn globs(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.glob.as_str())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Translates one normalised glob into an anchored regular expression
fn glob_to_regex(glob: &str) -> String {
    let mut expr = String::with_capacity(glob.len() * 2 + 2);
    expr.push('^');

    let mut chars = glob.chars().peekable();
    let mut buf = [0u8; 4];
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    expr.push_str("(?:.*/)?");
                } else {
                    expr.push_str(".*");
                }
            }
            '*' => expr.push_str("[^/]*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }

    expr.push('$');
    expr
}
