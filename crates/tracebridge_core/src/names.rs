//! Qualified code-unit names (`pkg.sub.Unit`).

use std::fmt;
use std::str::FromStr;

use crate::errors::NameError;

/// Separator between package segments and the unit's simple name.
pub const SEGMENT_SEPARATOR: char = '.';

/// A validated, non-empty, dot-separated code-unit name.
///
/// Every segment is an identifier: a letter, `_` or `$`, followed by letters, digits, `_` or `$`.
/// Nested units keep their `$` suffix (`Outer$Inner`); it is part of the last segment. Path
/// separators can never appear, so a name always maps to a single location below a namespace root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName(String);

impl QualifiedName {
    /// Parse and validate a qualified name.
    ///
    /// Rejects empty input, empty segments (`a..b`, `.a`, `a.`), and segments that are not
    /// identifiers (whitespace, `/`, `\`, a leading digit, ...).
    pub fn parse(raw: &str) -> Result<Self, NameError> {
        if raw.is_empty() {
            return Err(NameError::Empty);
        }
        for segment in raw.split(SEGMENT_SEPARATOR) {
            let mut chars = segment.chars();
            let invalid = match chars.next() {
                None => return Err(NameError::EmptySegment { name: raw.to_string() }),
                Some(first) if !is_identifier_start(first) => Some(first),
                Some(_) => chars.find(|&c| !is_identifier_part(c)),
            };
            if let Some(ch) = invalid {
                return Err(NameError::InvalidCharacter {
                    name: raw.to_string(),
                    ch,
                });
            }
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the dot-separated segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEGMENT_SEPARATOR)
    }

    /// Everything before the last `.`; empty for the default package.
    pub fn package(&self) -> &str {
        self.0
            .rfind(SEGMENT_SEPARATOR)
            .map(|idx| &self.0[..idx])
            .unwrap_or("")
    }

    /// The last segment.
    pub fn simple_name(&self) -> &str {
        self.0
            .rfind(SEGMENT_SEPARATOR)
            .map(|idx| &self.0[idx + 1..])
            .unwrap_or(&self.0)
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_identifier_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for QualifiedName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for QualifiedName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
