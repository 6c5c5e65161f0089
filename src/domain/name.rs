//! Namespace names
//!
//! A namespace name is symbol text such as `my.app.core`. Names are compared
//! and ordered as plain strings, which keeps every traversal deterministic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum NameError {
    #[error("Namespace name is empty")]
    Empty,

    #[error("Invalid namespace name '{0}': {1}")]
    Invalid(String, &'static str),
}

/// Name of a namespace, e.g. `my.app.core`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NamespaceName(String);

impl NamespaceName {
    /// Creates a name, validating the symbol text
    pub fn new(name: impl Into<String>) -> Result<Self, NameError> {
        let name = name.into();
        validate(&name)?;
        Ok(Self(name))
    }

    /// Returns the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the dotted segments of the name
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Joins a prefix-list entry onto this name (`foo.bar` + `baz` = `foo.bar.baz`)
    pub fn child(&self, suffix: &str) -> Result<Self, NameError> {
        Self::new(format!("{}.{}", self.0, suffix))
    }
}

fn validate(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }

    let first = name.chars().next().unwrap_or(' ');
    if first.is_ascii_digit() {
        return Err(NameError::Invalid(name.to_string(), "starts with a digit"));
    }
    if first == ':' {
        return Err(NameError::Invalid(name.to_string(), "looks like a keyword"));
    }
    if name.chars().any(|c| c.is_whitespace() || "()[]{}\"';@^`~\\,".contains(c)) {
        return Err(NameError::Invalid(name.to_string(), "contains a reserved character"));
    }
    if name.starts_with('.') || name.ends_with('.') || name.contains("..") {
        return Err(NameError::Invalid(name.to_string(), "has an empty segment"));
    }

    Ok(())
}

impl fmt::Display for NamespaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NamespaceName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.trim())
    }
}

impl TryFrom<String> for NamespaceName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NamespaceName> for String {
    fn from(name: NamespaceName) -> Self {
        name.0
    }
}

impl AsRef<str> for NamespaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
