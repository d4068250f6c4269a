//! Allow-list validation for strings interpolated into SQL text
//!
//! Native dbt project statements cannot bind object names, branch refs or
//! target names as parameters, so every such value must pass one of these
//! validators before it is formatted into a statement. Values are never
//! escaped; anything outside the allow-list is rejected.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};

static IDENTIFIER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^[A-Za-z0-9_."]+$"#).expect("identifier pattern"));
static REF_PATH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_./-]+$").expect("ref path pattern"));
static TARGET_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("target pattern"));

/// Validate a (possibly dotted) warehouse object name
///
/// Trims surrounding whitespace and returns the cleaned value.
pub fn validate_identifier(value: &str, label: &str) -> Result<String> {
    check(
        value.trim(),
        label,
        &IDENTIFIER_PATTERN,
        "Use a fully-qualified warehouse identifier.",
    )
}

/// Validate a version-control branch name or repository-relative path
///
/// Trims whitespace, then any leading/trailing `/`.
pub fn validate_ref_path(value: &str, label: &str) -> Result<String> {
    check(
        value.trim().trim_matches('/'),
        label,
        &REF_PATH_PATTERN,
        "Use only letters, digits, _, -, ., and /.",
    )
}

/// Validate a dbt target name
pub fn validate_target(value: &str, label: &str) -> Result<String> {
    check(
        value.trim(),
        label,
        &TARGET_PATTERN,
        "Use only letters, digits, underscores, and dashes.",
    )
}

fn check(candidate: &str, label: &str, pattern: &Regex, hint: &str) -> Result<String> {
    if candidate.is_empty() {
        return Err(Error::InvalidIdentifier {
            label: label.to_string(),
            value: String::new(),
            reason: "cannot be empty".to_string(),
        });
    }
    if !pattern.is_match(candidate) {
        return Err(Error::InvalidIdentifier {
            label: label.to_string(),
            value: candidate.to_string(),
            reason: format!("contains unsupported characters: {candidate:?}. {hint}"),
        });
    }
    Ok(candidate.to_string())
}

/// A warehouse object name that passed [`validate_identifier`]
///
/// Only constructible through [`QualifiedName::parse`], so holding one is
/// proof that the text is safe to interpolate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct QualifiedName(String);

impl QualifiedName {
    /// Validate and wrap `value`
    pub fn parse(value: &str, label: &str) -> Result<Self> {
        validate_identifier(value, label).map(Self)
    }

    /// Append `.part` to an already-validated name
    pub fn child(&self, part: &str) -> Result<Self> {
        Self::parse(&format!("{}.{}", self.0, part), "object name")
    }

    /// Borrow the validated text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validated handle of a deployed dbt project object
pub type ProjectHandle = QualifiedName;
