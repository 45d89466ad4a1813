//! Version gating for catalogs.
//!
//! A catalog can declare `version_range = ">=1.0.30, <1.1.0"` in its `[meta]`
//! table. The target's version is either supplied by the caller or detected
//! from the target's content with `version_pattern`.

use crate::config::loader::Catalog;
use semver::{Version, VersionReq};
use std::fmt;

#[derive(Debug, Clone)]
pub enum VersionError {
    /// Invalid version string (e.g., "not-a-version")
    InvalidVersion { value: String, source: String },
    /// Invalid version requirement (e.g., ">=bad")
    InvalidRequirement { value: String, source: String },
    /// `version_pattern` failed to compile
    InvalidPattern { value: String, source: String },
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::InvalidVersion { value, source } => {
                write!(f, "invalid version '{}': {}", value, source)
            }
            VersionError::InvalidRequirement { value, source } => {
                write!(f, "invalid version requirement '{}': {}", value, source)
            }
            VersionError::InvalidPattern { value, source } => {
                write!(f, "invalid version pattern '{}': {}", value, source)
            }
        }
    }
}

impl std::error::Error for VersionError {}

/// Check if a version matches a requirement string.
///
/// `None` or a blank requirement matches every version.
///
/// ```
/// use bundle_patcher::config::version::matches_requirement;
///
/// assert!(matches_requirement("1.0.44", Some(">=1.0.30, <1.1.0")).unwrap());
/// assert!(!matches_requirement("1.1.0", Some(">=1.0.30, <1.1.0")).unwrap());
/// assert!(matches_requirement("2.0.0", None).unwrap());
/// ```
pub fn matches_requirement(
    version: &str,
    requirement: Option<&str>,
) -> Result<bool, VersionError> {
    let Some(req_str) = requirement else {
        return Ok(true);
    };

    let req_str = req_str.trim();
    if req_str.is_empty() {
        return Ok(true);
    }

    let version = Version::parse(version.trim()).map_err(|e| VersionError::InvalidVersion {
        value: version.to_string(),
        source: e.to_string(),
    })?;

    let req = VersionReq::parse(req_str).map_err(|e| VersionError::InvalidRequirement {
        value: req_str.to_string(),
        source: e.to_string(),
    })?;

    Ok(req.matches(&version))
}

/// Extract the target's version with `pattern`'s first capture group.
///
/// Returns `Ok(None)` when the pattern does not match or the group did not
/// participate in the match.
pub fn detect_version(content: &str, pattern: &str) -> Result<Option<String>, VersionError> {
    let re = crate::cache::get_or_compile(pattern).map_err(|e| VersionError::InvalidPattern {
        value: pattern.to_string(),
        source: e.to_string(),
    })?;

    Ok(re
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string()))
}

/// Outcome of checking a target against a catalog's version requirements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    /// The catalog declares no `version_range`
    Unconstrained,
    Satisfied { version: String },
    Unsatisfied { version: String, requirement: String },
    /// A range is declared but the target's version could not be determined
    Undetected,
}

/// Check the target against every `version_range` in `catalog`.
///
/// `explicit` takes precedence over detection via `version_pattern`.
pub fn check_catalog_version(
    catalog: &Catalog,
    content: &str,
    explicit: Option<&str>,
) -> Result<VersionCheck, VersionError> {
    let ranges: Vec<&str> = catalog.version_ranges().collect();
    if ranges.is_empty() {
        return Ok(VersionCheck::Unconstrained);
    }

    let version = match explicit {
        Some(v) => Some(v.trim().to_string()),
        None => match catalog.version_pattern() {
            Some(pattern) => detect_version(content, pattern)?,
            None => None,
        },
    };
    let Some(version) = version else {
        return Ok(VersionCheck::Undetected);
    };

    for requirement in ranges {
        if !matches_requirement(&version, Some(requirement))? {
            return Ok(VersionCheck::Unsatisfied {
                version,
                requirement: requirement.to_string(),
            });
        }
    }
    Ok(VersionCheck::Satisfied { version })
}
