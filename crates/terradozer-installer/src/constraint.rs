//! Terraform version constraints
//!
//! Terraform writes constraints as comma-separated clauses such as
//! `>= 1.0, < 3.0` or `~> 2.43`. They are translated into a
//! [`semver::VersionReq`]; `!=` clauses have no semver counterpart and are
//! kept as an exclusion list.

use crate::error::{InstallError, Result};
use semver::{Version, VersionReq};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub struct VersionConstraint {
    raw: String,
    req: VersionReq,
    excluded: Vec<Version>,
}

impl VersionConstraint {
    /// A constraint every version satisfies
    pub fn any() -> Self {
        Self {
            raw: String::new(),
            req: VersionReq::STAR,
            excluded: Vec::new(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |message: String| InstallError::InvalidConstraint {
            constraint: raw.to_string(),
            message,
        };

        let mut comparators = Vec::new();
        let mut excluded = Vec::new();

        for clause in raw.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let (op, rest) = split_operator(clause);
            let (version, segments) = partial_version(rest).map_err(invalid)?;

            match op {
                "~>" => {
                    comparators.push(format!(">={}", version));
                    let upper = match segments {
                        1 | 2 => Version::new(version.major + 1, 0, 0),
                        _ => Version::new(version.major, version.minor + 1, 0),
                    };
                    comparators.push(format!("<{}", upper));
                }
                "!=" => excluded.push(version),
                op => comparators.push(format!("{}{}", op, version)),
            }
        }

        let req = if comparators.is_empty() {
            VersionReq::STAR
        } else {
            VersionReq::parse(&comparators.join(", ")).map_err(|e| invalid(e.to_string()))?
        };

        Ok(Self {
            raw: raw.trim().to_string(),
            req,
            excluded,
        })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.req.matches(version) && !self.excluded.contains(version)
    }

    /// The constraint as written
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Default for VersionConstraint {
    fn default() -> Self {
        Self::any()
    }
}

impl FromStr for VersionConstraint {
    type Err = InstallError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.raw.is_empty() {
            write!(f, "(any version)")
        } else {
            write!(f, "{}", self.raw)
        }
    }
}

fn split_operator(clause: &str) -> (&str, &str) {
    for op in ["~>", ">=", "<=", "!=", ">", "<", "="] {
        if let Some(rest) = clause.strip_prefix(op) {
            return (op, rest.trim());
        }
    }
    ("=", clause)
}

/// Parse `1`, `1.2` or `1.2.3[-pre]`, padding missing segments with zero.
/// Also returns how many segments were written.
fn partial_version(s: &str) -> std::result::Result<(Version, usize), String> {
    let s = s.trim().trim_start_matches('v');
    let (core, pre) = match s.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (s, None),
    };

    let segments: Vec<&str> = core.split('.').collect();
    if segments.is_empty() || segments.len() > 3 || segments.iter().any(|p| p.is_empty()) {
        return Err(format!("malformed version {:?}", s));
    }

    let mut padded = segments.clone();
    padded.resize(3, "0");
    let mut text = padded.join(".");
    if let Some(pre) = pre {
        text.push('-');
        text.push_str(pre);
    }

    let version = Version::parse(&text).map_err(|e| format!("malformed version {:?}: {}", s, e))?;
    Ok((version, segments.len()))
}
