//! Constraint resolution
//!
//! Picks one concrete compiler version from a list of pragma constraints.
//!
//! # Policy
//!
//! Each clause resolves independently to a `(minor, patch)` candidate and the
//! overall result is the **minimum** candidate. This is a conservative
//! approximation, not a range intersection: `^0.5.2` together with `>=0.5.0`
//! resolves to the newest 0.5 release because both candidates are compared,
//! never intersected. Downstream bucketing depends on this exact policy.

use crate::constraint::{parse_constraint, Clause, Comparator};
use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Minor versions with a pinned toolchain
pub const SUPPORTED_MINORS: [u32; 3] = [4, 5, 6];

/// Lowest supported minor, used when a file carries no constraint
pub const MIN_MINOR: u32 = 4;

/// Highest supported minor, the ceiling for open-ended constraints
pub const MAX_MINOR: u32 = 6;

/// Patch number written for a "latest" patch that has no release table entry
pub const LATEST_PATCH_PLACEHOLDER: u32 = 69;

/// Patch component of a resolved version
///
/// `Latest` sorts above every explicit patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Patch {
    /// An explicit patch number
    Exact(u32),
    /// Newest patch of the minor
    Latest,
}

/// A resolved `(minor, patch)` pair under the natural total order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResolvedVersion {
    /// Minor component
    pub minor: u32,
    /// Patch component
    pub patch: Patch,
}

impl ResolvedVersion {
    /// Explicit `(minor, patch)` pair
    #[inline]
    #[must_use]
    pub const fn exact(minor: u32, patch: u32) -> Self {
        Self {
            minor,
            patch: Patch::Exact(patch),
        }
    }

    /// Newest patch of `minor`
    #[inline]
    #[must_use]
    pub const fn latest(minor: u32) -> Self {
        Self {
            minor,
            patch: Patch::Latest,
        }
    }

    /// Result for a file with no constraints
    #[inline]
    #[must_use]
    pub const fn default_floor() -> Self {
        Self::latest(MIN_MINOR)
    }

    /// Newest supported version
    #[inline]
    #[must_use]
    pub const fn ceiling() -> Self {
        Self::latest(MAX_MINOR)
    }
}

impl fmt::Display for ResolvedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.patch {
            Patch::Exact(patch) => write!(f, "({}, {patch})", self.minor),
            Patch::Latest => write!(f, "({}, latest)", self.minor),
        }
    }
}

/// Resolve an ordered list of constraint strings to one version
///
/// An empty list resolves to [`ResolvedVersion::default_floor`].
///
/// # Errors
/// Returns `ParseError` if any string holds no recognizable clause.
pub fn resolve<S: AsRef<str>>(constraints: &[S]) -> Result<ResolvedVersion, ParseError> {
    let mut best: Option<ResolvedVersion> = None;
    for constraint in constraints {
        let candidate = resolve_constraint(constraint.as_ref())?;
        best = Some(best.map_or(candidate, |b| b.min(candidate)));
    }
    Ok(best.unwrap_or_else(ResolvedVersion::default_floor))
}

/// Resolve one constraint string, which may carry several clauses
///
/// A compound string is resolved as an independent sub-list of its clauses.
///
/// # Errors
/// Returns `ParseError` if the string holds no recognizable clause.
pub fn resolve_constraint(constraint: &str) -> Result<ResolvedVersion, ParseError> {
    let clauses = parse_constraint(constraint)?;
    if let [single] = clauses.as_slice() {
        return Ok(resolve_clause(single));
    }

    let sub_list: Vec<String> = clauses.iter().map(ToString::to_string).collect();
    resolve(&sub_list)
}

/// Resolve a single clause to its candidate version
#[must_use]
pub fn resolve_clause(clause: &Clause) -> ResolvedVersion {
    let minor = if SUPPORTED_MINORS.contains(&clause.minor) {
        clause.minor
    } else {
        MAX_MINOR
    };

    match clause.comparator {
        Comparator::Caret => ResolvedVersion::latest(minor),
        Comparator::Greater | Comparator::GreaterOrEqual => ResolvedVersion::ceiling(),
        Comparator::Exact => match clause.patch {
            Some(patch) => ResolvedVersion::exact(minor, patch),
            None => ResolvedVersion::latest(minor),
        },
        Comparator::LessOrEqual => ResolvedVersion::exact(minor, clause.patch.unwrap_or(0)),
        Comparator::Less => match clause.patch.unwrap_or(0) {
            0 => ResolvedVersion::latest(minor.saturating_sub(1)),
            patch => ResolvedVersion::exact(minor, patch - 1),
        },
    }
}

/// Canonical release strings for "latest patch" versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionTable {
    latest: BTreeMap<u32, String>,
}

impl VersionTable {
    /// Table from explicit `(minor, release)` pairs
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = (u32, String)>) -> Self {
        Self {
            latest: entries.into_iter().collect(),
        }
    }

    /// Release string for a resolved version
    ///
    /// `(minor, Latest)` maps through the table; everything else, and any
    /// minor missing from the table, formats as `0.<minor>.<patch>`.
    #[must_use]
    pub fn release(&self, version: ResolvedVersion) -> String {
        match version.patch {
            Patch::Latest => self
                .latest
                .get(&version.minor)
                .cloned()
                .unwrap_or_else(|| format!("0.{}.{LATEST_PATCH_PLACEHOLDER}", version.minor)),
            Patch::Exact(patch) => format!("0.{}.{patch}", version.minor),
        }
    }

    /// Whether `release` is one of the canonical latest releases
    #[must_use]
    pub fn is_canonical(&self, release: &str) -> bool {
        self.latest.values().any(|r| r == release)
    }

    /// Canonical releases in minor order
    pub fn releases(&self) -> impl Iterator<Item = &str> {
        self.latest.values().map(String::as_str)
    }
}

impl Default for VersionTable {
    fn default() -> Self {
        Self::new([
            (4, "0.4.26".to_string()),
            (5, "0.5.16".to_string()),
            (6, "0.6.11".to_string()),
        ])
    }
}
