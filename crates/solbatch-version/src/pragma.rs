//! Lightweight pragma scanning
//!
//! Extracts raw constraint text from `pragma solidity ...;` lines without
//! parsing the surrounding source.

use once_cell::sync::Lazy;
use regex::Regex;

static PRAGMA_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^pragma\s+solidity\s+(.+?);").unwrap_or_else(|e| panic!("pragma regex: {e}"))
});

/// Raw constraint strings of every line-leading version pragma, in order
#[must_use]
pub fn pragma_constraints(source: &str) -> Vec<String> {
    PRAGMA_VERSION
        .captures_iter(source)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}
