//! Compiler-version resolution for smart-contract sources
//!
//! Turns free-form pragma constraints into one concrete compiler release:
//!
//! ```rust
//! use solbatch_version::{resolve, ResolvedVersion, VersionTable};
//!
//! let version = resolve(&["0.4.25", ">=0.4.1 <0.5"]).unwrap();
//! assert_eq!(version, ResolvedVersion::exact(4, 25));
//! assert_eq!(VersionTable::default().release(version), "0.4.25");
//! ```

pub mod constraint;
pub mod error;
pub mod pragma;
pub mod resolver;
pub mod source;

pub use constraint::{parse_constraint, Clause, Comparator};
pub use error::{ParseError, SourceError};
pub use pragma::pragma_constraints;
pub use resolver::{
    resolve, resolve_clause, resolve_constraint, Patch, ResolvedVersion, VersionTable,
    LATEST_PATCH_PLACEHOLDER, MAX_MINOR, MIN_MINOR, SUPPORTED_MINORS,
};
pub use source::SourceUnit;
