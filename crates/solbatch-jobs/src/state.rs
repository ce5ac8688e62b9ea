//! Per-item job state machine
//!
//! ```text
//! Pending -> Dispatched -> Succeeded
//!                      \-> Failed(detail)
//! ```
//!
//! Terminal states never transition again, and nothing re-enters `Pending`.

use crate::error::JobError;
use std::fmt;

/// Status of one work item
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobStatus {
    /// Discovered, not yet handed to a worker
    Pending,
    /// Handed to a worker, outcome unknown
    Dispatched,
    /// Worker reported success
    Succeeded,
    /// Worker reported failure with diagnostic detail
    Failed(String),
}

impl JobStatus {
    /// Whether the status is final
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Dispatched => 1,
            Self::Succeeded | Self::Failed(_) => 2,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Dispatched => f.write_str("dispatched"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed(_) => f.write_str("failed"),
        }
    }
}

/// Whether `from -> to` is a legal single step
#[must_use]
pub fn is_allowed(from: &JobStatus, to: &JobStatus) -> bool {
    from.rank() + 1 == to.rank()
}

/// Identity and status of one work item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    /// Stable work-item key
    pub key: String,
    /// Current status
    pub status: JobStatus,
}

impl JobRecord {
    /// New pending record
    #[inline]
    #[must_use]
    pub fn pending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status: JobStatus::Pending,
        }
    }

    /// Move to `next`
    ///
    /// # Errors
    /// Returns `JobError::IllegalTransition` if the step is not allowed;
    /// the record is left unchanged.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), JobError> {
        if !is_allowed(&self.status, &next) {
            return Err(JobError::IllegalTransition {
                key: self.key.clone(),
                from: self.status.clone(),
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn happy_path() {
        let mut record = JobRecord::pending("a.sol");
        record.transition(JobStatus::Dispatched).unwrap();
        record.transition(JobStatus::Succeeded).unwrap();
        assert!(record.status.is_terminal());
    }

    #[test]
    fn failure_keeps_detail() {
        let mut record = JobRecord::pending("a.sol");
        record.transition(JobStatus::Dispatched).unwrap();
        record.transition(JobStatus::Failed("exit 1".to_string())).unwrap();
        assert_eq!(record.status, JobStatus::Failed("exit 1".to_string()));
    }

    #[test]
    fn terminal_never_regresses() {
        let mut record = JobRecord::pending("a.sol");
        record.transition(JobStatus::Dispatched).unwrap();
        record.transition(JobStatus::Succeeded).unwrap();

        assert!(record.transition(JobStatus::Pending).is_err());
        assert!(record.transition(JobStatus::Dispatched).is_err());
        assert!(record.transition(JobStatus::Failed(String::new())).is_err());
        assert_eq!(record.status, JobStatus::Succeeded);
    }

    #[test]
    fn pending_cannot_skip_dispatch() {
        let mut record = JobRecord::pending("a.sol");
        assert!(record.transition(JobStatus::Succeeded).is_err());
    }

    fn any_status() -> impl Strategy<Value = JobStatus> {
        prop_oneof![
            Just(JobStatus::Pending),
            Just(JobStatus::Dispatched),
            Just(JobStatus::Succeeded),
            ".{0,8}".prop_map(JobStatus::Failed),
        ]
    }

    proptest! {
        #[test]
        fn transitions_are_monotonic(from in any_status(), to in any_status()) {
            if is_allowed(&from, &to) {
                prop_assert!(to.rank() > from.rank());
                prop_assert!(!from.is_terminal());
            }
        }
    }
}
