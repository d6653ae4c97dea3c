use thiserror::Error;

/// Failures raised by the session core.
///
/// These are local and synchronous; nothing inside the core retries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("session lock poisoned")]
    LockPoisoned,
}

/// Failures raised when recording a streak claim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreakError {
    #[error("already claimed for day {0}")]
    AlreadyClaimedToday(i64),

    #[error("day {day} is before the last claimed day {last}")]
    InvalidDay { day: i64, last: i64 },

    #[error("no completed proof to claim")]
    NoProof,
}
