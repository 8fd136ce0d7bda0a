//! Error handling for the election engine
//!
//! Every domain failure is typed and returned to the caller; nothing is
//! swallowed. [`ErrorKind`] groups the variants into the four caller-facing
//! categories (validation, state conflict, authorization, not-found) plus
//! internal faults, which are the only errors ever retried.

use crate::types::ElectionState;

/// Result type alias for the election engine
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the election engine
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Election schedule is malformed (start >= end, or start in the past)
    #[error("Invalid schedule: {reason}")]
    InvalidSchedule { reason: String },

    /// Operation is inapplicable in the election's current state
    #[error("Operation '{operation}' not allowed while election is {state:?}")]
    InvalidState {
        operation: String,
        state: ElectionState,
    },

    /// Voter already present on the roll for this election
    #[error("Voter '{voter_id}' is already on the roll for election {election_id}")]
    DuplicateVoter {
        election_id: uuid::Uuid,
        voter_id: String,
    },

    /// Position title already used within this election
    #[error("Position '{title}' already exists in this election")]
    DuplicatePosition { title: String },

    /// Ballot submitted outside the Active voting window
    #[error("Election is not accepting ballots (state: {state:?})")]
    ElectionNotActive { state: ElectionState },

    /// Voter is not on the roll or is marked ineligible
    #[error("Voter is not eligible for this election")]
    NotEligible,

    /// Ballot does not cover every position exactly once with valid candidates
    #[error("Incomplete ballot: {reason}")]
    IncompleteBallot { reason: String },

    /// A ballot for this (election, voter) pair has already been committed
    #[error("Voter has already cast a ballot in this election")]
    AlreadyVoted,

    /// Tally requested before the election closed
    #[error("Election must be closed before tallying (state: {state:?})")]
    ElectionNotClosed { state: ElectionState },

    /// Publish requested before any tally was computed
    #[error("No tally has been computed for this election")]
    NotTallied,

    /// Results were already published; the flag is one-way
    #[error("Results for this election are already published")]
    AlreadyPublished,

    /// Results requested before the publish gate opened
    #[error("Results for this election have not been published")]
    NotPublished,

    /// Caller lacks the required role or standing
    #[error("Caller is not authorized to perform this operation")]
    NotAuthorized,

    /// Referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Transient storage conflict during an atomic commit; retried locally
    /// a bounded number of times before surfacing
    #[error("Commit conflict: {message}")]
    Conflict { message: String },

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Caller-facing error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller input is malformed; recoverable by correcting the input
    Validation,
    /// Operation valid but inapplicable given current system state
    StateConflict,
    /// Caller lacks the right role or standing
    Authorization,
    /// Referenced entity absent
    NotFound,
    /// Internal fault; the only kind eligible for automatic retry
    Internal,
}

impl Error {
    /// Classify this error into its caller-facing kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidSchedule { .. }
            | Error::IncompleteBallot { .. }
            | Error::DuplicateVoter { .. }
            | Error::DuplicatePosition { .. } => ErrorKind::Validation,
            Error::InvalidState { .. }
            | Error::ElectionNotActive { .. }
            | Error::ElectionNotClosed { .. }
            | Error::AlreadyVoted
            | Error::NotTallied
            | Error::AlreadyPublished
            | Error::NotPublished => ErrorKind::StateConflict,
            Error::NotAuthorized | Error::NotEligible => ErrorKind::Authorization,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Conflict { .. } | Error::Serialization(_) | Error::Internal { .. } => {
                ErrorKind::Internal
            }
        }
    }

    /// Create an invalid-schedule error
    pub fn invalid_schedule(reason: impl Into<String>) -> Self {
        Self::InvalidSchedule {
            reason: reason.into(),
        }
    }

    /// Create an invalid-state error
    pub fn invalid_state(operation: impl Into<String>, state: ElectionState) -> Self {
        Self::InvalidState {
            operation: operation.into(),
            state,
        }
    }

    /// Create an incomplete-ballot error
    pub fn incomplete_ballot(reason: impl Into<String>) -> Self {
        Self::IncompleteBallot {
            reason: reason.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create a commit-conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Convenience macro for internal errors (lock poisoning and the like)
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::Error::internal($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::internal(format!($fmt, $($arg)*))
    };
}
