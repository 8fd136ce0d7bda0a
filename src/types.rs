//! # Core Types for the Election Engine
//!
//! This module defines the entities shared by every component of the engine:
//! elections and their lifecycle states, positions and candidates, voter roll
//! entries, committed ballots, and result tallies.
//!
//! ## Design Principles
//!
//! - **Surrogate ids**: every entity is keyed by a UUID; relationships are
//!   plain foreign-key references, never nested copies
//! - **Monotonic lifecycle**: [`ElectionState`] only moves forward along the
//!   edges in [`ElectionState::can_transition_to`]
//! - **Deterministic aggregates**: tallies use [`BTreeMap`] so recomputation
//!   over an unchanged ballot set is bit-identical
//! - **Ballot secrecy**: voter identity lives on [`Ballot`] for the audit
//!   trail only and never appears in [`ResultTally`]
//!
//! ## Usage Example
//!
//! ```rust
//! use ballot::types::{Election, ElectionState, Visibility};
//! use chrono::Utc;
//! use uuid::Uuid;
//!
//! let now = Utc::now().timestamp();
//! let election = Election {
//!     id: Uuid::new_v4(),
//!     name: "Student Council President".to_string(),
//!     owner: "manager@school.example".to_string(),
//!     start_time: now + 3600,
//!     end_time: now + 86400,
//!     visibility: Visibility::Public,
//!     state: ElectionState::Draft,
//!     created_at: Utc::now(),
//! };
//!
//! assert!(!election.has_started(now));
//! assert_eq!(election.effective_state(now), ElectionState::Draft);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Unix timestamp (seconds since epoch, UTC)
///
/// All scheduling decisions are pure functions of this clock value and the
/// persisted start/end timestamps, which is what makes concurrent lifecycle
/// evaluation idempotent.
pub type Timestamp = i64;

/// Caller role resolved by the external identity authority
///
/// The engine never performs authentication itself; it receives an already
/// resolved [`Actor`] and performs capability checks against its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Platform administrator: full access, including the audit log
    Admin,
    /// Election manager: creates and operates the elections they own
    Manager,
    /// Voter: casts ballots in elections where they appear on the roll
    Voter,
}

/// An authenticated caller: identity plus resolved role
///
/// Produced by the identity & role authority collaborator (out of scope
/// here); the engine treats it as opaque input to its capability checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Stable caller identity (email or external id)
    pub id: String,
    /// Resolved role
    pub role: Role,
}

impl Actor {
    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Admin,
        }
    }

    pub fn manager(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Manager,
        }
    }

    pub fn voter(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Voter,
        }
    }
}

/// Who may see a published election and its results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    /// Anyone may view the election and its published results
    Public,
    /// Only roll members, the owning manager, and admins may view
    Private,
}

/// States in the election lifecycle
///
/// `Draft → Scheduled → Active → Closed → Published`, with Published
/// terminal. The two time-driven edges (`Scheduled→Active`, `Active→Closed`)
/// are evaluated lazily on access; the explicit edges require a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionState {
    /// Under construction: structure (positions, candidates) may change
    Draft,
    /// Structure frozen, waiting for the start time
    Scheduled,
    /// Accepting ballots
    Active,
    /// Voting over; tallying allowed
    Closed,
    /// Results published; terminal
    Published,
}

impl ElectionState {
    /// Whether the lifecycle permits moving from `self` to `next`
    pub fn can_transition_to(self, next: ElectionState) -> bool {
        use ElectionState::*;
        matches!(
            (self, next),
            (Draft, Scheduled) | (Scheduled, Active) | (Active, Closed) | (Closed, Published)
        )
    }

    /// Published is the terminal state; no further transitions exist
    pub fn is_terminal(self) -> bool {
        self == ElectionState::Published
    }

    /// Whether the voter roll may still be modified in this state
    ///
    /// The roll freezes once the election can start accepting ballots, to
    /// prevent late manipulation of eligibility during voting.
    pub fn roll_open(self) -> bool {
        matches!(self, ElectionState::Draft | ElectionState::Scheduled)
    }
}

/// A time-boxed voting event with one or more positions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Election {
    /// Unique election identifier
    pub id: Uuid,

    /// Human-readable election name
    pub name: String,

    /// Identity of the owning manager
    pub owner: String,

    /// Voting window opens at this time (inclusive)
    pub start_time: Timestamp,

    /// Voting window closes at this time; must be after `start_time`
    pub end_time: Timestamp,

    /// Who may view this election and its published results
    pub visibility: Visibility,

    /// Last persisted lifecycle state
    ///
    /// The time-driven transitions may not have been applied yet; use
    /// [`Election::effective_state`] for the state as of a given clock
    /// reading.
    pub state: ElectionState,

    /// When this election record was created
    pub created_at: DateTime<Utc>,
}

impl Election {
    /// Whether the voting window has opened as of `now`
    pub fn has_started(&self, now: Timestamp) -> bool {
        now >= self.start_time
    }

    /// Whether the voting window has closed as of `now`
    pub fn has_ended(&self, now: Timestamp) -> bool {
        now >= self.end_time
    }

    /// Derive the lifecycle state as of `now`
    ///
    /// Pure function of the persisted state and the clock: concurrent
    /// observers always derive the same answer, so persisting the result is
    /// idempotent (the first writer wins, later writers change nothing).
    /// A Scheduled election whose whole window has already passed derives
    /// straight to Closed, having passed through Active unobserved.
    pub fn effective_state(&self, now: Timestamp) -> ElectionState {
        match self.state {
            ElectionState::Scheduled if self.has_ended(now) => ElectionState::Closed,
            ElectionState::Scheduled if self.has_started(now) => ElectionState::Active,
            ElectionState::Active if self.has_ended(now) => ElectionState::Closed,
            state => state,
        }
    }
}

/// A contested role within an election
///
/// Titles are unique within their election; the candidate set is fixed once
/// the election leaves Draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Unique position identifier
    pub id: Uuid,
    /// Election this position belongs to
    pub election_id: Uuid,
    /// Position title, unique within the election
    pub title: String,
}

/// A candidate standing for one position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Unique candidate identifier
    pub id: Uuid,
    /// Position this candidate stands for
    pub position_id: Uuid,
    /// Candidate's display name
    pub name: String,
    /// Optional candidate statement
    pub statement: Option<String>,
}

/// One voter's standing on an election's roll
///
/// Unique per (election, voter). `has_voted` is flipped exactly once, by a
/// successful ballot commit, and never reversed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoterRollEntry {
    /// Election this entry belongs to
    pub election_id: Uuid,
    /// Voter identity (email or external id)
    pub voter_id: String,
    /// Whether this voter may cast a ballot
    pub eligible: bool,
    /// Set only by a successful ballot commit; never reversed
    pub has_voted: bool,
    /// When this entry was added to the roll
    pub added_at: DateTime<Utc>,
}

/// Aggregate roll counts for a manager's election overview
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollSummary {
    pub total: u64,
    pub voted: u64,
    pub remaining: u64,
}

/// One voter's complete, immutable set of selections for an election
///
/// The voter identity is retained for the audit trail only; it never
/// appears in any tally-facing output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ballot {
    /// Unique ballot identifier
    pub id: Uuid,
    /// Election this ballot was cast in
    pub election_id: Uuid,
    /// Casting voter identity (audit only)
    pub voter_id: String,
    /// Exactly one candidate per position, keyed by position id
    pub selections: BTreeMap<Uuid, Uuid>,
    /// Submission time
    pub cast_at: Timestamp,
}

/// Aggregated per-candidate counts derived from committed ballots
///
/// Deterministic: [`BTreeMap`] ordering makes recomputation over an
/// unchanged ballot set bit-identical. Exposes only aggregates, satisfying
/// ballot secrecy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTally {
    /// Election this tally belongs to
    pub election_id: Uuid,
    /// Vote count per candidate id (zero-vote candidates included)
    pub counts: BTreeMap<Uuid, u64>,
    /// Number of committed ballots folded into this tally
    pub ballot_count: u64,
    /// When this tally was computed
    pub computed_at: Timestamp,
    /// One-way publish flag; set by the results publisher, never cleared
    pub published: bool,
}

impl ResultTally {
    /// A candidate's share of the committed ballots, as a percentage
    ///
    /// Returns 0.0 for unknown candidates and for elections with no
    /// committed ballots.
    pub fn percentage(&self, candidate_id: &Uuid) -> f64 {
        if self.ballot_count == 0 {
            return 0.0;
        }
        let votes = self.counts.get(candidate_id).copied().unwrap_or(0);
        (votes as f64 / self.ballot_count as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_edges() {
        use ElectionState::*;

        assert!(Draft.can_transition_to(Scheduled));
        assert!(Scheduled.can_transition_to(Active));
        assert!(Active.can_transition_to(Closed));
        assert!(Closed.can_transition_to(Published));

        // No skipping, no regression
        assert!(!Draft.can_transition_to(Active));
        assert!(!Scheduled.can_transition_to(Closed));
        assert!(!Published.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Active));
        assert!(Published.is_terminal());
    }

    fn election_with_window(state: ElectionState, start: Timestamp, end: Timestamp) -> Election {
        Election {
            id: Uuid::new_v4(),
            name: "Test Election".to_string(),
            owner: "manager@example.com".to_string(),
            start_time: start,
            end_time: end,
            visibility: Visibility::Public,
            state,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_effective_state_derivation() {
        let now = Utc::now().timestamp();

        // Draft never auto-advances, even past its window
        let draft = election_with_window(ElectionState::Draft, now - 7200, now - 3600);
        assert_eq!(draft.effective_state(now), ElectionState::Draft);

        // Scheduled before the window stays Scheduled
        let upcoming = election_with_window(ElectionState::Scheduled, now + 3600, now + 7200);
        assert_eq!(upcoming.effective_state(now), ElectionState::Scheduled);

        // Scheduled inside the window derives to Active
        let open = election_with_window(ElectionState::Scheduled, now - 3600, now + 3600);
        assert_eq!(open.effective_state(now), ElectionState::Active);

        // Scheduled past the window derives straight to Closed
        let missed = election_with_window(ElectionState::Scheduled, now - 7200, now - 3600);
        assert_eq!(missed.effective_state(now), ElectionState::Closed);

        // Active past the end derives to Closed
        let over = election_with_window(ElectionState::Active, now - 7200, now - 3600);
        assert_eq!(over.effective_state(now), ElectionState::Closed);

        // Derivation is a pure function: repeated evaluation agrees
        assert_eq!(open.effective_state(now), open.effective_state(now));
    }

    #[test]
    fn test_roll_freeze_states() {
        assert!(ElectionState::Draft.roll_open());
        assert!(ElectionState::Scheduled.roll_open());
        assert!(!ElectionState::Active.roll_open());
        assert!(!ElectionState::Closed.roll_open());
        assert!(!ElectionState::Published.roll_open());
    }

    #[test]
    fn test_tally_percentage() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let mut counts = BTreeMap::new();
        counts.insert(alice, 35u64);
        counts.insert(bob, 28u64);

        let tally = ResultTally {
            election_id: Uuid::new_v4(),
            counts,
            ballot_count: 63,
            computed_at: Utc::now().timestamp(),
            published: false,
        };

        assert!((tally.percentage(&alice) - 55.55).abs() < 0.1);
        assert_eq!(tally.percentage(&Uuid::new_v4()), 0.0);

        let empty = ResultTally {
            election_id: Uuid::new_v4(),
            counts: BTreeMap::new(),
            ballot_count: 0,
            computed_at: Utc::now().timestamp(),
            published: false,
        };
        assert_eq!(empty.percentage(&alice), 0.0);
    }
}
