//! Election registry: entity ownership and the lifecycle state machine
//!
//! Exclusively owns Election, Position, and Candidate records. Structural
//! edits are only permitted while an election is Draft; the two time-driven
//! transitions (Scheduled→Active, Active→Closed) are applied lazily whenever
//! an election is read, so no background sweep is required.

use crate::types::{Candidate, Election, ElectionState, Position, Timestamp, Visibility};
use crate::{Error, Result, internal_error};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

pub struct ElectionRegistry {
    elections: RwLock<HashMap<Uuid, Election>>,
    positions: RwLock<HashMap<Uuid, Position>>,
    candidates: RwLock<HashMap<Uuid, Candidate>>,
}

impl ElectionRegistry {
    pub fn new() -> Self {
        Self {
            elections: RwLock::new(HashMap::new()),
            positions: RwLock::new(HashMap::new()),
            candidates: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new election in Draft
    ///
    /// The schedule is validated at creation: the start must lie in the
    /// future and strictly before the end.
    pub fn create_election(
        &self,
        owner: &str,
        name: &str,
        start_time: Timestamp,
        end_time: Timestamp,
        visibility: Visibility,
    ) -> Result<Election> {
        let now = Utc::now().timestamp();

        if start_time >= end_time {
            return Err(Error::invalid_schedule("start time must be before end time"));
        }
        if start_time <= now {
            return Err(Error::invalid_schedule("start time must be in the future"));
        }

        let election = Election {
            id: Uuid::new_v4(),
            name: name.to_string(),
            owner: owner.to_string(),
            start_time,
            end_time,
            visibility,
            state: ElectionState::Draft,
            created_at: Utc::now(),
        };

        let mut elections = self
            .elections
            .write()
            .map_err(|_| internal_error!("Election store lock poisoned"))?;
        elections.insert(election.id, election.clone());

        tracing::info!("🗳️  Election created: id={}, name={}", election.id, election.name);

        Ok(election)
    }

    /// Add a position to a Draft election
    ///
    /// Titles are unique within an election.
    pub fn add_position(&self, election_id: Uuid, title: &str) -> Result<Position> {
        let election = self.election(election_id)?;
        if election.state != ElectionState::Draft {
            return Err(Error::invalid_state("add_position", election.state));
        }

        let mut positions = self
            .positions
            .write()
            .map_err(|_| internal_error!("Position store lock poisoned"))?;

        let duplicate = positions
            .values()
            .any(|p| p.election_id == election_id && p.title == title);
        if duplicate {
            return Err(Error::DuplicatePosition {
                title: title.to_string(),
            });
        }

        let position = Position {
            id: Uuid::new_v4(),
            election_id,
            title: title.to_string(),
        };
        positions.insert(position.id, position.clone());

        Ok(position)
    }

    /// Add a candidate to a position whose election is still Draft
    pub fn add_candidate(
        &self,
        position_id: Uuid,
        name: &str,
        statement: Option<String>,
    ) -> Result<Candidate> {
        let position = self.position(position_id)?;
        let election = self.election(position.election_id)?;
        if election.state != ElectionState::Draft {
            return Err(Error::invalid_state("add_candidate", election.state));
        }

        let candidate = Candidate {
            id: Uuid::new_v4(),
            position_id,
            name: name.to_string(),
            statement,
        };

        let mut candidates = self
            .candidates
            .write()
            .map_err(|_| internal_error!("Candidate store lock poisoned"))?;
        candidates.insert(candidate.id, candidate.clone());

        Ok(candidate)
    }

    /// Explicit Draft→Scheduled transition
    ///
    /// Requires at least one position, every position to have at least one
    /// candidate, and the voting window to still lie in the future.
    pub fn schedule(&self, election_id: Uuid) -> Result<Election> {
        let election = self.election(election_id)?;
        if election.state != ElectionState::Draft {
            return Err(Error::invalid_state("schedule", election.state));
        }

        let now = Utc::now().timestamp();
        if election.start_time <= now {
            return Err(Error::invalid_schedule(
                "start time has already passed; adjust the schedule before scheduling",
            ));
        }

        let positions = self.positions_for(election_id)?;
        if positions.is_empty() {
            return Err(Error::invalid_schedule(
                "election has no positions to contest",
            ));
        }
        for position in &positions {
            if self.candidates_for(position.id)?.is_empty() {
                return Err(Error::invalid_schedule(format!(
                    "position '{}' has no candidates",
                    position.title
                )));
            }
        }

        self.transition(election_id, ElectionState::Scheduled, "schedule")
    }

    /// Explicit early close (emergency stop); also the normal close path
    ///
    /// Fails with `InvalidState` unless the election is currently Active
    /// (after applying any pending time-driven transition).
    pub fn close(&self, election_id: Uuid) -> Result<Election> {
        let election = self.election(election_id)?;
        if election.state != ElectionState::Active {
            return Err(Error::invalid_state("close", election.state));
        }
        self.transition(election_id, ElectionState::Closed, "close")
    }

    /// Closed→Published; invoked only by the results publisher after the
    /// publish gate checks pass
    pub(crate) fn mark_published(&self, election_id: Uuid) -> Result<Election> {
        let election = self.election(election_id)?;
        if election.state != ElectionState::Closed {
            return Err(Error::invalid_state("publish", election.state));
        }
        self.transition(election_id, ElectionState::Published, "publish")
    }

    /// Fetch an election, applying any pending time-driven transition
    ///
    /// Lazy evaluation of the Scheduled→Active and Active→Closed edges: the
    /// effective state is a pure function of the clock, so concurrent
    /// callers derive the same answer and only the first persists it.
    pub fn election(&self, election_id: Uuid) -> Result<Election> {
        let now = Utc::now().timestamp();

        {
            let elections = self
                .elections
                .read()
                .map_err(|_| internal_error!("Election store lock poisoned"))?;
            let election = elections
                .get(&election_id)
                .ok_or_else(|| Error::not_found("Election", election_id))?;
            if election.effective_state(now) == election.state {
                return Ok(election.clone());
            }
        }

        // A time-driven transition is due; persist it under the write lock.
        let mut elections = self
            .elections
            .write()
            .map_err(|_| internal_error!("Election store lock poisoned"))?;
        let election = elections
            .get_mut(&election_id)
            .ok_or_else(|| Error::not_found("Election", election_id))?;

        let effective = election.effective_state(now);
        if effective != election.state {
            tracing::info!(
                "⏱️  Election {} advanced {:?} -> {:?} (time-driven)",
                election_id,
                election.state,
                effective
            );
            election.state = effective;
        }

        Ok(election.clone())
    }

    /// Current state of an election; always available
    pub fn state(&self, election_id: Uuid) -> Result<ElectionState> {
        Ok(self.election(election_id)?.state)
    }

    /// All elections, with pending time-driven transitions applied
    pub fn list_elections(&self) -> Result<Vec<Election>> {
        let ids: Vec<Uuid> = {
            let elections = self
                .elections
                .read()
                .map_err(|_| internal_error!("Election store lock poisoned"))?;
            elections.keys().copied().collect()
        };

        ids.into_iter().map(|id| self.election(id)).collect()
    }

    /// Positions defined for an election
    pub fn positions_for(&self, election_id: Uuid) -> Result<Vec<Position>> {
        let positions = self
            .positions
            .read()
            .map_err(|_| internal_error!("Position store lock poisoned"))?;
        Ok(positions
            .values()
            .filter(|p| p.election_id == election_id)
            .cloned()
            .collect())
    }

    /// Look up a single position
    pub fn position(&self, position_id: Uuid) -> Result<Position> {
        let positions = self
            .positions
            .read()
            .map_err(|_| internal_error!("Position store lock poisoned"))?;
        positions
            .get(&position_id)
            .cloned()
            .ok_or_else(|| Error::not_found("Position", position_id))
    }

    /// Candidates standing for a position
    pub fn candidates_for(&self, position_id: Uuid) -> Result<Vec<Candidate>> {
        let candidates = self
            .candidates
            .read()
            .map_err(|_| internal_error!("Candidate store lock poisoned"))?;
        Ok(candidates
            .values()
            .filter(|c| c.position_id == position_id)
            .cloned()
            .collect())
    }

    /// Apply an explicit transition, enforcing the state machine edges
    fn transition(
        &self,
        election_id: Uuid,
        next: ElectionState,
        operation: &str,
    ) -> Result<Election> {
        let mut elections = self
            .elections
            .write()
            .map_err(|_| internal_error!("Election store lock poisoned"))?;
        let election = elections
            .get_mut(&election_id)
            .ok_or_else(|| Error::not_found("Election", election_id))?;

        // Re-check under the write lock: a concurrent caller may have won.
        if !election.state.can_transition_to(next) {
            return Err(Error::invalid_state(operation, election.state));
        }

        tracing::info!(
            "🗳️  Election {} transitioned {:?} -> {:?}",
            election_id,
            election.state,
            next
        );
        election.state = next;

        Ok(election.clone())
    }

    /// Rewrite an election's voting window, bypassing schedule validation.
    /// Lets tests place elections at arbitrary points in their lifecycle
    /// without sleeping through real windows.
    #[cfg(test)]
    pub(crate) fn set_window_for_testing(
        &self,
        election_id: Uuid,
        start_time: Timestamp,
        end_time: Timestamp,
    ) -> Result<()> {
        let mut elections = self
            .elections
            .write()
            .map_err(|_| internal_error!("Election store lock poisoned"))?;
        let election = elections
            .get_mut(&election_id)
            .ok_or_else(|| Error::not_found("Election", election_id))?;
        election.start_time = start_time;
        election.end_time = end_time;
        Ok(())
    }
}

impl Default for ElectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn future_window() -> (Timestamp, Timestamp) {
        let now = Utc::now().timestamp();
        (now + 3600, now + 7200)
    }

    fn draft_with_ballot_structure(registry: &ElectionRegistry) -> Election {
        let (start, end) = future_window();
        let election = registry
            .create_election(
                "manager@example.com",
                "Science Olympiad Team Lead",
                start,
                end,
                Visibility::Public,
            )
            .unwrap();
        let position = registry.add_position(election.id, "Team Lead").unwrap();
        registry
            .add_candidate(position.id, "Rohan Verma", None)
            .unwrap();
        election
    }

    #[test]
    fn test_create_validates_schedule() {
        let registry = ElectionRegistry::new();
        let now = Utc::now().timestamp();

        // start >= end
        let err = registry
            .create_election("m", "Bad", now + 7200, now + 3600, Visibility::Public)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSchedule { .. }));

        // start in the past
        let err = registry
            .create_election("m", "Bad", now - 10, now + 3600, Visibility::Public)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSchedule { .. }));

        // valid
        let election = registry
            .create_election("m", "Good", now + 3600, now + 7200, Visibility::Private)
            .unwrap();
        assert_eq!(election.state, ElectionState::Draft);
    }

    #[test]
    fn test_structural_edits_only_in_draft() {
        let registry = ElectionRegistry::new();
        let election = draft_with_ballot_structure(&registry);

        registry.schedule(election.id).unwrap();

        let err = registry.add_position(election.id, "Vice Lead").unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidState { state: ElectionState::Scheduled, .. }
        ));

        let position = registry.positions_for(election.id).unwrap().remove(0);
        let err = registry
            .add_candidate(position.id, "Late Candidate", None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
    }

    #[test]
    fn test_duplicate_position_title_rejected() {
        let registry = ElectionRegistry::new();
        let election = draft_with_ballot_structure(&registry);

        let err = registry.add_position(election.id, "Team Lead").unwrap_err();
        assert!(matches!(err, Error::DuplicatePosition { .. }));

        // Same title in a different election is fine
        let other = draft_with_ballot_structure(&registry);
        assert_ne!(other.id, election.id);
    }

    #[test]
    fn test_schedule_requires_complete_structure() {
        let registry = ElectionRegistry::new();
        let (start, end) = future_window();

        // No positions at all
        let empty = registry
            .create_election("m", "Empty", start, end, Visibility::Public)
            .unwrap();
        let err = registry.schedule(empty.id).unwrap_err();
        assert!(matches!(err, Error::InvalidSchedule { .. }));

        // Position without candidates
        let hollow = registry
            .create_election("m", "Hollow", start, end, Visibility::Public)
            .unwrap();
        registry.add_position(hollow.id, "President").unwrap();
        let err = registry.schedule(hollow.id).unwrap_err();
        assert!(matches!(err, Error::InvalidSchedule { .. }));
    }

    #[test]
    fn test_time_driven_transitions_are_lazy_and_idempotent() {
        let registry = ElectionRegistry::new();
        let election = draft_with_ballot_structure(&registry);
        registry.schedule(election.id).unwrap();

        // Move the window into the past: start passed, end not yet
        let now = Utc::now().timestamp();
        registry
            .set_window_for_testing(election.id, now - 60, now + 3600)
            .unwrap();

        // Repeated reads derive and persist the same transition once
        assert_eq!(registry.state(election.id).unwrap(), ElectionState::Active);
        assert_eq!(registry.state(election.id).unwrap(), ElectionState::Active);

        // End passes: Active -> Closed
        registry
            .set_window_for_testing(election.id, now - 7200, now - 60)
            .unwrap();
        assert_eq!(registry.state(election.id).unwrap(), ElectionState::Closed);
    }

    #[test]
    fn test_scheduled_election_never_observed_active_closes() {
        let registry = ElectionRegistry::new();
        let election = draft_with_ballot_structure(&registry);
        registry.schedule(election.id).unwrap();

        let now = Utc::now().timestamp();
        registry
            .set_window_for_testing(election.id, now - 7200, now - 3600)
            .unwrap();

        assert_eq!(registry.state(election.id).unwrap(), ElectionState::Closed);
    }

    #[test]
    fn test_close_requires_active() {
        let registry = ElectionRegistry::new();
        let election = draft_with_ballot_structure(&registry);

        let err = registry.close(election.id).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidState { state: ElectionState::Draft, .. }
        ));

        registry.schedule(election.id).unwrap();
        let err = registry.close(election.id).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidState { state: ElectionState::Scheduled, .. }
        ));

        // Early close from Active works (emergency stop)
        let now = Utc::now().timestamp();
        registry
            .set_window_for_testing(election.id, now - 60, now + 3600)
            .unwrap();
        let closed = registry.close(election.id).unwrap();
        assert_eq!(closed.state, ElectionState::Closed);

        // Closing twice fails
        let err = registry.close(election.id).unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
    }

    #[test]
    fn test_published_is_terminal() {
        let registry = ElectionRegistry::new();
        let election = draft_with_ballot_structure(&registry);
        registry.schedule(election.id).unwrap();

        let now = Utc::now().timestamp();
        registry
            .set_window_for_testing(election.id, now - 7200, now - 60)
            .unwrap();
        assert_eq!(registry.state(election.id).unwrap(), ElectionState::Closed);

        registry.mark_published(election.id).unwrap();
        assert_eq!(
            registry.state(election.id).unwrap(),
            ElectionState::Published
        );

        // No edges leave Published
        assert!(registry.close(election.id).is_err());
        assert!(registry.mark_published(election.id).is_err());
        assert!(registry.schedule(election.id).is_err());
    }

    #[test]
    fn test_missing_entities() {
        let registry = ElectionRegistry::new();
        assert!(matches!(
            registry.election(Uuid::new_v4()).unwrap_err(),
            Error::NotFound { .. }
        ));
        assert!(matches!(
            registry.position(Uuid::new_v4()).unwrap_err(),
            Error::NotFound { .. }
        ));
        assert!(matches!(
            registry.add_position(Uuid::new_v4(), "X").unwrap_err(),
            Error::NotFound { .. }
        ));
    }
}
