//! Ballot box: validation and atomic commit of ballots
//!
//! The integrity-critical component. A cast is only committed when the
//! election is Active, the voter is eligible and has not voted, and the
//! selections cover every position exactly once with candidates that belong
//! to their claimed positions. The commit itself persists the ballot and
//! flips the roll's has-voted flag as one indivisible unit: both write
//! guards (roll first, then ballots) are held across the whole commit, and
//! the has-voted compare-and-set plus a unique (election, voter) ballot
//! index guarantee that concurrent duplicate casts produce exactly one
//! success and one `AlreadyVoted`.
//!
//! Ballots are immutable once committed; no update or delete exists.

use crate::engine::registry::ElectionRegistry;
use crate::engine::roll::VoterRoll;
use crate::types::{Ballot, ElectionState};
use crate::{Error, Result, internal_error};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Committed ballots plus the unique (election, voter) index
///
/// Both live under one lock so the index can never disagree with the
/// ballots it guards.
#[derive(Default)]
struct BallotStore {
    ballots: HashMap<Uuid, Ballot>,
    by_voter: HashMap<(Uuid, String), Uuid>,
}

pub struct BallotBox {
    registry: Arc<ElectionRegistry>,
    roll: Arc<VoterRoll>,
    store: RwLock<BallotStore>,
    max_commit_retries: u32,
}

impl BallotBox {
    pub fn new(
        registry: Arc<ElectionRegistry>,
        roll: Arc<VoterRoll>,
        max_commit_retries: u32,
    ) -> Self {
        Self {
            registry,
            roll,
            store: RwLock::new(BallotStore::default()),
            max_commit_retries: max_commit_retries.max(1),
        }
    }

    /// Validate and commit one ballot
    ///
    /// Failure order follows the casting contract: election state, voter
    /// standing, ballot completeness, then the atomic commit.
    pub fn cast_ballot(
        &self,
        election_id: Uuid,
        voter_id: &str,
        selections: BTreeMap<Uuid, Uuid>,
    ) -> Result<Ballot> {
        // 1. Election must be Active (lazy time-driven sync included).
        let election = self.registry.election(election_id)?;
        if election.state != ElectionState::Active {
            return Err(Error::ElectionNotActive {
                state: election.state,
            });
        }

        // 2. Voter must be on the roll, eligible, and not yet voted. This
        //    precheck gives the common failure paths a cheap answer; the
        //    commit re-checks under the write guards.
        match self.roll.entry(election_id, voter_id)? {
            None => return Err(Error::NotEligible),
            Some(entry) if !entry.eligible => return Err(Error::NotEligible),
            Some(entry) if entry.has_voted => return Err(Error::AlreadyVoted),
            Some(_) => {}
        }

        // 3. Selections must cover every position exactly once with
        //    candidates belonging to their claimed positions.
        self.validate_selections(election_id, &selections)?;

        let ballot = Ballot {
            id: Uuid::new_v4(),
            election_id,
            voter_id: voter_id.to_string(),
            selections,
            cast_at: Utc::now().timestamp(),
        };

        // 4. Atomic commit, with a bounded local retry on internal storage
        //    conflicts. Domain errors (AlreadyVoted, NotEligible) surface
        //    immediately and are never retried.
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.commit(&ballot) {
                Err(Error::Conflict { message }) if attempts < self.max_commit_retries => {
                    tracing::warn!(
                        "⚠️  Ballot commit conflict (attempt {}/{}): {}",
                        attempts,
                        self.max_commit_retries,
                        message
                    );
                    continue;
                }
                result => {
                    result?;
                    break;
                }
            }
        }

        tracing::info!(
            "🗳️  Ballot committed: election={}, ballot={}",
            election_id,
            ballot.id
        );

        Ok(ballot)
    }

    /// Persist the ballot and flip has-voted as one indivisible unit
    ///
    /// Lock order: roll entries first, then the ballot store. The roll
    /// compare-and-set is the serialization point for a (election, voter)
    /// pair; the by_voter index is defense in depth at the storage layer.
    fn commit(&self, ballot: &Ballot) -> Result<()> {
        let mut entries = self.roll.lock_entries()?;
        let mut store = self
            .store
            .write()
            .map_err(|_| internal_error!("Ballot store lock poisoned"))?;

        let voter_key = (ballot.election_id, ballot.voter_id.clone());
        if store.by_voter.contains_key(&voter_key) {
            // A ballot already exists; never overwrite or duplicate.
            return Err(Error::AlreadyVoted);
        }

        VoterRoll::mark_voted(&mut entries, ballot.election_id, &ballot.voter_id)?;

        store.by_voter.insert(voter_key, ballot.id);
        store.ballots.insert(ballot.id, ballot.clone());

        Ok(())
    }

    fn validate_selections(
        &self,
        election_id: Uuid,
        selections: &BTreeMap<Uuid, Uuid>,
    ) -> Result<()> {
        let positions = self.registry.positions_for(election_id)?;

        if selections.len() != positions.len() {
            return Err(Error::incomplete_ballot(format!(
                "expected {} selections, got {}",
                positions.len(),
                selections.len()
            )));
        }

        for position in &positions {
            let candidate_id = selections.get(&position.id).ok_or_else(|| {
                Error::incomplete_ballot(format!("no selection for position '{}'", position.title))
            })?;

            let belongs = self
                .registry
                .candidates_for(position.id)?
                .iter()
                .any(|c| &c.id == candidate_id);
            if !belongs {
                return Err(Error::incomplete_ballot(format!(
                    "candidate {} does not stand for position '{}'",
                    candidate_id, position.title
                )));
            }
        }

        Ok(())
    }

    /// All committed ballots for an election
    pub fn ballots_for(&self, election_id: Uuid) -> Result<Vec<Ballot>> {
        let store = self
            .store
            .read()
            .map_err(|_| internal_error!("Ballot store lock poisoned"))?;
        Ok(store
            .ballots
            .values()
            .filter(|b| b.election_id == election_id)
            .cloned()
            .collect())
    }

    /// Number of committed ballots for an election
    pub fn ballot_count(&self, election_id: Uuid) -> Result<u64> {
        let store = self
            .store
            .read()
            .map_err(|_| internal_error!("Ballot store lock poisoned"))?;
        Ok(store
            .by_voter
            .keys()
            .filter(|(eid, _)| *eid == election_id)
            .count() as u64)
    }

    /// Whether a committed ballot exists for this (election, voter) pair
    pub fn has_ballot(&self, election_id: Uuid, voter_id: &str) -> Result<bool> {
        let store = self
            .store
            .read()
            .map_err(|_| internal_error!("Ballot store lock poisoned"))?;
        Ok(store
            .by_voter
            .contains_key(&(election_id, voter_id.to_string())))
    }
}
