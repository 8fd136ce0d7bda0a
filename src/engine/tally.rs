//! Tally engine: deterministic aggregation of committed ballots
//!
//! Derives `ResultTally` records by folding over the ballot box's committed
//! log. Summation is commutative, so the result is independent of ballot
//! order; counts live in a `BTreeMap`, so recomputation over an unchanged
//! ballot set is bit-identical. The engine never mutates ballots and never
//! exposes per-voter selections.

use crate::engine::ballot_box::BallotBox;
use crate::engine::registry::ElectionRegistry;
use crate::types::{ElectionState, ResultTally};
use crate::{Error, Result, internal_error};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

pub struct TallyEngine {
    registry: Arc<ElectionRegistry>,
    ballot_box: Arc<BallotBox>,
    tallies: RwLock<HashMap<Uuid, ResultTally>>,
}

impl TallyEngine {
    pub fn new(registry: Arc<ElectionRegistry>, ballot_box: Arc<BallotBox>) -> Self {
        Self {
            registry,
            ballot_box,
            tallies: RwLock::new(HashMap::new()),
        }
    }

    /// Compute (or recompute) the tally for a closed election
    ///
    /// Every candidate appears in the counts, including those with zero
    /// votes. Recomputation over an unchanged ballot set returns the stored
    /// tally unchanged, preserving `computed_at` and the publish flag;
    /// recomputation is therefore idempotent and safe under concurrent
    /// invocation.
    pub fn compute_tally(&self, election_id: Uuid) -> Result<ResultTally> {
        let election = self.registry.election(election_id)?;
        if !matches!(
            election.state,
            ElectionState::Closed | ElectionState::Published
        ) {
            return Err(Error::ElectionNotClosed {
                state: election.state,
            });
        }

        let mut counts: BTreeMap<Uuid, u64> = BTreeMap::new();
        for position in self.registry.positions_for(election_id)? {
            for candidate in self.registry.candidates_for(position.id)? {
                counts.insert(candidate.id, 0);
            }
        }

        let ballots = self.ballot_box.ballots_for(election_id)?;
        let ballot_count = ballots.len() as u64;
        for ballot in &ballots {
            for candidate_id in ballot.selections.values() {
                *counts.entry(*candidate_id).or_insert(0) += 1;
            }
        }

        let mut tallies = self
            .tallies
            .write()
            .map_err(|_| internal_error!("Tally store lock poisoned"))?;

        // Idempotence: an unchanged ballot set keeps the stored tally
        // byte-for-byte, publish flag and timestamp included.
        if let Some(existing) = tallies.get(&election_id) {
            if existing.counts == counts && existing.ballot_count == ballot_count {
                return Ok(existing.clone());
            }
        }

        let tally = ResultTally {
            election_id,
            counts,
            ballot_count,
            computed_at: Utc::now().timestamp(),
            published: tallies
                .get(&election_id)
                .map(|t| t.published)
                .unwrap_or(false),
        };
        tallies.insert(election_id, tally.clone());

        tracing::info!(
            "🧮 Tally computed: election={}, ballots={}",
            election_id,
            tally.ballot_count
        );

        Ok(tally)
    }

    /// The stored tally for an election, if one has been computed
    pub fn tally(&self, election_id: Uuid) -> Result<Option<ResultTally>> {
        let tallies = self
            .tallies
            .read()
            .map_err(|_| internal_error!("Tally store lock poisoned"))?;
        Ok(tallies.get(&election_id).cloned())
    }

    /// Set the one-way publish flag; invoked only by the results publisher
    pub(crate) fn set_published(&self, election_id: Uuid) -> Result<ResultTally> {
        let mut tallies = self
            .tallies
            .write()
            .map_err(|_| internal_error!("Tally store lock poisoned"))?;

        let tally = tallies.get_mut(&election_id).ok_or(Error::NotTallied)?;
        if tally.published {
            return Err(Error::AlreadyPublished);
        }
        tally.published = true;

        Ok(tally.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::roll::VoterRoll;
    use crate::types::Visibility;

    struct Fixture {
        registry: Arc<ElectionRegistry>,
        roll: Arc<VoterRoll>,
        ballot_box: Arc<BallotBox>,
        tally_engine: TallyEngine,
        election_id: Uuid,
        position_id: Uuid,
        candidates: Vec<Uuid>,
    }

    /// An Active election with one position and `candidate_count` candidates.
    fn active_election(candidate_count: usize) -> Fixture {
        let registry = Arc::new(ElectionRegistry::new());
        let roll = Arc::new(VoterRoll::new());
        let ballot_box = Arc::new(BallotBox::new(registry.clone(), roll.clone(), 3));
        let tally_engine = TallyEngine::new(registry.clone(), ballot_box.clone());

        let now = Utc::now().timestamp();
        let election = registry
            .create_election(
                "manager@school.com",
                "Science Olympiad Team Lead",
                now + 3600,
                now + 7200,
                Visibility::Public,
            )
            .unwrap();
        let position = registry.add_position(election.id, "Team Lead").unwrap();
        let candidates: Vec<Uuid> = (0..candidate_count)
            .map(|i| {
                registry
                    .add_candidate(position.id, &format!("Candidate {i}"), None)
                    .unwrap()
                    .id
            })
            .collect();

        registry.schedule(election.id).unwrap();
        registry
            .set_window_for_testing(election.id, now - 60, now + 3600)
            .unwrap();

        Fixture {
            registry,
            roll,
            ballot_box,
            tally_engine,
            election_id: election.id,
            position_id: position.id,
            candidates,
        }
    }

    fn cast_for(fixture: &Fixture, voter: &str, candidate: Uuid) {
        fixture.roll.add_voter(fixture.election_id, voter).unwrap();
        let mut selections = BTreeMap::new();
        selections.insert(fixture.position_id, candidate);
        fixture
            .ballot_box
            .cast_ballot(fixture.election_id, voter, selections)
            .unwrap();
    }

    #[test]
    fn test_tally_requires_closed_election() {
        let fixture = active_election(2);

        let err = fixture
            .tally_engine
            .compute_tally(fixture.election_id)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ElectionNotClosed { state: ElectionState::Active }
        ));
    }

    #[test]
    fn test_conservation_68_ballots_across_3_candidates() {
        let fixture = active_election(3);

        // 35 / 28 / 5, matching the published scenario
        let spread = [35usize, 28, 5];
        let mut voter = 0;
        for (candidate_index, votes) in spread.iter().enumerate() {
            for _ in 0..*votes {
                cast_for(
                    &fixture,
                    &format!("voter{voter}@school.com"),
                    fixture.candidates[candidate_index],
                );
                voter += 1;
            }
        }

        fixture.registry.close(fixture.election_id).unwrap();
        let tally = fixture
            .tally_engine
            .compute_tally(fixture.election_id)
            .unwrap();

        assert_eq!(tally.ballot_count, 68);
        assert_eq!(tally.counts.values().sum::<u64>(), 68);
        assert_eq!(tally.counts[&fixture.candidates[0]], 35);
        assert_eq!(tally.counts[&fixture.candidates[1]], 28);
        assert_eq!(tally.counts[&fixture.candidates[2]], 5);
    }

    #[test]
    fn test_zero_vote_candidates_appear_in_counts() {
        let fixture = active_election(3);
        cast_for(&fixture, "only.voter@school.com", fixture.candidates[0]);

        fixture.registry.close(fixture.election_id).unwrap();
        let tally = fixture
            .tally_engine
            .compute_tally(fixture.election_id)
            .unwrap();

        assert_eq!(tally.counts.len(), 3);
        assert_eq!(tally.counts[&fixture.candidates[1]], 0);
        assert_eq!(tally.counts[&fixture.candidates[2]], 0);
    }

    #[test]
    fn test_recomputation_is_idempotent() {
        let fixture = active_election(2);
        cast_for(&fixture, "a@school.com", fixture.candidates[0]);
        cast_for(&fixture, "b@school.com", fixture.candidates[1]);

        fixture.registry.close(fixture.election_id).unwrap();

        let first = fixture
            .tally_engine
            .compute_tally(fixture.election_id)
            .unwrap();
        let second = fixture
            .tally_engine
            .compute_tally(fixture.election_id)
            .unwrap();

        // Bit-identical, computed_at included
        assert_eq!(first, second);
    }

    #[test]
    fn test_publish_flag_is_one_way() {
        let fixture = active_election(2);
        cast_for(&fixture, "a@school.com", fixture.candidates[0]);
        fixture.registry.close(fixture.election_id).unwrap();

        assert!(matches!(
            fixture
                .tally_engine
                .set_published(fixture.election_id)
                .unwrap_err(),
            Error::NotTallied
        ));

        fixture
            .tally_engine
            .compute_tally(fixture.election_id)
            .unwrap();
        let published = fixture
            .tally_engine
            .set_published(fixture.election_id)
            .unwrap();
        assert!(published.published);

        assert!(matches!(
            fixture
                .tally_engine
                .set_published(fixture.election_id)
                .unwrap_err(),
            Error::AlreadyPublished
        ));

        // Recomputation after publish keeps the flag set
        let recomputed = fixture
            .tally_engine
            .compute_tally(fixture.election_id)
            .unwrap();
        assert!(recomputed.published);
    }
}
