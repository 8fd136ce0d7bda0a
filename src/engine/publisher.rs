//! Results publisher: the explicit, irreversible publish gate
//!
//! Tallies stay invisible until a manager or admin publishes them. Publish
//! sets the tally's one-way flag and advances the election to its terminal
//! Published state in the same operation; reads of published results apply
//! the election's visibility rules to the caller.

use crate::engine::registry::ElectionRegistry;
use crate::engine::roll::VoterRoll;
use crate::engine::tally::TallyEngine;
use crate::types::{Actor, Election, ElectionState, ResultTally, Role, Visibility};
use crate::{Error, Result};
use std::sync::Arc;
use uuid::Uuid;

pub struct ResultsPublisher {
    registry: Arc<ElectionRegistry>,
    roll: Arc<VoterRoll>,
    tally_engine: Arc<TallyEngine>,
}

impl ResultsPublisher {
    pub fn new(
        registry: Arc<ElectionRegistry>,
        roll: Arc<VoterRoll>,
        tally_engine: Arc<TallyEngine>,
    ) -> Self {
        Self {
            registry,
            roll,
            tally_engine,
        }
    }

    /// Publish an election's tally
    ///
    /// Gate order: a tally must exist (`NotTallied`), must not already be
    /// published (`AlreadyPublished`), and the election must be Closed
    /// (`InvalidState`). On success the flag is set irreversibly and the
    /// election advances to Published.
    pub fn publish(&self, election_id: Uuid) -> Result<ResultTally> {
        let election = self.registry.election(election_id)?;

        match self.tally_engine.tally(election_id)? {
            None => return Err(Error::NotTallied),
            Some(tally) if tally.published => return Err(Error::AlreadyPublished),
            Some(_) => {}
        }

        if election.state != ElectionState::Closed {
            return Err(Error::invalid_state("publish", election.state));
        }

        let tally = self.tally_engine.set_published(election_id)?;
        self.registry.mark_published(election_id)?;

        tracing::info!("📢 Results published: election={}", election_id);

        Ok(tally)
    }

    /// Read a published tally, enforcing visibility
    ///
    /// Private elections are visible only to roll members, the owning
    /// manager, and admins; the authorization check runs before the
    /// published check so an unauthorized caller learns nothing about the
    /// election's progress.
    pub fn published_results(&self, election_id: Uuid, actor: &Actor) -> Result<ResultTally> {
        let election = self.registry.election(election_id)?;

        if !self.may_view(&election, actor)? {
            return Err(Error::NotAuthorized);
        }

        match self.tally_engine.tally(election_id)? {
            Some(tally) if tally.published => Ok(tally),
            _ => Err(Error::NotPublished),
        }
    }

    /// Visibility rule shared with the service's election reads
    pub fn may_view(&self, election: &Election, actor: &Actor) -> Result<bool> {
        match election.visibility {
            Visibility::Public => Ok(true),
            Visibility::Private => Ok(match actor.role {
                Role::Admin => true,
                Role::Manager => election.owner == actor.id,
                Role::Voter => self.roll.entry(election.id, &actor.id)?.is_some(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ballot_box::BallotBox;
    use chrono::Utc;
    use std::collections::BTreeMap;

    struct Fixture {
        registry: Arc<ElectionRegistry>,
        tally_engine: Arc<TallyEngine>,
        publisher: ResultsPublisher,
        election_id: Uuid,
    }

    /// A Closed election with one committed ballot, ready to tally.
    fn closed_election(visibility: Visibility) -> Fixture {
        let registry = Arc::new(ElectionRegistry::new());
        let roll = Arc::new(VoterRoll::new());
        let ballot_box = Arc::new(BallotBox::new(registry.clone(), roll.clone(), 3));
        let tally_engine = Arc::new(TallyEngine::new(registry.clone(), ballot_box.clone()));
        let publisher =
            ResultsPublisher::new(registry.clone(), roll.clone(), tally_engine.clone());

        let now = Utc::now().timestamp();
        let election = registry
            .create_election(
                "manager@school.com",
                "Annual Fest Committee Head",
                now + 3600,
                now + 7200,
                visibility,
            )
            .unwrap();
        let position = registry.add_position(election.id, "Committee Head").unwrap();
        let candidate = registry
            .add_candidate(position.id, "Priya Sharma", None)
            .unwrap();
        roll.add_voter(election.id, "member@school.com").unwrap();

        registry.schedule(election.id).unwrap();
        registry
            .set_window_for_testing(election.id, now - 60, now + 3600)
            .unwrap();

        let mut selections = BTreeMap::new();
        selections.insert(position.id, candidate.id);
        ballot_box
            .cast_ballot(election.id, "member@school.com", selections)
            .unwrap();

        registry.close(election.id).unwrap();

        Fixture {
            registry,
            tally_engine,
            publisher,
            election_id: election.id,
        }
    }

    #[test]
    fn test_publish_gate_order() {
        let fixture = closed_election(Visibility::Public);

        // No tally yet
        assert!(matches!(
            fixture.publisher.publish(fixture.election_id).unwrap_err(),
            Error::NotTallied
        ));

        fixture.tally_engine.compute_tally(fixture.election_id).unwrap();

        let tally = fixture.publisher.publish(fixture.election_id).unwrap();
        assert!(tally.published);
        assert_eq!(
            fixture.registry.state(fixture.election_id).unwrap(),
            ElectionState::Published
        );

        // Second publish fails; the flag is one-way
        assert!(matches!(
            fixture.publisher.publish(fixture.election_id).unwrap_err(),
            Error::AlreadyPublished
        ));
    }

    #[test]
    fn test_results_hidden_until_published() {
        let fixture = closed_election(Visibility::Public);
        let anyone = Actor::voter("anyone@school.com");

        assert!(matches!(
            fixture
                .publisher
                .published_results(fixture.election_id, &anyone)
                .unwrap_err(),
            Error::NotPublished
        ));

        fixture.tally_engine.compute_tally(fixture.election_id).unwrap();

        // A computed but unpublished tally is still hidden
        assert!(matches!(
            fixture
                .publisher
                .published_results(fixture.election_id, &anyone)
                .unwrap_err(),
            Error::NotPublished
        ));

        fixture.publisher.publish(fixture.election_id).unwrap();
        let tally = fixture
            .publisher
            .published_results(fixture.election_id, &anyone)
            .unwrap();
        assert_eq!(tally.ballot_count, 1);
    }

    #[test]
    fn test_private_election_visibility() {
        let fixture = closed_election(Visibility::Private);
        fixture.tally_engine.compute_tally(fixture.election_id).unwrap();
        fixture.publisher.publish(fixture.election_id).unwrap();

        // Roll member, owning manager, and admin may view
        for actor in [
            Actor::voter("member@school.com"),
            Actor::manager("manager@school.com"),
            Actor::admin("admin@school.com"),
        ] {
            fixture
                .publisher
                .published_results(fixture.election_id, &actor)
                .unwrap();
        }

        // Outsiders and other managers may not
        for actor in [
            Actor::voter("outsider@school.com"),
            Actor::manager("other.manager@school.com"),
        ] {
            assert!(matches!(
                fixture
                    .publisher
                    .published_results(fixture.election_id, &actor)
                    .unwrap_err(),
                Error::NotAuthorized
            ));
        }
    }

    #[test]
    fn test_publish_requires_closed_election() {
        let registry = Arc::new(ElectionRegistry::new());
        let roll = Arc::new(VoterRoll::new());
        let ballot_box = Arc::new(BallotBox::new(registry.clone(), roll.clone(), 3));
        let tally_engine = Arc::new(TallyEngine::new(registry.clone(), ballot_box));
        let publisher = ResultsPublisher::new(registry.clone(), roll, tally_engine);

        let now = Utc::now().timestamp();
        let election = registry
            .create_election("m", "Draft Only", now + 3600, now + 7200, Visibility::Public)
            .unwrap();

        // Draft election: no tally exists, so NotTallied fires first
        assert!(matches!(
            publisher.publish(election.id).unwrap_err(),
            Error::NotTallied
        ));
    }
}
