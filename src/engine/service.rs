//! Role-gated command/query facade over the engine components
//!
//! The single entry point consumed by a presentation layer or programmatic
//! client. Every command takes an already resolved [`Actor`] (identity plus
//! role, produced by the external identity authority), performs its
//! capability check before any business logic, and appends exactly one
//! audit entry recording success or the specific typed failure. Queries do
//! not audit; only mutations do.

use crate::audit::{ActionKind, AuditEntry, AuditLog, AuditQuery, AuditTarget, Outcome};
use crate::config::Config;
use crate::engine::ballot_box::BallotBox;
use crate::engine::publisher::ResultsPublisher;
use crate::engine::registry::ElectionRegistry;
use crate::engine::roll::VoterRoll;
use crate::engine::tally::TallyEngine;
use crate::types::{
    Actor, Ballot, Candidate, Election, ElectionState, Position, ResultTally, Role, RollSummary,
    Timestamp, Visibility, VoterRollEntry,
};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

pub struct ElectionService {
    registry: Arc<ElectionRegistry>,
    roll: Arc<VoterRoll>,
    ballot_box: Arc<BallotBox>,
    tally_engine: Arc<TallyEngine>,
    publisher: ResultsPublisher,
    audit: Arc<AuditLog>,
}

impl ElectionService {
    pub fn new(config: &Config) -> Self {
        let registry = Arc::new(ElectionRegistry::new());
        let roll = Arc::new(VoterRoll::new());
        let ballot_box = Arc::new(BallotBox::new(
            registry.clone(),
            roll.clone(),
            config.commit.max_commit_retries,
        ));
        let tally_engine = Arc::new(TallyEngine::new(registry.clone(), ballot_box.clone()));
        let publisher =
            ResultsPublisher::new(registry.clone(), roll.clone(), tally_engine.clone());

        Self {
            registry,
            roll,
            ballot_box,
            tally_engine,
            publisher,
            audit: Arc::new(AuditLog::new()),
        }
    }

    // ---- Commands -------------------------------------------------------

    /// Create a new Draft election owned by the calling manager
    pub async fn create_election(
        &self,
        actor: &Actor,
        name: &str,
        start_time: Timestamp,
        end_time: Timestamp,
        visibility: Visibility,
    ) -> Result<Election> {
        let result = self.require_role(actor, &[Role::Manager]).and_then(|_| {
            self.registry
                .create_election(&actor.id, name, start_time, end_time, visibility)
        });

        let target = match &result {
            Ok(election) => AuditTarget::Election(election.id),
            Err(_) => AuditTarget::System,
        };
        self.record(actor, ActionKind::CreateElection, target, &result)
            .await;
        result
    }

    /// Add a position to a Draft election (owning manager only)
    pub async fn add_position(
        &self,
        actor: &Actor,
        election_id: Uuid,
        title: &str,
    ) -> Result<Position> {
        let result = (|| {
            self.require_role(actor, &[Role::Manager])?;
            let election = self.registry.election(election_id)?;
            self.require_owner(actor, &election)?;
            self.registry.add_position(election_id, title)
        })();

        let target = match &result {
            Ok(position) => AuditTarget::Position {
                election_id,
                position_id: position.id,
            },
            Err(_) => AuditTarget::Election(election_id),
        };
        self.record(actor, ActionKind::AddPosition, target, &result)
            .await;
        result
    }

    /// Add a candidate to a position whose election is Draft (owner only)
    pub async fn add_candidate(
        &self,
        actor: &Actor,
        position_id: Uuid,
        name: &str,
        statement: Option<String>,
    ) -> Result<Candidate> {
        let result = (|| -> Result<(Uuid, Candidate)> {
            self.require_role(actor, &[Role::Manager])?;
            let position = self.registry.position(position_id)?;
            let election = self.registry.election(position.election_id)?;
            self.require_owner(actor, &election)?;
            let candidate = self.registry.add_candidate(position_id, name, statement)?;
            Ok((election.id, candidate))
        })();

        let target = match &result {
            Ok((election_id, candidate)) => AuditTarget::Candidate {
                election_id: *election_id,
                candidate_id: candidate.id,
            },
            Err(_) => AuditTarget::System,
        };
        self.record(actor, ActionKind::AddCandidate, target, &result)
            .await;
        result.map(|(_, candidate)| candidate)
    }

    /// Explicit Draft→Scheduled transition (owning manager only)
    pub async fn schedule_election(&self, actor: &Actor, election_id: Uuid) -> Result<Election> {
        let result = (|| {
            self.require_role(actor, &[Role::Manager])?;
            let election = self.registry.election(election_id)?;
            self.require_owner(actor, &election)?;
            self.registry.schedule(election_id)
        })();

        self.record(
            actor,
            ActionKind::ScheduleElection,
            AuditTarget::Election(election_id),
            &result,
        )
        .await;
        result
    }

    /// Add a voter to the roll; frozen once the election can start
    pub async fn add_voter(
        &self,
        actor: &Actor,
        election_id: Uuid,
        voter_id: &str,
    ) -> Result<VoterRollEntry> {
        let result = (|| {
            self.require_role(actor, &[Role::Manager])?;
            let election = self.registry.election(election_id)?;
            self.require_owner(actor, &election)?;
            if !election.state.roll_open() {
                return Err(Error::invalid_state("add_voter", election.state));
            }
            self.roll.add_voter(election_id, voter_id)
        })();

        self.record(
            actor,
            ActionKind::AddVoter,
            AuditTarget::Voter {
                election_id,
                voter_id: voter_id.to_string(),
            },
            &result,
        )
        .await;
        result
    }

    /// Early close (emergency stop) by the owning manager or an admin
    pub async fn close_election(&self, actor: &Actor, election_id: Uuid) -> Result<Election> {
        let result = (|| {
            self.require_role(actor, &[Role::Manager, Role::Admin])?;
            let election = self.registry.election(election_id)?;
            self.require_owner(actor, &election)?;
            self.registry.close(election_id)
        })();

        self.record(
            actor,
            ActionKind::CloseElection,
            AuditTarget::Election(election_id),
            &result,
        )
        .await;
        result
    }

    /// Cast the calling voter's ballot
    ///
    /// The voter identity is taken from the actor, recorded in the audit
    /// trail, and never exposed in any tally-facing output.
    pub async fn cast_ballot(
        &self,
        actor: &Actor,
        election_id: Uuid,
        selections: BTreeMap<Uuid, Uuid>,
    ) -> Result<Ballot> {
        let result = self
            .require_role(actor, &[Role::Voter])
            .and_then(|_| self.ballot_box.cast_ballot(election_id, &actor.id, selections));

        let target = match &result {
            Ok(ballot) => AuditTarget::Ballot {
                election_id,
                ballot_id: ballot.id,
            },
            Err(_) => AuditTarget::Voter {
                election_id,
                voter_id: actor.id.clone(),
            },
        };
        self.record(actor, ActionKind::CastBallot, target, &result)
            .await;
        result
    }

    /// Compute (or recompute) the tally for a closed election
    pub async fn compute_tally(&self, actor: &Actor, election_id: Uuid) -> Result<ResultTally> {
        let result = (|| {
            self.require_role(actor, &[Role::Manager, Role::Admin])?;
            let election = self.registry.election(election_id)?;
            self.require_owner(actor, &election)?;
            self.tally_engine.compute_tally(election_id)
        })();

        self.record(
            actor,
            ActionKind::ComputeTally,
            AuditTarget::Election(election_id),
            &result,
        )
        .await;
        result
    }

    /// Publish a closed election's tally; irreversible
    pub async fn publish(&self, actor: &Actor, election_id: Uuid) -> Result<ResultTally> {
        let result = (|| {
            self.require_role(actor, &[Role::Manager, Role::Admin])?;
            let election = self.registry.election(election_id)?;
            self.require_owner(actor, &election)?;
            self.publisher.publish(election_id)
        })();

        self.record(
            actor,
            ActionKind::PublishResults,
            AuditTarget::Election(election_id),
            &result,
        )
        .await;
        result
    }

    // ---- Queries --------------------------------------------------------

    /// Fetch an election, applying visibility rules
    ///
    /// A private election is reported as absent to callers who may not view
    /// it; authorization failures must not disclose that the id exists.
    pub fn get_election(&self, actor: &Actor, election_id: Uuid) -> Result<Election> {
        let election = self.registry.election(election_id)?;
        if !self.publisher.may_view(&election, actor)? {
            return Err(Error::not_found("Election", election_id));
        }
        Ok(election)
    }

    /// Current lifecycle state; always available, visibility permitting
    pub fn get_state(&self, actor: &Actor, election_id: Uuid) -> Result<ElectionState> {
        Ok(self.get_election(actor, election_id)?.state)
    }

    /// Active elections in which this voter may still cast a ballot
    pub fn list_elections_for_voter(&self, voter_id: &str) -> Result<Vec<Election>> {
        let mut open = Vec::new();
        for election_id in self.roll.open_elections_for(voter_id)? {
            let election = self.registry.election(election_id)?;
            if election.state == ElectionState::Active {
                open.push(election);
            }
        }
        Ok(open)
    }

    /// Whether the calling voter has a committed ballot in this election
    pub fn has_voted(&self, actor: &Actor, election_id: Uuid) -> Result<bool> {
        self.roll.has_voted(election_id, &actor.id)
    }

    /// The positions and candidates a voter picks from, visibility permitting
    pub fn ballot_structure(
        &self,
        actor: &Actor,
        election_id: Uuid,
    ) -> Result<Vec<(Position, Vec<Candidate>)>> {
        self.get_election(actor, election_id)?;
        let mut structure = Vec::new();
        for position in self.registry.positions_for(election_id)? {
            let candidates = self.registry.candidates_for(position.id)?;
            structure.push((position, candidates));
        }
        Ok(structure)
    }

    /// Elections visible to a manager or admin: own elections for managers,
    /// everything for admins
    pub fn list_elections(&self, actor: &Actor) -> Result<Vec<Election>> {
        self.require_role(actor, &[Role::Manager, Role::Admin])?;
        let mut elections = self.registry.list_elections()?;
        if actor.role == Role::Manager {
            elections.retain(|e| e.owner == actor.id);
        }
        Ok(elections)
    }

    /// A published tally, visibility permitting
    pub fn get_published_results(&self, actor: &Actor, election_id: Uuid) -> Result<ResultTally> {
        self.publisher.published_results(election_id, actor)
    }

    /// Roll counts for a manager's election overview (owner or admin)
    pub fn roll_summary(&self, actor: &Actor, election_id: Uuid) -> Result<RollSummary> {
        self.require_role(actor, &[Role::Manager, Role::Admin])?;
        let election = self.registry.election(election_id)?;
        self.require_owner(actor, &election)?;
        self.roll.summary(election_id)
    }

    /// The audit trail, optionally filtered to one election (admin only)
    pub async fn get_audit_log(
        &self,
        actor: &Actor,
        election_id: Option<Uuid>,
    ) -> Result<Vec<AuditEntry>> {
        self.require_role(actor, &[Role::Admin])?;
        self.audit
            .query(AuditQuery {
                election_id,
                ..Default::default()
            })
            .await
    }

    /// Verify the audit chain end to end (admin only)
    pub async fn verify_audit_chain(&self, actor: &Actor) -> Result<crate::audit::IntegrityReport> {
        self.require_role(actor, &[Role::Admin])?;
        self.audit.verify_chain().await
    }

    // ---- Internals ------------------------------------------------------

    fn require_role(&self, actor: &Actor, allowed: &[Role]) -> Result<()> {
        if allowed.contains(&actor.role) {
            Ok(())
        } else {
            Err(Error::NotAuthorized)
        }
    }

    /// Managers may operate only on elections they own; admins on any
    fn require_owner(&self, actor: &Actor, election: &Election) -> Result<()> {
        match actor.role {
            Role::Admin => Ok(()),
            Role::Manager if election.owner == actor.id => Ok(()),
            _ => Err(Error::NotAuthorized),
        }
    }

    /// Append the audit entry for an attempted mutation
    ///
    /// Fire-and-forget relative to the operation's result: an append
    /// failure is logged, never propagated. Runs on failure paths too, so
    /// every attempt leaves exactly one entry.
    async fn record<T>(
        &self,
        actor: &Actor,
        action: ActionKind,
        target: AuditTarget,
        result: &Result<T>,
    ) {
        let outcome = match result {
            Ok(_) => Outcome::Success,
            Err(err) => Outcome::Failure {
                reason: err.to_string(),
            },
        };

        if let Err(err) = self.audit.append(actor, action, target, outcome).await {
            tracing::warn!("Audit append failed: {err}");
        }
    }

    /// Direct registry access for fixtures that need to reposition an
    /// election inside its voting window.
    #[cfg(test)]
    pub(crate) fn registry_for_testing(&self) -> &ElectionRegistry {
        &self.registry
    }
}
