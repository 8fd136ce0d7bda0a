//! Voter roll: per-election eligibility and voting status
//!
//! Exclusively owns `VoterRollEntry` state. The has-voted flag is flipped
//! only through [`VoterRoll::mark_voted`], a compare-and-set invoked by the
//! ballot box inside its commit boundary, and is never reversed.

use crate::types::{RollSummary, VoterRollEntry};
use crate::{Error, Result, internal_error};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockWriteGuard};
use uuid::Uuid;

/// Storage key: one entry per (election, voter) pair
pub(crate) type RollKey = (Uuid, String);

pub struct VoterRoll {
    entries: RwLock<HashMap<RollKey, VoterRollEntry>>,
}

impl VoterRoll {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Add a voter to an election's roll
    ///
    /// The roll-freeze check (no additions once the election is past
    /// Scheduled) lives in the service layer, which owns the registry; this
    /// method enforces only the uniqueness invariant.
    pub fn add_voter(&self, election_id: Uuid, voter_id: &str) -> Result<VoterRollEntry> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| internal_error!("Roll lock poisoned"))?;

        let key = (election_id, voter_id.to_string());
        if entries.contains_key(&key) {
            return Err(Error::DuplicateVoter {
                election_id,
                voter_id: voter_id.to_string(),
            });
        }

        let entry = VoterRollEntry {
            election_id,
            voter_id: voter_id.to_string(),
            eligible: true,
            has_voted: false,
            added_at: Utc::now(),
        };
        entries.insert(key, entry.clone());

        Ok(entry)
    }

    /// Whether the voter may still cast a ballot: on the roll, eligible,
    /// and not yet voted
    pub fn is_eligible(&self, election_id: Uuid, voter_id: &str) -> Result<bool> {
        let entries = self
            .entries
            .read()
            .map_err(|_| internal_error!("Roll lock poisoned"))?;

        Ok(entries
            .get(&(election_id, voter_id.to_string()))
            .map(|e| e.eligible && !e.has_voted)
            .unwrap_or(false))
    }

    /// Look up one roll entry
    pub fn entry(&self, election_id: Uuid, voter_id: &str) -> Result<Option<VoterRollEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| internal_error!("Roll lock poisoned"))?;
        Ok(entries.get(&(election_id, voter_id.to_string())).cloned())
    }

    /// Whether this voter has a committed ballot in the election
    pub fn has_voted(&self, election_id: Uuid, voter_id: &str) -> Result<bool> {
        Ok(self
            .entry(election_id, voter_id)?
            .map(|e| e.has_voted)
            .unwrap_or(false))
    }

    /// All roll entries for an election
    pub fn entries_for(&self, election_id: Uuid) -> Result<Vec<VoterRollEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| internal_error!("Roll lock poisoned"))?;
        Ok(entries
            .values()
            .filter(|e| e.election_id == election_id)
            .cloned()
            .collect())
    }

    /// Aggregate counts for a manager's roll overview
    pub fn summary(&self, election_id: Uuid) -> Result<RollSummary> {
        let entries = self.entries_for(election_id)?;
        let total = entries.len() as u64;
        let voted = entries.iter().filter(|e| e.has_voted).count() as u64;
        Ok(RollSummary {
            total,
            voted,
            remaining: total - voted,
        })
    }

    /// Elections where this voter holds an eligible, not-yet-voted entry
    pub fn open_elections_for(&self, voter_id: &str) -> Result<Vec<Uuid>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| internal_error!("Roll lock poisoned"))?;
        Ok(entries
            .values()
            .filter(|e| e.voter_id == voter_id && e.eligible && !e.has_voted)
            .map(|e| e.election_id)
            .collect())
    }

    /// Write-lock the underlying entries for the ballot commit boundary
    ///
    /// Only the ballot box uses this, so the has-voted flip and the ballot
    /// insert happen under the same pair of write guards. Lock order is
    /// always roll before ballots.
    pub(crate) fn lock_entries(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<RollKey, VoterRollEntry>>> {
        self.entries
            .write()
            .map_err(|_| internal_error!("Roll lock poisoned"))
    }

    /// Compare-and-set the has-voted flag on an already write-locked roll
    ///
    /// Returns `AlreadyVoted` if the flag is set, `NotEligible` if the entry
    /// is missing or ineligible. Never clears the flag.
    pub(crate) fn mark_voted(
        entries: &mut HashMap<RollKey, VoterRollEntry>,
        election_id: Uuid,
        voter_id: &str,
    ) -> Result<()> {
        let entry = entries
            .get_mut(&(election_id, voter_id.to_string()))
            .ok_or(Error::NotEligible)?;

        if !entry.eligible {
            return Err(Error::NotEligible);
        }
        if entry.has_voted {
            return Err(Error::AlreadyVoted);
        }

        entry.has_voted = true;
        Ok(())
    }
}

impl Default for VoterRoll {
    fn default() -> Self {
        Self::new()
    }
}
