//! Append-only audit log with a tamper-evident hash chain
//!
//! Every state-changing operation across the engine, successful or not,
//! produces exactly one [`AuditEntry`]. Entries are hash-chained: each
//! carries a Blake3 hash of its own content and the full hash of its
//! predecessor, so any mutation, deletion, or reordering of the sequence is
//! detectable by [`AuditLog::verify_chain`]. Entries are never mutated or
//! deleted.

use crate::types::{Actor, Role};
use crate::{Result, internal_error};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Hash arbitrary bytes with Blake3
fn hash_bytes(data: &[u8]) -> [u8; 32] {
    blake3::hash(data).into()
}

/// Constant-time hash comparison
fn hashes_equal(a: &[u8; 32], b: &[u8; 32]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

/// The state-changing operation an audit entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    CreateElection,
    AddPosition,
    AddCandidate,
    ScheduleElection,
    CloseElection,
    AddVoter,
    CastBallot,
    ComputeTally,
    PublishResults,
}

/// The entity an audit entry refers to
///
/// Every variant except `System` carries the owning election id so the log
/// can be filtered per election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditTarget {
    Election(Uuid),
    Position {
        election_id: Uuid,
        position_id: Uuid,
    },
    Candidate {
        election_id: Uuid,
        candidate_id: Uuid,
    },
    Voter {
        election_id: Uuid,
        voter_id: String,
    },
    Ballot {
        election_id: Uuid,
        ballot_id: Uuid,
    },
    /// Operation failed before any entity was resolved
    System,
}

impl AuditTarget {
    /// The election this target belongs to, if any
    pub fn election_id(&self) -> Option<Uuid> {
        match self {
            AuditTarget::Election(id) => Some(*id),
            AuditTarget::Position { election_id, .. }
            | AuditTarget::Candidate { election_id, .. }
            | AuditTarget::Voter { election_id, .. }
            | AuditTarget::Ballot { election_id, .. } => Some(*election_id),
            AuditTarget::System => None,
        }
    }
}

/// Whether the recorded operation succeeded, and if not, why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Failure { reason: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// One immutable record in the audit chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique record identifier
    pub record_id: Uuid,

    /// Position in the chain (monotonically increasing from 1)
    pub sequence: u64,

    /// Unix timestamp when the record was appended
    pub timestamp: u64,

    /// Full hash of the previous record (`None` for the first entry)
    pub previous_hash: Option<[u8; 32]>,

    /// Blake3 hash of this record's content fields
    pub content_hash: [u8; 32],

    /// Identity of the caller that attempted the operation
    pub actor_id: String,

    /// Role the caller held at the time
    pub actor_role: Role,

    /// What was attempted
    pub action: ActionKind,

    /// What it was attempted on
    pub target: AuditTarget,

    /// Success, or the specific typed failure rendered as text
    pub outcome: Outcome,
}

impl AuditEntry {
    fn new(
        sequence: u64,
        previous_hash: Option<[u8; 32]>,
        actor: &Actor,
        action: ActionKind,
        target: AuditTarget,
        outcome: Outcome,
    ) -> Result<Self> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| internal_error!("System time error"))?
            .as_secs();

        let content = serde_json::to_vec(&(&actor.id, &actor.role, &action, &target, &outcome))?;
        let content_hash = hash_bytes(&content);

        Ok(Self {
            record_id: Uuid::new_v4(),
            sequence,
            timestamp,
            previous_hash,
            content_hash,
            actor_id: actor.id.clone(),
            actor_role: actor.role,
            action,
            target,
            outcome,
        })
    }

    /// Hash of the entire record, used as the next entry's `previous_hash`
    pub fn record_hash(&self) -> Result<[u8; 32]> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hash_bytes(&bytes))
    }

    /// Recompute the content hash and compare it against the stored one
    pub fn verify_content(&self) -> Result<bool> {
        let content = serde_json::to_vec(&(
            &self.actor_id,
            &self.actor_role,
            &self.action,
            &self.target,
            &self.outcome,
        ))?;
        let expected = hash_bytes(&content);
        Ok(hashes_equal(&self.content_hash, &expected))
    }
}

/// Filter criteria for audit queries
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    /// Only entries targeting this election
    pub election_id: Option<Uuid>,
    /// Only entries by this actor
    pub actor_id: Option<String>,
    /// Only entries for this action kind
    pub action: Option<ActionKind>,
    /// Only failed operations
    pub failures_only: bool,
    /// Maximum number of entries returned
    pub limit: Option<usize>,
}

/// Result of a chain integrity verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub entries_checked: usize,
    pub violations: Vec<IntegrityViolation>,
    pub chain_valid: bool,
}

/// A single detected integrity violation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityViolation {
    pub record_id: Uuid,
    pub sequence: u64,
    pub kind: ViolationKind,
}

/// Ways the chain can be found broken
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationKind {
    ContentHashMismatch,
    ChainBroken,
    SequenceGap,
}

/// The append-only audit log
///
/// Written to by every component, owned by none. Appends are serialized
/// through the sequence counter so the chain order is total.
pub struct AuditLog {
    sequence: Mutex<u64>,
    entries: RwLock<VecDeque<AuditEntry>>,
    last_hash: Mutex<Option<[u8; 32]>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            sequence: Mutex::new(1),
            entries: RwLock::new(VecDeque::new()),
            last_hash: Mutex::new(None),
        }
    }

    /// Append one entry recording an attempted operation
    ///
    /// Called on success and failure paths alike; every attempted mutation
    /// produces exactly one entry.
    pub async fn append(
        &self,
        actor: &Actor,
        action: ActionKind,
        target: AuditTarget,
        outcome: Outcome,
    ) -> Result<AuditEntry> {
        // Single critical section: sequence draw, chain link, and insert
        // must be indivisible or concurrent appends would fork the chain.
        let mut entries = self
            .entries
            .write()
            .map_err(|_| internal_error!("Audit log lock poisoned"))?;
        let mut counter = self
            .sequence
            .lock()
            .map_err(|_| internal_error!("Audit sequence lock poisoned"))?;
        let mut last = self
            .last_hash
            .lock()
            .map_err(|_| internal_error!("Audit last-hash lock poisoned"))?;

        let entry = AuditEntry::new(*counter, *last, actor, action, target, outcome)?;
        let entry_hash = entry.record_hash()?;

        entries.push_back(entry.clone());
        *counter += 1;
        *last = Some(entry_hash);

        tracing::debug!(
            "📝 Audit entry appended: seq={}, action={:?}, outcome={}, hash={}",
            entry.sequence,
            entry.action,
            if entry.outcome.is_success() {
                "success"
            } else {
                "failure"
            },
            hex::encode(&entry_hash[..8]),
        );

        Ok(entry)
    }

    /// Walk the whole chain and verify content hashes and links
    pub async fn verify_chain(&self) -> Result<IntegrityReport> {
        let entries = self
            .entries
            .read()
            .map_err(|_| internal_error!("Audit log lock poisoned"))?;

        let mut report = IntegrityReport {
            entries_checked: 0,
            violations: Vec::new(),
            chain_valid: true,
        };

        let mut previous_hash: Option<[u8; 32]> = None;
        let mut previous_sequence: Option<u64> = None;

        for entry in entries.iter() {
            report.entries_checked += 1;

            if !entry.verify_content()? {
                report.violations.push(IntegrityViolation {
                    record_id: entry.record_id,
                    sequence: entry.sequence,
                    kind: ViolationKind::ContentHashMismatch,
                });
            }

            if entry.previous_hash != previous_hash {
                report.violations.push(IntegrityViolation {
                    record_id: entry.record_id,
                    sequence: entry.sequence,
                    kind: ViolationKind::ChainBroken,
                });
            }

            if let Some(prev_seq) = previous_sequence {
                if entry.sequence != prev_seq + 1 {
                    report.violations.push(IntegrityViolation {
                        record_id: entry.record_id,
                        sequence: entry.sequence,
                        kind: ViolationKind::SequenceGap,
                    });
                }
            }

            previous_hash = Some(entry.record_hash()?);
            previous_sequence = Some(entry.sequence);
        }

        report.chain_valid = report.violations.is_empty();
        Ok(report)
    }

    /// Entries matching the query, in chain order
    pub async fn query(&self, query: AuditQuery) -> Result<Vec<AuditEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| internal_error!("Audit log lock poisoned"))?;

        let mut results: Vec<AuditEntry> = entries
            .iter()
            .filter(|entry| Self::matches(entry, &query))
            .cloned()
            .collect();

        if let Some(limit) = query.limit {
            results.truncate(limit);
        }

        Ok(results)
    }

    /// Total number of entries appended so far
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matches(entry: &AuditEntry, query: &AuditQuery) -> bool {
        if let Some(election_id) = query.election_id {
            if entry.target.election_id() != Some(election_id) {
                return false;
            }
        }

        if let Some(ref actor_id) = query.actor_id {
            if &entry.actor_id != actor_id {
                return false;
            }
        }

        if let Some(action) = query.action {
            if entry.action != action {
                return false;
            }
        }

        if query.failures_only && entry.outcome.is_success() {
            return false;
        }

        true
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}
