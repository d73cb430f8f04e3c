//! Hash chain over the audit log.
//!
//! Each record commits to its predecessor's hash, so altering, removing or
//! reordering a stored row breaks verification from that point on. Dropping
//! the newest rows leaves a shorter chain that is still internally valid;
//! that is only caught by checking against a [`ChainHead`] recorded earlier
//! outside the store.

use chrono::{SecondsFormat, SubsecRound};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use sentinel_core::SecurityEventId;

use crate::audit::{NewSecurityEvent, SecurityEvent};

/// Predecessor hash of the first record.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditChainError {
    #[error("sequence gap: expected {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },

    #[error("hash mismatch at sequence {sequence}")]
    HashMismatch { sequence: u64 },

    #[error("chain truncated: expected head at sequence {expected_head}, found {found}")]
    Truncated { expected_head: u64, found: u64 },
}

/// Newest verified record of a chain. An empty chain has head
/// `(0, GENESIS_HASH)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    pub sequence: u64,
    pub chain_hash: String,
}

impl ChainHead {
    pub fn genesis() -> Self {
        Self {
            sequence: 0,
            chain_hash: GENESIS_HASH.to_string(),
        }
    }
}

/// Turn a pending event into a committed record linked to `prev_hash`.
///
/// Timestamps are truncated to microseconds, the precision every backing
/// store can round-trip.
pub fn seal(
    event: NewSecurityEvent,
    id: SecurityEventId,
    sequence: u64,
    prev_hash: &str,
) -> SecurityEvent {
    let mut sealed = SecurityEvent {
        id,
        sequence,
        event_type: event.event_type,
        author_user_id: event.author_user_id,
        affected_user_id: event.affected_user_id,
        occurred_utc: event.occurred_utc.trunc_subsecs(6),
        details: event.details,
        previous_role_id: event.previous_role_id,
        new_role_id: event.new_role_id,
        chain_hash: String::new(),
    };
    sealed.chain_hash = digest(prev_hash, &sealed);
    sealed
}

/// Verify records given in ascending sequence order and return the head.
///
/// With `pinned`, the chain must still contain that head unchanged; it may
/// have grown past it.
pub fn verify_chain(
    events: &[SecurityEvent],
    pinned: Option<&ChainHead>,
) -> Result<ChainHead, AuditChainError> {
    let mut head = ChainHead::genesis();
    let mut pin_seen = pinned.is_none_or(|p| p.sequence == 0 && p.chain_hash == GENESIS_HASH);
    for (idx, e) in events.iter().enumerate() {
        let expected = idx as u64 + 1;
        if e.sequence != expected {
            return Err(AuditChainError::SequenceGap {
                expected,
                found: e.sequence,
            });
        }
        if digest(&head.chain_hash, e) != e.chain_hash {
            return Err(AuditChainError::HashMismatch {
                sequence: e.sequence,
            });
        }
        if let Some(p) = pinned.filter(|p| p.sequence == e.sequence) {
            if p.chain_hash != e.chain_hash {
                return Err(AuditChainError::HashMismatch {
                    sequence: e.sequence,
                });
            }
            pin_seen = true;
        }
        head = ChainHead {
            sequence: e.sequence,
            chain_hash: e.chain_hash.clone(),
        };
    }
    match pinned {
        Some(p) if !pin_seen && p.sequence > head.sequence => Err(AuditChainError::Truncated {
            expected_head: p.sequence,
            found: head.sequence,
        }),
        Some(p) if !pin_seen => Err(AuditChainError::HashMismatch { sequence: p.sequence }),
        _ => Ok(head),
    }
}

fn digest(prev_hash: &str, e: &SecurityEvent) -> String {
    let previous_role = e.previous_role_id.map(|r| r.to_string()).unwrap_or_default();
    let new_role = e.new_role_id.map(|r| r.to_string()).unwrap_or_default();
    let occurred = e.occurred_utc.to_rfc3339_opts(SecondsFormat::Micros, true);
    let sequence = e.sequence.to_string();
    let id = e.id.to_string();
    let author = e.author_user_id.to_string();
    let affected = e.affected_user_id.to_string();

    let mut hasher = Sha256::new();
    for field in [
        prev_hash,
        id.as_str(),
        sequence.as_str(),
        e.event_type.as_str(),
        author.as_str(),
        affected.as_str(),
        occurred.as_str(),
        e.details.as_str(),
        previous_role.as_str(),
        new_role.as_str(),
    ] {
        // Length-prefixed so field boundaries cannot be shifted.
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}
