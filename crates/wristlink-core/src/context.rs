//! Replicated application context
//!
//! Each direction of the link carries exactly one context snapshot: the
//! outbound snapshot is owned locally, the inbound one by the peer. Setting
//! a new outbound context replaces the previous snapshot wholesale
//! (last-writer-wins at snapshot granularity); nothing is merged. Delivery
//! is the channel's contract (at least once); the store never retries.

use serde::{Deserialize, Serialize};

use crate::envelope::{Envelope, EnvelopeBody, EnvelopeKind, PayloadMap};
use crate::errors::{CodecError, ContextError};
use crate::link::LinkState;
use crate::types::{SequenceId, Timestamp};

// ----------------------------------------------------------------------------
// Context Snapshot
// ----------------------------------------------------------------------------

/// Full value of replicated context in one direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    /// Replicated key-value data
    pub data: PayloadMap,
    /// Monotonically increasing per-direction version
    pub version: u64,
    /// When this snapshot was produced
    pub updated_at: Timestamp,
}

impl ContextSnapshot {
    /// Build the wire envelope replicating this snapshot
    pub fn to_envelope(&self, sequence: SequenceId) -> Result<Envelope, CodecError> {
        let body = bincode::serialize(self)?;
        Ok(Envelope::new(
            EnvelopeKind::Context,
            sequence,
            EnvelopeBody::Blob(body),
        ))
    }

    /// Parse a snapshot out of a received context envelope
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, CodecError> {
        match &envelope.body {
            EnvelopeBody::Blob(bytes) => Ok(bincode::deserialize(bytes)?),
            EnvelopeBody::Map(_) => Err(CodecError::UnexpectedBody {
                kind: envelope.kind.name(),
            }),
        }
    }
}

// ----------------------------------------------------------------------------
// Context Store
// ----------------------------------------------------------------------------

/// Holds the current snapshot for each direction of the link
#[derive(Debug, Default)]
pub struct ContextStore {
    outbound: Option<ContextSnapshot>,
    inbound: Option<ContextSnapshot>,
}

impl ContextStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the outbound snapshot with new data
    ///
    /// Fails with `LinkNotActive` unless the link is `Active`; on success the
    /// prior snapshot is discarded, the version bumped, and the new snapshot
    /// returned for handoff to the channel.
    pub fn set_outbound(
        &mut self,
        data: PayloadMap,
        link: LinkState,
        now: Timestamp,
    ) -> Result<ContextSnapshot, ContextError> {
        if !link.is_active() {
            return Err(ContextError::LinkNotActive { state: link });
        }

        let version = self.outbound.as_ref().map(|s| s.version + 1).unwrap_or(1);
        let snapshot = ContextSnapshot {
            data,
            version,
            updated_at: now,
        };
        self.outbound = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Store a snapshot received from the peer
    ///
    /// Returns `true` when the snapshot was accepted. A version at or below
    /// the stored inbound version is a stale replay and is ignored.
    pub fn receive_inbound(&mut self, snapshot: ContextSnapshot) -> bool {
        if let Some(current) = &self.inbound {
            if snapshot.version <= current.version {
                return false;
            }
        }
        self.inbound = Some(snapshot);
        true
    }

    /// Most recently received inbound snapshot, if any
    pub fn latest_inbound(&self) -> Option<&ContextSnapshot> {
        self.inbound.as_ref()
    }

    /// Most recently set outbound snapshot, if any
    pub fn latest_outbound(&self) -> Option<&ContextSnapshot> {
        self.outbound.as_ref()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
