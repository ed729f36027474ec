//! Core types for the Wristlink protocol
//!
//! This module defines the fundamental types used throughout the link core,
//! using newtype patterns for semantic validation and type safety.

use core::fmt;
use core::ops::{Add, Sub};
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Sequence Identifier
// ----------------------------------------------------------------------------

/// Per-direction envelope sequence number, strictly increasing from 1.
///
/// Used for inbound ordering and reply correlation, never for deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceId(u64);

impl SequenceId {
    /// Create a sequence id from a raw value
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Generator for the outbound half of a link's sequence space
#[derive(Debug, Default)]
pub struct OutboundSequence(u64);

impl OutboundSequence {
    /// Create a generator whose first issued id is 1
    pub fn new() -> Self {
        Self(0)
    }

    /// Issue the next sequence id
    pub fn next(&mut self) -> SequenceId {
        self.0 += 1;
        SequenceId(self.0)
    }

    /// Last issued id, if any
    pub fn last_issued(&self) -> Option<SequenceId> {
        if self.0 == 0 {
            None
        } else {
            Some(SequenceId(self.0))
        }
    }
}

// ----------------------------------------------------------------------------
// Transfer Identifier
// ----------------------------------------------------------------------------

/// Unique identifier for a queued transfer item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(uuid::Uuid);

impl TransferId {
    /// Generate a new random transfer id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Wrap an existing uuid
    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }

    /// Get the inner uuid
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a new timestamp
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Get the current wall-clock timestamp
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as u64)
    }

    /// Get the raw milliseconds
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Add milliseconds to this timestamp
    pub fn add_millis(&self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Get duration since another timestamp
    pub fn duration_since(&self, other: Self) -> core::time::Duration {
        core::time::Duration::from_millis(self.0.saturating_sub(other.0))
    }
}

impl Add<u64> for Timestamp {
    type Output = Timestamp;

    fn add(self, other: u64) -> Timestamp {
        Timestamp(self.0.saturating_add(other))
    }
}

impl Sub for Timestamp {
    type Output = u64;

    fn sub(self, other: Timestamp) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

// ----------------------------------------------------------------------------
// Time Source Trait
// ----------------------------------------------------------------------------

/// Trait for providing timestamps to the pure state containers
///
/// Implementations should provide monotonic timestamps when possible; tests
/// substitute a manually advanced source for deterministic behavior.
pub trait TimeSource {
    /// Get the current timestamp
    fn now(&self) -> Timestamp;
}

/// Standard library implementation of TimeSource
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
