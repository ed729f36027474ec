//! Link state tracking
//!
//! The link state is driven entirely by the external channel collaborator;
//! this module only stores the latest value and coalesces duplicates so a
//! repeated state never fires a second change event.

use core::fmt;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Link State
// ----------------------------------------------------------------------------

/// Reachability/activation state of the peer link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkState {
    /// Link has never been activated
    Inactive,
    /// Activation handshake in progress
    Activating,
    /// Peer is reachable and the link is usable
    Active,
    /// Link was active but the peer is currently unreachable
    Unreachable,
}

impl LinkState {
    /// Whether live operations (messages, context replication) are permitted
    pub fn is_active(&self) -> bool {
        matches!(self, LinkState::Active)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Inactive => write!(f, "Inactive"),
            LinkState::Activating => write!(f, "Activating"),
            LinkState::Active => write!(f, "Active"),
            LinkState::Unreachable => write!(f, "Unreachable"),
        }
    }
}

// ----------------------------------------------------------------------------
// Link State Tracker
// ----------------------------------------------------------------------------

/// Stores the latest externally reported link state
///
/// The session coordinator is the sole writer. Duplicate updates are
/// coalesced: [`LinkStateTracker::update`] returns `None` when the reported
/// state equals the stored one, and the caller fires no change event.
#[derive(Debug)]
pub struct LinkStateTracker {
    current: LinkState,
}

impl LinkStateTracker {
    /// Create a tracker in the initial `Inactive` state
    pub fn new() -> Self {
        Self {
            current: LinkState::Inactive,
        }
    }

    /// Get the current link state
    pub fn current(&self) -> LinkState {
        self.current
    }

    /// Store a newly reported state
    ///
    /// Returns the state when it differs from the stored one, `None` when
    /// the update is a duplicate.
    pub fn update(&mut self, state: LinkState) -> Option<LinkState> {
        if state == self.current {
            return None;
        }
        self.current = state;
        Some(state)
    }
}

impl Default for LinkStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
