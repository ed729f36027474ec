//! Centralized configuration
//!
//! Consolidates the tunable knobs of the link core so callers configure one
//! structure instead of threading values through each component.

use core::time::Duration;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Coordinator Configuration
// ----------------------------------------------------------------------------

/// Configuration for the session coordinator task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// How long a reply-carrying message waits before failing with Timeout
    pub reply_timeout: Duration,
    /// Cadence of the housekeeping tick (reply expiry, periodic drain)
    pub housekeeping_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_secs(10),
            housekeeping_interval: Duration::from_millis(250),
        }
    }
}

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the coordinator's channels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Commands from application handles to the coordinator
    pub command_buffer_size: usize,
    /// State changes and inbound frames from the channel collaborator
    pub channel_event_buffer_size: usize,
    /// Events published to application subscribers
    pub app_event_buffer_size: usize,
    /// Progress and completion updates from in-flight transfer streams
    pub transfer_event_buffer_size: usize,
    /// Outbound frames awaiting serialized handoff to the channel
    pub outbound_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32,        // application commands are infrequent
            channel_event_buffer_size: 128, // inbound traffic can be bursty
            app_event_buffer_size: 256,     // subscribers may lag behind
            transfer_event_buffer_size: 64,
            outbound_buffer_size: 64,
        }
    }
}

// ----------------------------------------------------------------------------
// Transfer Configuration
// ----------------------------------------------------------------------------

/// Configuration for the transfer queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Maximum accepted file payload size in bytes
    pub max_file_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_file_size: 100 * 1024 * 1024,
        }
    }
}

// ----------------------------------------------------------------------------
// Unified Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for one link session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WristlinkConfig {
    pub coordinator: CoordinatorConfig,
    pub channels: ChannelConfig,
    pub transfers: TransferConfig,
}

impl WristlinkConfig {
    /// Configuration tuned for fast tests: short timeouts, quick ticks
    pub fn responsive() -> Self {
        Self {
            coordinator: CoordinatorConfig {
                reply_timeout: Duration::from_millis(200),
                housekeeping_interval: Duration::from_millis(20),
            },
            ..Self::default()
        }
    }

    /// Override the reply timeout
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.coordinator.reply_timeout = timeout;
        self
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
