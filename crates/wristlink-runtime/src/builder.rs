//! Session builder
//!
//! Wires a channel implementation, configuration, and the coordinator task
//! together and returns the application-facing pieces. The channel is an
//! explicit constructor argument; there is no ambient default session to
//! reach for.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

use wristlink_core::{AppEvent, Result, WristlinkConfig};

use crate::channel::{Channel, ChannelEvent};
use crate::coordinator::SessionCoordinator;
use crate::handle::SessionHandle;

// ----------------------------------------------------------------------------
// Session Builder
// ----------------------------------------------------------------------------

/// Builder for a single link session
pub struct SessionBuilder {
    config: WristlinkConfig,
}

impl SessionBuilder {
    /// Create a builder with default configuration
    pub fn new() -> Self {
        Self {
            config: WristlinkConfig::default(),
        }
    }

    /// Replace the full configuration
    pub fn with_config(mut self, config: WristlinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the reply timeout
    pub fn with_reply_timeout(mut self, timeout: core::time::Duration) -> Self {
        self.config.coordinator.reply_timeout = timeout;
        self
    }

    /// Spawn the coordinator over the given channel
    ///
    /// `channel_events` is the receiver half the channel implementation
    /// produced at construction time. Must be called within a tokio runtime.
    pub fn spawn(
        self,
        channel: Arc<dyn Channel>,
        channel_events: mpsc::Receiver<ChannelEvent>,
    ) -> SessionRuntime {
        let (command_tx, command_rx) = mpsc::channel(self.config.channels.command_buffer_size);
        let (app_event_tx, _) = broadcast::channel(self.config.channels.app_event_buffer_size);

        let coordinator = SessionCoordinator::new(
            self.config,
            channel,
            channel_events,
            command_rx,
            app_event_tx.clone(),
        );
        let task = tokio::spawn(coordinator.run());
        debug!("session coordinator spawned");

        SessionRuntime {
            handle: SessionHandle::new(command_tx, app_event_tx),
            task,
        }
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Session Runtime
// ----------------------------------------------------------------------------

/// A running session: the handle plus the coordinator task
pub struct SessionRuntime {
    handle: SessionHandle,
    task: JoinHandle<Result<()>>,
}

impl SessionRuntime {
    /// Get a clone of the session handle
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Subscribe to the typed event stream
    pub fn events(&self) -> broadcast::Receiver<AppEvent> {
        self.handle.subscribe()
    }

    /// Wait for the coordinator to finish
    pub async fn join(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(_) => Err(wristlink_core::WristlinkError::SessionClosed),
        }
    }

    /// Abort the coordinator task outright
    pub fn abort(&self) {
        self.task.abort();
    }
}
