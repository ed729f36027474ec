//! The channel seam
//!
//! The channel collaborator is the externally provided, reliable-ish,
//! byte-level peer link: platform pairing, buffering, and transport security
//! all live behind it. The coordinator treats it as opaque. Implementations
//! are injected at construction time; nothing in this crate reaches for a
//! shared default session.

use async_trait::async_trait;
use tokio::sync::mpsc;

use wristlink_core::{ChannelError, LinkState};

// ----------------------------------------------------------------------------
// Channel Events
// ----------------------------------------------------------------------------

/// Events the channel pushes to the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The link changed reachability/activation state
    StateChanged(LinkState),
    /// An encoded envelope frame arrived from the peer
    Inbound(Vec<u8>),
}

/// Updates produced by an in-progress transfer stream
#[derive(Debug)]
pub enum StreamEvent {
    /// Fraction of the payload streamed so far, in [0, 1]
    Progress(f64),
    /// The peer acknowledged the complete payload
    Completed,
    /// The stream ended without completing
    Failed(ChannelError),
}

// ----------------------------------------------------------------------------
// Channel Trait
// ----------------------------------------------------------------------------

/// Byte-level peer channel the coordinator drives
///
/// Implementations hand their event receiver to the session builder at
/// construction time; the coordinator is the only consumer.
#[async_trait]
pub trait Channel: Send + Sync + 'static {
    /// Begin the platform activation ceremony
    async fn activate(&self) -> Result<(), ChannelError>;

    /// Fire-and-forget delivery of one frame
    async fn send_best_effort(&self, frame: Vec<u8>) -> Result<(), ChannelError>;

    /// Deliver one frame with at-least-once semantics
    async fn send_with_ack(&self, frame: Vec<u8>) -> Result<(), ChannelError>;

    /// Stream a transfer frame, reporting progress until a terminal event
    ///
    /// The returned receiver yields `Progress` updates followed by exactly
    /// one `Completed` or `Failed`; a closed receiver without a terminal
    /// event is treated as a channel failure.
    async fn stream_transfer(
        &self,
        frame: Vec<u8>,
    ) -> Result<mpsc::Receiver<StreamEvent>, ChannelError>;

    /// Query a peer-advertised boolean capability flag
    async fn query_capability(&self, name: &str) -> Result<bool, ChannelError>;
}
