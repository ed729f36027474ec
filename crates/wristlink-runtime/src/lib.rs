//! Wristlink Runtime Engine
//!
//! This crate contains the runtime engine for the Wristlink link core:
//! - [`SessionCoordinator`]: the task owning one peer link end to end
//! - [`SessionHandle`]: the non-blocking application API
//! - [`SessionBuilder`]: wiring for channel, configuration, and task
//! - The [`Channel`] trait: the seam to the externally provided transport
//!
//! `wristlink-core` provides the pure protocol state this engine drives.

pub mod builder;
pub mod channel;
pub mod command;
pub mod coordinator;
pub mod handle;

pub use builder::{SessionBuilder, SessionRuntime};
pub use channel::{Channel, ChannelEvent, StreamEvent};
pub use command::Command;
pub use coordinator::SessionCoordinator;
pub use handle::SessionHandle;

// Re-export core types for convenience
pub use wristlink_core::{
    AppEvent, ChannelError, CodecError, CommandKind, CommandStatus, ContextDirection,
    ContextError, ContextSnapshot, Envelope, EnvelopeBody, EnvelopeCodec, EnvelopeKind,
    FilePayload, LinkState, MessageError, Outcome, PayloadMap, PayloadValue, Result, SequenceId,
    Timestamp, TransferError, TransferId, TransferItem, TransferKind, TransferStatus,
    WristlinkConfig, WristlinkError, COMPLICATION_CAPABILITY,
};
