//! Wristlink Core Protocol Implementation
//!
//! This crate provides the foundational types, wire codec, and pure state
//! containers for the Wristlink companion-device link: envelope framing,
//! link state tracking, last-writer-wins context replication, one-shot
//! reply correlation, and the durable transfer queue. The async session
//! coordinator that drives these against a real channel lives in
//! `wristlink-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod context;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod link;
pub mod reply;
pub mod status;
pub mod transfer;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{ChannelConfig, CoordinatorConfig, TransferConfig, WristlinkConfig};
pub use context::{ContextSnapshot, ContextStore};
pub use envelope::{
    Envelope, EnvelopeBody, EnvelopeCodec, EnvelopeKind, PayloadMap, PayloadValue,
};
pub use errors::{
    ChannelError, CodecError, ContextError, MessageError, Result, TransferError, WristlinkError,
    WristlinkResult,
};
pub use events::{AppEvent, ContextDirection};
pub use link::{LinkState, LinkStateTracker};
pub use reply::{ReplyResponder, ReplyRouter};
pub use status::{CommandKind, CommandStatus, Outcome};
pub use transfer::{
    ContentHash, FilePayload, FileTransfer, TransferItem, TransferKind, TransferPayload,
    TransferQueue, TransferStatus, UserInfoTransfer, COMPLICATION_CAPABILITY,
};
pub use types::{
    OutboundSequence, SequenceId, SystemTimeSource, TimeSource, Timestamp, TransferId,
};
