//! Error types for the Wristlink protocol
//!
//! This module contains all error types used throughout the link core,
//! including codec errors, link-state preconditions, transfer errors, and
//! the main WristlinkError type that unifies them all.

use crate::link::LinkState;
use crate::transfer::TransferStatus;
use crate::types::TransferId;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Errors produced by the envelope codec
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("frame truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("bad magic: {0:#06x}")]
    BadMagic(u16),
    #[error("unsupported wire version: {0}")]
    UnsupportedVersion(u8),
    #[error("unknown envelope kind: {0:#04x}")]
    UnknownKind(u8),
    #[error("unknown flag bits: {0:#010b}")]
    UnknownFlags(u8),
    #[error("checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { expected: u32, computed: u32 },
    #[error("frame has {0} trailing bytes")]
    TrailingBytes(usize),
    #[error("unexpected body form for envelope kind {kind}")]
    UnexpectedBody { kind: &'static str },
    #[error("body serialization error: {0}")]
    Body(#[from] bincode::Error),
}

/// Errors for context replication operations
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("link is {state}, outbound context requires an active link")]
    LinkNotActive { state: LinkState },
}

/// Errors for live message operations
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("link is {state}, live messages require an active link")]
    LinkNotActive { state: LinkState },
    #[error("link lost before a reply arrived")]
    LinkLost,
    #[error("no reply within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Errors for transfer queue operations
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("transfer {id} not found or already terminal")]
    NotFound { id: TransferId },
    #[error("peer does not advertise capability {capability:?}")]
    CapabilityUnavailable { capability: String },
    #[error("transfer failed: {reason}")]
    TransferFailed { reason: String },
    #[error("transfer {id} is {status:?}, operation not permitted")]
    InvalidStatus { id: TransferId, status: TransferStatus },
    #[error("file too large: {size} bytes (max {max})")]
    FileTooLarge { size: usize, max: usize },
}

/// Errors surfaced by the channel collaborator
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,
    #[error("link dropped mid-operation")]
    LinkDropped,
    #[error("channel i/o error: {reason}")]
    Io { reason: String },
}

// ----------------------------------------------------------------------------
// Unified Error Type
// ----------------------------------------------------------------------------

/// Core error type for the Wristlink protocol
#[derive(Debug, thiserror::Error)]
pub enum WristlinkError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("context error: {0}")]
    Context(#[from] ContextError),

    #[error("message error: {0}")]
    Message(#[from] MessageError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// The session coordinator is no longer running
    #[error("session closed")]
    SessionClosed,
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl TransferError {
    /// Create a not-found error for an id
    pub fn not_found(id: TransferId) -> Self {
        TransferError::NotFound { id }
    }

    /// Create a capability-unavailable error
    pub fn capability_unavailable<T: Into<String>>(capability: T) -> Self {
        TransferError::CapabilityUnavailable {
            capability: capability.into(),
        }
    }

    /// Create a transfer-failed error with a reason
    pub fn failed<T: Into<String>>(reason: T) -> Self {
        TransferError::TransferFailed {
            reason: reason.into(),
        }
    }
}

impl ChannelError {
    /// Create an i/o error with a reason
    pub fn io<T: Into<String>>(reason: T) -> Self {
        ChannelError::Io {
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, WristlinkError>;
pub type WristlinkResult<T> = Result<T>;
