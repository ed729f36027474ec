//! Immutable command status emissions
//!
//! Every operation produces one status value at invocation time and, for
//! operations with an asynchronous tail (reply-carrying messages, queued
//! transfers), one more when the completion or failure lands. Each emission
//! is a fresh immutable value; a status is never mutated after it is handed
//! to observers, so two observers reading at different times always see the
//! same thing.

use serde::{Deserialize, Serialize};

use crate::envelope::PayloadMap;
use crate::types::TransferId;

// ----------------------------------------------------------------------------
// Command Identity
// ----------------------------------------------------------------------------

/// Which operation a status emission describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    SetContext,
    SendMessage,
    SendMessageData,
    SendMessageWithReply,
    Reply,
    Transfer,
    CancelTransfer,
}

impl core::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            CommandKind::SetContext => "SetContext",
            CommandKind::SendMessage => "SendMessage",
            CommandKind::SendMessageData => "SendMessageData",
            CommandKind::SendMessageWithReply => "SendMessageWithReply",
            CommandKind::Reply => "Reply",
            CommandKind::Transfer => "Transfer",
            CommandKind::CancelTransfer => "CancelTransfer",
        };
        write!(f, "{}", name)
    }
}

/// Outcome phrase of a status emission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Handed to the channel
    Sent,
    /// Accepted into the transfer queue
    Queued,
    /// A correlated reply arrived
    ReplyReceived,
    /// Asynchronous completion succeeded
    Completed,
    /// Cancelled by the caller
    Cancelled,
    /// Operation failed; `error` carries the reason
    Failed,
}

// ----------------------------------------------------------------------------
// Command Status
// ----------------------------------------------------------------------------

/// A single immutable status emission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandStatus {
    pub command: CommandKind,
    pub outcome: Outcome,
    /// Payload attached to the outcome (e.g. a reply body)
    pub payload: Option<PayloadMap>,
    pub error: Option<String>,
    /// The transfer this emission concerns, for queue operations
    pub transfer: Option<TransferId>,
}

impl CommandStatus {
    /// Status for a payload handed to the channel
    pub fn sent(command: CommandKind) -> Self {
        Self {
            command,
            outcome: Outcome::Sent,
            payload: None,
            error: None,
            transfer: None,
        }
    }

    /// Status for an item accepted into the transfer queue
    pub fn queued(transfer: TransferId) -> Self {
        Self {
            command: CommandKind::Transfer,
            outcome: Outcome::Queued,
            payload: None,
            error: None,
            transfer: Some(transfer),
        }
    }

    /// Status for a received reply
    pub fn reply_received(payload: Option<PayloadMap>) -> Self {
        Self {
            command: CommandKind::SendMessageWithReply,
            outcome: Outcome::ReplyReceived,
            payload,
            error: None,
            transfer: None,
        }
    }

    /// Status for a completed transfer
    pub fn transfer_completed(transfer: TransferId) -> Self {
        Self {
            command: CommandKind::Transfer,
            outcome: Outcome::Completed,
            payload: None,
            error: None,
            transfer: Some(transfer),
        }
    }

    /// Status for a cancelled transfer
    pub fn transfer_cancelled(transfer: TransferId) -> Self {
        Self {
            command: CommandKind::CancelTransfer,
            outcome: Outcome::Cancelled,
            payload: None,
            error: None,
            transfer: Some(transfer),
        }
    }

    /// Terminal failure status for any operation
    pub fn failed<E: core::fmt::Display>(command: CommandKind, error: E) -> Self {
        Self {
            command,
            outcome: Outcome::Failed,
            payload: None,
            error: Some(error.to_string()),
            transfer: None,
        }
    }

    /// Terminal failure status tied to a transfer item
    pub fn transfer_failed<E: core::fmt::Display>(transfer: TransferId, error: E) -> Self {
        Self {
            command: CommandKind::Transfer,
            outcome: Outcome::Failed,
            payload: None,
            error: Some(error.to_string()),
            transfer: Some(transfer),
        }
    }

    /// Attach a transfer id to this emission
    pub fn with_transfer(mut self, transfer: TransferId) -> Self {
        self.transfer = Some(transfer);
        self
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
