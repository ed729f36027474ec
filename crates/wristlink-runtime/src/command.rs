//! Commands from application handles to the coordinator
//!
//! Each command carries its own oneshot responder, so results flow back to
//! exactly the caller that issued the operation and never cross an
//! asynchronous boundary as a thrown error.

use tokio::sync::oneshot;

use wristlink_core::{
    ContextError, ContextSnapshot, EnvelopeBody, FilePayload, LinkState, MessageError, PayloadMap,
    SequenceId, TransferError, TransferItem, TransferId,
};

/// Responder for operations that resolve synchronously against local state
pub type Responder<T> = oneshot::Sender<T>;

/// Commands accepted by the session coordinator
#[derive(Debug)]
pub enum Command {
    /// Replace the outbound context snapshot
    SetContext {
        data: PayloadMap,
        respond: Responder<Result<ContextSnapshot, ContextError>>,
    },
    /// Fire-and-forget live message with a key-value payload
    SendMessage {
        payload: PayloadMap,
        respond: Responder<Result<(), MessageError>>,
    },
    /// Fire-and-forget live message with a raw byte payload
    SendMessageData {
        data: Vec<u8>,
        respond: Responder<Result<(), MessageError>>,
    },
    /// Live message expecting a one-shot reply; the responder resolves when
    /// the reply, timeout, or link loss lands
    SendMessageWithReply {
        payload: PayloadMap,
        respond: Responder<Result<EnvelopeBody, MessageError>>,
    },
    /// Answer a received reply-requesting message
    Reply {
        to: SequenceId,
        payload: PayloadMap,
        respond: Responder<Result<(), MessageError>>,
    },
    /// Queue a user-info payload for durable transfer
    EnqueueUserInfo {
        payload: PayloadMap,
        metadata: PayloadMap,
        respond: Responder<TransferItem>,
    },
    /// Queue a complication user-info payload
    EnqueueComplicationUserInfo {
        payload: PayloadMap,
        metadata: PayloadMap,
        respond: Responder<TransferItem>,
    },
    /// Queue a file for durable transfer
    EnqueueFile {
        file: FilePayload,
        metadata: PayloadMap,
        respond: Responder<Result<TransferItem, TransferError>>,
    },
    /// Cancel a queued or in-flight transfer
    CancelTransfer {
        id: TransferId,
        respond: Responder<Result<(), TransferError>>,
    },
    /// Acknowledge a terminal transfer, purging it from the queue
    AcknowledgeTransfer {
        id: TransferId,
        respond: Responder<Result<TransferItem, TransferError>>,
    },
    /// Look up a transfer item
    GetTransfer {
        id: TransferId,
        respond: Responder<Option<TransferItem>>,
    },
    /// Current link state
    GetLinkState { respond: Responder<LinkState> },
    /// Most recently received inbound context snapshot
    GetInboundContext {
        respond: Responder<Option<ContextSnapshot>>,
    },
    /// Stop the coordinator; the in-flight transfer reverts to Queued
    Shutdown,
}
