//! Typed event surface published by the session coordinator
//!
//! Observers subscribe to a typed stream instead of a name-keyed broadcast:
//! every emission point is statically traceable to the variant it produces.

use serde::{Deserialize, Serialize};

use crate::context::ContextSnapshot;
use crate::envelope::{EnvelopeBody, PayloadMap};
use crate::link::LinkState;
use crate::status::CommandStatus;
use crate::transfer::{TransferItem, TransferKind};
use crate::types::{SequenceId, TransferId};

// ----------------------------------------------------------------------------
// App Events
// ----------------------------------------------------------------------------

/// Which side of the link a context snapshot belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextDirection {
    Outbound,
    Inbound,
}

/// Events published to the application layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppEvent {
    /// The link changed state (duplicates are coalesced upstream)
    LinkStateChanged { state: LinkState },
    /// A context snapshot was set locally or received from the peer
    ContextChanged {
        direction: ContextDirection,
        snapshot: ContextSnapshot,
    },
    /// A live message arrived; `wants_reply` asks for a one-shot answer
    MessageReceived {
        sequence: SequenceId,
        body: EnvelopeBody,
        wants_reply: bool,
    },
    /// A queued user-info payload arrived from the peer
    UserInfoReceived {
        kind: TransferKind,
        payload: PayloadMap,
        metadata: PayloadMap,
    },
    /// A file transfer arrived from the peer, content hash verified
    FileReceived {
        name: String,
        data: Vec<u8>,
        metadata: PayloadMap,
    },
    /// Streaming progress on the in-flight transfer
    TransferProgress { id: TransferId, progress: f64 },
    /// An outbound transfer completed
    TransferCompleted { item: TransferItem },
    /// An outbound transfer failed; `item.error` carries the reason
    TransferFailed { item: TransferItem },
    /// A link drop pushed the in-flight transfer back to the queue
    TransferRequeued { id: TransferId },
    /// Per-operation status emission (see [`CommandStatus`])
    Status(CommandStatus),
}
