//! Application-facing session handle
//!
//! A cheap, cloneable front for the coordinator task. Every method sends a
//! typed command and resolves on the coordinator's response; none of them
//! block on network I/O. A handle outliving its coordinator fails with
//! `SessionClosed` rather than hanging.

use tokio::sync::{broadcast, mpsc, oneshot};

use wristlink_core::{
    AppEvent, ContextSnapshot, EnvelopeBody, FilePayload, LinkState, PayloadMap, Result,
    SequenceId, TransferItem, TransferId, WristlinkError,
};

use crate::command::Command;

// ----------------------------------------------------------------------------
// Session Handle
// ----------------------------------------------------------------------------

/// Clonable handle to a running session coordinator
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    app_events: broadcast::Sender<AppEvent>,
}

impl SessionHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        app_events: broadcast::Sender<AppEvent>,
    ) -> Self {
        Self {
            commands,
            app_events,
        }
    }

    /// Subscribe to the typed event stream
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.app_events.subscribe()
    }

    /// Replace the outbound context snapshot (requires an active link)
    pub async fn set_context(&self, data: PayloadMap) -> Result<ContextSnapshot> {
        let result = self
            .request(|respond| Command::SetContext { data, respond })
            .await?;
        Ok(result?)
    }

    /// Most recently received inbound context snapshot
    pub async fn latest_inbound_context(&self) -> Result<Option<ContextSnapshot>> {
        self.request(|respond| Command::GetInboundContext { respond })
            .await
    }

    /// Current link state
    pub async fn link_state(&self) -> Result<LinkState> {
        self.request(|respond| Command::GetLinkState { respond })
            .await
    }

    /// Fire-and-forget live message (requires an active link)
    pub async fn send_message(&self, payload: PayloadMap) -> Result<()> {
        let result = self
            .request(|respond| Command::SendMessage { payload, respond })
            .await?;
        Ok(result?)
    }

    /// Fire-and-forget raw-bytes live message (requires an active link)
    pub async fn send_message_data(&self, data: Vec<u8>) -> Result<()> {
        let result = self
            .request(|respond| Command::SendMessageData { data, respond })
            .await?;
        Ok(result?)
    }

    /// Live message expecting a one-shot reply
    ///
    /// Resolves with the reply body, or fails with `Timeout` or `LinkLost`;
    /// exactly one of the two happens per call.
    pub async fn send_message_with_reply(&self, payload: PayloadMap) -> Result<EnvelopeBody> {
        let result = self
            .request(|respond| Command::SendMessageWithReply { payload, respond })
            .await?;
        Ok(result?)
    }

    /// Answer a received reply-requesting message
    pub async fn reply(&self, to: SequenceId, payload: PayloadMap) -> Result<()> {
        let result = self
            .request(|respond| Command::Reply { to, payload, respond })
            .await?;
        Ok(result?)
    }

    /// Queue a user-info payload for durable transfer; works in any link state
    pub async fn transfer_user_info(
        &self,
        payload: PayloadMap,
        metadata: PayloadMap,
    ) -> Result<TransferItem> {
        self.request(|respond| Command::EnqueueUserInfo {
            payload,
            metadata,
            respond,
        })
        .await
    }

    /// Queue a complication user-info payload
    pub async fn transfer_complication_user_info(
        &self,
        payload: PayloadMap,
        metadata: PayloadMap,
    ) -> Result<TransferItem> {
        self.request(|respond| Command::EnqueueComplicationUserInfo {
            payload,
            metadata,
            respond,
        })
        .await
    }

    /// Queue a file for durable transfer
    pub async fn transfer_file(
        &self,
        file: FilePayload,
        metadata: PayloadMap,
    ) -> Result<TransferItem> {
        let result = self
            .request(|respond| Command::EnqueueFile {
                file,
                metadata,
                respond,
            })
            .await?;
        Ok(result?)
    }

    /// Cancel a queued or in-flight transfer
    pub async fn cancel_transfer(&self, id: TransferId) -> Result<()> {
        let result = self
            .request(|respond| Command::CancelTransfer { id, respond })
            .await?;
        Ok(result?)
    }

    /// Acknowledge a terminal transfer, purging it from the queue
    pub async fn acknowledge_transfer(&self, id: TransferId) -> Result<TransferItem> {
        let result = self
            .request(|respond| Command::AcknowledgeTransfer { id, respond })
            .await?;
        Ok(result?)
    }

    /// Look up a transfer item by id
    pub async fn transfer(&self, id: TransferId) -> Result<Option<TransferItem>> {
        self.request(|respond| Command::GetTransfer { id, respond })
            .await
    }

    /// Request a graceful coordinator shutdown
    pub async fn shutdown(&self) -> Result<()> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| WristlinkError::SessionClosed)
    }

    /// Send a command and await its oneshot response
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T> {
        let (respond, receive) = oneshot::channel();
        self.commands
            .send(build(respond))
            .await
            .map_err(|_| WristlinkError::SessionClosed)?;
        receive.await.map_err(|_| WristlinkError::SessionClosed)
    }
}
