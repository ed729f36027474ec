//! Session coordinator task
//!
//! Exactly one coordinator exists per channel. It is the sole writer of the
//! link state, the context store, the reply correlation table, and the
//! transfer queue; application handles reach it only through typed commands.
//! All channel I/O is handed off to helper tasks (a serialized outbound
//! writer, one stream task per in-flight transfer) so no command ever
//! blocks the dispatch loop on the network.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use wristlink_core::{
    AppEvent, ChannelError, CommandKind, CommandStatus, ContextDirection, ContextSnapshot,
    ContextStore, Envelope, EnvelopeCodec, EnvelopeKind, FileTransfer, LinkStateTracker,
    MessageError, OutboundSequence, ReplyRouter, Result, SequenceId, SystemTimeSource, Timestamp,
    TransferError, TransferId, TransferKind, TransferQueue, UserInfoTransfer, WristlinkConfig,
    COMPLICATION_CAPABILITY,
};

use crate::channel::{Channel, ChannelEvent, StreamEvent};
use crate::command::Command;

// ----------------------------------------------------------------------------
// Internal Plumbing
// ----------------------------------------------------------------------------

/// Updates from the in-flight transfer stream task
#[derive(Debug)]
enum TransferEvent {
    Progress { id: TransferId, fraction: f64 },
    Finished {
        id: TransferId,
        result: std::result::Result<(), ChannelError>,
    },
}

/// Frames awaiting serialized handoff to the channel
#[derive(Debug)]
enum OutboundFrame {
    BestEffort(Vec<u8>),
    WithAck(Vec<u8>),
}

struct ActiveStream {
    id: TransferId,
    task: JoinHandle<()>,
}

// ----------------------------------------------------------------------------
// Session Coordinator
// ----------------------------------------------------------------------------

/// Owns the link lifecycle, routes inbound envelopes, and serializes
/// outbound operations for one peer link
pub struct SessionCoordinator {
    config: WristlinkConfig,
    channel: Arc<dyn Channel>,
    commands: mpsc::Receiver<Command>,
    channel_events: mpsc::Receiver<ChannelEvent>,
    transfer_events_tx: mpsc::Sender<TransferEvent>,
    transfer_events: mpsc::Receiver<TransferEvent>,
    outbound: Option<mpsc::Sender<OutboundFrame>>,
    app_events: broadcast::Sender<AppEvent>,
    link: LinkStateTracker,
    context: ContextStore,
    replies: ReplyRouter,
    transfers: TransferQueue<SystemTimeSource>,
    sequence: OutboundSequence,
    last_inbound: Option<SequenceId>,
    active_stream: Option<ActiveStream>,
    running: bool,
}

impl SessionCoordinator {
    /// Create a coordinator over an injected channel
    pub fn new(
        config: WristlinkConfig,
        channel: Arc<dyn Channel>,
        channel_events: mpsc::Receiver<ChannelEvent>,
        commands: mpsc::Receiver<Command>,
        app_events: broadcast::Sender<AppEvent>,
    ) -> Self {
        let (transfer_events_tx, transfer_events) =
            mpsc::channel(config.channels.transfer_event_buffer_size);
        let transfers =
            TransferQueue::with_config(config.transfers.clone(), SystemTimeSource::new());

        Self {
            config,
            channel,
            commands,
            channel_events,
            transfer_events_tx,
            transfer_events,
            outbound: None,
            app_events,
            link: LinkStateTracker::new(),
            context: ContextStore::new(),
            replies: ReplyRouter::new(),
            transfers,
            sequence: OutboundSequence::new(),
            last_inbound: None,
            active_stream: None,
            running: true,
        }
    }

    /// Run the coordinator dispatch loop until shutdown
    pub async fn run(mut self) -> Result<()> {
        info!("session coordinator starting");

        let (outbound_tx, outbound_rx) =
            mpsc::channel(self.config.channels.outbound_buffer_size);
        self.outbound = Some(outbound_tx);
        let writer = tokio::spawn(Self::run_outbound_writer(self.channel.clone(), outbound_rx));

        if let Err(error) = self.channel.activate().await {
            warn!(%error, "channel activation failed");
        }

        let mut housekeeping =
            tokio::time::interval(self.config.coordinator.housekeeping_interval);
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.running {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        info!("command channel closed, shutting down");
                        break;
                    }
                },
                event = self.channel_events.recv() => match event {
                    Some(event) => self.handle_channel_event(event).await,
                    None => {
                        warn!("channel event stream closed, shutting down");
                        break;
                    }
                },
                Some(event) = self.transfer_events.recv() => {
                    self.handle_transfer_event(event).await;
                }
                _ = housekeeping.tick() => self.housekeeping().await,
            }
        }

        // The in-flight transfer stays durable across coordinator restarts
        if let Some(active) = self.active_stream.take() {
            active.task.abort();
            if let Some(id) = self.transfers.revert_in_flight() {
                debug!(%id, "in-flight transfer requeued at shutdown");
            }
        }
        drop(self.outbound.take());
        let _ = writer.await;

        info!("session coordinator stopped");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Command Dispatch
    // ------------------------------------------------------------------------

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetContext { data, respond } => {
                let now = Timestamp::now();
                match self.context.set_outbound(data, self.link.current(), now) {
                    Ok(snapshot) => {
                        match snapshot.to_envelope(self.sequence.next()) {
                            // At-least-once delivery is the channel's contract
                            Ok(envelope) => self.queue_envelope(envelope, true),
                            Err(error) => {
                                warn!(%error, "failed to encode context snapshot")
                            }
                        }
                        self.publish(AppEvent::ContextChanged {
                            direction: ContextDirection::Outbound,
                            snapshot: snapshot.clone(),
                        });
                        self.publish_status(CommandStatus::sent(CommandKind::SetContext));
                        let _ = respond.send(Ok(snapshot));
                    }
                    Err(error) => {
                        self.publish_status(CommandStatus::failed(CommandKind::SetContext, &error));
                        let _ = respond.send(Err(error));
                    }
                }
            }
            Command::SendMessage { payload, respond } => {
                let result =
                    self.send_live(CommandKind::SendMessage, |seq| Envelope::message(seq, payload));
                let _ = respond.send(result);
            }
            Command::SendMessageData { data, respond } => {
                let result = self.send_live(CommandKind::SendMessageData, |seq| {
                    Envelope::message_data(seq, data)
                });
                let _ = respond.send(result);
            }
            Command::SendMessageWithReply { payload, respond } => {
                let state = self.link.current();
                if !state.is_active() {
                    let error = MessageError::LinkNotActive { state };
                    self.publish_status(CommandStatus::failed(
                        CommandKind::SendMessageWithReply,
                        &error,
                    ));
                    let _ = respond.send(Err(error));
                    return;
                }

                let sequence = self.sequence.next();
                let now = Timestamp::now();
                let timeout_ms = self.config.coordinator.reply_timeout.as_millis() as u64;
                self.replies
                    .register(sequence, now, now.add_millis(timeout_ms), respond);
                self.queue_envelope(Envelope::message(sequence, payload).requesting_reply(), false);
                self.publish_status(CommandStatus::sent(CommandKind::SendMessageWithReply));
            }
            Command::Reply { to, payload, respond } => {
                let result = self.send_live(CommandKind::Reply, |seq| {
                    Envelope::message(seq, payload).in_reply_to(to)
                });
                let _ = respond.send(result);
            }
            Command::EnqueueUserInfo {
                payload,
                metadata,
                respond,
            } => {
                let item = self.transfers.enqueue_user_info(payload, metadata);
                self.publish_status(CommandStatus::queued(item.id));
                let _ = respond.send(item);
                self.drain().await;
            }
            Command::EnqueueComplicationUserInfo {
                payload,
                metadata,
                respond,
            } => {
                let item = self.transfers.enqueue_complication_user_info(payload, metadata);
                self.publish_status(CommandStatus::queued(item.id));
                let _ = respond.send(item);
                self.drain().await;
            }
            Command::EnqueueFile {
                file,
                metadata,
                respond,
            } => match self.transfers.enqueue_file(file, metadata) {
                Ok(item) => {
                    self.publish_status(CommandStatus::queued(item.id));
                    let _ = respond.send(Ok(item));
                    self.drain().await;
                }
                Err(error) => {
                    self.publish_status(CommandStatus::failed(CommandKind::Transfer, &error));
                    let _ = respond.send(Err(error));
                }
            },
            Command::CancelTransfer { id, respond } => {
                let was_in_flight = self.transfers.in_flight_id() == Some(id);
                match self.transfers.cancel(id) {
                    Ok(_item) => {
                        if was_in_flight {
                            self.abort_active_stream();
                        }
                        self.publish_status(CommandStatus::transfer_cancelled(id));
                        let _ = respond.send(Ok(()));
                        self.drain().await;
                    }
                    Err(error) => {
                        self.publish_status(
                            CommandStatus::failed(CommandKind::CancelTransfer, &error)
                                .with_transfer(id),
                        );
                        let _ = respond.send(Err(error));
                    }
                }
            }
            Command::AcknowledgeTransfer { id, respond } => {
                let _ = respond.send(self.transfers.acknowledge(id));
            }
            Command::GetTransfer { id, respond } => {
                let _ = respond.send(self.transfers.get(id).cloned());
            }
            Command::GetLinkState { respond } => {
                let _ = respond.send(self.link.current());
            }
            Command::GetInboundContext { respond } => {
                let _ = respond.send(self.context.latest_inbound().cloned());
            }
            Command::Shutdown => {
                self.running = false;
            }
        }
    }

    /// Fire-and-forget live send: precondition check, sequence stamp, handoff
    fn send_live(
        &mut self,
        kind: CommandKind,
        envelope_for: impl FnOnce(SequenceId) -> Envelope,
    ) -> std::result::Result<(), MessageError> {
        let state = self.link.current();
        if !state.is_active() {
            let error = MessageError::LinkNotActive { state };
            self.publish_status(CommandStatus::failed(kind, &error));
            return Err(error);
        }

        let envelope = envelope_for(self.sequence.next());
        self.queue_envelope(envelope, false);
        self.publish_status(CommandStatus::sent(kind));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Channel Event Dispatch
    // ------------------------------------------------------------------------

    async fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::StateChanged(state) => {
                let was_active = self.link.current().is_active();
                if let Some(new_state) = self.link.update(state) {
                    info!(%new_state, "link state changed");
                    self.publish(AppEvent::LinkStateChanged { state: new_state });
                    if new_state.is_active() {
                        self.drain().await;
                    } else if was_active {
                        self.on_link_lost();
                    }
                }
            }
            ChannelEvent::Inbound(frame) => self.handle_inbound(frame),
        }
    }

    /// Fail everything that only makes sense on an active link
    fn on_link_lost(&mut self) {
        for _sequence in self.replies.fail_all_link_lost() {
            self.publish_status(CommandStatus::failed(
                CommandKind::SendMessageWithReply,
                MessageError::LinkLost,
            ));
        }
        if self.active_stream.is_some() {
            self.abort_active_stream();
            if let Some(id) = self.transfers.revert_in_flight() {
                debug!(%id, "in-flight transfer requeued after link drop");
                self.publish(AppEvent::TransferRequeued { id });
            }
        }
    }

    fn handle_inbound(&mut self, frame: Vec<u8>) {
        let envelope = match EnvelopeCodec::decode(&frame) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(%error, "dropping undecodable inbound frame");
                return;
            }
        };

        // Inbound processing is serial, so this only trips on a misbehaving
        // channel replaying old frames
        if let Some(last) = self.last_inbound {
            if envelope.sequence < last {
                warn!(sequence = %envelope.sequence, %last, "dropping regressed inbound sequence");
                return;
            }
        }
        self.last_inbound = Some(envelope.sequence);

        match envelope.kind {
            EnvelopeKind::Context => match ContextSnapshot::from_envelope(&envelope) {
                Ok(snapshot) => {
                    if self.context.receive_inbound(snapshot.clone()) {
                        self.publish(AppEvent::ContextChanged {
                            direction: ContextDirection::Inbound,
                            snapshot,
                        });
                    }
                }
                Err(error) => warn!(%error, "dropping malformed context envelope"),
            },
            EnvelopeKind::Message | EnvelopeKind::MessageData => {
                if let Some(reply_to) = envelope.reply_to {
                    let payload = envelope.body.as_map().cloned();
                    if self.replies.resolve(reply_to, envelope.body) {
                        self.publish_status(CommandStatus::reply_received(payload));
                    } else {
                        debug!(%reply_to, "reply for unknown or already-settled correlation");
                    }
                } else {
                    self.publish(AppEvent::MessageReceived {
                        sequence: envelope.sequence,
                        body: envelope.body,
                        wants_reply: envelope.wants_reply,
                    });
                }
            }
            EnvelopeKind::UserInfo | EnvelopeKind::ComplicationUserInfo => {
                let kind = if envelope.kind == EnvelopeKind::ComplicationUserInfo {
                    TransferKind::ComplicationUserInfo
                } else {
                    TransferKind::UserInfo
                };
                match UserInfoTransfer::from_envelope(&envelope) {
                    Ok(transfer) => self.publish(AppEvent::UserInfoReceived {
                        kind,
                        payload: transfer.payload,
                        metadata: transfer.metadata,
                    }),
                    Err(error) => warn!(%error, "dropping malformed user-info envelope"),
                }
            }
            EnvelopeKind::File => match FileTransfer::from_envelope(&envelope) {
                Ok(transfer) if transfer.file.verify() => self.publish(AppEvent::FileReceived {
                    name: transfer.file.name,
                    data: transfer.file.data,
                    metadata: transfer.metadata,
                }),
                Ok(transfer) => {
                    warn!(file = %transfer.file.name, "dropping file with bad content hash")
                }
                Err(error) => warn!(%error, "dropping malformed file envelope"),
            },
        }
    }

    // ------------------------------------------------------------------------
    // Transfer Drain
    // ------------------------------------------------------------------------

    async fn handle_transfer_event(&mut self, event: TransferEvent) {
        match event {
            TransferEvent::Progress { id, fraction } => {
                // Updates from an aborted stream are stale
                if self.active_stream.as_ref().map(|a| a.id) != Some(id) {
                    return;
                }
                if let Some(progress) = self.transfers.set_progress(id, fraction) {
                    self.publish(AppEvent::TransferProgress { id, progress });
                }
            }
            TransferEvent::Finished { id, result } => {
                if self.active_stream.as_ref().map(|a| a.id) != Some(id) {
                    return;
                }
                self.active_stream = None;

                match result {
                    Ok(()) => {
                        if let Ok(item) = self.transfers.complete(id) {
                            self.publish(AppEvent::TransferCompleted { item });
                            self.publish_status(CommandStatus::transfer_completed(id));
                        }
                        self.drain().await;
                    }
                    Err(ChannelError::LinkDropped) => {
                        // Resumption, not retry: back to the front of the queue
                        if let Some(id) = self.transfers.revert_in_flight() {
                            self.publish(AppEvent::TransferRequeued { id });
                        }
                    }
                    Err(error) => {
                        if let Ok(item) = self.transfers.fail(id, error.to_string()) {
                            self.publish(AppEvent::TransferFailed { item });
                            self.publish_status(CommandStatus::transfer_failed(id, &error));
                        }
                        self.drain().await;
                    }
                }
            }
        }
    }

    /// Start streaming the oldest queued item if the link permits
    async fn drain(&mut self) {
        if !self.link.current().is_active() {
            return;
        }

        while self.active_stream.is_none() {
            let Some((id, kind)) = self.transfers.peek_next_queued().map(|i| (i.id, i.kind))
            else {
                break;
            };

            if kind == TransferKind::ComplicationUserInfo {
                let enabled = match self.channel.query_capability(COMPLICATION_CAPABILITY).await {
                    Ok(enabled) => enabled,
                    Err(error) => {
                        warn!(%error, "capability query failed");
                        false
                    }
                };
                if !enabled {
                    let error = TransferError::capability_unavailable(COMPLICATION_CAPABILITY);
                    if let Ok(item) = self.transfers.fail(id, error.to_string()) {
                        self.publish(AppEvent::TransferFailed { item });
                        self.publish_status(CommandStatus::transfer_failed(id, &error));
                    }
                    // The rejected item consumed no drain cycle
                    continue;
                }
            }

            let Some(item) = self.transfers.get(id) else {
                break;
            };
            let frame = match item
                .to_envelope(self.sequence.next())
                .and_then(|envelope| EnvelopeCodec::encode(&envelope))
            {
                Ok(frame) => frame,
                Err(error) => {
                    if let Ok(item) = self.transfers.fail(id, error.to_string()) {
                        self.publish(AppEvent::TransferFailed { item });
                        self.publish_status(CommandStatus::transfer_failed(id, &error));
                    }
                    continue;
                }
            };

            if let Err(error) = self.transfers.begin(id) {
                warn!(%id, %error, "could not mark transfer in flight");
                break;
            }
            debug!(%id, "transfer in flight");
            let task = tokio::spawn(Self::run_stream(
                self.channel.clone(),
                id,
                frame,
                self.transfer_events_tx.clone(),
            ));
            self.active_stream = Some(ActiveStream { id, task });
        }
    }

    fn abort_active_stream(&mut self) {
        if let Some(active) = self.active_stream.take() {
            active.task.abort();
        }
    }

    /// Forward one transfer stream into the coordinator's event queue
    async fn run_stream(
        channel: Arc<dyn Channel>,
        id: TransferId,
        frame: Vec<u8>,
        events: mpsc::Sender<TransferEvent>,
    ) {
        let result = match channel.stream_transfer(frame).await {
            Ok(mut updates) => {
                let mut outcome = Err(ChannelError::Closed);
                while let Some(update) = updates.recv().await {
                    match update {
                        StreamEvent::Progress(fraction) => {
                            let _ = events.send(TransferEvent::Progress { id, fraction }).await;
                        }
                        StreamEvent::Completed => {
                            outcome = Ok(());
                            break;
                        }
                        StreamEvent::Failed(error) => {
                            outcome = Err(error);
                            break;
                        }
                    }
                }
                outcome
            }
            Err(error) => Err(error),
        };
        let _ = events.send(TransferEvent::Finished { id, result }).await;
    }

    // ------------------------------------------------------------------------
    // Housekeeping and Helpers
    // ------------------------------------------------------------------------

    async fn housekeeping(&mut self) {
        let now = Timestamp::now();
        for _sequence in self.replies.expire(now) {
            let timeout_ms = self.config.coordinator.reply_timeout.as_millis() as u64;
            self.publish_status(CommandStatus::failed(
                CommandKind::SendMessageWithReply,
                MessageError::Timeout { timeout_ms },
            ));
        }
        self.drain().await;
    }

    /// Encode an envelope and queue it for the serialized outbound writer
    fn queue_envelope(&mut self, envelope: Envelope, with_ack: bool) {
        let frame = match EnvelopeCodec::encode(&envelope) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, kind = envelope.kind.name(), "failed to encode outbound envelope");
                return;
            }
        };
        let frame = if with_ack {
            OutboundFrame::WithAck(frame)
        } else {
            OutboundFrame::BestEffort(frame)
        };
        match &self.outbound {
            Some(outbound) => {
                if let Err(error) = outbound.try_send(frame) {
                    warn!(%error, "outbound queue rejected frame");
                }
            }
            None => warn!("outbound writer not running, dropping frame"),
        }
    }

    /// Serialized writer: outbound frames reach the channel in issue order
    async fn run_outbound_writer(
        channel: Arc<dyn Channel>,
        mut outbound: mpsc::Receiver<OutboundFrame>,
    ) {
        while let Some(frame) = outbound.recv().await {
            let result = match frame {
                OutboundFrame::BestEffort(bytes) => channel.send_best_effort(bytes).await,
                OutboundFrame::WithAck(bytes) => channel.send_with_ack(bytes).await,
            };
            if let Err(error) = result {
                warn!(%error, "outbound send failed");
            }
        }
    }

    fn publish(&self, event: AppEvent) {
        // No subscribers is not an error
        let _ = self.app_events.send(event);
    }

    fn publish_status(&self, status: CommandStatus) {
        self.publish(AppEvent::Status(status));
    }
}
