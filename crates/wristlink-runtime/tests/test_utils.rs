//! Shared test utilities for runtime integration tests
//!
//! Provides a scriptable in-memory channel: tests drive link state, inject
//! inbound frames, inspect captured outbound traffic, and script how each
//! transfer stream behaves (complete, fail mid-stream, drop the link).

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use wristlink_runtime::{
    AppEvent, Channel, ChannelError, ChannelEvent, LinkState, PayloadMap, PayloadValue,
    StreamEvent,
};

// ----------------------------------------------------------------------------
// Transfer Scripts
// ----------------------------------------------------------------------------

/// How the mock channel plays out one `stream_transfer` call
#[derive(Debug, Clone, Copy)]
pub enum TransferScript {
    /// Emit `steps` rising progress updates, then complete
    Complete { steps: u32 },
    /// Emit `after_steps` progress updates, then fail with an i/o error
    FailAfter { after_steps: u32 },
    /// Emit `after_steps` progress updates, drop the link, then report it
    DropLinkAfter { after_steps: u32 },
}

impl Default for TransferScript {
    fn default() -> Self {
        TransferScript::Complete { steps: 4 }
    }
}

// ----------------------------------------------------------------------------
// Mock Channel
// ----------------------------------------------------------------------------

struct Shared {
    events_tx: mpsc::Sender<ChannelEvent>,
    sent: Mutex<Vec<Vec<u8>>>,
    sent_notify: mpsc::UnboundedSender<Vec<u8>>,
    streamed: Mutex<Vec<Vec<u8>>>,
    capabilities: Mutex<HashMap<String, bool>>,
    scripts: Mutex<VecDeque<TransferScript>>,
    step_delay: Duration,
}

/// In-memory channel implementation for tests
pub struct MockChannel {
    shared: Arc<Shared>,
}

/// Test-side control surface over a [`MockChannel`]
pub struct MockController {
    shared: Arc<Shared>,
    sent_rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MockChannel {
    /// Create a channel, its event stream, and its controller
    pub fn new() -> (Arc<Self>, mpsc::Receiver<ChannelEvent>, MockController) {
        let (events_tx, events_rx) = mpsc::channel(128);
        let (sent_notify, sent_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            events_tx,
            sent: Mutex::new(Vec::new()),
            sent_notify,
            streamed: Mutex::new(Vec::new()),
            capabilities: Mutex::new(HashMap::new()),
            scripts: Mutex::new(VecDeque::new()),
            step_delay: Duration::from_millis(5),
        });

        let channel = Arc::new(Self {
            shared: shared.clone(),
        });
        let controller = MockController { shared, sent_rx };
        (channel, events_rx, controller)
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn activate(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn send_best_effort(&self, frame: Vec<u8>) -> Result<(), ChannelError> {
        self.shared.sent.lock().unwrap().push(frame.clone());
        let _ = self.shared.sent_notify.send(frame);
        Ok(())
    }

    async fn send_with_ack(&self, frame: Vec<u8>) -> Result<(), ChannelError> {
        // The mock acknowledges instantly; same capture path
        self.send_best_effort(frame).await
    }

    async fn stream_transfer(
        &self,
        frame: Vec<u8>,
    ) -> Result<mpsc::Receiver<StreamEvent>, ChannelError> {
        self.shared.streamed.lock().unwrap().push(frame);
        let script = self
            .shared
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();

        let (tx, rx) = mpsc::channel(16);
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let progress = |done: u32, total: u32| {
                // Stays below 1.0; completion is a separate terminal event
                done as f64 / (total as f64 + 1.0)
            };
            match script {
                TransferScript::Complete { steps } => {
                    for step in 1..=steps {
                        tokio::time::sleep(shared.step_delay).await;
                        let _ = tx.send(StreamEvent::Progress(progress(step, steps))).await;
                    }
                    let _ = tx.send(StreamEvent::Completed).await;
                }
                TransferScript::FailAfter { after_steps } => {
                    for step in 1..=after_steps {
                        tokio::time::sleep(shared.step_delay).await;
                        let _ = tx
                            .send(StreamEvent::Progress(progress(step, after_steps + 1)))
                            .await;
                    }
                    let _ = tx
                        .send(StreamEvent::Failed(ChannelError::io("stream interrupted")))
                        .await;
                }
                TransferScript::DropLinkAfter { after_steps } => {
                    for step in 1..=after_steps {
                        tokio::time::sleep(shared.step_delay).await;
                        let _ = tx
                            .send(StreamEvent::Progress(progress(step, after_steps + 1)))
                            .await;
                    }
                    let _ = shared
                        .events_tx
                        .send(ChannelEvent::StateChanged(LinkState::Unreachable))
                        .await;
                    let _ = tx.send(StreamEvent::Failed(ChannelError::LinkDropped)).await;
                }
            }
        });
        Ok(rx)
    }

    async fn query_capability(&self, name: &str) -> Result<bool, ChannelError> {
        Ok(self
            .shared
            .capabilities
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or(false))
    }
}

/// Cheap cloneable handle for injecting channel events from helper tasks
#[derive(Clone)]
pub struct InboundInjector {
    events_tx: mpsc::Sender<ChannelEvent>,
}

impl InboundInjector {
    /// Deliver an encoded frame as inbound traffic; best effort
    pub async fn inject_inbound(&self, frame: Vec<u8>) {
        let _ = self.events_tx.send(ChannelEvent::Inbound(frame)).await;
    }

    /// Report a link state change; best effort
    pub async fn set_link_state(&self, state: LinkState) {
        let _ = self
            .events_tx
            .send(ChannelEvent::StateChanged(state))
            .await;
    }
}

impl MockController {
    /// Get a cloneable injector over this channel's event stream
    pub fn injector(&self) -> InboundInjector {
        InboundInjector {
            events_tx: self.shared.events_tx.clone(),
        }
    }

    /// Report a link state change to the coordinator
    pub async fn set_link_state(&self, state: LinkState) {
        self.shared
            .events_tx
            .send(ChannelEvent::StateChanged(state))
            .await
            .expect("coordinator gone");
    }

    /// Deliver an encoded frame as inbound traffic
    pub async fn inject_inbound(&self, frame: Vec<u8>) {
        self.shared
            .events_tx
            .send(ChannelEvent::Inbound(frame))
            .await
            .expect("coordinator gone");
    }

    /// All frames handed to `send_best_effort`/`send_with_ack` so far
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.shared.sent.lock().unwrap().clone()
    }

    /// All frames handed to `stream_transfer` so far
    pub fn streamed_frames(&self) -> Vec<Vec<u8>> {
        self.shared.streamed.lock().unwrap().clone()
    }

    /// Await the next outbound frame
    pub async fn next_sent(&mut self) -> Vec<u8> {
        self.recv_sent().await.expect("channel gone")
    }

    /// Await the next outbound frame, or `None` once the channel is gone
    pub async fn recv_sent(&mut self) -> Option<Vec<u8>> {
        self.sent_rx.recv().await
    }

    /// Set a peer capability flag
    pub fn set_capability(&self, name: &str, enabled: bool) {
        self.shared
            .capabilities
            .lock()
            .unwrap()
            .insert(name.to_string(), enabled);
    }

    /// Script the next `stream_transfer` call
    pub fn queue_transfer_script(&self, script: TransferScript) {
        self.shared.scripts.lock().unwrap().push_back(script);
    }
}

// ----------------------------------------------------------------------------
// Assertion Helpers
// ----------------------------------------------------------------------------

/// Await the first event matching `predicate`, skipping the rest
pub async fn wait_for_event<F>(events: &mut broadcast::Receiver<AppEvent>, mut predicate: F) -> AppEvent
where
    F: FnMut(&AppEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    panic!("event subscriber lagged by {} events", skipped)
                }
                Err(broadcast::error::RecvError::Closed) => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Drive the link Active and wait until the coordinator has seen it
pub async fn activate_link(
    controller: &MockController,
    events: &mut broadcast::Receiver<AppEvent>,
) {
    controller.set_link_state(LinkState::Active).await;
    wait_for_event(events, |event| {
        matches!(
            event,
            AppEvent::LinkStateChanged {
                state: LinkState::Active
            }
        )
    })
    .await;
}

/// Build a single-entry payload map
pub fn payload(key: &str, value: impl Into<PayloadValue>) -> PayloadMap {
    let mut map = PayloadMap::new();
    map.insert(key.to_string(), value.into());
    map
}

/// Install the test tracing subscriber once per binary
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
