//! Durable transfer queue
//!
//! Transfers are accepted regardless of link state and drained whenever the
//! link is Active: oldest Queued item first, at most one InFlight at a time.
//! A channel failure mid-transfer is terminal (`Failed`, never retried); a
//! link drop mid-transfer reverts the item to Queued at its original FIFO
//! position so it resumes on the next activation. Terminal items stay
//! queryable until the caller acknowledges them, at which point the queue
//! purges them.

use std::collections::VecDeque;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::TransferConfig;
use crate::envelope::{Envelope, EnvelopeBody, EnvelopeKind, PayloadMap};
use crate::errors::{CodecError, TransferError};
use crate::types::{SequenceId, TimeSource, Timestamp, TransferId};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Capability the peer must advertise before complication items drain
pub const COMPLICATION_CAPABILITY: &str = "complication";

// ----------------------------------------------------------------------------
// Content Hash
// ----------------------------------------------------------------------------

/// SHA-256 hash of file transfer content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Calculate the hash of file data
    pub fn from_data(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        Self(hash)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Verify data matches this hash
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::from_data(data) == *self
    }
}

impl core::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

// ----------------------------------------------------------------------------
// Transfer Payloads
// ----------------------------------------------------------------------------

/// File content and integrity metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePayload {
    /// Original file name
    pub name: String,
    /// File content
    pub data: Vec<u8>,
    /// SHA-256 of `data`, verified on receipt
    pub content_hash: ContentHash,
}

impl FilePayload {
    /// Create a file payload, computing its content hash
    pub fn new(name: String, data: Vec<u8>) -> Self {
        let content_hash = ContentHash::from_data(&data);
        Self {
            name,
            data,
            content_hash,
        }
    }

    /// Verify the content against the recorded hash
    pub fn verify(&self) -> bool {
        self.content_hash.verify(&self.data)
    }
}

/// Payload carried by a queued transfer item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransferPayload {
    /// Key-value payload (UserInfo and ComplicationUserInfo kinds)
    UserInfo(PayloadMap),
    /// File content (File kind)
    File(FilePayload),
}

// ----------------------------------------------------------------------------
// Wire Representations
// ----------------------------------------------------------------------------

/// Wire form of a user-info transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfoTransfer {
    pub payload: PayloadMap,
    pub metadata: PayloadMap,
}

impl UserInfoTransfer {
    /// Parse a user-info transfer out of a received envelope
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, CodecError> {
        match &envelope.body {
            EnvelopeBody::Blob(bytes) => Ok(bincode::deserialize(bytes)?),
            EnvelopeBody::Map(_) => Err(CodecError::UnexpectedBody {
                kind: envelope.kind.name(),
            }),
        }
    }
}

/// Wire form of a file transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileTransfer {
    pub file: FilePayload,
    pub metadata: PayloadMap,
}

impl FileTransfer {
    /// Parse a file transfer out of a received envelope
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, CodecError> {
        match &envelope.body {
            EnvelopeBody::Blob(bytes) => Ok(bincode::deserialize(bytes)?),
            EnvelopeBody::Map(_) => Err(CodecError::UnexpectedBody {
                kind: envelope.kind.name(),
            }),
        }
    }
}

// ----------------------------------------------------------------------------
// Transfer Item
// ----------------------------------------------------------------------------

/// Kind of queued transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferKind {
    UserInfo,
    File,
    ComplicationUserInfo,
}

impl TransferKind {
    /// The envelope kind used when this transfer crosses the wire
    pub fn envelope_kind(&self) -> EnvelopeKind {
        match self {
            TransferKind::UserInfo => EnvelopeKind::UserInfo,
            TransferKind::File => EnvelopeKind::File,
            TransferKind::ComplicationUserInfo => EnvelopeKind::ComplicationUserInfo,
        }
    }
}

/// Lifecycle status of a transfer item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    /// Waiting for a drain cycle
    Queued,
    /// Currently streaming through the channel
    InFlight,
    /// Delivered in full
    Completed,
    /// Channel failure or unavailable capability; not retried
    Failed,
    /// Cancelled by the caller
    Cancelled,
}

impl TransferStatus {
    /// Whether this status ends the item's lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Failed | TransferStatus::Cancelled
        )
    }
}

/// A queued transfer and its observable state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferItem {
    pub id: TransferId,
    pub kind: TransferKind,
    pub payload: TransferPayload,
    pub metadata: PayloadMap,
    pub status: TransferStatus,
    /// Fraction streamed so far, in [0, 1]
    pub progress: f64,
    pub created_at: Timestamp,
    /// Failure reason when status is Failed
    pub error: Option<String>,
}

impl TransferItem {
    /// Build the wire envelope for this item
    pub fn to_envelope(&self, sequence: SequenceId) -> Result<Envelope, CodecError> {
        let body = match &self.payload {
            TransferPayload::UserInfo(payload) => bincode::serialize(&UserInfoTransfer {
                payload: payload.clone(),
                metadata: self.metadata.clone(),
            })?,
            TransferPayload::File(file) => bincode::serialize(&FileTransfer {
                file: file.clone(),
                metadata: self.metadata.clone(),
            })?,
        };
        Ok(Envelope::new(
            self.kind.envelope_kind(),
            sequence,
            EnvelopeBody::Blob(body),
        ))
    }
}

// ----------------------------------------------------------------------------
// Transfer Queue
// ----------------------------------------------------------------------------

/// FIFO queue of durable transfers, at most one InFlight at a time
#[derive(Debug)]
pub struct TransferQueue<T: TimeSource> {
    config: TransferConfig,
    items: HashMap<TransferId, TransferItem>,
    /// Non-terminal items in creation order; the front is next to drain
    order: VecDeque<TransferId>,
    in_flight: Option<TransferId>,
    time_source: T,
}

impl<T: TimeSource> TransferQueue<T> {
    /// Create a queue with default configuration
    pub fn new(time_source: T) -> Self {
        Self::with_config(TransferConfig::default(), time_source)
    }

    /// Create a queue with custom configuration
    pub fn with_config(config: TransferConfig, time_source: T) -> Self {
        Self {
            config,
            items: HashMap::new(),
            order: VecDeque::new(),
            in_flight: None,
            time_source,
        }
    }

    /// Queue a user-info payload; always succeeds regardless of link state
    pub fn enqueue_user_info(&mut self, payload: PayloadMap, metadata: PayloadMap) -> TransferItem {
        self.insert(TransferKind::UserInfo, TransferPayload::UserInfo(payload), metadata)
    }

    /// Queue a complication user-info payload
    ///
    /// Drains only when the peer advertises [`COMPLICATION_CAPABILITY`].
    pub fn enqueue_complication_user_info(
        &mut self,
        payload: PayloadMap,
        metadata: PayloadMap,
    ) -> TransferItem {
        self.insert(
            TransferKind::ComplicationUserInfo,
            TransferPayload::UserInfo(payload),
            metadata,
        )
    }

    /// Queue a file transfer
    pub fn enqueue_file(
        &mut self,
        file: FilePayload,
        metadata: PayloadMap,
    ) -> Result<TransferItem, TransferError> {
        if file.data.len() > self.config.max_file_size {
            return Err(TransferError::FileTooLarge {
                size: file.data.len(),
                max: self.config.max_file_size,
            });
        }
        Ok(self.insert(TransferKind::File, TransferPayload::File(file), metadata))
    }

    fn insert(
        &mut self,
        kind: TransferKind,
        payload: TransferPayload,
        metadata: PayloadMap,
    ) -> TransferItem {
        let item = TransferItem {
            id: TransferId::generate(),
            kind,
            payload,
            metadata,
            status: TransferStatus::Queued,
            progress: 0.0,
            created_at: self.time_source.now(),
            error: None,
        };
        self.order.push_back(item.id);
        self.items.insert(item.id, item.clone());
        item
    }

    /// The oldest Queued item, if any and if nothing is InFlight
    pub fn peek_next_queued(&self) -> Option<&TransferItem> {
        if self.in_flight.is_some() {
            return None;
        }
        self.order.front().and_then(|id| self.items.get(id))
    }

    /// Mark an item InFlight
    pub fn begin(&mut self, id: TransferId) -> Result<(), TransferError> {
        if let Some(current) = self.in_flight {
            return Err(TransferError::InvalidStatus {
                id: current,
                status: TransferStatus::InFlight,
            });
        }
        let item = self.items.get_mut(&id).ok_or(TransferError::NotFound { id })?;
        if item.status != TransferStatus::Queued {
            return Err(TransferError::InvalidStatus {
                id,
                status: item.status,
            });
        }
        item.status = TransferStatus::InFlight;
        self.in_flight = Some(id);
        Ok(())
    }

    /// Record streaming progress on the InFlight item
    pub fn set_progress(&mut self, id: TransferId, fraction: f64) -> Option<f64> {
        let item = self.items.get_mut(&id)?;
        if item.status != TransferStatus::InFlight {
            return None;
        }
        item.progress = fraction.clamp(0.0, 1.0);
        Some(item.progress)
    }

    /// Complete the InFlight item
    pub fn complete(&mut self, id: TransferId) -> Result<TransferItem, TransferError> {
        let item = self.items.get_mut(&id).ok_or(TransferError::NotFound { id })?;
        if item.status != TransferStatus::InFlight {
            return Err(TransferError::InvalidStatus {
                id,
                status: item.status,
            });
        }
        item.status = TransferStatus::Completed;
        item.progress = 1.0;
        let item = item.clone();
        self.retire(id);
        Ok(item)
    }

    /// Fail a Queued or InFlight item; never retried automatically
    pub fn fail(&mut self, id: TransferId, reason: String) -> Result<TransferItem, TransferError> {
        let item = self.items.get_mut(&id).ok_or(TransferError::NotFound { id })?;
        if item.status.is_terminal() {
            return Err(TransferError::InvalidStatus {
                id,
                status: item.status,
            });
        }
        item.status = TransferStatus::Failed;
        item.error = Some(reason);
        let item = item.clone();
        self.retire(id);
        Ok(item)
    }

    /// Revert the InFlight item to Queued after a link drop
    ///
    /// Partial progress is discarded; the item keeps its original FIFO
    /// position and drains again once the link is Active.
    pub fn revert_in_flight(&mut self) -> Option<TransferId> {
        let id = self.in_flight.take()?;
        let item = self.items.get_mut(&id)?;
        item.status = TransferStatus::Queued;
        item.progress = 0.0;
        tracing::debug!(%id, "in-flight transfer reverted to queued");
        Some(id)
    }

    /// Cancel a non-terminal item
    ///
    /// Unknown ids and items already in a terminal state fail with
    /// `NotFound`. The returned item tells the caller whether an in-flight
    /// stream has to be aborted.
    pub fn cancel(&mut self, id: TransferId) -> Result<TransferItem, TransferError> {
        let item = self.items.get_mut(&id).ok_or(TransferError::NotFound { id })?;
        if item.status.is_terminal() {
            return Err(TransferError::NotFound { id });
        }
        let was_in_flight = item.status == TransferStatus::InFlight;
        item.status = TransferStatus::Cancelled;
        let item = item.clone();
        self.retire(id);
        debug_assert!(!was_in_flight || self.in_flight.is_none());
        Ok(item)
    }

    /// Purge a terminal item, transferring ownership to the caller
    pub fn acknowledge(&mut self, id: TransferId) -> Result<TransferItem, TransferError> {
        let status = self.items.get(&id).map(|item| item.status);
        match status {
            None => Err(TransferError::NotFound { id }),
            Some(status) if !status.is_terminal() => {
                Err(TransferError::InvalidStatus { id, status })
            }
            Some(_) => self.items.remove(&id).ok_or(TransferError::NotFound { id }),
        }
    }

    /// Remove a now-terminal item from the drain order
    fn retire(&mut self, id: TransferId) {
        self.order.retain(|queued| *queued != id);
        if self.in_flight == Some(id) {
            self.in_flight = None;
        }
    }

    /// Look up an item by id
    pub fn get(&self, id: TransferId) -> Option<&TransferItem> {
        self.items.get(&id)
    }

    /// Id of the item currently streaming, if any
    pub fn in_flight_id(&self) -> Option<TransferId> {
        self.in_flight
    }

    /// Number of items waiting to drain
    pub fn queued_len(&self) -> usize {
        self.order
            .iter()
            .filter_map(|id| self.items.get(id))
            .filter(|item| item.status == TransferStatus::Queued)
            .count()
    }

    /// Total items owned by the queue, terminal ones included
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct ManualTimeSource(Cell<u64>);

    impl ManualTimeSource {
        fn new() -> Self {
            Self(Cell::new(1_000))
        }

        fn advance(&self, millis: u64) {
            self.0.set(self.0.get() + millis);
        }
    }

    impl TimeSource for &ManualTimeSource {
        fn now(&self) -> Timestamp {
            Timestamp::new(self.0.get())
        }
    }

    fn payload(tag: i64) -> PayloadMap {
        let mut map = PayloadMap::new();
        map.insert("tag".into(), crate::envelope::PayloadValue::Int(tag));
        map
    }

    #[test]
    fn test_enqueue_fifo_order() {
        let clock = ManualTimeSource::new();
        let mut queue = TransferQueue::new(&clock);

        let first = queue.enqueue_user_info(payload(1), PayloadMap::new());
        clock.advance(10);
        let second = queue.enqueue_user_info(payload(2), PayloadMap::new());

        assert_eq!(first.status, TransferStatus::Queued);
        assert_eq!(queue.queued_len(), 2);
        assert_eq!(queue.peek_next_queued().unwrap().id, first.id);

        queue.begin(first.id).unwrap();
        queue.complete(first.id).unwrap();
        assert_eq!(queue.peek_next_queued().unwrap().id, second.id);
    }

    #[test]
    fn test_single_in_flight() {
        let clock = ManualTimeSource::new();
        let mut queue = TransferQueue::new(&clock);

        let first = queue.enqueue_user_info(payload(1), PayloadMap::new());
        let second = queue.enqueue_user_info(payload(2), PayloadMap::new());

        queue.begin(first.id).unwrap();
        // Nothing else may start while one item is InFlight
        assert!(queue.peek_next_queued().is_none());
        assert!(matches!(
            queue.begin(second.id),
            Err(TransferError::InvalidStatus { .. })
        ));

        queue.complete(first.id).unwrap();
        queue.begin(second.id).unwrap();
        assert_eq!(queue.in_flight_id(), Some(second.id));
    }

    #[test]
    fn test_revert_preserves_fifo_position() {
        let clock = ManualTimeSource::new();
        let mut queue = TransferQueue::new(&clock);

        let first = queue.enqueue_user_info(payload(1), PayloadMap::new());
        let _second = queue.enqueue_user_info(payload(2), PayloadMap::new());

        queue.begin(first.id).unwrap();
        queue.set_progress(first.id, 0.6);

        // Link drop: the item goes back to the front with progress discarded
        assert_eq!(queue.revert_in_flight(), Some(first.id));
        let item = queue.get(first.id).unwrap();
        assert_eq!(item.status, TransferStatus::Queued);
        assert_eq!(item.progress, 0.0);
        assert_eq!(queue.peek_next_queued().unwrap().id, first.id);
    }

    #[test]
    fn test_fail_is_terminal() {
        let clock = ManualTimeSource::new();
        let mut queue = TransferQueue::new(&clock);

        let item = queue.enqueue_user_info(payload(1), PayloadMap::new());
        queue.begin(item.id).unwrap();
        let failed = queue.fail(item.id, "stream broke".into()).unwrap();

        assert_eq!(failed.status, TransferStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("stream broke"));
        assert!(queue.in_flight_id().is_none());
        // A failed item never drains again
        assert!(queue.peek_next_queued().is_none());
    }

    #[test]
    fn test_cancel_queued_and_in_flight() {
        let clock = ManualTimeSource::new();
        let mut queue = TransferQueue::new(&clock);

        let queued = queue.enqueue_user_info(payload(1), PayloadMap::new());
        let cancelled = queue.cancel(queued.id).unwrap();
        assert_eq!(cancelled.status, TransferStatus::Cancelled);

        let flying = queue.enqueue_user_info(payload(2), PayloadMap::new());
        queue.begin(flying.id).unwrap();
        queue.cancel(flying.id).unwrap();
        assert!(queue.in_flight_id().is_none());
    }

    #[test]
    fn test_cancel_terminal_is_not_found() {
        let clock = ManualTimeSource::new();
        let mut queue = TransferQueue::new(&clock);

        let item = queue.enqueue_user_info(payload(1), PayloadMap::new());
        queue.begin(item.id).unwrap();
        queue.complete(item.id).unwrap();

        assert!(matches!(
            queue.cancel(item.id),
            Err(TransferError::NotFound { .. })
        ));
        assert!(matches!(
            queue.cancel(TransferId::generate()),
            Err(TransferError::NotFound { .. })
        ));
    }

    #[test]
    fn test_acknowledge_purges_terminal_items() {
        let clock = ManualTimeSource::new();
        let mut queue = TransferQueue::new(&clock);

        let item = queue.enqueue_user_info(payload(1), PayloadMap::new());
        assert!(matches!(
            queue.acknowledge(item.id),
            Err(TransferError::InvalidStatus { .. })
        ));

        queue.begin(item.id).unwrap();
        queue.complete(item.id).unwrap();

        let owned = queue.acknowledge(item.id).unwrap();
        assert_eq!(owned.status, TransferStatus::Completed);
        assert!(queue.get(item.id).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_file_size_limit() {
        let clock = ManualTimeSource::new();
        let config = TransferConfig { max_file_size: 16 };
        let mut queue = TransferQueue::with_config(config, &clock);

        let small = FilePayload::new("ok.bin".into(), vec![0u8; 16]);
        assert!(queue.enqueue_file(small, PayloadMap::new()).is_ok());

        let large = FilePayload::new("big.bin".into(), vec![0u8; 17]);
        assert!(matches!(
            queue.enqueue_file(large, PayloadMap::new()),
            Err(TransferError::FileTooLarge { .. })
        ));
    }

    #[test]
    fn test_file_payload_hash() {
        let file = FilePayload::new("face.png".into(), b"pixel data".to_vec());
        assert!(file.verify());

        let mut tampered = file.clone();
        tampered.data.push(0xFF);
        assert!(!tampered.verify());
    }

    #[test]
    fn test_transfer_envelope_roundtrip() {
        let clock = ManualTimeSource::new();
        let mut queue = TransferQueue::new(&clock);

        let mut metadata = PayloadMap::new();
        metadata.insert("session".into(), crate::envelope::PayloadValue::Int(9));

        let item = queue.enqueue_user_info(payload(5), metadata.clone());
        let envelope = item.to_envelope(SequenceId::new(21)).unwrap();
        assert_eq!(envelope.kind, EnvelopeKind::UserInfo);

        let parsed = UserInfoTransfer::from_envelope(&envelope).unwrap();
        assert_eq!(parsed.payload, payload(5));
        assert_eq!(parsed.metadata, metadata);

        let file_item = queue
            .enqueue_file(FilePayload::new("f.txt".into(), b"abc".to_vec()), metadata)
            .unwrap();
        let envelope = file_item.to_envelope(SequenceId::new(22)).unwrap();
        assert_eq!(envelope.kind, EnvelopeKind::File);
        let parsed = FileTransfer::from_envelope(&envelope).unwrap();
        assert_eq!(parsed.file.name, "f.txt");
        assert!(parsed.file.verify());
    }
}
