//! One-shot reply correlation
//!
//! A message sent with a reply expectation registers its sequence id here.
//! Each registration resolves exactly once: with the reply body when the
//! peer answers, with `Timeout` when the deadline passes, or with
//! `LinkLost` when the link leaves Active while the correlation is still
//! outstanding. Removal from the table before completion is what makes the
//! at-most-once half of the guarantee structural rather than convention.

use hashbrown::HashMap;
use tokio::sync::oneshot;

use crate::envelope::EnvelopeBody;
use crate::errors::MessageError;
use crate::types::{SequenceId, Timestamp};

/// Completion side of a pending reply
pub type ReplyResponder = oneshot::Sender<Result<EnvelopeBody, MessageError>>;

// ----------------------------------------------------------------------------
// Pending Reply
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct PendingReply {
    registered_at: Timestamp,
    deadline: Timestamp,
    responder: ReplyResponder,
}

// ----------------------------------------------------------------------------
// Reply Router
// ----------------------------------------------------------------------------

/// Correlation table from outbound sequence id to pending completion
#[derive(Debug, Default)]
pub struct ReplyRouter {
    pending: HashMap<SequenceId, PendingReply>,
}

impl ReplyRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending reply for an outbound sequence id
    pub fn register(
        &mut self,
        sequence: SequenceId,
        now: Timestamp,
        deadline: Timestamp,
        responder: ReplyResponder,
    ) {
        self.pending.insert(
            sequence,
            PendingReply {
                registered_at: now,
                deadline,
                responder,
            },
        );
    }

    /// Resolve a correlation with a received reply body
    ///
    /// Returns `true` when a pending entry existed and was completed; a
    /// reply to an unknown or already-resolved sequence id returns `false`.
    pub fn resolve(&mut self, reply_to: SequenceId, body: EnvelopeBody) -> bool {
        match self.pending.remove(&reply_to) {
            Some(entry) => {
                // Receiver may have been dropped; resolution still counts
                let _ = entry.responder.send(Ok(body));
                true
            }
            None => false,
        }
    }

    /// Fail every correlation whose deadline has passed
    ///
    /// Returns the expired sequence ids so the caller can emit one terminal
    /// status event per failed operation.
    pub fn expire(&mut self, now: Timestamp) -> Vec<SequenceId> {
        let expired: Vec<SequenceId> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(sequence, _)| *sequence)
            .collect();

        for sequence in &expired {
            if let Some(entry) = self.pending.remove(sequence) {
                let timeout_ms = entry.deadline - entry.registered_at;
                let _ = entry.responder.send(Err(MessageError::Timeout { timeout_ms }));
            }
        }
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "reply correlations timed out");
        }

        expired
    }

    /// Fail every outstanding correlation with `LinkLost`
    ///
    /// Called when the link leaves Active; returns the failed sequence ids.
    pub fn fail_all_link_lost(&mut self) -> Vec<SequenceId> {
        let failed: Vec<SequenceId> = self.pending.keys().copied().collect();
        for (_, entry) in self.pending.drain() {
            let _ = entry.responder.send(Err(MessageError::LinkLost));
        }
        failed
    }

    /// Number of outstanding correlations
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::PayloadMap;

    fn body() -> EnvelopeBody {
        EnvelopeBody::Map(PayloadMap::new())
    }

    #[test]
    fn test_resolve_completes_exactly_once() {
        let mut router = ReplyRouter::new();
        let (tx, mut rx) = oneshot::channel();
        let seq = SequenceId::new(1);

        router.register(seq, Timestamp::new(0), Timestamp::new(1000), tx);
        assert_eq!(router.pending_count(), 1);

        assert!(router.resolve(seq, body()));
        assert!(rx.try_recv().unwrap().is_ok());

        // Second resolution of the same id finds nothing
        assert!(!router.resolve(seq, body()));
        assert_eq!(router.pending_count(), 0);
    }

    #[test]
    fn test_resolve_unknown_sequence() {
        let mut router = ReplyRouter::new();
        assert!(!router.resolve(SequenceId::new(99), body()));
    }

    #[test]
    fn test_expire_fails_with_timeout() {
        let mut router = ReplyRouter::new();
        let (tx_a, mut rx_a) = oneshot::channel();
        let (tx_b, mut rx_b) = oneshot::channel();

        router.register(SequenceId::new(1), Timestamp::new(0), Timestamp::new(100), tx_a);
        router.register(SequenceId::new(2), Timestamp::new(0), Timestamp::new(500), tx_b);

        let expired = router.expire(Timestamp::new(200));
        assert_eq!(expired, vec![SequenceId::new(1)]);
        assert_eq!(router.pending_count(), 1);

        match rx_a.try_recv().unwrap() {
            Err(MessageError::Timeout { timeout_ms }) => assert_eq!(timeout_ms, 100),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(rx_b.try_recv().is_err()); // still pending

        // An expired correlation can no longer be resolved
        assert!(!router.resolve(SequenceId::new(1), body()));
    }

    #[test]
    fn test_link_lost_fails_all_outstanding() {
        let mut router = ReplyRouter::new();
        let (tx_a, mut rx_a) = oneshot::channel();
        let (tx_b, mut rx_b) = oneshot::channel();

        router.register(SequenceId::new(1), Timestamp::new(0), Timestamp::new(100), tx_a);
        router.register(SequenceId::new(2), Timestamp::new(0), Timestamp::new(100), tx_b);

        let mut failed = router.fail_all_link_lost();
        failed.sort();
        assert_eq!(failed, vec![SequenceId::new(1), SequenceId::new(2)]);
        assert_eq!(router.pending_count(), 0);

        assert!(matches!(rx_a.try_recv().unwrap(), Err(MessageError::LinkLost)));
        assert!(matches!(rx_b.try_recv().unwrap(), Err(MessageError::LinkLost)));
    }
}
