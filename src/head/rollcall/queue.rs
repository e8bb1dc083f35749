/*!
 * Roll Call Queue
 *
 * Routes roll call responses arriving on the network receive path to the
 * task collecting them for a request. Each active roll call owns a bounded
 * channel; delivery never blocks, a full channel drops the response.
 */

use crate::core::PeerId;
use crate::models::messages::RollCallResponse;
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// A roll call response together with the peer it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollCallReply {
    pub from: PeerId,
    pub response: RollCallResponse,
}

struct Channel {
    tx: flume::Sender<RollCallReply>,
    rx: flume::Receiver<RollCallReply>,
}

/// Per-request channels of roll call replies
#[derive(Clone)]
pub struct RollCallQueue {
    queues: Arc<DashMap<String, Channel, RandomState>>,
    capacity: usize,
}

impl RollCallQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: Arc::new(DashMap::with_hasher(RandomState::new())),
            capacity,
        }
    }

    /// Allocate the channel for a request, replacing any previous one
    pub fn create(&self, request_id: &str) {
        let (tx, rx) = flume::bounded(self.capacity);
        self.queues.insert(request_id.to_string(), Channel { tx, rx });
    }

    /// Receiving end for a request's replies
    pub fn responses(&self, request_id: &str) -> Option<flume::Receiver<RollCallReply>> {
        self.queues.get(request_id).map(|ch| ch.rx.clone())
    }

    /// Queue a reply; returns false if it was dropped
    pub fn add(&self, request_id: &str, reply: RollCallReply) -> bool {
        let Some(channel) = self.queues.get(request_id) else {
            return false;
        };

        match channel.tx.try_send(reply) {
            Ok(()) => true,
            Err(flume::TrySendError::Full(reply)) => {
                debug!(request = request_id, peer = %reply.from, "roll call queue full, dropping response");
                false
            }
            Err(flume::TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn remove(&self, request_id: &str) {
        self.queues.remove(request_id);
    }

    pub fn exists(&self, request_id: &str) -> bool {
        self.queues.contains_key(request_id)
    }

    /// Number of active roll calls
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}
