//! Outbound call correlation
//!
//! Every outbound Call registers a fresh unique id with a reply slot before
//! it hits the wire. An inbound CallResult/CallError resolves the slot; a
//! reply with no matching slot is reported to the caller so it can be
//! logged and dropped.

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

/// The station's answer to an outbound Call.
#[derive(Debug)]
pub enum CallReply {
    Result(Value),
    Error { code: String, description: String },
}

/// Pending reply slots, keyed by unique message id. All operations are O(1)
/// map accesses; nothing here ever blocks an action handler.
#[derive(Default)]
pub struct PendingCalls {
    slots: DashMap<String, oneshot::Sender<CallReply>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh unique id and its reply slot.
    pub fn register(&self) -> (String, oneshot::Receiver<CallReply>) {
        let unique_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.slots.insert(unique_id.clone(), tx);
        (unique_id, rx)
    }

    /// Resolve the slot for `unique_id`. Returns `false` when no call is
    /// pending under that id (an unmatched reply).
    pub fn resolve(&self, unique_id: &str, reply: CallReply) -> bool {
        match self.slots.remove(unique_id) {
            Some((_, tx)) => {
                // the caller may have timed out and dropped the receiver
                let _ = tx.send(reply);
                true
            }
            None => false,
        }
    }

    /// Forget a slot whose caller gave up (send failure, timeout).
    pub fn forget(&self, unique_id: &str) {
        self.slots.remove(unique_id);
    }

    /// Drop every pending slot. Used on transport close; each waiting
    /// caller observes a closed channel.
    pub fn abandon_all(&self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

// ── Tests ──────────────────────────────────────────────────────
