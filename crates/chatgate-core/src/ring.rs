//! Bounded message ring
//!
//! Fixed-capacity append-only buffer of recent inbound messages. Once full,
//! the oldest entries are evicted first. Readers get an owned snapshot, never
//! a live view, so iteration cannot observe eviction.

use std::collections::VecDeque;

use crate::types::InboundMessage;

// ----------------------------------------------------------------------------
// Message Ring
// ----------------------------------------------------------------------------

/// Fixed-capacity FIFO buffer of inbound messages
#[derive(Debug, Clone)]
pub struct MessageRing {
    messages: VecDeque<InboundMessage>,
    capacity: usize,
}

impl MessageRing {
    /// Create a ring retaining at most `capacity` messages
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append at the tail, evicting from the head while over capacity
    pub fn append(&mut self, message: InboundMessage) {
        self.messages.push_back(message);
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
    }

    /// Owned copy of the retained messages in insertion order
    pub fn snapshot(&self) -> Vec<InboundMessage> {
        self.messages.iter().cloned().collect()
    }

    /// Number of retained messages (always <= capacity)
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all retained messages
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Identity, MessageId, Timestamp};

    fn message(n: usize) -> InboundMessage {
        InboundMessage {
            id: MessageId::new(format!("m{}", n)),
            from: Identity::new("peer@example"),
            body: format!("message {}", n),
            timestamp: Timestamp::new(n as u64),
        }
    }

    #[test]
    fn test_append_preserves_order() {
        let mut ring = MessageRing::new(100);
        for n in 0..5 {
            ring.append(message(n));
        }
        let snapshot = ring.snapshot();
        assert_eq!(snapshot.len(), 5);
        assert_eq!(snapshot[0].body, "message 0");
        assert_eq!(snapshot[4].body, "message 4");
    }

    #[test]
    fn test_eviction_keeps_last_capacity_entries() {
        let mut ring = MessageRing::new(100);
        for n in 0..101 {
            ring.append(message(n));
        }
        let snapshot = ring.snapshot();
        assert_eq!(snapshot.len(), 100);
        // First retained element is the 2nd insertion
        assert_eq!(snapshot[0].body, "message 1");
        assert_eq!(snapshot[99].body, "message 100");
    }

    #[test]
    fn test_len_never_exceeds_capacity() {
        let mut ring = MessageRing::new(10);
        for n in 0..250 {
            ring.append(message(n));
            assert!(ring.len() <= 10);
        }
        assert_eq!(ring.len(), 10);
        assert_eq!(ring.snapshot()[0].body, "message 240");
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut ring = MessageRing::new(3);
        ring.append(message(0));
        let snapshot = ring.snapshot();
        for n in 1..10 {
            ring.append(message(n));
        }
        // The earlier snapshot is unaffected by later eviction
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].body, "message 0");
    }

    #[test]
    fn test_clear() {
        let mut ring = MessageRing::new(10);
        ring.append(message(0));
        ring.append(message(1));
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.capacity(), 10);
    }
}
