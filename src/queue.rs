//! # Outbound Send Queue
//!
//! A FIFO of encoded frames waiting for the transport. Because only one send
//! may be outstanding at a time, everything the engine emits passes through
//! here and is handed to the transport one frame per send-completion.
//!
//! The queue applies backpressure at a configured depth: ordinary publishes
//! and subscriptions are dropped once the limit is reached, while
//! protocol-mandated acknowledgements are enqueued with `force` and bypass
//! the limit entirely (they can still only fill the remaining physical
//! capacity `Q`, which must be sized above the depth limit).

use heapless::Deque;

use crate::packet::RawPacket;

/// FIFO of pending outbound frames with a runtime depth limit.
pub struct SendQueue<const N: usize, const Q: usize> {
    entries: Deque<RawPacket<N>, Q>,
    limit: usize,
}

impl<const N: usize, const Q: usize> SendQueue<N, Q> {
    /// Creates an empty queue that rejects non-forced enqueues at `limit`
    /// entries.
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Deque::new(),
            limit,
        }
    }

    /// Appends a frame. Without `force`, fails once the queue already holds
    /// `limit` entries; with it, fails only when the physical capacity is
    /// exhausted. The frame is dropped on failure.
    pub fn enqueue(&mut self, frame: RawPacket<N>, force: bool) -> bool {
        if !force && self.entries.len() >= self.limit {
            debug!("queue: full ({} entries), frame dropped", self.entries.len());
            return false;
        }
        self.entries.push_back(frame).is_ok()
    }

    /// Removes and returns the oldest frame.
    pub fn pop(&mut self) -> Option<RawPacket<N>> {
        self.entries.pop_front()
    }

    /// Drops every pending frame.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
