// SPDX-License-Identifier: MIT

//! Bounded queue of outbound OTA notifications.
//!
//! The dispatcher pushes `[status, value]` notifications here; the
//! transport glue drains them whenever the link can take another packet.

use heapless::Deque;

use crate::protocol::OtaStatus;

const QUEUE_DEPTH: usize = 8;

pub struct NotificationQueue {
    queue: Deque<OtaStatus, QUEUE_DEPTH>,
    dropped: u32,
}

impl NotificationQueue {
    pub const fn new() -> Self {
        Self {
            queue: Deque::new(),
            dropped: 0,
        }
    }

    /// Enqueue a notification. When full, the oldest entry is dropped so
    /// the freshest status always gets through.
    pub fn publish(&mut self, status: OtaStatus) {
        if self.queue.is_full() {
            self.queue.pop_front();
            self.dropped = self.dropped.saturating_add(1);
            #[cfg(feature = "defmt")]
            defmt::warn!("notification queue full, dropping oldest");
        }
        // Cannot fail: a slot was just freed if needed.
        let _ = self.queue.push_back(status);
    }

    /// Next notification to send, oldest first.
    pub fn pop(&mut self) -> Option<OtaStatus> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Notifications lost to overflow since startup.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new()
    }
}
