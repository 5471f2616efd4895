use std::collections::VecDeque;

use crate::ack_queue::ACK_SEND_DEADLINE_MS;

/// Minimum interval between two resend requests for the same missing packet. Asking more
///  often than this just wastes bandwidth while the first request is still in flight.
pub const RESEND_REQUEST_BACKOFF_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedResendRequest {
    pub seq: u32,
    /// earliest time this request may (re)appear on an outbound packet; 0 = immediately
    pub active_at: u64,
    /// when this request, if still pending, starts forcing an empty packet
    pub urgent_at: u64,
}

/// Sequence numbers we know the peer sent but we never received, i.e. the gaps in the
///  inbound packet stream. Entries stay queued, backing off between requests, until the
///  missing packet finally arrives.
#[derive(Debug, Default)]
pub struct ResendRequestQueue {
    queue: VecDeque<QueuedResendRequest>,
}

impl ResendRequestQueue {
    pub fn new() -> ResendRequestQueue {
        ResendRequestQueue::default()
    }

    /// Queue a resend request for a missing packet. Duplicates are silently dropped.
    pub fn enqueue(&mut self, seq: u32, now: u64) {
        if self.queue.iter().any(|r| r.seq == seq) {
            return;
        }
        self.queue.push_back(QueuedResendRequest {
            seq,
            active_at: 0,
            urgent_at: now + ACK_SEND_DEADLINE_MS,
        });
    }

    /// Called when the missing packet arrived after all. Returns whether it was queued.
    pub fn remove(&mut self, seq: u32) -> bool {
        let len_before = self.queue.len();
        self.queue.retain(|r| r.seq != seq);
        self.queue.len() != len_before
    }

    /// The requests that may go out now (i.e. that are not backing off), in insertion order.
    pub fn due_now(&self, now: u64) -> Vec<u32> {
        self.queue
            .iter()
            .filter(|r| r.active_at <= now)
            .map(|r| r.seq)
            .collect()
    }

    /// Called when a resend request was put on an outbound packet: back off before asking
    ///  again, and push the urgency deadline out accordingly.
    pub fn mark_sent(&mut self, seq: u32, now: u64) {
        if let Some(request) = self.queue.iter_mut().find(|r| r.seq == seq) {
            request.active_at = now + RESEND_REQUEST_BACKOFF_MS;
            request.urgent_at = request.active_at + ACK_SEND_DEADLINE_MS;
        }
    }

    /// Earliest deadline among the queued requests, or `None` if nothing is queued.
    ///
    /// NB: `mark_sent` pushes deadlines out, so insertion order is not urgency order here
    ///  and the whole queue has to be scanned.
    pub fn next_urgent(&self) -> Option<u64> {
        self.queue.iter().map(|r| r.urgent_at).min()
    }

    pub fn contains(&self, seq: u32) -> bool {
        self.queue.iter().any(|r| r.seq == seq)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
