use std::collections::VecDeque;

/// If an ack is not piggybacked onto a regular packet within this interval, it becomes
///  urgent and forces an otherwise-empty packet to be sent.
pub const ACK_SEND_DEADLINE_MS: u64 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedAck {
    pub seq: u32,
    /// when this ack, if still queued, starts forcing an empty packet
    pub urgent_at: u64,
}

/// Inbound sequence numbers we owe the peer an acknowledgement for.
///
/// Acks are queued in arrival order; with a monotonic clock that is also urgency order, so
///  the front of the queue carries the earliest deadline.
#[derive(Debug, Default)]
pub struct AckQueue {
    queue: VecDeque<QueuedAck>,
}

impl AckQueue {
    pub fn new() -> AckQueue {
        AckQueue::default()
    }

    /// Queue an acknowledgement for a received packet. Queuing the same sequence number
    ///  twice without a drain in between is a no-op.
    pub fn enqueue(&mut self, seq: u32, now: u64) {
        if self.queue.iter().any(|a| a.seq == seq) {
            return;
        }
        self.queue.push_back(QueuedAck {
            seq,
            urgent_at: now + ACK_SEND_DEADLINE_MS,
        });
    }

    /// Take up to `max` queued acks, oldest first, for inclusion in an outbound packet.
    pub fn drain_for_send(&mut self, max: usize) -> Vec<u32> {
        let n = max.min(self.queue.len());
        self.queue.drain(..n).map(|a| a.seq).collect()
    }

    /// Earliest deadline among the queued acks, or `None` if nothing is queued.
    pub fn next_urgent(&self) -> Option<u64> {
        self.queue.front().map(|a| a.urgent_at)
    }

    pub fn contains(&self, seq: u32) -> bool {
        self.queue.iter().any(|a| a.seq == seq)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_enqueue_is_idempotent() {
        let mut queue = AckQueue::new();
        queue.enqueue(5, 100);
        queue.enqueue(5, 150);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_urgent(), Some(300));

        // after a drain, the same sequence number may be queued again
        assert_eq!(queue.drain_for_send(usize::MAX), vec![5]);
        queue.enqueue(5, 200);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_urgent(), Some(400));
    }

    #[test]
    fn test_drain_oldest_first() {
        let mut queue = AckQueue::new();
        queue.enqueue(5, 0);
        queue.enqueue(2, 10);
        queue.enqueue(9, 20);

        assert_eq!(queue.drain_for_send(2), vec![5, 2]);
        assert_eq!(queue.drain_for_send(usize::MAX), vec![9]);
        assert!(queue.is_empty());
        assert_eq!(queue.next_urgent(), None);
    }

    #[rstest]
    #[case::empty(vec![], None)]
    #[case::single(vec![(5, 0)], Some(ACK_SEND_DEADLINE_MS))]
    #[case::oldest_wins(vec![(5, 0), (6, 50)], Some(ACK_SEND_DEADLINE_MS))]
    fn test_next_urgent(#[case] enqueues: Vec<(u32, u64)>, #[case] expected: Option<u64>) {
        let mut queue = AckQueue::new();
        for (seq, now) in enqueues {
            queue.enqueue(seq, now);
        }
        assert_eq!(queue.next_urgent(), expected);
    }
}
