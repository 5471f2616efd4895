use std::net::SocketAddr;
use std::pin::pin;
use std::sync::Arc;

use anyhow::bail;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, trace};

use crate::ack_queue::AckQueue;
use crate::clock::Clock;
use crate::control_payload::ControlPayload;
use crate::location::Location;
use crate::resend_queue::ResendRequestQueue;
use crate::retransmit_cache::RetransmitCache;

/// The sequencing state this node keeps about both packet streams of one remote peer.
///
/// All operations go through a single session lock; the queues and the retransmit cache are
///  only ever touched while it is held. The pure state machine lives in
///  [`PeerSessionInner`]; [`PeerSession`] wraps it with the lock, the clock and the
///  suspension handling for a full send window.
struct PeerSessionInner {
    cache: RetransmitCache,
    ack_queue: AckQueue,
    resend_requests: ResendRequestQueue,
    /// highest sequence number received so far, not counting retransmissions arriving late
    last_received_seq: Option<u32>,
}

impl PeerSessionInner {
    fn new() -> PeerSessionInner {
        PeerSessionInner {
            cache: RetransmitCache::new(),
            ack_queue: AckQueue::new(),
            resend_requests: ResendRequestQueue::new(),
            last_received_seq: None,
        }
    }

    fn record_sent(&mut self, payload: &[u8], seq: u32) -> anyhow::Result<()> {
        if self.cache.window_full(seq) {
            bail!("send window full: packet #{} may not be sent yet", seq);
        }
        self.cache.insert(seq, payload.to_vec());
        Ok(())
    }

    /// Returns whether the ack actually evicted a cached packet (and may therefore have
    ///  opened the send window).
    fn ack_received(&mut self, seq: u32) -> bool {
        self.cache.remove(seq)
    }

    fn packet_received(&mut self, seq: u32, now: u64) {
        self.ack_queue.enqueue(seq, now);

        match self.last_received_seq {
            Some(last) if seq < last => {
                // a requested retransmission arriving - stop asking for it
                self.resend_requests.remove(seq);
            }
            last => {
                let gap_start = last.map(|l| l + 1).unwrap_or(0);
                for gap in gap_start..seq {
                    debug!("packet #{} skipped over #{} - queueing resend request", seq, gap);
                    self.resend_requests.enqueue(gap, now);
                }
                self.last_received_seq = Some(seq);
            }
        }
    }

    fn next_urgent_at(&self) -> Option<u64> {
        match (self.ack_queue.next_urgent(), self.resend_requests.next_urgent()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn take_control_payload(&mut self, now: u64, max_acks: usize) -> ControlPayload {
        let acks = self.ack_queue.drain_for_send(max_acks);
        let resend_requests = self.resend_requests.due_now(now);
        for &seq in &resend_requests {
            self.resend_requests.mark_sent(seq, now);
        }
        ControlPayload {
            acks,
            resend_requests,
        }
    }
}

pub struct PeerSession {
    location: Location,
    peer_addr: SocketAddr,
    clock: Arc<dyn Clock>,
    inner: Mutex<PeerSessionInner>,
    /// signalled whenever an eviction from the retransmit cache may have opened the window
    window_space: Notify,
}

impl PeerSession {
    pub fn new(location: Location, peer_addr: SocketAddr, clock: Arc<dyn Clock>) -> PeerSession {
        PeerSession {
            location,
            peer_addr,
            clock,
            inner: Mutex::new(PeerSessionInner::new()),
            window_space: Notify::new(),
        }
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Record a packet we just sent, so it can be resent on request until it is acked.
    ///  Fails if the send window is full; the caller may retry after the next ack, or use
    ///  [`PeerSession::sent`] to suspend instead.
    pub async fn try_sent(&self, payload: &[u8], seq: u32) -> anyhow::Result<()> {
        self.inner.lock().await.record_sent(payload, seq)
    }

    /// Record a packet we just sent. If the send window is full, this suspends until the
    ///  ack (or drop) that unblocks the window arrives.
    pub async fn sent(&self, payload: &[u8], seq: u32) {
        loop {
            let mut notified = pin!(self.window_space.notified());
            notified.as_mut().enable();
            {
                let mut inner = self.inner.lock().await;
                if !inner.cache.window_full(seq) {
                    inner
                        .record_sent(payload, seq)
                        .expect("window was just checked to have space");
                    return;
                }
            }
            trace!("suspending send of packet #{} to {:?} until the window opens", seq, self.peer_addr);
            notified.await;
        }
    }

    /// Called when the peer acknowledged a packet: evict it from the retransmit cache.
    pub async fn ack_received(&self, seq: u32) {
        let evicted = self.inner.lock().await.ack_received(seq);
        if evicted {
            trace!("ack for packet #{} from {:?}", seq, self.peer_addr);
            self.window_space.notify_waiters();
        }
    }

    /// Called for every inbound sequenced packet: queue an ack for it, and reconcile the
    ///  resend-request queue - a late packet resolves its pending resend request, a packet
    ///  that skips ahead queues resend requests for everything it jumped over.
    pub async fn packet_received(&self, seq: u32) {
        let now = self.clock.now_ms();
        self.inner.lock().await.packet_received(seq, now);
    }

    /// The peer asked us to resend this packet: serve its payload from the cache, if it is
    ///  still there.
    pub async fn resend_requested(&self, seq: u32) -> Option<Vec<u8>> {
        self.inner.lock().await.cache.payload(seq).map(|p| p.to_vec())
    }

    /// Evict a cached payload without an ack, to relieve memory pressure. The peer will
    ///  never get this packet resent; higher layers must cope.
    pub async fn drop_cached(&self, seq: u32) {
        let evicted = self.inner.lock().await.cache.remove(seq);
        if evicted {
            debug!("dropped cached packet #{} for {:?} without ack", seq, self.peer_addr);
            self.window_space.notify_waiters();
        }
    }

    /// The earliest point in time at which a queued ack or resend request starts forcing an
    ///  otherwise-empty packet, or `None` if nothing is pending.
    pub async fn next_urgent_at(&self) -> Option<u64> {
        self.inner.lock().await.next_urgent_at()
    }

    /// Whether a pending control item's deadline has arrived, authorizing an
    ///  otherwise-empty packet.
    pub async fn urgent_control_due(&self) -> bool {
        match self.next_urgent_at().await {
            Some(urgent_at) => urgent_at <= self.clock.now_ms(),
            None => false,
        }
    }

    /// Drain the control information to piggyback onto an outbound packet: all queued acks
    ///  (up to `max_acks`) plus every resend request that is not backing off. The drained
    ///  resend requests start their backoff.
    pub async fn take_control_payload(&self, max_acks: usize) -> ControlPayload {
        let now = self.clock.now_ms();
        self.inner.lock().await.take_control_payload(now, max_acks)
    }

    pub async fn window_full(&self, next_seq: u32) -> bool {
        self.inner.lock().await.cache.window_full(next_seq)
    }

    pub async fn cache_bounds(&self) -> (Option<u32>, Option<u32>) {
        let inner = self.inner.lock().await;
        (inner.cache.lowest(), inner.cache.highest())
    }
}
