use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, trace};

use crate::peer_session::PeerSession;

/// Where the flusher puts its otherwise-empty control packets. This is an abstraction over
///  the datagram socket (and whatever envelope / encryption sits in front of it),
///  introduced to facilitate mocking the I/O part away for testing.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ControlSink: Send + Sync + 'static {
    async fn send_control(&self, to: SocketAddr, payload: &[u8]);
}

#[async_trait]
impl ControlSink for Arc<UdpSocket> {
    async fn send_control(&self, to: SocketAddr, payload: &[u8]) {
        trace!("UDP socket: sending control packet to {:?}", to);

        if let Err(e) = self.send_to(payload, to).await {
            error!("error sending control packet to {:?}: {}", to, e);
        }
    }
}

pub struct FlushConfig {
    /// how often the flusher checks for urgent control items; a fraction of the ack
    ///  deadline, so deadlines are not missed by much
    pub poll_interval: Duration,
    /// upper bound on acks per emitted packet, so the packet fits the configured MTU
    pub max_acks_per_packet: usize,
}

impl Default for FlushConfig {
    fn default() -> Self {
        FlushConfig {
            poll_interval: Duration::from_millis(50),
            max_acks_per_packet: 256,
        }
    }
}

/// The per-session flusher: polls the session for control items whose deadline has arrived
///  and emits an otherwise-empty packet carrying just those. The task is aborted when the
///  flusher is dropped.
pub struct SessionFlusher {
    handle: JoinHandle<()>,
}

impl Drop for SessionFlusher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl SessionFlusher {
    pub fn spawn(
        session: Arc<PeerSession>,
        sink: Arc<dyn ControlSink>,
        config: FlushConfig,
    ) -> SessionFlusher {
        SessionFlusher {
            handle: tokio::spawn(Self::do_loop(session, sink, config)),
        }
    }

    async fn do_loop(session: Arc<PeerSession>, sink: Arc<dyn ControlSink>, config: FlushConfig) {
        let mut ticker = interval(config.poll_interval);
        loop {
            ticker.tick().await;

            if !session.urgent_control_due().await {
                continue;
            }

            let payload = session.take_control_payload(config.max_acks_per_packet).await;
            if payload.is_empty() {
                continue;
            }

            debug!(
                "flushing urgent control payload to {:?}: {} acks, {} resend requests",
                session.peer_addr(),
                payload.acks.len(),
                payload.resend_requests.len()
            );

            let mut buf = BytesMut::new();
            payload.ser(&mut buf);
            sink.send_control(session.peer_addr(), &buf).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::control_payload::ControlPayload;
    use crate::location::Location;

    fn new_session(clock: Arc<ManualClock>) -> Arc<PeerSession> {
        Arc::new(PeerSession::new(
            Location::new(0.75).unwrap(),
            SocketAddr::from(([10, 0, 0, 2], 4701)),
            clock,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_empty_packet_when_ack_becomes_urgent() {
        let clock = Arc::new(ManualClock::new(0));
        let session = new_session(clock.clone());

        for seq in 0..=10 {
            session.packet_received(seq).await;
        }

        let mut sink = MockControlSink::new();
        sink.expect_send_control()
            .once()
            .withf(|to, payload| {
                let mut buf: &[u8] = payload;
                let deser = ControlPayload::deser(&mut buf).unwrap();
                *to == SocketAddr::from(([10, 0, 0, 2], 4701))
                    && deser.acks == (0..=10).collect::<Vec<_>>()
                    && deser.resend_requests.is_empty()
            })
            .return_const(());

        clock.set(200);
        let _flusher = SessionFlusher::spawn(session.clone(), Arc::new(sink), FlushConfig::default());

        // several poll intervals pass; the single expected send must not repeat
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(session.next_urgent_at().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_packet_before_the_deadline() {
        let clock = Arc::new(ManualClock::new(0));
        let session = new_session(clock.clone());

        session.packet_received(0).await;
        clock.set(199);

        let sink = MockControlSink::new(); // no expectations: any send would panic
        let _flusher = SessionFlusher::spawn(session.clone(), Arc::new(sink), FlushConfig::default());

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(session.next_urgent_at().await, Some(200));
    }
}
