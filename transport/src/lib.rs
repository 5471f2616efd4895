//! Per-peer reliability layer for the datagram links between overlay nodes.
//!
//! Each node talks to its peers over an unreliable datagram transport. This crate holds the
//!  per-peer state that layers acknowledgements, gap detection, resend requests and sliding
//!  window flow control on top of that transport. It deliberately stops short of congestion
//!  control - the only flow control is a fixed window of unacknowledged packets.
//!
//! ## Design goals
//!
//! * One [`peer_session::PeerSession`] per remote node, holding everything this node needs to
//!   remember about the packet streams to and from that peer
//!   * the cache of sent-but-unacked packet payloads, so resend requests can be served
//!   * the queue of inbound sequence numbers we still owe acks for
//!   * the queue of "please resend packet N" requests with their backoff state
//! * Control information (acks and resend requests) is piggybacked onto regular outbound
//!   packets whenever one goes out anyway
//!   * if no regular packet leaves for long enough, a pending ack or resend request becomes
//!     *urgent* and authorizes sending an otherwise-empty packet that carries only control
//!     payload. A per-session flusher polls for this (see [`flush_loop`]).
//! * Sending is bounded by a sliding window: packet `N` may not go out while packet `N - 256`
//!   is still unacknowledged. The send path either suspends until the blocking ack arrives or
//!   reports the window as full, at the caller's choice.
//! * A session's keyspace location and transport address are fixed at handshake time -
//!   replacing either means tearing the session down and building a new one.
//!
//! Socket I/O, packet encryption and routing policy live elsewhere; this crate only consumes
//!  narrow interfaces for them.
//!
//! ## Control payload wire format
//!
//! All numbers are varint-encoded (see `bytes-varint`):
//!
//! ```ascii
//! 0: number of acks (varint usize)
//! *: (repeated) acked sequence number (varint u32)
//! *: number of resend requests (varint usize)
//! *: (repeated) requested sequence number (varint u32)
//! ```

pub mod ack_queue;
pub mod clock;
pub mod control_payload;
pub mod flush_loop;
pub mod location;
pub mod peer_session;
pub mod resend_queue;
pub mod retransmit_cache;
