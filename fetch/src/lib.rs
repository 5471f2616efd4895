//! Redundant split-file fetch for a content-addressed overlay network.
//!
//! Large content is split into `K` data blocks plus `M` erasure-coded check blocks such that
//!  any `K` of the `K + M` reconstruct the original. This crate holds the coordinator for
//!  fetching one such segment:
//!
//! * [`segment::FetchSegment`] launches one child fetch per block and tracks their
//!   completions under a segment lock. As soon as any `K` blocks are in, it cancels the
//!   remaining children and hands over to the decoder; if enough blocks fail that success
//!   is no longer achievable, it fails with the accumulated per-block error histogram.
//! * [`decoder`] runs the FEC reconstruction on a dedicated worker thread, writes the
//!   concatenated data into a fresh bucket, and then makes a best-effort pass at *healing*
//!   the network: blocks that could not be fetched are re-encoded locally and handed to an
//!   insertion service for re-insertion.
//!
//! Child fetch scheduling, the block retrieval transport, metadata parsing and the blob
//!  storage backend are external collaborators; this crate consumes narrow interfaces for
//!  them ([`block_fetch`], [`bucket`], [`heal`]).
//!
//! Cancellation is racy by design: a child fetch completing after the segment was cancelled
//!  or after decoding started must find its slot already cleared and return without effect.
//!  The segment's terminal state is monotone - once `finished`, always `finished` - and the
//!  parent is notified exactly once.

pub mod block_fetch;
pub mod bucket;
pub mod codec;
pub mod context;
pub mod decoder;
pub mod error;
pub mod heal;
pub mod keys;
pub mod random;
pub mod segment;
