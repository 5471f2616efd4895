#[cfg(test)] use mockall::automock;

use crate::keys::BlockKey;

/// Everything a child block fetcher needs to go and get one block of a segment.
#[derive(Debug, Clone)]
pub struct BlockFetchRequest {
    pub key: BlockKey,
    /// the block's index within the segment, `0..K` for data blocks, `K..K+M` for check
    ///  blocks; comes back with every completion callback
    pub token: usize,
    pub is_data_block: bool,
    pub max_retries: u32,
    pub recursion_level: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum BlockCreateError {
    /// the key does not resolve to a fetchable URI - invalidates the whole splitfile
    #[error("malformed block URI: {0}")]
    MalformedUri(String),
    #[error("block fetcher setup failed: {0}")]
    Other(String),
}

/// A running (or finished) child fetch for one block. Completions are reported back to the
///  owning segment with the request's token; `cancel` is best-effort - callbacks may still
///  arrive afterwards and the segment must cope.
#[cfg_attr(test, automock)]
pub trait BlockFetch: Send + Sync {
    fn schedule(&self);
    fn cancel(&self);
    /// How often this fetch has been retried so far. Used by the heal pass to decide
    ///  whether a missing block is worth re-inserting.
    fn retry_count(&self) -> u32;
    fn token(&self) -> usize;
}

/// Creates child fetchers; implemented by the fetch scheduler that owns request dispatch.
#[cfg_attr(test, automock)]
pub trait BlockFetchFactory: Send + Sync {
    fn create(&self, request: BlockFetchRequest) -> Result<Box<dyn BlockFetch>, BlockCreateError>;
}
