use std::sync::Arc;

use crate::bucket::BucketFactory;
use crate::heal::HealQueue;
use crate::random::RandomSource;

/// The shared collaborators every fetch in a client request uses. One context is built per
///  request and handed down to all its segments.
pub struct FetchContext {
    pub bucket_factory: Arc<dyn BucketFactory>,
    pub random: Arc<dyn RandomSource>,
    pub heal_queue: Arc<dyn HealQueue>,
    /// retry budget for each child block fetch
    pub max_block_retries: u32,
}
