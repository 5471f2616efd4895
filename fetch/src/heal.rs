use tracing::debug;

use crate::bucket::Bucket;

/// Hand-off point to the insertion service that re-inserts blocks into the network. Healing
///  is fire-and-forget: once a block is queued here, the segment is done with it, and
///  whatever happens to the insert never reflects back on the fetch.
#[cfg_attr(test, mockall::automock)]
pub trait HealQueue: Send + Sync {
    fn queue_heal(&self, data: Box<dyn Bucket>);
}

/// Placeholder for nodes that do not run an insertion service: logs and drops.
pub struct DiscardingHealQueue;

impl HealQueue for DiscardingHealQueue {
    fn queue_heal(&self, data: Box<dyn Bucket>) {
        debug!("no insertion service configured - discarding heal block of {} bytes", data.size());
    }
}
