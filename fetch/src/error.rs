use rustc_hash::FxHashMap;
use std::fmt::{Display, Formatter};

/// Histogram of per-block failure codes, accumulated across all child fetches of a segment
///  and merged from child histograms where available. Carried inside
///  [`FetchError::SplitfileError`] so callers can see *why* a segment became unfetchable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureCodeTracker {
    counts: FxHashMap<u16, u32>,
}

impl FailureCodeTracker {
    pub fn new() -> FailureCodeTracker {
        FailureCodeTracker::default()
    }

    pub fn inc(&mut self, code: u16, n: u32) {
        *self.counts.entry(code).or_insert(0) += n;
    }

    pub fn merge(&mut self, other: &FailureCodeTracker) {
        for (&code, &n) in &other.counts {
            self.inc(code, n);
        }
    }

    pub fn count(&self, code: u16) -> u32 {
        self.counts.get(&code).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl Display for FailureCodeTracker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut entries: Vec<(u16, u32)> = self.counts.iter().map(|(&c, &n)| (c, n)).collect();
        entries.sort_unstable();
        for (i, (code, n)) in entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "code {}: {}", code, n)?;
        }
        Ok(())
    }
}

/// Terminal failure of a whole segment, surfaced to the parent fetcher.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// Construction-time: a key could not be resolved to a fetchable block.
    #[error("invalid URI in splitfile: {0}")]
    InvalidUri(String),

    /// Construction-time: the segment metadata itself is unusable.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Storage I/O raised while decoding.
    #[error("bucket error while decoding: {0}")]
    BucketError(String),

    /// Too many blocks failed for the segment to ever reach the decode quorum.
    #[error("too many failed blocks ({errors})")]
    SplitfileError { errors: FailureCodeTracker },

    /// Externally requested termination.
    #[error("cancelled")]
    Cancelled,
}

/// The terminal failure of one child block fetch, reported after the child exhausted its
///  own retries.
#[derive(Debug, Clone)]
pub struct BlockFetchError {
    /// failure code, merged into the segment's histogram
    pub code: u16,
    /// fatal = the block is permanently unavailable (e.g. an authoritative negative
    ///  result), as opposed to merely running out of retries
    pub fatal: bool,
    /// the child's own histogram across its retries, if it kept one
    pub codes: Option<FailureCodeTracker>,
}

impl BlockFetchError {
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inc_and_merge() {
        let mut a = FailureCodeTracker::new();
        a.inc(7, 1);
        a.inc(7, 2);
        a.inc(12, 1);

        let mut b = FailureCodeTracker::new();
        b.inc(7, 1);
        b.inc(3, 5);

        a.merge(&b);

        assert_eq!(a.count(7), 4);
        assert_eq!(a.count(12), 1);
        assert_eq!(a.count(3), 5);
        assert_eq!(a.count(99), 0);
        assert_eq!(a.total(), 10);
    }

    #[test]
    fn test_display_is_sorted() {
        let mut tracker = FailureCodeTracker::new();
        tracker.inc(12, 1);
        tracker.inc(3, 2);

        assert_eq!(tracker.to_string(), "code 3: 2, code 12: 1");
    }
}
