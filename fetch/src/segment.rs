use std::io::{self, Write};
use std::mem;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, trace, warn};

use crate::block_fetch::{BlockCreateError, BlockFetch, BlockFetchFactory, BlockFetchRequest};
use crate::bucket::Bucket;
use crate::codec::SplitType;
use crate::context::FetchContext;
use crate::decoder::Decoder;
use crate::error::{BlockFetchError, FailureCodeTracker, FetchError};
use crate::keys::BlockKey;

/// The parent fetcher's interest in a segment: exactly one callback on the terminal
///  transition. By the time this runs, the segment reports `is_finished() == true`.
#[cfg_attr(test, mockall::automock)]
pub trait SegmentOwner: Send + Sync {
    fn segment_finished(&self, segment: &FetchSegment);
}

struct SegmentInner {
    /// key slots are cleared as block completions come in; a cleared slot is how a late or
    ///  duplicate callback for the same block is recognized and ignored
    data_keys: Vec<Option<BlockKey>>,
    check_keys: Vec<Option<BlockKey>>,
    data_blocks: Vec<Option<Box<dyn Bucket>>>,
    check_blocks: Vec<Option<Box<dyn Bucket>>>,
    /// child fetchers by token; kept for cancellation and for retry counts in the heal pass
    fetchers: Vec<Option<Arc<dyn BlockFetch>>>,
    fetched_blocks: usize,
    failed_blocks: usize,
    fatally_failed_blocks: usize,
    errors: FailureCodeTracker,
    started_decode: bool,
    finished: bool,
    failure: Option<FetchError>,
    decoded: Option<Box<dyn Bucket>>,
}

/// One segment of a splitfile: `K` data blocks and `M` check blocks, of which any `K`
///  suffice. Drives one child fetch per block, hands over to the decoder once enough blocks
///  are in, and reports the terminal outcome to its owner exactly once.
pub struct FetchSegment {
    split_type: SplitType,
    min_fetched: usize,
    recursion_level: u32,
    owner: Arc<dyn SegmentOwner>,
    factory: Arc<dyn BlockFetchFactory>,
    context: Arc<FetchContext>,
    inner: Mutex<SegmentInner>,
}

impl FetchSegment {
    pub fn new(
        raw_split_type: u16,
        data_keys: Vec<BlockKey>,
        check_keys: Vec<BlockKey>,
        owner: Arc<dyn SegmentOwner>,
        factory: Arc<dyn BlockFetchFactory>,
        context: Arc<FetchContext>,
        variable_block_lengths: bool,
        recursion_level: u32,
    ) -> Result<Arc<FetchSegment>, FetchError> {
        let split_type = SplitType::from_raw(raw_split_type)?;

        // both supported layouts need all-of-K: redundancy only widens the choice of blocks
        let min_fetched = data_keys.len();

        // variable-length blocks mean the splitfile may nest, so the depth counts up;
        //  fixed-length blocks are always leaves and reset it
        let recursion_level = if variable_block_lengths {
            recursion_level + 1
        } else {
            0
        };

        let num_data = data_keys.len();
        let num_check = check_keys.len();

        let segment = Arc::new(FetchSegment {
            split_type,
            min_fetched,
            recursion_level,
            owner,
            factory,
            context,
            inner: Mutex::new(SegmentInner {
                data_keys: data_keys.into_iter().map(Some).collect(),
                check_keys: check_keys.into_iter().map(Some).collect(),
                data_blocks: (0..num_data).map(|_| None).collect(),
                check_blocks: (0..num_check).map(|_| None).collect(),
                fetchers: (0..num_data + num_check).map(|_| None).collect(),
                fetched_blocks: 0,
                failed_blocks: 0,
                fatally_failed_blocks: 0,
                errors: FailureCodeTracker::new(),
                started_decode: false,
                finished: false,
                failure: None,
                decoded: None,
            }),
        });
        debug!("created segment: {} data + {} check blocks, type {:?}", num_data, num_check, split_type);
        Ok(segment)
    }

    pub fn split_type(&self) -> SplitType {
        self.split_type
    }

    pub fn recursion_level(&self) -> u32 {
        self.recursion_level
    }

    pub(crate) fn context(&self) -> &Arc<FetchContext> {
        &self.context
    }

    pub(crate) fn owner(&self) -> &Arc<dyn SegmentOwner> {
        &self.owner
    }

    /// Launch one child fetch per block. Unsupported key variants and unresolvable keys
    ///  fail the whole segment instead of launching anything further.
    pub fn schedule(self: &Arc<Self>) {
        let (data_keys, check_keys) = {
            let inner = self.inner.lock().unwrap();
            (inner.data_keys.clone(), inner.check_keys.clone())
        };
        let num_data = data_keys.len();

        let keys = data_keys.into_iter().chain(check_keys);
        for (token, key) in keys.enumerate() {
            let Some(key) = key else {
                // completions cannot arrive before their fetcher was created
                error!("key slot {} already cleared during schedule - this is a bug", token);
                continue;
            };

            if key.is_updatable() {
                warn!("updatable key {} inside a splitfile - failing segment", key);
                self.fail(FetchError::InvalidMetadata(
                    "cannot have USKs within a splitfile".to_string(),
                ));
                return;
            }

            let request = BlockFetchRequest {
                key,
                token,
                is_data_block: token < num_data,
                max_retries: self.context.max_block_retries,
                recursion_level: self.recursion_level,
            };
            let fetcher = match self.factory.create(request) {
                Ok(fetcher) => <Arc<dyn BlockFetch>>::from(fetcher),
                Err(BlockCreateError::MalformedUri(e)) => {
                    self.fail(FetchError::InvalidUri(e));
                    return;
                }
                Err(BlockCreateError::Other(e)) => {
                    // any setup failure invalidates the splitfile the same way
                    self.fail(FetchError::InvalidUri(e));
                    return;
                }
            };

            let mut inner = self.inner.lock().unwrap();
            if inner.finished {
                drop(inner);
                fetcher.cancel();
                return;
            }
            inner.fetchers[token] = Some(fetcher);
        }

        let to_schedule: Vec<Arc<dyn BlockFetch>> = {
            let inner = self.inner.lock().unwrap();
            if inner.finished {
                return;
            }
            inner.fetchers.iter().flatten().cloned().collect()
        };
        for fetcher in to_schedule {
            fetcher.schedule();
        }
    }

    /// Completion callback for one child fetch. Duplicate deliveries and deliveries racing
    ///  a cancellation or the decode hand-over are ignored.
    pub fn on_success(self: &Arc<Self>, result: Box<dyn Bucket>, token: usize) {
        let start_decode = {
            let mut inner = self.inner.lock().unwrap();
            if inner.finished || inner.started_decode {
                trace!("late success for block {} - discarding", token);
                return;
            }
            let num_data = inner.data_keys.len();
            if token < num_data {
                if inner.data_keys[token].is_none() {
                    warn!("data block {} already finished - ignoring duplicate delivery", token);
                    return;
                }
                inner.data_keys[token] = None;
                inner.data_blocks[token] = Some(result);
            } else if token < num_data + inner.check_keys.len() {
                let i = token - num_data;
                if inner.check_keys[i].is_none() {
                    warn!("check block {} already finished - ignoring duplicate delivery", i);
                    return;
                }
                inner.check_keys[i] = None;
                inner.check_blocks[i] = Some(result);
            } else {
                error!("unrecognized block token {}", token);
                return;
            }
            inner.fetched_blocks += 1;
            trace!("block {} fetched ({} of {} needed)", token, inner.fetched_blocks, self.min_fetched);
            inner.fetched_blocks >= self.min_fetched
        };

        if start_decode {
            self.start_decode();
        }
    }

    /// Failure callback for one child fetch, after the child exhausted its retries. The
    ///  failure is accumulated; the segment only fails once success is out of reach.
    pub fn on_failure(self: &Arc<Self>, err: BlockFetchError, token: usize) {
        let segment_failure = {
            let mut inner = self.inner.lock().unwrap();
            if inner.finished || inner.started_decode {
                trace!("late failure for block {} - discarding", token);
                return;
            }
            let num_data = inner.data_keys.len();
            let num_check = inner.check_keys.len();
            if token < num_data {
                if inner.data_keys[token].is_none() {
                    warn!("data block {} already finished - ignoring duplicate failure", token);
                    return;
                }
                inner.data_keys[token] = None;
            } else if token < num_data + num_check {
                let i = token - num_data;
                if inner.check_keys[i].is_none() {
                    warn!("check block {} already finished - ignoring duplicate failure", i);
                    return;
                }
                inner.check_keys[i] = None;
            } else {
                error!("unrecognized block token {}", token);
                return;
            }

            debug!("block {} permanently failed (code {}, fatal: {})", token, err.code, err.fatal);
            if err.is_fatal() {
                inner.fatally_failed_blocks += 1;
            } else {
                inner.failed_blocks += 1;
            }

            match &err.codes {
                Some(codes) => inner.errors.merge(codes),
                None => {
                    let retries = inner.fetchers[token].as_ref().map_or(0, |f| f.retry_count());
                    inner.errors.inc(err.code, retries.max(1));
                }
            }

            // more failures than there are expendable blocks: success is out of reach
            let expendable = num_data + num_check - self.min_fetched;
            if inner.failed_blocks + inner.fatally_failed_blocks > expendable {
                Some(FetchError::SplitfileError {
                    errors: inner.errors.clone(),
                })
            } else {
                None
            }
        };

        if let Some(e) = segment_failure {
            self.fail(e);
        }
    }

    pub fn cancel(self: &Arc<Self>) {
        self.fail(FetchError::Cancelled);
    }

    /// Hand over to the decoder: past this point child completions are ignored, all
    ///  remaining children get cancelled (their late callbacks are harmless), and one
    ///  worker thread takes the fetched buckets.
    fn start_decode(self: &Arc<Self>) {
        let (fetchers, data, check) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.started_decode {
                return;
            }
            inner.started_decode = true;
            (
                mem::take(&mut inner.fetchers),
                mem::take(&mut inner.data_blocks),
                mem::take(&mut inner.check_blocks),
            )
        };

        let retry_counts: Vec<u32> = fetchers
            .iter()
            .map(|f| f.as_ref().map_or(0, |f| f.retry_count()))
            .collect();
        for fetcher in fetchers.iter().flatten() {
            fetcher.cancel();
        }

        debug!("decode quorum reached - spawning decoder");
        Decoder::new(self.clone(), data, check, retry_counts).spawn();
    }

    /// Terminal failure: set the failure exactly once, cancel all children from both
    ///  arrays, and notify the owner.
    fn fail(self: &Arc<Self>, e: FetchError) {
        let fetchers = {
            let mut inner = self.inner.lock().unwrap();
            if inner.finished {
                return;
            }
            inner.finished = true;
            inner.failure = Some(e);
            mem::take(&mut inner.fetchers)
        };
        for fetcher in fetchers.iter().flatten() {
            fetcher.cancel();
        }
        self.owner.segment_finished(self);
    }

    /// Store the decoded result and flip to finished. Returns whether the caller owns the
    ///  terminal transition and must notify the owner; `false` means the segment finished
    ///  some other way (e.g. was cancelled) while the decoder ran.
    pub(crate) fn publish_decoded(&self, decoded: Box<dyn Bucket>) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.finished {
            debug!("segment finished while decoding - dropping the decode result");
            return false;
        }
        inner.decoded = Some(decoded);
        inner.finished = true;
        true
    }

    /// Like [`FetchSegment::publish_decoded`], for a failed decode.
    pub(crate) fn publish_decode_failure(&self, e: FetchError) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.finished {
            debug!("segment finished while decoding - dropping the decode failure");
            return false;
        }
        inner.failure = Some(e);
        inner.finished = true;
        true
    }

    /// Has the segment reached its terminal state? Monotone: never goes back to `false`.
    pub fn is_finished(&self) -> bool {
        self.inner.lock().unwrap().finished
    }

    pub fn failure(&self) -> Option<FetchError> {
        self.inner.lock().unwrap().failure.clone()
    }

    pub fn fetched_blocks(&self) -> usize {
        self.inner.lock().unwrap().fetched_blocks
    }

    pub fn failed_blocks(&self) -> usize {
        self.inner.lock().unwrap().failed_blocks
    }

    pub fn fatally_failed_blocks(&self) -> usize {
        self.inner.lock().unwrap().fatally_failed_blocks
    }

    /// Lower bound on the number of currently running child fetches. Not tracked yet,
    ///  so always 0.
    pub fn running_blocks(&self) -> usize {
        0
    }

    /// Length of the decoded data, once the segment finished successfully.
    pub fn decoded_length(&self) -> Option<u64> {
        self.inner.lock().unwrap().decoded.as_ref().map(|d| d.size())
    }

    /// Stream the decoded data into `sink`, capped at `truncate_len` bytes; a negative cap
    ///  means "everything". Returns the number of bytes written.
    pub fn write_decoded_to(&self, sink: &mut dyn Write, truncate_len: i64) -> io::Result<u64> {
        let inner = self.inner.lock().unwrap();
        let decoded = inner
            .decoded
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "segment has no decoded data"))?;
        decoded.copy_to(sink, truncate_len)
    }
}
