use std::io;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, trace, warn};

use crate::bucket::{Bucket, BucketWriter};
use crate::codec::{codec_for, FecCodec, FEC_BLOCK_SIZE};
use crate::context::FetchContext;
use crate::error::FetchError;
use crate::segment::FetchSegment;

/// The decode worker for one segment. Takes ownership of the fetched block buckets when
///  the segment hands over, runs outside the segment lock, and is responsible for the
///  terminal success transition and the subsequent heal pass.
pub(crate) struct Decoder {
    segment: Arc<FetchSegment>,
    data: Vec<Option<Box<dyn Bucket>>>,
    check: Vec<Option<Box<dyn Bucket>>>,
    /// retry count of each block's child fetcher, by token; consulted by the heal pass
    retry_counts: Vec<u32>,
}

impl Decoder {
    pub(crate) fn new(
        segment: Arc<FetchSegment>,
        data: Vec<Option<Box<dyn Bucket>>>,
        check: Vec<Option<Box<dyn Bucket>>>,
        retry_counts: Vec<u32>,
    ) -> Decoder {
        Decoder {
            segment,
            data,
            check,
            retry_counts,
        }
    }

    /// Run the decode on its own detached thread. Process shutdown does not wait for it.
    pub(crate) fn spawn(self) {
        let spawned = thread::Builder::new()
            .name("splitfile-decoder".to_string())
            .spawn(move || self.run());
        if let Err(e) = spawned {
            error!("failed to spawn decoder thread: {}", e);
        }
    }

    pub(crate) fn run(mut self) {
        debug!("decoding segment: {} data + {} check blocks", self.data.len(), self.check.len());

        // which slots the network actually delivered - everything else is a heal candidate
        let fetched_data: Vec<bool> = self.data.iter().map(Option::is_some).collect();
        let fetched_check: Vec<bool> = self.check.iter().map(Option::is_some).collect();

        let context = self.segment.context().clone();
        let factory = context.bucket_factory.as_ref();

        let codec = match codec_for(self.segment.split_type(), self.data.len(), self.check.len()) {
            Ok(codec) => codec,
            Err(e) => {
                Self::finish_with_bucket_error(&self.segment, e);
                return;
            }
        };

        if let Some(codec) = &codec {
            if let Err(e) = codec.decode(&mut self.data, &mut self.check, FEC_BLOCK_SIZE, factory) {
                Self::finish_with_bucket_error(&self.segment, e);
                return;
            }
            // all data blocks exist now; check blocks are not necessarily filled
        }

        let assembled = Self::concatenate_data(&self.data, factory);
        match assembled {
            Ok(decoded) => {
                // the terminal state must be observable before the owner hears about it,
                //  or the owner may see an unfinished segment and drop the notification
                if !self.segment.publish_decoded(decoded) {
                    return;
                }
                let segment = self.segment.clone();
                segment.owner().segment_finished(&segment);
            }
            Err(e) => {
                Self::finish_with_bucket_error(&self.segment, e);
                return;
            }
        }

        self.heal(codec.as_deref(), &context, &fetched_data, &fetched_check);
        // block buckets are dropped here, releasing their storage
    }

    fn concatenate_data(
        data: &[Option<Box<dyn Bucket>>],
        factory: &dyn crate::bucket::BucketFactory,
    ) -> io::Result<Box<dyn Bucket>> {
        let mut decoded = factory.make_bucket(-1)?;
        for slot in data {
            let block = slot.as_ref().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "data block still missing after decode")
            })?;
            block.copy_to(&mut BucketWriter(decoded.as_mut()), -1)?;
        }
        trace!("assembled {} decoded bytes", decoded.size());
        Ok(decoded)
    }

    fn finish_with_bucket_error(segment: &Arc<FetchSegment>, e: io::Error) {
        warn!("bucket error while decoding: {}", e);
        if segment.publish_decode_failure(FetchError::BucketError(e.to_string())) {
            segment.owner().segment_finished(segment);
        }
    }

    /// Best-effort network healing: re-create the check blocks we never got, then hand
    ///  every block the network failed to deliver to the insertion service. Nothing in
    ///  here can fail the segment - it already succeeded.
    fn heal(
        &mut self,
        codec: Option<&dyn FecCodec>,
        context: &FetchContext,
        fetched_data: &[bool],
        fetched_check: &[bool],
    ) {
        if let Some(codec) = codec {
            if let Err(e) = codec.encode(
                &mut self.data,
                &mut self.check,
                FEC_BLOCK_SIZE,
                context.bucket_factory.as_ref(),
            ) {
                warn!("bucket error while healing: {}", e);
            }
        }

        let num_data = self.data.len();
        for (i, slot) in self.data.iter_mut().enumerate() {
            if !fetched_data[i] {
                Self::maybe_queue_heal(context, slot.take(), self.retry_counts[i]);
            }
        }
        for (i, slot) in self.check.iter_mut().enumerate() {
            if !fetched_check[i] {
                Self::maybe_queue_heal(context, slot.take(), self.retry_counts[num_data + i]);
            }
        }
    }

    fn maybe_queue_heal(context: &FetchContext, block: Option<Box<dyn Bucket>>, retry_count: u32) {
        // the block may be absent if re-encoding it failed; healing is best-effort
        let Some(block) = block else {
            return;
        };
        if retry_count == 0 {
            // a block nobody ever asked for is probably still out there: re-insert only
            //  one in five of those
            if context.random.next_uint(5) != 0 {
                trace!("skipping heal insert for a block that was never tried");
                return;
            }
        }
        debug!("queueing heal insert of {} bytes", block.size());
        context.heal_queue.queue_heal(block);
    }
}
