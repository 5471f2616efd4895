use reed_solomon_erasure::galois_8::ReedSolomon;
use std::io;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::bucket::{read_fully, Bucket, BucketFactory};
use crate::error::FetchError;

/// All blocks in a splitfile are this size; shorter final blocks are zero-padded up to it.
pub const FEC_BLOCK_SIZE: usize = 32768;

/// How a splitfile's blocks are laid out and protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitType {
    /// `M == 0`: no check blocks, every data block is needed, decode is plain concatenation.
    NonRedundant,
    /// Standard erasure coding: any `K` of the `K + M` blocks reconstruct the data.
    OnionStandard,
}

impl SplitType {
    pub const RAW_NONREDUNDANT: u16 = 0;
    pub const RAW_ONION_STANDARD: u16 = 1;

    /// Parse the raw metadata value. Anything unknown is a metadata error at segment
    ///  construction time.
    pub fn from_raw(raw: u16) -> Result<SplitType, FetchError> {
        match raw {
            Self::RAW_NONREDUNDANT => Ok(SplitType::NonRedundant),
            Self::RAW_ONION_STANDARD => Ok(SplitType::OnionStandard),
            other => Err(FetchError::InvalidMetadata(format!(
                "unknown splitfile type {}",
                other
            ))),
        }
    }
}

/// The erasure codec seam. The kernel doing the actual Galois-field math sits behind this;
///  callers only care that `decode` fills missing data buckets and `encode` fills missing
///  check buckets.
pub trait FecCodec: Send + Sync {
    /// Reconstruct all missing data buckets in place from any sufficient subset of data and
    ///  check buckets. Check buckets are *not* guaranteed to be filled afterwards.
    fn decode(
        &self,
        data: &mut [Option<Box<dyn Bucket>>],
        check: &mut [Option<Box<dyn Bucket>>],
        block_size: usize,
        factory: &dyn BucketFactory,
    ) -> io::Result<()>;

    /// Recompute parity and fill all missing check buckets in place. All data buckets must
    ///  be present (i.e. this runs after a successful `decode`).
    fn encode(
        &self,
        data: &mut [Option<Box<dyn Bucket>>],
        check: &mut [Option<Box<dyn Bucket>>],
        block_size: usize,
        factory: &dyn BucketFactory,
    ) -> io::Result<()>;
}

/// The codec for a segment's layout, or `None` where decoding is a no-op (no redundancy).
pub fn codec_for(
    split_type: SplitType,
    data_blocks: usize,
    check_blocks: usize,
) -> io::Result<Option<Arc<dyn FecCodec>>> {
    match split_type {
        SplitType::NonRedundant => Ok(None),
        SplitType::OnionStandard if check_blocks == 0 => Ok(None),
        SplitType::OnionStandard => Ok(Some(Arc::new(ReedSolomonCodec::new(
            data_blocks,
            check_blocks,
        )?))),
    }
}

/// Reed-Solomon over GF(2^8), the standard codec for `OnionStandard` splitfiles.
pub struct ReedSolomonCodec {
    rs: ReedSolomon,
}

impl ReedSolomonCodec {
    pub fn new(data_blocks: usize, check_blocks: usize) -> io::Result<ReedSolomonCodec> {
        let rs = ReedSolomon::new(data_blocks, check_blocks)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("FEC setup failed: {:?}", e)))?;
        Ok(ReedSolomonCodec { rs })
    }
}

/// Read a bucket into a zero-padded fixed-size shard, `None` if the bucket is missing.
fn read_shard(slot: &Option<Box<dyn Bucket>>, block_size: usize) -> io::Result<Option<Vec<u8>>> {
    let Some(bucket) = slot else {
        return Ok(None);
    };
    let mut shard = read_fully(bucket.as_ref())?;
    if shard.len() > block_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("block of {} bytes exceeds the block size of {}", shard.len(), block_size),
        ));
    }
    shard.resize(block_size, 0);
    Ok(Some(shard))
}

fn store_shard(
    slot: &mut Option<Box<dyn Bucket>>,
    shard: &[u8],
    factory: &dyn BucketFactory,
) -> io::Result<()> {
    let mut bucket = factory.make_bucket(shard.len() as i64)?;
    bucket.append(shard)?;
    *slot = Some(bucket);
    Ok(())
}

impl FecCodec for ReedSolomonCodec {
    fn decode(
        &self,
        data: &mut [Option<Box<dyn Bucket>>],
        check: &mut [Option<Box<dyn Bucket>>],
        block_size: usize,
        factory: &dyn BucketFactory,
    ) -> io::Result<()> {
        let present = data.iter().chain(check.iter()).filter(|s| s.is_some()).count();
        debug!("FEC decode: {} of {}+{} blocks present", present, data.len(), check.len());

        let mut shards: Vec<Option<Vec<u8>>> = Vec::with_capacity(data.len() + check.len());
        for slot in data.iter() {
            shards.push(read_shard(slot, block_size)?);
        }
        for slot in check.iter() {
            shards.push(read_shard(slot, block_size)?);
        }

        self.rs
            .reconstruct(&mut shards)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("FEC decode failed: {:?}", e)))?;

        for (slot, shard) in data.iter_mut().zip(shards.into_iter()) {
            if slot.is_none() {
                let shard = shard.expect("reconstruction must fill all data shards");
                trace!("FEC decode: reconstructed a missing data block");
                store_shard(slot, &shard, factory)?;
            }
        }
        Ok(())
    }

    fn encode(
        &self,
        data: &mut [Option<Box<dyn Bucket>>],
        check: &mut [Option<Box<dyn Bucket>>],
        block_size: usize,
        factory: &dyn BucketFactory,
    ) -> io::Result<()> {
        let mut shards: Vec<Vec<u8>> = Vec::with_capacity(data.len() + check.len());
        for slot in data.iter() {
            let shard = read_shard(slot, block_size)?.ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "cannot encode with missing data blocks")
            })?;
            shards.push(shard);
        }
        // parity shards are recomputed from scratch, whether present or not
        shards.extend((0..check.len()).map(|_| vec![0; block_size]));

        self.rs
            .encode(&mut shards)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("FEC encode failed: {:?}", e)))?;

        for (slot, shard) in check.iter_mut().zip(shards[data.len()..].iter()) {
            if slot.is_none() {
                trace!("FEC encode: filled in a missing check block");
                store_shard(slot, shard, factory)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{MemoryBucket, MemoryBucketFactory};
    use rstest::rstest;

    const TEST_BLOCK_SIZE: usize = 64;

    fn block(fill: u8) -> Option<Box<dyn Bucket>> {
        Some(Box::new(MemoryBucket::from_vec(vec![fill; TEST_BLOCK_SIZE])))
    }

    /// data blocks 1..=k, all check blocks computed via the codec itself
    fn encoded_segment(k: usize, m: usize) -> (Vec<Option<Box<dyn Bucket>>>, Vec<Option<Box<dyn Bucket>>>) {
        let codec = ReedSolomonCodec::new(k, m).unwrap();
        let mut data: Vec<Option<Box<dyn Bucket>>> = (1..=k).map(|i| block(i as u8)).collect();
        let mut check: Vec<Option<Box<dyn Bucket>>> = (0..m).map(|_| None).collect();
        codec
            .encode(&mut data, &mut check, TEST_BLOCK_SIZE, &MemoryBucketFactory)
            .unwrap();
        (data, check)
    }

    #[rstest]
    #[case::nonredundant(SplitType::RAW_NONREDUNDANT, Ok(SplitType::NonRedundant))]
    #[case::onion(SplitType::RAW_ONION_STANDARD, Ok(SplitType::OnionStandard))]
    #[case::unknown(17, Err(FetchError::InvalidMetadata("unknown splitfile type 17".to_string())))]
    fn test_split_type_from_raw(#[case] raw: u16, #[case] expected: Result<SplitType, FetchError>) {
        assert_eq!(SplitType::from_raw(raw), expected);
    }

    #[test]
    fn test_codec_for() {
        assert!(codec_for(SplitType::NonRedundant, 4, 0).unwrap().is_none());
        assert!(codec_for(SplitType::OnionStandard, 4, 0).unwrap().is_none());
        assert!(codec_for(SplitType::OnionStandard, 4, 2).unwrap().is_some());
    }

    #[rstest]
    #[case::one_data_block_missing(vec![1], vec![])]
    #[case::m_data_blocks_missing(vec![0, 2], vec![])]
    #[case::data_and_check_missing(vec![1], vec![0])]
    #[case::nothing_missing(vec![], vec![])]
    fn test_decode_reconstructs_missing_data(
        #[case] drop_data: Vec<usize>,
        #[case] drop_check: Vec<usize>,
    ) {
        let codec = ReedSolomonCodec::new(3, 2).unwrap();
        let (mut data, mut check) = encoded_segment(3, 2);
        for &i in &drop_data {
            data[i] = None;
        }
        for &i in &drop_check {
            check[i] = None;
        }

        codec
            .decode(&mut data, &mut check, TEST_BLOCK_SIZE, &MemoryBucketFactory)
            .unwrap();

        for (i, slot) in data.iter().enumerate() {
            let bucket = slot.as_ref().expect("all data blocks must be filled after decode");
            assert_eq!(read_fully(bucket.as_ref()).unwrap(), vec![(i + 1) as u8; TEST_BLOCK_SIZE]);
        }
    }

    #[test]
    fn test_decode_fails_below_quorum() {
        let codec = ReedSolomonCodec::new(3, 2).unwrap();
        let (mut data, mut check) = encoded_segment(3, 2);
        data[0] = None;
        data[1] = None;
        check[0] = None;

        let result = codec.decode(&mut data, &mut check, TEST_BLOCK_SIZE, &MemoryBucketFactory);
        assert!(result.is_err());
    }

    #[test]
    fn test_encode_requires_all_data() {
        let codec = ReedSolomonCodec::new(3, 2).unwrap();
        let (mut data, mut check) = encoded_segment(3, 2);
        data[1] = None;
        check[0] = None;

        assert!(codec
            .encode(&mut data, &mut check, TEST_BLOCK_SIZE, &MemoryBucketFactory)
            .is_err());
    }

    #[test]
    fn test_short_blocks_are_padded() {
        let codec = ReedSolomonCodec::new(2, 1).unwrap();
        let mut data: Vec<Option<Box<dyn Bucket>>> = vec![
            Some(Box::new(MemoryBucket::from_vec(vec![7; 10]))),
            Some(Box::new(MemoryBucket::from_vec(vec![9; TEST_BLOCK_SIZE]))),
        ];
        let mut check: Vec<Option<Box<dyn Bucket>>> = vec![None];

        codec
            .encode(&mut data, &mut check, TEST_BLOCK_SIZE, &MemoryBucketFactory)
            .unwrap();

        let check_bucket = check[0].as_ref().unwrap();
        assert_eq!(check_bucket.size() as usize, TEST_BLOCK_SIZE);

        // dropping the short block must be recoverable, including its padding
        data[0] = None;
        codec
            .decode(&mut data, &mut check, TEST_BLOCK_SIZE, &MemoryBucketFactory)
            .unwrap();
        let mut expected = vec![7; 10];
        expected.resize(TEST_BLOCK_SIZE, 0);
        assert_eq!(read_fully(data[0].as_ref().unwrap().as_ref()).unwrap(), expected);
    }

    #[test]
    fn test_oversized_block_is_rejected() {
        let codec = ReedSolomonCodec::new(2, 1).unwrap();
        let mut data: Vec<Option<Box<dyn Bucket>>> = vec![
            Some(Box::new(MemoryBucket::from_vec(vec![1; TEST_BLOCK_SIZE + 1]))),
            block(2),
        ];
        let mut check: Vec<Option<Box<dyn Bucket>>> = vec![None];

        assert!(codec
            .encode(&mut data, &mut check, TEST_BLOCK_SIZE, &MemoryBucketFactory)
            .is_err());
    }
}
