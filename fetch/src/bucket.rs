use std::fmt::Debug;
use std::io::{self, Write};

/// An opaque blob of bytes from the storage backend. Where the bytes actually live (memory,
///  a temp file, ...) is the backend's business; this layer only ever appends to a fresh
///  bucket and streams an existing one out.
pub trait Bucket: Send + Debug {
    fn size(&self) -> u64;

    fn append(&mut self, data: &[u8]) -> io::Result<()>;

    /// Stream up to `max_bytes` of the bucket's content into `dst`; a negative cap means
    ///  "everything". Returns the number of bytes copied.
    fn copy_to(&self, dst: &mut dyn Write, max_bytes: i64) -> io::Result<u64>;
}

pub trait BucketFactory: Send + Sync {
    /// `size_hint` is the expected final size in bytes, or `-1` if unknown.
    fn make_bucket(&self, size_hint: i64) -> io::Result<Box<dyn Bucket>>;
}

/// Read a bucket's entire content into memory. The blocks this crate deals in are small
///  (32 KiB), so this is fine for codec work.
pub fn read_fully(bucket: &dyn Bucket) -> io::Result<Vec<u8>> {
    let mut data = Vec::with_capacity(bucket.size() as usize);
    bucket.copy_to(&mut data, -1)?;
    Ok(data)
}

/// Adapter so a bucket can be the *target* of [`Bucket::copy_to`].
pub struct BucketWriter<'a>(pub &'a mut dyn Bucket);

impl Write for BucketWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.append(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Heap-backed bucket, used by tests and as the default backend for decoded segments.
#[derive(Debug, Default)]
pub struct MemoryBucket {
    data: Vec<u8>,
}

impl MemoryBucket {
    pub fn new() -> MemoryBucket {
        MemoryBucket::default()
    }

    pub fn from_vec(data: Vec<u8>) -> MemoryBucket {
        MemoryBucket { data }
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }
}

impl Bucket for MemoryBucket {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn copy_to(&self, dst: &mut dyn Write, max_bytes: i64) -> io::Result<u64> {
        let len = if max_bytes < 0 {
            self.data.len()
        } else {
            (max_bytes as usize).min(self.data.len())
        };
        dst.write_all(&self.data[..len])?;
        Ok(len as u64)
    }
}

pub struct MemoryBucketFactory;

impl BucketFactory for MemoryBucketFactory {
    fn make_bucket(&self, size_hint: i64) -> io::Result<Box<dyn Bucket>> {
        let capacity = if size_hint < 0 { 0 } else { size_hint as usize };
        Ok(Box::new(MemoryBucket::from_vec(Vec::with_capacity(capacity))))
    }
}
