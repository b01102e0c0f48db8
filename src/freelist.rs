use crate::{
    chunk::Chunk,
    error::Error,
    kernel::PlatformMemory,
    region::RegionSource,
    utils::align,
};

/// Number of buckets in every regime's table.
pub(crate) const BUCKETS: usize = 256;

pub(crate) const SMALL_UNIT: usize = 8;
pub(crate) const MEDIUM_UNIT: usize = 256;
pub(crate) const BIG_UNIT: usize = 4096;

pub(crate) const MAX_SMALL_SIZE: usize = BUCKETS * SMALL_UNIT;
pub(crate) const MAX_MEDIUM_SIZE: usize = BUCKETS * MEDIUM_UNIT;
pub(crate) const MAX_BIG_SIZE: usize = BUCKETS * BIG_UNIT;

/// Size class of a chunk, picked from its total size (header, alignment slack
/// and user data).
///
/// Every regime pads to its own unit, so the waste stays around 10% while all
/// tables keep [`BUCKETS`] entries:
///
/// ```text
/// Small      total <= 2 KiB    padded to 8      buckets 8, 16, ... 2048
/// Medium     total <= 64 KiB   padded to 256    buckets 256, 512, ... 65536
/// Big        total <= 1 MiB    padded to 4096   buckets 4096, 8192, ... 1048576
/// Oversized  anything bigger, straight from the platform
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Regime {
    Small,
    Medium,
    Big,
    Oversized,
}

impl Regime {
    /// Classifies a total chunk size. Also used on free, where the padded size
    /// read back from the header lands in the same regime.
    #[inline]
    pub const fn classify(total: usize) -> Self {
        if total <= MAX_SMALL_SIZE {
            Regime::Small
        } else if total <= MAX_MEDIUM_SIZE {
            Regime::Medium
        } else if total <= MAX_BIG_SIZE {
            Regime::Big
        } else {
            Regime::Oversized
        }
    }

    /// Alignment unit chunk sizes are padded to. Oversized chunks have none.
    #[inline]
    pub const fn unit(self) -> Option<usize> {
        match self {
            Regime::Small => Some(SMALL_UNIT),
            Regime::Medium => Some(MEDIUM_UNIT),
            Regime::Big => Some(BIG_UNIT),
            Regime::Oversized => None,
        }
    }

    /// Biggest padded size the regime holds.
    #[inline]
    pub const fn max_size(self) -> Option<usize> {
        match self {
            Regime::Small => Some(MAX_SMALL_SIZE),
            Regime::Medium => Some(MAX_MEDIUM_SIZE),
            Regime::Big => Some(MAX_BIG_SIZE),
            Regime::Oversized => None,
        }
    }
}

/// Bucket table of one regime.
///
/// Every bucket holds free chunks of one exact padded size. The chunks are
/// linked through their own first word, so the table itself is just the heads:
///
/// ```text
///   heads[0] (unit * 1)  -> None
///   heads[1] (unit * 2)  -> Chunk -> Chunk -> None
///   heads[2] (unit * 3)  -> Chunk -> None
///   ...
///   heads[255]           -> None
/// ```
pub(crate) struct FreeList {
    /// Alignment unit of the regime.
    unit: usize,
    heads: [Option<Chunk>; BUCKETS],
    /// Number of chunks currently linked in any bucket.
    len: usize,
}

impl FreeList {
    pub const fn new(unit: usize) -> Self {
        Self { unit, heads: [None; BUCKETS], len: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    fn bucket_index(&self, padded_size: usize) -> usize {
        padded_size / self.unit - 1
    }

    /// Hands out a chunk for a total size of `size` bytes, with the padded size
    /// already written in its header.
    ///
    /// The matching bucket is tried first. Only when it is empty a fresh chunk is
    /// carved out of the bump region.
    pub fn allocate<M: PlatformMemory>(
        &mut self,
        size: usize,
        regions: &mut RegionSource,
        memory: &mut M,
    ) -> Result<Chunk, Error> {
        let padded_size = align(size, self.unit);
        let index = self.bucket_index(padded_size);

        let chunk = match self.heads[index] {
            Some(chunk) => {
                unsafe { self.heads[index] = chunk.next_free(); }
                self.len -= 1;
                chunk
            }
            None => {
                tracing::trace!(padded_size, unit = self.unit, "bucket empty, carving from region");
                Chunk::new(regions.allocate_raw(padded_size, memory)?)
            }
        };

        unsafe { chunk.set_size(padded_size as u32); }

        Ok(chunk)
    }

    /// Pushes `chunk` onto the bucket for `padded_size`.
    ///
    /// # Panics
    ///
    /// If `padded_size` is not a positive multiple of the unit. That means the
    /// chunk header is corrupted and the tables can no longer be trusted.
    pub unsafe fn free(&mut self, padded_size: usize, chunk: Chunk) {
        assert!(
            padded_size > 0 && padded_size % self.unit == 0,
            "corrupted chunk header: padded size {padded_size} is not a positive multiple of {}",
            self.unit,
        );

        let index = self.bucket_index(padded_size);

        unsafe { chunk.set_next_free(self.heads[index]); }
        self.heads[index] = Some(chunk);
        self.len += 1;
    }

    /// Head of the bucket for `padded_size`, if any.
    #[cfg(test)]
    fn head(&self, padded_size: usize) -> Option<Chunk> {
        self.heads[self.bucket_index(padded_size)]
    }
}
