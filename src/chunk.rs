use std::{mem, ptr::NonNull};

use crate::utils::align;

/// Header size of a chunk: the padded chunk size plus the alignment hop, both
/// stored as 32 bit values.
pub(crate) const HEADER_SIZE: usize = 2 * mem::size_of::<u32>();

/// Size stored in the header of an oversized chunk. The actual size is not used,
/// it only has to be bigger than the biggest regime threshold.
pub(crate) const OVERSIZED_MARKER: u32 = i32::MAX as u32;

/// Oversized chunks are preceded by their reservation length, since the platform
/// needs it back on release.
pub(crate) const OVERSIZED_PREFIX: usize = mem::size_of::<u64>();

/// A chunk is a contiguous piece of memory handed out by one of the free lists,
/// by the bump region or, for oversized requests, by the platform directly.
///
/// ```text
/// +------------+-------------+-----------+----------------------+
/// | chunk size | ...padding  | hop (u32) |  aligned user data   |
/// +------------+-------------+-----------+----------------------+
/// ^            ^                         ^
/// start        start + HEADER_SIZE       data = align(start + HEADER_SIZE, align)
///                                        hop  = data - (start + HEADER_SIZE)
/// ```
///
/// While a chunk is free, its first word is reused to link it into its bucket,
/// overwriting the size. The size is written again when the chunk is handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Chunk {
    start: NonNull<u8>,
}

impl Chunk {
    #[inline]
    pub fn new(start: NonNull<u8>) -> Self {
        Self { start }
    }

    #[cfg(test)]
    pub fn start(self) -> NonNull<u8> {
        self.start
    }

    /// Padded chunk size, or [`OVERSIZED_MARKER`].
    #[inline]
    pub unsafe fn size(self) -> u32 {
        unsafe { self.start.as_ptr().cast::<u32>().read_unaligned() }
    }

    #[inline]
    pub unsafe fn set_size(self, size: u32) {
        unsafe { self.start.as_ptr().cast::<u32>().write_unaligned(size) }
    }

    /// Next chunk in the same bucket. Only meaningful while the chunk is free.
    #[inline]
    pub unsafe fn next_free(self) -> Option<Chunk> {
        let next = unsafe { self.start.as_ptr().cast::<*mut u8>().read_unaligned() };
        NonNull::new(next).map(Chunk::new)
    }

    #[inline]
    pub unsafe fn set_next_free(self, next: Option<Chunk>) {
        let next = next.map_or(std::ptr::null_mut(), |chunk| chunk.start.as_ptr());
        unsafe { self.start.as_ptr().cast::<*mut u8>().write_unaligned(next) }
    }

    /// Places the user data inside the chunk at `alignment` and records the hop
    /// right before it. Returns the aligned data pointer.
    ///
    /// The chunk must have been sized with at least `alignment` bytes of slack
    /// after the header.
    pub unsafe fn place_data(self, alignment: usize) -> NonNull<u8> {
        let after_header = self.start.as_ptr() as usize + HEADER_SIZE;
        let hop = align(after_header, alignment) - after_header;

        unsafe {
            let data = self.start.as_ptr().add(HEADER_SIZE + hop);
            data.sub(mem::size_of::<u32>()).cast::<u32>().write_unaligned(hop as u32);

            NonNull::new_unchecked(data)
        }
    }

    /// Walks back from a data pointer returned by [`Chunk::place_data`] to the
    /// start of its chunk.
    pub unsafe fn from_data(data: NonNull<u8>) -> Self {
        unsafe {
            let hop = data.as_ptr().sub(mem::size_of::<u32>()).cast::<u32>().read_unaligned();
            let start = data.as_ptr().sub(HEADER_SIZE + hop as usize);

            Self::new(NonNull::new_unchecked(start))
        }
    }

    /// Turns a fresh oversized reservation into a chunk: the reservation length
    /// goes first, the marker size right after it.
    pub unsafe fn oversized(base: NonNull<u8>, reserved: usize) -> Self {
        unsafe {
            base.as_ptr().cast::<u64>().write_unaligned(reserved as u64);
            let chunk = Self::new(NonNull::new_unchecked(base.as_ptr().add(OVERSIZED_PREFIX)));
            chunk.set_size(OVERSIZED_MARKER);

            chunk
        }
    }

    /// Base address and length of the reservation behind an oversized chunk.
    pub unsafe fn oversized_reservation(self) -> (NonNull<u8>, usize) {
        unsafe {
            let base = self.start.as_ptr().sub(OVERSIZED_PREFIX);
            let reserved = base.cast::<u64>().read_unaligned() as usize;

            (NonNull::new_unchecked(base), reserved)
        }
    }
}
