//! # nativemem - size-classed native memory for interop layers
//!
//! A segregated free-list allocator for many small, short-lived allocations
//! with caller-chosen alignment, built on top of big raw regions requested from
//! the platform.
//!
//! ```text
//!   alloc(size, align)
//!        |
//!        |  total = header + size + align
//!        v
//!   +-----------+   <= 2 KiB    +------------------+  empty bucket  +---------------+
//!   |  Regime   | ------------> | small buckets    | -------------> |               |
//!   | classify  |   <= 64 KiB   +------------------+                |  bump region  |
//!   |           | ------------> | medium buckets   | -------------> |  (4 MiB raw   |
//!   |           |   <= 1 MiB    +------------------+                |   regions)    |
//!   |           | ------------> | big buckets      | -------------> |               |
//!   +-----------+               +------------------+                +---------------+
//!        |  bigger
//!        v
//!   platform reserve / release
//! ```
//!
//! Every chunk starts with its padded size, and the 4 bytes right before the
//! pointer handed out record how far that pointer was pushed to honour the
//! alignment. That is all [`NativeAllocator::free`] needs to find the chunk and
//! its bucket again.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::alloc::Layout;
//! use nativemem::NativeAllocator;
//!
//! let mut allocator = NativeAllocator::new();
//!
//! let block = allocator.allocate(Layout::new::<u64>()).unwrap();
//! unsafe { block.as_ptr().cast::<u64>().write(42) };
//!
//! allocator.deallocate(block);
//! ```
//!
//! ## Limitations
//!
//! - **Single owner**: nothing is synchronized. Use one allocator per worker or
//!   wrap it in a lock.
//! - **No shrinking**: regions are only given back when the allocator is dropped.

pub mod access;
mod chunk;
mod config;
mod error;
mod freelist;
mod kernel;
mod region;
mod utils;

use std::{
    alloc::Layout,
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::{
    chunk::{Chunk, HEADER_SIZE, OVERSIZED_PREFIX},
    freelist::{BIG_UNIT, FreeList, MEDIUM_UNIT, SMALL_UNIT},
    region::RegionSource,
};

pub use crate::{
    access::{DataModel, NativeMem},
    config::{Config, REGION_SIZE_VAR},
    error::Error,
    freelist::Regime,
    kernel::{Kernel, PlatformMemory},
    region::DEFAULT_REGION_SIZE,
};

/// Source of allocator ids, so blocks can't be handed back to the wrong instance.
static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

/// Memory handed out by [`NativeAllocator::allocate`].
///
/// The handle owns the allocation: it can't be cloned and goes back through
/// [`NativeAllocator::deallocate`]. Dropping it without doing so leaks the chunk.
#[derive(Debug, PartialEq, Eq)]
pub struct NativeBlock {
    ptr: NonNull<u8>,
    len: usize,
    regime: Regime,
    owner: usize,
}

impl NativeBlock {
    /// Start of the usable memory, aligned as requested.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn as_non_null(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Number of bytes requested.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn regime(&self) -> Regime {
        self.regime
    }
}

/// Snapshot of the allocator's bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Raw regions requested from the platform so far.
    pub regions: usize,
    pub region_size: usize,
    /// Offset of the next fresh chunk in the current region.
    pub bump_cursor: usize,
    pub free_small: usize,
    pub free_medium: usize,
    pub free_big: usize,
    /// Oversized chunks handed out and not freed yet.
    pub oversized_live: usize,
}

/// Size-classed allocator with three free-list regimes and a bump-region source.
///
/// The allocator owns all of its state, so several independent instances can
/// live side by side. None of it is synchronized.
pub struct NativeAllocator<M: PlatformMemory = Kernel> {
    id: usize,
    memory: M,
    small: FreeList,
    medium: FreeList,
    big: FreeList,
    regions: RegionSource,
    oversized: usize,
}

// All the raw pointers inside point into memory this instance owns exclusively.
unsafe impl<M: PlatformMemory + Send> Send for NativeAllocator<M> {}

impl NativeAllocator<Kernel> {
    /// Allocator on top of the system memory provider with the default config.
    pub fn new() -> Self {
        Self::with_memory(Kernel)
    }

    /// Allocator on top of the system memory provider, configured from the
    /// environment (see [`Config::from_env`]).
    pub fn from_env() -> Result<Self, Error> {
        Self::with_config(Kernel, Config::from_env())
    }
}

impl Default for NativeAllocator<Kernel> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: PlatformMemory> NativeAllocator<M> {
    pub fn with_memory(memory: M) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            memory,
            small: FreeList::new(SMALL_UNIT),
            medium: FreeList::new(MEDIUM_UNIT),
            big: FreeList::new(BIG_UNIT),
            regions: RegionSource::new(DEFAULT_REGION_SIZE),
            oversized: 0,
        }
    }

    pub fn with_config(memory: M, config: Config) -> Result<Self, Error> {
        config.validate()?;

        let mut allocator = Self::with_memory(memory);
        allocator.regions = RegionSource::new(config.region_size);

        Ok(allocator)
    }

    /// The memory provider regions and oversized chunks come from.
    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Allocates `size` bytes aligned to `align` and returns the data pointer.
    ///
    /// The memory is not initialized. `align` must be a power of two no bigger
    /// than 4 GiB, otherwise [`Error::InvalidAlignment`] is returned.
    pub fn alloc(&mut self, size: usize, align: usize) -> Result<NonNull<u8>, Error> {
        if !align.is_power_of_two() || align - 1 > u32::MAX as usize {
            return Err(Error::InvalidAlignment { align });
        }

        let total = HEADER_SIZE
            .checked_add(size)
            .and_then(|total| total.checked_add(align))
            .ok_or(Error::SizeOverflow { size, align })?;

        let Self { memory, small, medium, big, regions, .. } = self;

        let chunk = match Regime::classify(total) {
            Regime::Small => small.allocate(total, regions, memory)?,
            Regime::Medium => medium.allocate(total, regions, memory)?,
            Regime::Big => big.allocate(total, regions, memory)?,
            Regime::Oversized => self.allocate_oversized(total)?,
        };

        Ok(unsafe { chunk.place_data(align) })
    }

    fn allocate_oversized(&mut self, total: usize) -> Result<Chunk, Error> {
        let reserved = total
            .checked_add(OVERSIZED_PREFIX)
            .ok_or(Error::SizeOverflow { size: total, align: 1 })?;

        let base = unsafe { self.memory.reserve(reserved) }.ok_or(Error::OutOfMemory { size: reserved })?;
        self.oversized += 1;

        tracing::debug!(base = ?base, reserved, "reserved oversized chunk");

        Ok(unsafe { Chunk::oversized(base, reserved) })
    }

    /// Gives back memory returned by [`NativeAllocator::alloc`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`NativeAllocator::alloc`] on this same allocator and
    /// not have been freed already. Nothing may access the memory afterwards.
    ///
    /// # Panics
    ///
    /// If the chunk header in front of `ptr` doesn't hold a valid padded size.
    pub unsafe fn free(&mut self, ptr: NonNull<u8>) {
        let chunk = unsafe { Chunk::from_data(ptr) };
        let size = unsafe { chunk.size() } as usize;

        match Regime::classify(size) {
            Regime::Small => unsafe { self.small.free(size, chunk) },
            Regime::Medium => unsafe { self.medium.free(size, chunk) },
            Regime::Big => unsafe { self.big.free(size, chunk) },
            Regime::Oversized => unsafe {
                let (base, reserved) = chunk.oversized_reservation();
                tracing::debug!(base = ?base, reserved, "releasing oversized chunk");

                self.memory.release(base, reserved);
                self.oversized -= 1;
            },
        }
    }

    /// Allocates memory for `layout`. The contents are not initialized.
    pub fn allocate(&mut self, layout: Layout) -> Result<NativeBlock, Error> {
        let ptr = self.alloc(layout.size(), layout.align())?;

        Ok(NativeBlock {
            ptr,
            len: layout.size(),
            // `alloc` already checked this sum doesn't overflow.
            regime: Regime::classify(HEADER_SIZE + layout.size() + layout.align()),
            owner: self.id,
        })
    }

    /// Like [`NativeAllocator::allocate`], with every byte set to zero.
    pub fn allocate_zeroed(&mut self, layout: Layout) -> Result<NativeBlock, Error> {
        let block = self.allocate(layout)?;
        unsafe { block.as_ptr().write_bytes(0, block.len()) };

        Ok(block)
    }

    /// Gives `block` back to its bucket, or to the platform if it was oversized.
    ///
    /// # Panics
    ///
    /// If `block` was allocated by another allocator.
    pub fn deallocate(&mut self, block: NativeBlock) {
        self.check_owner(&block);
        unsafe { self.free(block.ptr) }
    }

    /// Padded size recorded in the chunk header of `block`. Oversized chunks
    /// report a marker bigger than any regime instead.
    pub fn padded_size(&self, block: &NativeBlock) -> usize {
        self.check_owner(block);
        unsafe { Chunk::from_data(block.ptr).size() as usize }
    }

    pub fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            regions: self.regions.len(),
            region_size: self.regions.region_size(),
            bump_cursor: self.regions.cursor(),
            free_small: self.small.len(),
            free_medium: self.medium.len(),
            free_big: self.big.len(),
            oversized_live: self.oversized,
        }
    }

    #[inline]
    fn check_owner(&self, block: &NativeBlock) {
        assert_eq!(
            block.owner, self.id,
            "block at {:?} belongs to another allocator",
            block.ptr,
        );
    }
}

impl<M: PlatformMemory> Drop for NativeAllocator<M> {
    fn drop(&mut self) {
        if self.oversized > 0 {
            tracing::debug!(oversized = self.oversized, "dropping allocator with live oversized chunks");
        }

        unsafe { self.regions.release_all(&mut self.memory) }
    }
}
