use std::ptr::NonNull;

use crate::{error::Error, kernel::PlatformMemory};

/// Default size of every raw region requested from the platform.
pub const DEFAULT_REGION_SIZE: usize = 4 * 1024 * 1024;

/// Source of fresh chunks when a bucket is empty.
///
/// [`PlatformMemory`] hands out big raw regions. Chunks are carved from the
/// current one by bumping a cursor; once the next chunk doesn't fit anymore a new
/// region is requested and the tail of the old one is simply abandoned.
///
/// ```text
/// +--------------------------------------------------------+
/// | chunk | chunk | chunk |          not carved yet        |
/// +--------------------------------------------------------+
/// ^                       ^                                ^
/// base                    base + cursor                    base + region_size
/// ```
///
/// Regions are never given back one by one. Their chunks go back to the free
/// lists instead. The whole list is released when the allocator is dropped.
pub(crate) struct RegionSource {
    /// Base of every region requested so far, the current one last.
    regions: Vec<NonNull<u8>>,
    /// Offset of the next fresh chunk in the current region.
    cursor: usize,
    region_size: usize,
}

impl RegionSource {
    pub const fn new(region_size: usize) -> Self {
        Self { regions: Vec::new(), cursor: 0, region_size }
    }

    #[inline]
    pub fn region_size(&self) -> usize {
        self.region_size
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Carves `size` bytes out of the current region, requesting a new region
    /// first if there is none yet or it has no room left.
    pub fn allocate_raw<M: PlatformMemory>(&mut self, size: usize, memory: &mut M) -> Result<NonNull<u8>, Error> {
        assert!(
            size <= self.region_size,
            "chunk of {size} bytes can never fit in a region of {} bytes",
            self.region_size,
        );

        if let Some(current) = self.regions.last() {
            if self.cursor + size <= self.region_size {
                let addr = unsafe { current.add(self.cursor) };
                self.cursor += size;

                return Ok(addr);
            }
        }

        let region = unsafe { memory.reserve(self.region_size) }
            .ok_or(Error::OutOfMemory { size: self.region_size })?;

        tracing::trace!(
            base = ?region,
            region_size = self.region_size,
            regions = self.regions.len() + 1,
            abandoned = self.region_size - self.cursor,
            "acquired a new raw region"
        );

        self.regions.push(region);
        self.cursor = size;

        Ok(region)
    }

    /// Gives every region back to `memory`.
    ///
    /// # Safety
    ///
    /// No chunk carved from these regions may be used afterwards, and `memory`
    /// must be the provider they were reserved from.
    pub unsafe fn release_all<M: PlatformMemory>(&mut self, memory: &mut M) {
        if !self.regions.is_empty() {
            tracing::debug!(regions = self.regions.len(), region_size = self.region_size, "releasing raw regions");
        }

        for region in self.regions.drain(..) {
            unsafe { memory.release(region, self.region_size) }
        }
        self.cursor = 0;
    }
}
