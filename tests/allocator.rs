use std::{
    alloc::{self, Layout},
    cell::Cell,
    collections::HashSet,
    ptr::NonNull,
    rc::Rc,
};

use nativemem::{Config, Error, NativeAllocator, PlatformMemory, Regime};

/// Provider counting every reservation and release, backed by the global allocator.
#[derive(Default)]
struct CountingMemory {
    reserved: Rc<Cell<usize>>,
    released: Rc<Cell<usize>>,
    /// Reservations bigger than this are refused.
    limit: Option<usize>,
}

impl CountingMemory {
    fn layout(len: usize) -> Layout {
        Layout::from_size_align(len, 4096).unwrap()
    }
}

unsafe impl PlatformMemory for CountingMemory {
    unsafe fn reserve(&mut self, len: usize) -> Option<NonNull<u8>> {
        if self.limit.is_some_and(|limit| len > limit) {
            return None;
        }

        self.reserved.set(self.reserved.get() + 1);
        NonNull::new(unsafe { alloc::alloc(Self::layout(len)) })
    }

    unsafe fn release(&mut self, addr: NonNull<u8>, len: usize) {
        self.released.set(self.released.get() + 1);
        unsafe { alloc::dealloc(addr.as_ptr(), Self::layout(len)) }
    }
}

fn counting() -> (NativeAllocator<CountingMemory>, Rc<Cell<usize>>, Rc<Cell<usize>>) {
    let memory = CountingMemory::default();
    let reserved = memory.reserved.clone();
    let released = memory.released.clone();

    (NativeAllocator::with_memory(memory), reserved, released)
}

#[test]
fn round_trip_sizes_and_alignments() {
    let mut allocator = NativeAllocator::new();

    for size in [1, 7, 8, 2048, 2049, 65536, 65537, 1_048_576, 1_048_577] {
        for align in [1, 2, 4, 8, 16, 4096] {
            let ptr = allocator.alloc(size, align).unwrap();
            assert_eq!(0, ptr.as_ptr() as usize % align, "size {size} align {align}");

            let pattern: Vec<u8> = (0..size).map(|i| (i * 31 + size) as u8).collect();
            unsafe {
                ptr.as_ptr().copy_from_nonoverlapping(pattern.as_ptr(), size);
                let read = std::slice::from_raw_parts(ptr.as_ptr(), size);
                assert!(read == pattern.as_slice(), "size {size} align {align}");

                allocator.free(ptr);
            }
        }
    }

    assert_eq!(0, allocator.stats().oversized_live);
}

#[test]
fn live_allocations_never_overlap() {
    let mut allocator = NativeAllocator::new();
    let mut ranges = Vec::new();

    for i in 0..2000usize {
        let size = [1, 13, 64, 700, 3000, 20_000, 70_000][i % 7];
        let align = 1 << (i % 8);
        let ptr = allocator.alloc(size, align).unwrap();
        ranges.push((ptr.as_ptr() as usize, size.max(1), ptr));

        // Free a third of them along the way so chunks get reused.
        if i % 3 == 2 {
            let (_, _, ptr) = ranges.swap_remove(i % ranges.len());
            unsafe { allocator.free(ptr) };
        }
    }

    ranges.sort_by_key(|&(start, _, _)| start);
    for pair in ranges.windows(2) {
        let (start, len, _) = pair[0];
        assert!(start + len <= pair[1].0, "{:#x}+{} overlaps {:#x}", start, len, pair[1].0);
    }

    for (_, _, ptr) in ranges {
        unsafe { allocator.free(ptr) };
    }
}

#[test]
fn freed_chunks_are_reused_before_bumping() {
    let (mut allocator, reserved, _) = counting();

    for (size, align) in [(16, 8), (3000, 64), (100_000, 4096)] {
        let ptr = allocator.alloc(size, align).unwrap();
        let _keep = allocator.alloc(size, align).unwrap();
        unsafe { allocator.free(ptr) };

        let before = allocator.stats();
        let regions = reserved.get();

        let again = allocator.alloc(size, align).unwrap();
        assert_eq!(ptr, again);
        assert_eq!(before.bump_cursor, allocator.stats().bump_cursor);
        assert_eq!(regions, reserved.get());
    }
}

#[test]
fn compatible_padded_size_reuses_chunk() {
    let mut allocator = NativeAllocator::new();

    // Totals 8 + 20 + 4 = 32 and 8 + 24 + 1 = 33 pad to 32 and 40, while
    // 8 + 16 + 8 = 32 shares the first bucket.
    let first = allocator.allocate(Layout::from_size_align(20, 4).unwrap()).unwrap();
    let addr = first.as_ptr();
    allocator.deallocate(first);

    let other_bucket = allocator.allocate(Layout::from_size_align(24, 1).unwrap()).unwrap();
    assert_ne!(addr, other_bucket.as_ptr());

    let same_bucket = allocator.allocate(Layout::from_size_align(16, 8).unwrap()).unwrap();
    assert_eq!(addr, same_bucket.as_ptr());

    allocator.deallocate(other_bucket);
    allocator.deallocate(same_bucket);
}

#[test]
fn regime_boundaries_on_total_chunk_size() {
    let mut allocator = NativeAllocator::new();

    // With alignment 1 the total chunk size is size + 9.
    let cases = [
        (2048, Regime::Small),
        (2049, Regime::Medium),
        (65536, Regime::Medium),
        (65537, Regime::Big),
        (1_048_576, Regime::Big),
        (1_048_577, Regime::Oversized),
    ];

    for (total, regime) in cases {
        let block = allocator.allocate(Layout::from_size_align(total - 9, 1).unwrap()).unwrap();
        assert_eq!(regime, block.regime(), "total {total}");

        if let Some(unit) = regime.unit() {
            let padded = allocator.padded_size(&block);
            assert_eq!(0, padded % unit);
            assert!(padded >= total && padded < total + unit);
        }

        allocator.deallocate(block);
    }
}

#[test]
fn header_recovery_is_stable() {
    let mut allocator = NativeAllocator::new();
    let sizes = [3, 100, 2500, 40_000, 300_000];

    let blocks: Vec<_> = sizes
        .iter()
        .map(|&size| allocator.allocate(Layout::from_size_align(size, 32).unwrap()).unwrap())
        .collect();
    let padded: Vec<_> = blocks.iter().map(|block| allocator.padded_size(block)).collect();

    // Churn every bucket the blocks above live in.
    for _ in 0..50 {
        let churn: Vec<_> = sizes
            .iter()
            .map(|&size| allocator.allocate(Layout::from_size_align(size, 16).unwrap()).unwrap())
            .collect();
        for block in churn {
            allocator.deallocate(block);
        }
    }

    for (block, expected) in blocks.iter().zip(&padded) {
        assert_eq!(*expected, allocator.padded_size(block));
    }

    for block in blocks {
        allocator.deallocate(block);
    }
}

#[test]
fn hundred_small_objects_are_recycled() {
    let (mut allocator, reserved, _) = counting();

    let first: Vec<_> = (0..100).map(|_| allocator.alloc(16, 8).unwrap()).collect();
    let stats = allocator.stats();
    assert_eq!(1, stats.regions);
    assert_eq!(1, reserved.get());

    for ptr in first.iter().rev() {
        unsafe { allocator.free(*ptr) };
    }
    assert_eq!(100, allocator.stats().free_small);

    let second: Vec<_> = (0..100).map(|_| allocator.alloc(16, 8).unwrap()).collect();

    let first: HashSet<_> = first.into_iter().collect();
    let second: HashSet<_> = second.into_iter().collect();
    assert_eq!(first, second);

    assert_eq!(stats, allocator.stats());
    assert_eq!(1, reserved.get());
}

#[test]
fn oversized_goes_straight_to_the_platform() {
    let (mut allocator, reserved, released) = counting();

    let ptr = allocator.alloc(2_000_000, 8).unwrap();
    assert_eq!(0, ptr.as_ptr() as usize % 8);
    assert_eq!(1, reserved.get());

    let stats = allocator.stats();
    assert_eq!(0, stats.regions);
    assert_eq!(1, stats.oversized_live);

    unsafe {
        ptr.as_ptr().write_bytes(0x5A, 2_000_000);
        allocator.free(ptr);
    }

    assert_eq!(1, released.get());
    let stats = allocator.stats();
    assert_eq!(0, stats.oversized_live);
    assert_eq!(0, stats.free_small + stats.free_medium + stats.free_big);
}

#[test]
fn regions_are_kept_until_drop() {
    let (mut allocator, reserved, released) = counting();

    // Big chunks of 8 + 900_000 + 8 bytes pad to 901_120, four fit in a region.
    let ptrs: Vec<_> = (0..9).map(|_| allocator.alloc(900_000, 8).unwrap()).collect();
    assert_eq!(3, allocator.stats().regions);
    assert_eq!(3, reserved.get());

    for ptr in ptrs {
        unsafe { allocator.free(ptr) };
    }
    assert_eq!(0, released.get());
    assert_eq!(9, allocator.stats().free_big);

    drop(allocator);
    assert_eq!(3, released.get());
}

#[test]
fn refused_reservations_are_reported() {
    let memory = CountingMemory { limit: Some(1024 * 1024), ..Default::default() };
    let config = Config { region_size: 1024 * 1024 };
    let mut allocator = NativeAllocator::with_config(memory, config).unwrap();

    assert!(allocator.alloc(100, 8).is_ok());
    assert_eq!(
        Err(Error::OutOfMemory { size: 8 + 2_000_000 + 8 + 8 }),
        allocator.alloc(2_000_000, 8),
    );
    assert_eq!(0, allocator.stats().oversized_live);
}

#[test]
fn configured_region_size_is_used() {
    let config = Config { region_size: 2 * 1024 * 1024 };
    let mut allocator = NativeAllocator::with_config(CountingMemory::default(), config).unwrap();

    let block = allocator.allocate(Layout::new::<u64>()).unwrap();
    assert_eq!(2 * 1024 * 1024, allocator.stats().region_size);
    allocator.deallocate(block);

    let invalid = Config { region_size: 4096 };
    assert!(matches!(
        NativeAllocator::with_config(CountingMemory::default(), invalid),
        Err(Error::InvalidRegionSize { size: 4096 }),
    ));
}

#[test]
fn allocators_are_independent() {
    let mut first = NativeAllocator::new();
    let mut second = NativeAllocator::new();

    let a = first.alloc(64, 8).unwrap();
    unsafe { first.free(a) };

    let b = second.alloc(64, 8).unwrap();
    assert_ne!(a, b);
    assert_eq!(1, first.stats().free_small);
    assert_eq!(0, second.stats().free_small);

    unsafe { second.free(b) };
}
