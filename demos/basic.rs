use std::alloc::Layout;

use nativemem::{NativeAllocator, NativeBlock, NativeMem};

fn log_alloc(allocator: &NativeAllocator, block: &NativeBlock, layout: Layout) {
    println!(
        "Requested {} bytes aligned to {}: {:?} ({:?}, padded chunk {} bytes)",
        layout.size(),
        layout.align(),
        block.as_ptr(),
        block.regime(),
        allocator.padded_size(block),
    );
}

fn main() {
    let mut allocator = NativeAllocator::new();
    let native = NativeMem::default();

    let layouts = [
        Layout::new::<u64>(),
        Layout::array::<u8>(3000).unwrap(),
        Layout::from_size_align(100_000, 4096).unwrap(),
        Layout::array::<u8>(2_000_000).unwrap(),
    ];

    let mut blocks = Vec::new();
    for layout in layouts {
        let block = allocator.allocate(layout).unwrap();
        log_alloc(&allocator, &block, layout);
        blocks.push(block);
    }

    unsafe {
        native.put_long(blocks[0].as_ptr(), 0x1122_3344_5566_7788);
        println!("Value written to first block = {:#x}", native.get_long(blocks[0].as_ptr()));
    }

    println!("{:#?}", allocator.stats());

    let first = blocks.remove(0);
    let addr = first.as_ptr();
    allocator.deallocate(first);

    let reused = allocator.allocate(Layout::new::<u64>()).unwrap();
    println!("Freed block reused: {}", reused.as_ptr() == addr);
    allocator.deallocate(reused);

    for block in blocks {
        allocator.deallocate(block);
    }

    println!("{:#?}", allocator.stats());
}
