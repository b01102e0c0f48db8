use std::{ptr::NonNull, sync::OnceLock};

/// Virtual memory page size of the computer. This is usually 4096.
/// We can't know the value at compile time so it is queried once.
static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// This trait provides an abstraction over the bulk memory source the
/// allocator carves its regions from. The allocator itself has nothing
/// to do with the concrete implementations / APIs offered by each kernel,
/// and tests can plug in their own provider.
///
/// # Safety
///
/// Implementors must return memory that is valid for reads and writes of
/// `len` bytes, aligned to at least 8 bytes, and not handed out to anybody
/// else until it comes back through [`PlatformMemory::release`].
pub unsafe trait PlatformMemory {
    /// Request a memory region of size `len`. It returns a pointer to the
    /// given location or `None` if the underlying source refuses.
    unsafe fn reserve(&mut self, len: usize) -> Option<NonNull<u8>>;

    /// Returns the memory of size `len` starting from `addr` back to the source.
    ///
    /// # Safety
    ///
    /// `addr` and `len` must come from a previous [`PlatformMemory::reserve`]
    /// call on this same provider and nothing may touch the memory afterwards.
    unsafe fn release(&mut self, addr: NonNull<u8>, len: usize);
}

/// The system memory provider. Here is where we manage the low level
/// memory requests as well as platform-dependant stuff.
#[derive(Debug, Default, Clone, Copy)]
pub struct Kernel;

/// Wrapper to calculate the computer's page size.
#[inline]
pub(crate) fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| unsafe { Kernel::query_page_size() })
}

/// `len` rounded up to whole pages, `None` if that doesn't fit in a `usize`.
#[inline]
fn page_rounded(len: usize) -> Option<usize> {
    len.checked_next_multiple_of(page_size())
}

unsafe impl PlatformMemory for Kernel {
    unsafe fn reserve(&mut self, len: usize) -> Option<NonNull<u8>> {
        unsafe { Kernel::request_memory(page_rounded(len)?) }
    }

    unsafe fn release(&mut self, addr: NonNull<u8>, len: usize) {
        // Anything reserved was already rounded without overflowing.
        let len = page_rounded(len).unwrap_or(len);

        if !unsafe { Kernel::return_memory(addr, len) } {
            tracing::debug!(addr = ?addr, len, "platform refused to release memory");
        }
    }
}

#[cfg(unix)]
mod unix {
    use super::Kernel;

    use libc::{mmap, munmap, off_t, size_t};

    use std::{os::raw::{c_int, c_void}, ptr::NonNull};

    impl Kernel {
        pub(super) unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // mmap parameters.
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                let addr = mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET);

                match addr {
                    libc::MAP_FAILED => None,
                    addr => NonNull::new(addr.cast::<u8>()),
                }
            }
        }

        /// Returns whether the kernel accepted the release.
        pub(super) unsafe fn return_memory(addr: NonNull<u8>, len: usize) -> bool {
            unsafe { munmap(addr.as_ptr().cast::<c_void>(), len as size_t) == 0 }
        }

        pub(super) unsafe fn query_page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::{mem::MaybeUninit, os::raw::c_void, ptr::NonNull};

    use super::Kernel;

    use windows::Win32::System::{Memory, SystemInformation};

    impl Kernel {
        pub(super) unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let addr = Memory::VirtualAlloc(None, len, flags, protection);

                NonNull::new(addr.cast())
            }
        }

        /// Returns whether the kernel accepted the release.
        pub(super) unsafe fn return_memory(addr: NonNull<u8>, _len: usize) -> bool {
            unsafe { Memory::VirtualFree(addr.as_ptr() as *mut c_void, 0, Memory::MEM_RELEASE).is_ok() }
        }

        pub(super) unsafe fn query_page_size() -> usize {
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                system_info.assume_init().dwPageSize as usize
            }
        }
    }
}
