//! Raw accessors for memory handed out by the allocator.
//!
//! These don't do anything beyond the read or write itself: no bounds, no
//! alignment requirements (every access is unaligned-tolerant) and no
//! knowledge of what lives at the address.

use std::{mem, ptr, str::FromStr};

use crate::error::Error;

/// Pointer width of the host.
///
/// Native pointers read and written through [`NativeMem`] are as wide as the
/// host's, not the target's the memory may eventually describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataModel {
    Bits32,
    Bits64,
}

impl DataModel {
    /// Data model of the running process.
    pub const fn host() -> Self {
        #[cfg(target_pointer_width = "32")]
        {
            DataModel::Bits32
        }
        #[cfg(not(target_pointer_width = "32"))]
        {
            DataModel::Bits64
        }
    }

    /// Data model for a pointer size given in bytes.
    pub const fn from_pointer_width(bytes: usize) -> Result<Self, Error> {
        match bytes {
            4 => Ok(DataModel::Bits32),
            8 => Ok(DataModel::Bits64),
            _ => Err(Error::UnsupportedDataModel { bits: bytes.saturating_mul(8) }),
        }
    }

    /// Pointer size in bytes.
    #[inline]
    pub const fn pointer_size(self) -> usize {
        match self {
            DataModel::Bits32 => 4,
            DataModel::Bits64 => 8,
        }
    }
}

/// Parses the data model the way hosts usually report it: `"32"` or `"64"`.
impl FromStr for DataModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "32" => Ok(DataModel::Bits32),
            "64" => Ok(DataModel::Bits64),
            other => Err(Error::UnsupportedDataModel { bits: other.parse().unwrap_or(0) }),
        }
    }
}

/// Typed reads and writes at raw addresses.
///
/// All methods are `unsafe`: the caller guarantees the addressed bytes are valid
/// for the access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeMem {
    model: DataModel,
}

impl Default for NativeMem {
    fn default() -> Self {
        Self::new(DataModel::host())
    }
}

impl NativeMem {
    pub const fn new(model: DataModel) -> Self {
        Self { model }
    }

    #[inline]
    pub const fn data_model(&self) -> DataModel {
        self.model
    }

    #[inline]
    pub const fn pointer_size(&self) -> usize {
        self.model.pointer_size()
    }

    #[inline]
    pub unsafe fn get_byte(&self, mem: *const u8) -> i8 {
        unsafe { mem.cast::<i8>().read_unaligned() }
    }

    #[inline]
    pub unsafe fn put_byte(&self, mem: *mut u8, value: i8) {
        unsafe { mem.cast::<i8>().write_unaligned(value) }
    }

    #[inline]
    pub unsafe fn get_short(&self, mem: *const u8) -> i16 {
        unsafe { mem.cast::<i16>().read_unaligned() }
    }

    #[inline]
    pub unsafe fn put_short(&self, mem: *mut u8, value: i16) {
        unsafe { mem.cast::<i16>().write_unaligned(value) }
    }

    #[inline]
    pub unsafe fn get_int(&self, mem: *const u8) -> i32 {
        unsafe { mem.cast::<i32>().read_unaligned() }
    }

    #[inline]
    pub unsafe fn put_int(&self, mem: *mut u8, value: i32) {
        unsafe { mem.cast::<i32>().write_unaligned(value) }
    }

    #[inline]
    pub unsafe fn get_long(&self, mem: *const u8) -> i64 {
        unsafe { mem.cast::<i64>().read_unaligned() }
    }

    #[inline]
    pub unsafe fn put_long(&self, mem: *mut u8, value: i64) {
        unsafe { mem.cast::<i64>().write_unaligned(value) }
    }

    #[inline]
    pub unsafe fn get_float(&self, mem: *const u8) -> f32 {
        unsafe { mem.cast::<f32>().read_unaligned() }
    }

    #[inline]
    pub unsafe fn put_float(&self, mem: *mut u8, value: f32) {
        unsafe { mem.cast::<f32>().write_unaligned(value) }
    }

    #[inline]
    pub unsafe fn get_double(&self, mem: *const u8) -> f64 {
        unsafe { mem.cast::<f64>().read_unaligned() }
    }

    #[inline]
    pub unsafe fn put_double(&self, mem: *mut u8, value: f64) {
        unsafe { mem.cast::<f64>().write_unaligned(value) }
    }

    /// Reads a pointer-sized value, zero-extended under [`DataModel::Bits32`].
    pub unsafe fn get_native_ptr(&self, mem: *const u8) -> u64 {
        unsafe {
            match self.model {
                DataModel::Bits32 => self.get_int(mem) as u32 as u64,
                DataModel::Bits64 => self.get_long(mem) as u64,
            }
        }
    }

    /// Writes a pointer-sized value, truncated to 32 bits under [`DataModel::Bits32`].
    pub unsafe fn put_native_ptr(&self, mem: *mut u8, value: u64) {
        unsafe {
            match self.model {
                DataModel::Bits32 => self.put_int(mem, value as u32 as i32),
                DataModel::Bits64 => self.put_long(mem, value as i64),
            }
        }
    }

    /// Copies `dest.len()` bytes from `source` into `dest`.
    pub unsafe fn get_bytes(&self, source: *const u8, dest: &mut [u8]) {
        unsafe { ptr::copy_nonoverlapping(source, dest.as_mut_ptr(), dest.len()) }
    }

    /// Copies `source` to `dest`.
    pub unsafe fn put_bytes(&self, source: &[u8], dest: *mut u8) {
        unsafe { ptr::copy_nonoverlapping(source.as_ptr(), dest, source.len()) }
    }

    /// Copies `dest.len()` UTF-16 code units from `source` into `dest`.
    pub unsafe fn get_chars(&self, source: *const u8, dest: &mut [u16]) {
        unsafe {
            ptr::copy_nonoverlapping(source, dest.as_mut_ptr().cast::<u8>(), dest.len() * mem::size_of::<u16>())
        }
    }

    /// Copies the UTF-16 code units in `source` to `dest`.
    pub unsafe fn put_chars(&self, source: &[u16], dest: *mut u8) {
        unsafe {
            ptr::copy_nonoverlapping(source.as_ptr().cast::<u8>(), dest, source.len() * mem::size_of::<u16>())
        }
    }

    pub unsafe fn zero_memory(&self, dest: *mut u8, len: usize) {
        unsafe { ptr::write_bytes(dest, 0, len) }
    }

    /// Copies `len` bytes from `src` to `dest`. The ranges may overlap.
    pub unsafe fn copy_memory(&self, dest: *mut u8, len: usize, src: *const u8) {
        unsafe { ptr::copy(src, dest, len) }
    }
}
