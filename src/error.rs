use thiserror::Error;

/// Errors returned by the allocator and its collaborators.
///
/// Bookkeeping contract violations (a corrupted chunk header, a block handed
/// back to the wrong allocator) are not represented here: they panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The platform memory provider refused to hand out `size` bytes.
    #[error("platform memory provider refused a reservation of {size} bytes")]
    OutOfMemory { size: usize },

    /// The alignment is not a power of two, or is too large to be recorded
    /// as an alignment hop.
    #[error("alignment {align} is not a supported power of two")]
    InvalidAlignment { align: usize },

    /// `header + size + align` does not fit in a `usize`.
    #[error("chunk for {size} bytes aligned to {align} overflows the address space")]
    SizeOverflow { size: usize, align: usize },

    /// The host data model is neither 32 nor 64 bit.
    #[error("unsupported data model: {bits} bit pointers")]
    UnsupportedDataModel { bits: usize },

    /// A region size that cannot hold the biggest in-regime chunk.
    #[error("invalid region size {size}: must be at least 1 MiB and a multiple of 8")]
    InvalidRegionSize { size: usize },
}
