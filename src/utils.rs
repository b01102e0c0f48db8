//! This file contains the helper functions for the allocator.
//! These are functions that don't particularly belong to any concrete module of the program.


/// It aligns `to_be_aligned` up to the next multiple of `alignment`.
///
/// This is used to pad chunk sizes to their regime's alignment unit, to place the
/// data pointer of a chunk at the alignment the caller asked for and to round
/// platform reservations up to whole pages.
///
/// `alignment` must be a power of two.
#[inline]
pub const fn align(to_be_aligned: usize, alignment: usize) -> usize {
    (to_be_aligned + alignment - 1) & !(alignment - 1)
}
