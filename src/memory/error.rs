//! Error types for linear memory reads.

use thiserror::Error;

use super::NumericKind;

/// Errors that can occur while copying a region out of linear memory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The requested region extends past the end of the memory.
    #[error("Region at offset {offset} with length {len} exceeds memory size {memory_size}")]
    OutOfBounds {
        offset: u32,
        len: usize,
        memory_size: usize,
    },

    /// The region length does not fit in the host address space.
    #[error("Region length overflows: {count} elements of {width} bytes")]
    LengthOverflow { count: usize, width: usize },

    /// The descriptor's element kind does not match the requested host type.
    #[error("Region holds {actual} elements, requested {expected}")]
    KindMismatch {
        expected: NumericKind,
        actual: NumericKind,
    },
}
