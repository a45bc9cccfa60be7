//! Region descriptors and the bounds-checked reader.

use std::fmt;

use super::MemoryError;

/// Numeric element kinds the module stages in its scratch regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericKind {
    /// 64-bit IEEE 754 float, little-endian.
    F64,
    /// 32-bit two's complement integer, little-endian.
    I32,
}

impl NumericKind {
    /// Size of one element in bytes.
    pub const fn width(self) -> usize {
        match self {
            NumericKind::F64 => 8,
            NumericKind::I32 => 4,
        }
    }
}

impl fmt::Display for NumericKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericKind::F64 => write!(f, "f64"),
            NumericKind::I32 => write!(f, "i32"),
        }
    }
}

/// A host type that can be decoded from a region element.
pub trait Element: Copy {
    /// The element kind this type decodes.
    const KIND: NumericKind;

    /// Decode one element from exactly `KIND.width()` little-endian bytes.
    fn from_le_slice(bytes: &[u8]) -> Option<Self>;
}

impl Element for f64 {
    const KIND: NumericKind = NumericKind::F64;

    fn from_le_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(f64::from_le_bytes)
    }
}

impl Element for i32 {
    const KIND: NumericKind = NumericKind::I32;

    fn from_le_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(i32::from_le_bytes)
    }
}

/// Location and layout of a scratch region in linear memory.
///
/// Descriptors are built per call from the offset an accessor export returns.
/// Memory can grow between calls, so neither the descriptor nor any view
/// derived from it should outlive the call that produced the offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionDescriptor {
    /// Byte offset of the first element.
    pub offset: u32,
    /// Number of elements.
    pub count: usize,
    /// Element kind.
    pub kind: NumericKind,
}

impl RegionDescriptor {
    /// Describe `count` elements of kind `kind` at `offset`.
    pub const fn new(offset: u32, count: usize, kind: NumericKind) -> Self {
        Self {
            offset,
            count,
            kind,
        }
    }

    /// Describe `count` elements of the host type `T` at `offset`.
    pub const fn of<T: Element>(offset: u32, count: usize) -> Self {
        Self::new(offset, count, T::KIND)
    }

    /// Element width in bytes.
    pub const fn width(&self) -> usize {
        self.kind.width()
    }

    /// Total region length in bytes.
    pub fn byte_len(&self) -> Result<usize, MemoryError> {
        self.count
            .checked_mul(self.width())
            .ok_or(MemoryError::LengthOverflow {
                count: self.count,
                width: self.width(),
            })
    }
}

/// Copy the region described by `descriptor` out of `memory`.
///
/// `memory` must be a view of the module's memory taken after the module
/// populated the region. The returned vector is an independent copy.
pub fn read_region<T: Element>(
    memory: &[u8],
    descriptor: &RegionDescriptor,
) -> Result<Vec<T>, MemoryError> {
    if descriptor.kind != T::KIND {
        return Err(MemoryError::KindMismatch {
            expected: T::KIND,
            actual: descriptor.kind,
        });
    }

    let len = descriptor.byte_len()?;
    let start = descriptor.offset as usize;
    let out_of_bounds = MemoryError::OutOfBounds {
        offset: descriptor.offset,
        len,
        memory_size: memory.len(),
    };
    let end = start.checked_add(len).ok_or_else(|| out_of_bounds.clone())?;
    let bytes = memory.get(start..end).ok_or(out_of_bounds)?;

    bytes
        .chunks_exact(descriptor.width())
        .map(|chunk| {
            T::from_le_slice(chunk).ok_or(MemoryError::LengthOverflow {
                count: descriptor.count,
                width: descriptor.width(),
            })
        })
        .collect()
}
