//! Reading fixed-layout regions out of the module's linear memory.
//!
//! The module can only return one scalar per call, so multi-value results are
//! staged in scratch regions inside its memory. A [`RegionDescriptor`] names
//! such a region (offset, element kind and count), and [`read_region`] copies it
//! into an owned vector. The copy never aliases the source buffer, so a later
//! call into the module cannot change values that were already returned.

mod error;
mod region;

pub use error::MemoryError;
pub use region::{Element, NumericKind, RegionDescriptor, read_region};
