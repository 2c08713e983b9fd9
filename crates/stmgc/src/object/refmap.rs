//! Reference Map - where the strong pointer fields of a type live
//!
//! Each bit in the bitmap represents one word of payload.
//! - Bit = 1: strong pointer field, visited by `trace`
//! - Bit = 0: anything else (integers, padding, the weak field)
//!
//! # Layout
//!
//! ```text
//! Payload Layout (SR: three pointers):
//! ┌─────────┬─────────┬─────────┐
//! │ 0-7     │ 8-15    │ 16-23   │
//! │ (bit 0) │ (bit 1) │ (bit 2) │
//! ├─────────┼─────────┼─────────┤
//! │ s1      │ sr2     │ sr3     │
//! │ bit=1   │ bit=1   │ bit=1   │
//! └─────────┴─────────┴─────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use stmgc::object::ReferenceMap;
//!
//! let map = ReferenceMap::new(&[0, 16]).unwrap();
//!
//! assert!(map.is_reference(0));
//! assert!(!map.is_reference(8));
//! assert!(map.is_reference(16));
//! assert_eq!(map.count(), 2);
//! ```

use super::address::WORD;
use crate::error::{Result, StmError};

/// Size of each slot tracked by the reference map (in bytes)
pub const SLOT_SIZE: usize = WORD;

/// Maximum number of reference fields tracked per type
pub const MAX_REFS: usize = 64;

/// Maximum payload prefix that can hold pointer fields
pub const MAX_TRACKED_SIZE: usize = MAX_REFS * SLOT_SIZE;

/// Reference map for an object type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReferenceMap {
    bitmap: u64,
}

impl ReferenceMap {
    /// A map with no pointers
    #[inline]
    pub const fn empty() -> Self {
        Self { bitmap: 0 }
    }

    /// Create a reference map with pointers at the given payload offsets
    ///
    /// Offsets must be word-aligned and below [`MAX_TRACKED_SIZE`].
    /// Duplicates are folded.
    pub fn new(offsets: &[usize]) -> Result<Self> {
        let mut bitmap: u64 = 0;

        for &offset in offsets {
            if offset % SLOT_SIZE != 0 {
                return Err(StmError::Configuration(format!(
                    "pointer offset {} must be aligned to {} bytes",
                    offset, SLOT_SIZE
                )));
            }

            let bit = offset / SLOT_SIZE;
            if bit >= MAX_REFS {
                return Err(StmError::Configuration(format!(
                    "pointer offset {} exceeds maximum tracked size {}",
                    offset, MAX_TRACKED_SIZE
                )));
            }

            bitmap |= 1u64 << bit;
        }

        Ok(Self { bitmap })
    }

    /// Check if a given offset holds a strong pointer
    /// Returns false for unaligned offsets
    #[inline]
    pub fn is_reference(&self, offset: usize) -> bool {
        if offset % SLOT_SIZE != 0 {
            return false;
        }

        let bit = offset / SLOT_SIZE;
        bit < MAX_REFS && (self.bitmap & (1u64 << bit)) != 0
    }

    /// Number of pointer fields
    #[inline]
    pub const fn count(&self) -> u32 {
        self.bitmap.count_ones()
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.bitmap == 0
    }

    /// One past the last byte covered by a pointer field
    pub fn extent(&self) -> usize {
        (MAX_REFS - self.bitmap.leading_zeros() as usize) * SLOT_SIZE
    }

    /// Iterate over all pointer offsets in ascending order
    #[inline]
    pub const fn iter(&self) -> ReferenceMapIter {
        ReferenceMapIter {
            bitmap: self.bitmap,
        }
    }
}

/// Iterator over pointer offsets in a ReferenceMap
#[derive(Debug, Clone, Copy)]
pub struct ReferenceMapIter {
    /// Bits not yet yielded
    bitmap: u64,
}

impl Iterator for ReferenceMapIter {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        if self.bitmap == 0 {
            return None;
        }
        let bit = self.bitmap.trailing_zeros() as usize;
        self.bitmap &= self.bitmap - 1;
        Some(bit * SLOT_SIZE)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.bitmap.count_ones() as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ReferenceMapIter {}

impl std::iter::FusedIterator for ReferenceMapIter {}
