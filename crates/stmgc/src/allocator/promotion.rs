//! Promotion Buffer - page-granular shared allocation during commit
//!
//! A commit carves promoted twins out of chunks taken from the shared
//! arena, the same way a thread refills its allocation buffer:
//!
//! 1. Twin fits the current chunk: bump the cursor
//! 2. Twin does not fit: take a fresh chunk of `max(size, page_size)`
//!    bytes and abandon the tail of the old one
//!
//! With a page size of 1 twins are packed back to back. A commit that
//! promotes nothing never takes a chunk.

use super::arena::Arena;
use crate::error::{Result, StmError};
use crate::object::address::Address;

/// Commit-scoped allocation buffer in the shared arena
#[derive(Debug)]
pub struct PromotionBuffer {
    page_size: usize,
    cursor: usize,
    limit: usize,
    reserved: usize,
}

impl PromotionBuffer {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            cursor: 0,
            limit: 0,
            reserved: 0,
        }
    }

    pub fn allocate(&mut self, shared: &mut Arena, size: usize) -> Result<Address> {
        if self.limit - self.cursor < size {
            self.refill(shared, size)?;
        }

        let addr = Address::new(self.cursor).ok_or(StmError::InvalidAccess {
            address: self.cursor,
            len: size,
        })?;
        self.cursor += size;
        Ok(addr)
    }

    fn refill(&mut self, shared: &mut Arena, size: usize) -> Result<()> {
        let chunk = size.max(self.page_size);
        let start = shared.allocate(chunk)?;

        self.cursor = start.as_usize();
        self.limit = self.cursor + chunk;
        self.reserved += chunk;

        log::trace!("promotion chunk of {} bytes at {}", chunk, start);
        Ok(())
    }

    /// Shared bytes consumed, including abandoned chunk tails
    pub fn reserved(&self) -> usize {
        self.reserved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: usize = 0x100_0000;

    fn shared() -> Arena {
        Arena::new(BASE, 1 << 20, 4096).unwrap()
    }

    #[test]
    fn test_page_size_one_packs_twins() {
        let mut arena = shared();
        let mut buffer = PromotionBuffer::new(1);
        let a = buffer.allocate(&mut arena, 40).unwrap();
        let b = buffer.allocate(&mut arena, 56).unwrap();
        assert_eq!(b - a, 40);
        assert_eq!(arena.used(), 96);
        assert_eq!(buffer.reserved(), 96);
    }

    #[test]
    fn test_page_rounding() {
        let mut arena = shared();
        let mut buffer = PromotionBuffer::new(128);
        let a = buffer.allocate(&mut arena, 40).unwrap();
        let b = buffer.allocate(&mut arena, 40).unwrap();
        assert_eq!(b - a, 40);
        assert_eq!(arena.used(), 128);
        assert_eq!(buffer.reserved(), 128);

        let c = buffer.allocate(&mut arena, 64).unwrap();
        assert_eq!(c.as_usize(), BASE + 128);
        assert_eq!(arena.used(), 256);
    }

    #[test]
    fn test_object_larger_than_page() {
        let mut arena = shared();
        let mut buffer = PromotionBuffer::new(39);
        buffer.allocate(&mut arena, 40).unwrap();
        assert_eq!(arena.used(), 40);
    }

    #[test]
    fn test_unused_buffer_consumes_nothing() {
        let arena = shared();
        let buffer = PromotionBuffer::new(4096);
        assert_eq!(buffer.reserved(), 0);
        assert_eq!(arena.used(), 0);
    }
}
