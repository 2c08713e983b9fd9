//! Allocator Submodule - Bump Pointer Arena
//!
//! An arena owns one reserved range of the simulated address space and
//! hands out addresses from it with a bump pointer. Backing memory is a
//! byte vector that grows in `chunk_size` steps as the pointer advances;
//! fresh memory always reads as zero.

use crate::error::{Result, StmError};
use crate::object::address::{align_up, Address, WORD};
use crate::object::header::{ObjectHeader, HEADER_SIZE};

/// Arena - bump pointer allocator over a reserved address range
pub struct Arena {
    start: Address,
    reserve: usize,
    top: usize,
    memory: Vec<u8>,
    chunk_size: usize,
}

impl Arena {
    pub fn new(start: usize, reserve: usize, chunk_size: usize) -> Result<Self> {
        let start = Address::new(start).ok_or_else(|| {
            StmError::Configuration("arena must not start at address 0".to_string())
        })?;
        if reserve == 0 {
            return Err(StmError::Configuration(
                "arena reserve must be > 0".to_string(),
            ));
        }
        if start.as_usize().checked_add(reserve).is_none() {
            return Err(StmError::Configuration(format!(
                "arena at {} with reserve {:#x} overflows the address space",
                start, reserve
            )));
        }
        if chunk_size == 0 || !chunk_size.is_power_of_two() {
            return Err(StmError::Configuration(format!(
                "chunk size ({}) must be a power of two",
                chunk_size
            )));
        }

        Ok(Self {
            start,
            reserve,
            top: 0,
            memory: Vec::new(),
            chunk_size,
        })
    }

    /// Bump-allocate `size` bytes
    ///
    /// No rounding: two back-to-back calls return addresses exactly `size`
    /// bytes apart.
    pub fn allocate(&mut self, size: usize) -> Result<Address> {
        let available = self.reserve - self.top;
        let new_top = self
            .top
            .checked_add(size)
            .filter(|&new_top| new_top <= self.reserve)
            .ok_or(StmError::OutOfAddressSpace {
                requested: size,
                available,
            })?;

        self.ensure_backed(new_top)?;

        let addr = self.address_at(self.top)?;
        self.top = new_top;
        Ok(addr)
    }

    fn ensure_backed(&mut self, len: usize) -> Result<()> {
        if len <= self.memory.len() {
            return Ok(());
        }

        let target = align_up(len, self.chunk_size).min(self.reserve);
        self.memory
            .try_reserve(target - self.memory.len())
            .map_err(|_| StmError::OutOfAddressSpace {
                requested: target - self.memory.len(),
                available: 0,
            })?;
        self.memory.resize(target, 0);
        Ok(())
    }

    fn address_at(&self, offset: usize) -> Result<Address> {
        self.start.add(offset).ok_or(StmError::InvalidAccess {
            address: self.start.as_usize(),
            len: offset,
        })
    }

    /// Check whether `addr` falls inside the allocated part of the arena
    #[inline]
    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.start && addr - self.start < self.top
    }

    #[inline]
    pub fn start(&self) -> Address {
        self.start
    }

    /// Bytes handed out so far
    #[inline]
    pub fn used(&self) -> usize {
        self.top
    }

    /// Address the next allocation will return
    #[inline]
    pub fn free_pointer(&self) -> usize {
        self.start.as_usize() + self.top
    }

    pub fn remaining(&self) -> usize {
        self.reserve - self.top
    }

    /// Bytes of backing memory currently held
    pub fn committed(&self) -> usize {
        self.memory.len()
    }

    fn offset_of(&self, addr: Address, len: usize) -> Result<usize> {
        let invalid = StmError::InvalidAccess {
            address: addr.as_usize(),
            len,
        };
        if addr < self.start {
            return Err(invalid);
        }
        let offset = addr - self.start;
        match offset.checked_add(len) {
            Some(end) if end <= self.top => Ok(offset),
            _ => Err(invalid),
        }
    }

    pub fn bytes(&self, addr: Address, len: usize) -> Result<&[u8]> {
        let offset = self.offset_of(addr, len)?;
        Ok(&self.memory[offset..offset + len])
    }

    pub fn bytes_mut(&mut self, addr: Address, len: usize) -> Result<&mut [u8]> {
        let offset = self.offset_of(addr, len)?;
        Ok(&mut self.memory[offset..offset + len])
    }

    pub fn read_word(&self, addr: Address) -> Result<usize> {
        let bytes = self.bytes(addr, WORD)?;
        let word: [u8; WORD] = bytes.try_into().map_err(|_| StmError::InvalidAccess {
            address: addr.as_usize(),
            len: WORD,
        })?;
        Ok(usize::from_ne_bytes(word))
    }

    pub fn write_word(&mut self, addr: Address, value: usize) -> Result<()> {
        self.bytes_mut(addr, WORD)?
            .copy_from_slice(&value.to_ne_bytes());
        Ok(())
    }

    /// Decode the header of the object at `obj`
    pub fn header(&self, obj: Address) -> Result<ObjectHeader> {
        self.offset_of(obj, HEADER_SIZE)?;
        let type_word = self.read_word(obj)?;
        let version = self.read_word(self.address_at(obj - self.start + WORD)?)?;
        Ok(ObjectHeader::decode([type_word, version]))
    }

    pub fn set_header(&mut self, obj: Address, header: &ObjectHeader) -> Result<()> {
        let [type_word, version] = header.encode();
        let bytes = self.bytes_mut(obj, HEADER_SIZE)?;
        bytes[..WORD].copy_from_slice(&type_word.to_ne_bytes());
        bytes[WORD..].copy_from_slice(&version.to_ne_bytes());
        Ok(())
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("start", &self.start)
            .field("reserve", &self.reserve)
            .field("used", &self.top)
            .field("committed", &self.memory.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::header::{TypeId, GLOBAL};

    const BASE: usize = 0x10_0000;

    fn arena() -> Arena {
        Arena::new(BASE, 0x1_0000, 64).unwrap()
    }

    #[test]
    fn test_arena_new_rejects_bad_input() {
        assert!(Arena::new(0, 0x1000, 64).is_err());
        assert!(Arena::new(BASE, 0, 64).is_err());
        assert!(Arena::new(BASE, 0x1000, 48).is_err());
        assert!(Arena::new(usize::MAX - 8, 0x1000, 64).is_err());
    }

    #[test]
    fn test_allocate_is_contiguous_without_padding() {
        let mut arena = arena();
        let a3 = arena.allocate(3).unwrap();
        let a4 = arena.allocate(4).unwrap();
        let a5 = arena.allocate(5).unwrap();
        let a6 = arena.allocate(6).unwrap();
        assert_eq!(a3.as_usize(), BASE);
        assert_eq!(a4 - a3, 3);
        assert_eq!(a5 - a4, 4);
        assert_eq!(a6 - a5, 5);
        assert_eq!(arena.used(), 18);
    }

    #[test]
    fn test_fresh_memory_is_zero() {
        let mut arena = arena();
        let obj = arena.allocate(40).unwrap();
        assert!(arena.bytes(obj, 40).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_grows_past_first_chunk() {
        let mut arena = arena();
        arena.allocate(60).unwrap();
        let far = arena.allocate(200).unwrap();
        arena.write_word(far, 0xDEAD).unwrap();
        assert_eq!(arena.read_word(far).unwrap(), 0xDEAD);
        assert!(arena.committed() >= 260);
        assert_eq!(arena.committed() % 64, 0);
    }

    #[test]
    fn test_out_of_address_space() {
        let mut arena = Arena::new(BASE, 128, 64).unwrap();
        arena.allocate(100).unwrap();
        let err = arena.allocate(64).unwrap_err();
        assert!(matches!(
            err,
            StmError::OutOfAddressSpace {
                requested: 64,
                available: 28
            }
        ));
    }

    #[test]
    fn test_access_outside_allocation_is_rejected() {
        let mut arena = arena();
        let obj = arena.allocate(16).unwrap();
        assert!(arena.read_word(obj.add(8).unwrap()).is_ok());
        assert!(arena.read_word(obj.add(16).unwrap()).is_err());
        assert!(arena.read_word(Address::new(BASE - 8).unwrap()).is_err());
        assert!(!arena.contains(obj.add(16).unwrap()));
        assert!(arena.contains(obj));
    }

    #[test]
    fn test_header_roundtrip() {
        let mut arena = arena();
        let obj = arena.allocate(HEADER_SIZE + 8).unwrap();
        let header = ObjectHeader::new(TypeId(5), GLOBAL);
        arena.set_header(obj, &header).unwrap();
        assert_eq!(arena.header(obj).unwrap(), header);
    }
}
