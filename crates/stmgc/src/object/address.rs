//! Addresses and the address-space layout
//!
//! The heap lives in a simulated 64-bit address space split into three
//! disjoint reserved ranges:
//!
//! ```text
//! ┌──────────────────────┬──────────────────────┬──────────────────────────────┐
//! │ Shared space         │ Identity token space │ Nursery space                │
//! │ 1 << 32 ..           │ 1 << 44 .. 1 << 45   │ 1 << 45 ..                   │
//! │ one arena            │ never holds objects  │ one window per worker thread │
//! └──────────────────────┴──────────────────────┴──────────────────────────────┘
//! ```
//!
//! A pointer field holding `0` is null, so addresses are non-zero by type.

use serde::Serialize;
use std::fmt;
use std::num::NonZeroUsize;

#[cfg(not(target_pointer_width = "64"))]
compile_error!("stmgc requires a 64-bit target");

/// Size of a pointer field in bytes
pub const WORD: usize = 8;

/// Start of the shared space
pub const SHARED_SPACE_START: usize = 1 << 32;

/// Start of the identity token space
pub const IDENTITY_SPACE_START: usize = 1 << 44;

/// Size of the identity token space
pub const IDENTITY_SPACE_SIZE: usize = 1 << 44;

/// Start of the nursery space
pub const NURSERY_SPACE_START: usize = IDENTITY_SPACE_START + IDENTITY_SPACE_SIZE;

/// Largest shared reservation that stays clear of the identity space
pub const MAX_SHARED_RESERVE: usize = IDENTITY_SPACE_START - SHARED_SPACE_START;

/// A non-null heap address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(transparent)]
pub struct Address(NonZeroUsize);

impl Address {
    /// Wrap a raw word; `0` is null
    #[inline]
    pub fn new(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Address)
    }

    /// Raw integer value
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0.get()
    }

    /// Address `bytes` further on
    #[inline]
    pub fn add(self, bytes: usize) -> Option<Address> {
        self.as_usize().checked_add(bytes).and_then(Address::new)
    }

    /// Encode an optional address as a pointer-field word
    #[inline]
    pub fn to_word(ptr: Option<Address>) -> usize {
        ptr.map_or(0, Address::as_usize)
    }
}

impl std::ops::Sub for Address {
    type Output = usize;

    fn sub(self, rhs: Address) -> usize {
        self.as_usize() - rhs.as_usize()
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#x})", self.as_usize())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.as_usize())
    }
}

/// Round an object size up to the word size
#[inline]
pub fn round_up_for_allocation(size: usize) -> usize {
    align_up(size, WORD)
}

/// Align value up to a power-of-two boundary
#[inline]
pub fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Which reserved range an address falls in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    Shared,
    Identity,
    /// Nursery window of the given worker thread number
    Nursery(u32),
    Unmapped,
}

impl Space {
    /// Classify `addr` given the shared and per-worker reservations
    pub fn classify(addr: Address, shared_reserve: usize, nursery_reserve: usize) -> Space {
        let raw = addr.as_usize();
        if raw >= SHARED_SPACE_START && raw - SHARED_SPACE_START < shared_reserve {
            Space::Shared
        } else if (IDENTITY_SPACE_START..NURSERY_SPACE_START).contains(&raw) {
            Space::Identity
        } else if raw >= NURSERY_SPACE_START && nursery_reserve > 0 {
            let window = (raw - NURSERY_SPACE_START) / nursery_reserve;
            match u32::try_from(window + 1) {
                Ok(thread) => Space::Nursery(thread),
                Err(_) => Space::Unmapped,
            }
        } else {
            Space::Unmapped
        }
    }
}

/// Start of the nursery window of worker `thread` (numbered from 1)
pub fn nursery_window_start(thread: u32, nursery_reserve: usize) -> Option<usize> {
    let index = (thread as usize).checked_sub(1)?;
    index
        .checked_mul(nursery_reserve)
        .and_then(|offset| NURSERY_SPACE_START.checked_add(offset))
        .filter(|start| start.checked_add(nursery_reserve).is_some())
}
