//! Object Header - Metadata prefixed to every heap object
//!
//! Object Header Layout (16 bytes):
//! ┌─────────────────────────────────────────┐
//! │         Type/flag word (8 bytes)        │
//! │  - Bits 0-31: type id                   │
//! │  - Bit 32: GLOBAL                       │
//! │  - Bit 33: WAS_COPIED                   │
//! │  - Bit 34: version slot holds Original  │
//! │  - Bit 35: version slot holds Forwarded │
//! ├─────────────────────────────────────────┤
//! │         Version slot (8 bytes)          │
//! └─────────────────────────────────────────┘
//!
//! The version slot is read and written as a [`Version`]; the two tag bits
//! keep "working copy of" and "promoted to" apart even though both hold a
//! shared address.

use super::address::{Address, WORD};

/// Size of object header in bytes
pub const HEADER_SIZE: usize = 2 * WORD;

/// Object lives in, or was promoted into, the shared heap
pub const GLOBAL: u32 = 1 << 0;

/// Some transaction holds a private working copy of this shared object
pub const WAS_COPIED: u32 = 1 << 1;

const VERSION_ORIGINAL: u32 = 1 << 2;
const VERSION_FORWARDED: u32 = 1 << 3;
const VERSION_TAGS: u32 = VERSION_ORIGINAL | VERSION_FORWARDED;

const FLAG_SHIFT: u32 = 32;

/// Type id understood by the layout oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// Contents of the version slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Empty,
    /// On a private working copy: the shared object it was copied from
    Original(Address),
    /// On a promoted private object: its shared twin
    Forwarded(Address),
}

impl Version {
    /// The address held in the slot, if any
    pub fn address(self) -> Option<Address> {
        match self {
            Version::Empty => None,
            Version::Original(addr) | Version::Forwarded(addr) => Some(addr),
        }
    }
}

/// Decoded object header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    type_id: TypeId,
    flags: u32,
    version: usize,
}

impl ObjectHeader {
    /// Create new object header with an empty version slot
    pub fn new(type_id: TypeId, flags: u32) -> Self {
        Self {
            type_id,
            flags: flags & !VERSION_TAGS,
            version: 0,
        }
    }

    /// Decode from the two header words
    pub fn decode(words: [usize; 2]) -> Self {
        Self {
            type_id: TypeId(words[0] as u32),
            flags: (words[0] >> FLAG_SHIFT) as u32,
            version: words[1],
        }
    }

    /// Encode into the two header words
    pub fn encode(&self) -> [usize; 2] {
        [
            self.type_id.0 as usize | (self.flags as usize) << FLAG_SHIFT,
            self.version,
        ]
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn is_global(&self) -> bool {
        self.flags & GLOBAL != 0
    }

    #[inline]
    pub fn was_copied(&self) -> bool {
        self.flags & WAS_COPIED != 0
    }

    /// Set WAS_COPIED; returns true if it was already set
    #[inline]
    pub fn set_copied(&mut self) -> bool {
        let was = self.was_copied();
        self.flags |= WAS_COPIED;
        was
    }

    /// Read the version slot
    pub fn version(&self) -> Version {
        match (self.flags & VERSION_TAGS, Address::new(self.version)) {
            (VERSION_ORIGINAL, Some(addr)) => Version::Original(addr),
            (VERSION_FORWARDED, Some(addr)) => Version::Forwarded(addr),
            _ => Version::Empty,
        }
    }

    /// Overwrite the version slot
    pub fn set_version(&mut self, version: Version) {
        self.flags &= !VERSION_TAGS;
        self.version = match version {
            Version::Empty => 0,
            Version::Original(addr) => {
                self.flags |= VERSION_ORIGINAL;
                addr.as_usize()
            }
            Version::Forwarded(addr) => {
                self.flags |= VERSION_FORWARDED;
                addr.as_usize()
            }
        };
    }

    /// Install a forwarding pointer
    /// Returns false, leaving the slot untouched, if one is already set
    pub fn try_set_forwarding(&mut self, twin: Address) -> bool {
        if matches!(self.version(), Version::Forwarded(_)) {
            return false;
        }
        self.set_version(Version::Forwarded(twin));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(raw: usize) -> Address {
        Address::new(raw).unwrap()
    }

    #[test]
    fn test_new_header_flags() {
        let header = ObjectHeader::new(TypeId(7), GLOBAL);
        assert!(header.is_global());
        assert!(!header.was_copied());
        assert_eq!(header.type_id(), TypeId(7));
        assert_eq!(header.version(), Version::Empty);
    }

    #[test]
    fn test_set_copied() {
        let mut header = ObjectHeader::new(TypeId(1), GLOBAL);
        assert!(!header.set_copied());
        assert!(header.set_copied());
        assert!(header.was_copied());
        assert!(header.is_global());
    }

    #[test]
    fn test_encode_decode() {
        let mut header = ObjectHeader::new(TypeId(0xABCD), GLOBAL | WAS_COPIED);
        header.set_version(Version::Original(addr(0x1_0000_0040)));

        let decoded = ObjectHeader::decode(header.encode());
        assert_eq!(decoded, header);
        assert_eq!(decoded.version(), Version::Original(addr(0x1_0000_0040)));
    }

    #[test]
    fn test_version_tags_are_distinct() {
        let mut header = ObjectHeader::new(TypeId(3), 0);
        header.set_version(Version::Original(addr(0x2000)));
        assert_eq!(header.version(), Version::Original(addr(0x2000)));

        header.set_version(Version::Forwarded(addr(0x3000)));
        assert_eq!(header.version(), Version::Forwarded(addr(0x3000)));
        assert_eq!(header.version().address(), Some(addr(0x3000)));

        header.set_version(Version::Empty);
        assert_eq!(header.version(), Version::Empty);
        assert_eq!(header.version().address(), None);
    }

    #[test]
    fn test_forwarding_set_once() {
        let mut header = ObjectHeader::new(TypeId(3), 0);
        assert!(header.try_set_forwarding(addr(0x5000)));
        assert!(!header.try_set_forwarding(addr(0x6000)));
        assert_eq!(header.version(), Version::Forwarded(addr(0x5000)));
    }

    #[test]
    fn test_new_ignores_version_tag_bits() {
        let header = ObjectHeader::new(TypeId(1), GLOBAL | VERSION_FORWARDED);
        assert_eq!(header.version(), Version::Empty);
    }

    #[test]
    fn test_header_size_constant() {
        assert_eq!(HEADER_SIZE, 16);
    }
}
