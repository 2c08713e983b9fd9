//! Object Module - transactional heap object model
//!
//! Addresses, the two-word header every object carries, and the layout
//! oracle that tells the heap where pointer fields live.

pub mod address;
pub mod header;
pub mod layout;
pub mod refmap;

pub use address::{round_up_for_allocation, Address, Space, WORD};
pub use header::{ObjectHeader, TypeId, Version, GLOBAL, HEADER_SIZE, WAS_COPIED};
pub use layout::{TypeDescriptor, TypeLayout, TypeRegistry};
pub use refmap::ReferenceMap;
