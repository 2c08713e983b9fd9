//! # stmgc - Software-Transactional Heap
//!
//! stmgc gives every worker thread an isolated, mutable view of objects
//! that otherwise live in one shared heap, and folds that view back into
//! the shared heap when the worker's transaction commits.
//!
//! ## Overview
//!
//! - **Nursery allocation**: each transaction bump-allocates into its own
//!   nursery; the main thread allocates straight into the shared heap
//! - **Write barrier**: the first store to a shared object inside a
//!   transaction goes to a private copy made on demand
//! - **Commit**: private objects reachable from the written shared objects
//!   are promoted into the shared heap, pointers are rewritten, and the
//!   private copies are applied onto their originals in place
//! - **Identity**: identity and hash survive promotion
//! - **Weak references**: redirected to promoted targets, cleared when the
//!   target did not survive
//!
//! Conflict detection between concurrent transactions is not part of this
//! crate. Commits are serialized by the shared heap's lock; deciding which
//! transactions may commit is left to the caller.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use stmgc::object::{ReferenceMap, TypeDescriptor, TypeRegistry};
//! use stmgc::{StmConfig, StmHeap};
//!
//! fn main() -> Result<(), stmgc::StmError> {
//!     let mut types = TypeRegistry::new();
//!     let node = types.register(
//!         TypeDescriptor::new("Node", 16).with_refs(ReferenceMap::new(&[0])?),
//!     )?;
//!     let heap = StmHeap::new(StmConfig::default(), Arc::new(types))?;
//!
//!     let mut main = heap.attach_main()?;
//!     let list = main.try_malloc(node)?;
//!
//!     let mut worker = heap.attach_worker()?;
//!     worker.try_start_transaction()?;
//!     let head = worker.try_materialize(list)?;
//!     let fresh = worker.try_malloc(node)?;
//!     worker.try_write_word(fresh, 8, 42)?;
//!     worker.try_write_ptr(head, 0, Some(fresh))?;
//!     let report = worker.try_commit()?;
//!     assert_eq!(report.promoted, 1);
//!
//!     let promoted = main.try_read_ptr(list, 0)?.expect("node was promoted");
//!     assert_eq!(main.try_read_word(promoted, 8)?, 42);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                   Worker Threads (1, 2, ...)               │
//! │  ┌───────────────┐  ┌───────────────┐                      │
//! │  │ Nursery       │  │ Nursery       │   one per transaction│
//! │  │ Object map    │  │ Object map    │   shared -> private  │
//! │  └──────┬────────┘  └──────┬────────┘                      │
//! │         │ write barrier    │                               │
//! └─────────┼──────────────────┼───────────────────────────────┘
//!           │ commit           │ commit
//! ┌─────────▼──────────────────▼───────────────────────────────┐
//! │                      Shared Heap                           │
//! │  prepare: translate pointers, promote, resolve weak refs   │
//! │  apply:   overwrite written objects in place               │
//! │  end:     drop the nursery                                 │
//! └────────────────────────────────────────────────────────────┘
//!               ▲
//!               │ direct allocation and stores
//!        Main Thread (0)
//! ```
//!
//! ## Errors
//!
//! Every barrier and commit entry point comes in two forms. `try_*`
//! returns [`StmError`]; the plain form treats any error as a defect in the
//! calling runtime, logs it and panics.
//!
//! ## Modules
//!
//! - [`allocator`]: bump-pointer arenas and the promotion buffer
//! - [`config`]: heap configuration and validation
//! - [`error`]: error types
//! - [`heap`]: the shared heap, commit scopes and thread registration
//! - [`logging`]: structured transaction events
//! - [`object`]: addresses, headers and type layouts
//! - [`stats`]: counters

pub mod config;
pub mod error;

// Memory
pub mod allocator;
pub mod heap;
pub mod object;

// Transactional protocol
mod barrier;
pub mod commit;
pub mod identity;
pub mod mutator;
pub mod transaction;
mod weak;

// Monitoring
pub mod logging;
pub mod stats;

pub use commit::CommitReport;
pub use config::StmConfig;
pub use error::{Result, StmError};
pub use heap::StmHeap;
pub use identity::{mangle_hash, IdentityToken};
pub use mutator::{Mutator, ThreadNum};
pub use object::{Address, TypeId, TypeLayout, Version};
pub use transaction::TxPhase;

/// stmgc version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Create a heap configured from the environment
///
/// See [`StmConfig::from_env`] for the variables read.
pub fn init(layout: std::sync::Arc<dyn TypeLayout>) -> Result<std::sync::Arc<StmHeap>> {
    StmHeap::new(StmConfig::from_env(), layout)
}
