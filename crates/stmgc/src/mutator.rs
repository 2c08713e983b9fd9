//! Mutator - per-thread handle on the transactional heap
//!
//! A `Mutator` is what a thread gets when it attaches to an [`StmHeap`].
//! Thread 0 is the main thread: it allocates straight into the shared
//! heap and mutates shared objects in place, never inside a transaction.
//! Threads 1, 2, 3... are transactional workers: everything they allocate
//! or write lands in the nursery of their current transaction until it
//! commits.
//!
//! The barriers, identity queries and the commit protocol are implemented
//! on `Mutator` in their own modules.

use crate::allocator::Arena;
use crate::error::{OrFatal, Result, StmError};
use crate::heap::StmHeap;
use crate::logging::StmEvent;
use crate::object::address::{Space, WORD};
use crate::object::{Address, ObjectHeader, TypeId, Version, GLOBAL, HEADER_SIZE};
use crate::transaction::{TransactionLocal, TxPhase};
use std::fmt;
use std::sync::Arc;

/// Thread number; 0 is the main thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadNum(pub u32);

impl ThreadNum {
    pub const MAIN: ThreadNum = ThreadNum(0);

    #[inline]
    pub fn is_main(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ThreadNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which memory an object lives in, from the caller's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Location {
    /// Nursery of the caller's transaction
    Private,
    Shared,
}

/// Per-thread handle; dropping it detaches the thread
pub struct Mutator {
    pub(crate) heap: Arc<StmHeap>,
    thread: ThreadNum,
    pub(crate) tx: Option<TransactionLocal>,
}

impl Mutator {
    pub(crate) fn new(heap: Arc<StmHeap>, thread: ThreadNum) -> Self {
        Self {
            heap,
            thread,
            tx: None,
        }
    }

    #[inline]
    pub fn thread(&self) -> ThreadNum {
        self.thread
    }

    #[inline]
    pub fn is_main(&self) -> bool {
        self.thread.is_main()
    }

    pub fn heap(&self) -> &Arc<StmHeap> {
        &self.heap
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Commit phase of the open transaction, if any
    pub fn phase(&self) -> Option<TxPhase> {
        self.tx.as_ref().map(|tx| tx.phase)
    }

    // ------------------------------------------------------------------
    // Transaction boundaries
    // ------------------------------------------------------------------

    /// Open a transaction with an empty nursery and object map
    pub fn try_start_transaction(&mut self) -> Result<()> {
        if self.is_main() {
            return Err(StmError::violation(
                "start_transaction",
                "the main thread never runs transactions",
            ));
        }
        if self.tx.is_some() {
            return Err(StmError::TransactionAlreadyActive {
                thread: self.thread.0,
            });
        }

        let config = self.heap.config();
        let nursery = Arena::new(
            self.heap.nursery_start(self.thread)?,
            config.nursery_reserve,
            config.arena_chunk_size,
        )?;
        self.tx = Some(TransactionLocal::new(nursery));

        self.heap.stats_collector().record_start();
        self.heap.emit(StmEvent::TransactionStart {
            thread: self.thread.0,
        });
        log::debug!("thread {}: transaction started", self.thread);
        Ok(())
    }

    pub fn start_transaction(&mut self) {
        self.try_start_transaction().or_fatal()
    }

    /// Discard the open transaction without touching shared objects
    ///
    /// Allowed until the roots have been applied; after that the only way
    /// out is `end_transaction`.
    pub fn try_abort(&mut self) -> Result<()> {
        let tx = self.tx_ref("abort")?;
        if tx.phase == TxPhase::Applied {
            return Err(StmError::violation(
                "abort",
                "roots were already applied to the shared heap",
            ));
        }

        if let Some(tx) = self.tx.take() {
            self.heap.stats_collector().record_abort();
            self.heap.emit(StmEvent::TransactionAbort {
                thread: self.thread.0,
                roots: tx.object_map.len(),
            });
            log::debug!(
                "thread {}: transaction aborted, {} private copies discarded",
                self.thread,
                tx.object_map.len()
            );
        }
        Ok(())
    }

    pub fn abort(&mut self) {
        self.try_abort().or_fatal()
    }

    pub(crate) fn tx_ref(&self, operation: &'static str) -> Result<&TransactionLocal> {
        self.tx
            .as_ref()
            .ok_or(StmError::NoActiveTransaction { operation })
    }

    pub(crate) fn tx_mut(&mut self, operation: &'static str) -> Result<&mut TransactionLocal> {
        self.tx
            .as_mut()
            .ok_or(StmError::NoActiveTransaction { operation })
    }

    // ------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------

    /// Raw bump allocation in the caller's arena
    ///
    /// The shared arena on the main thread, the transaction's nursery
    /// otherwise. Sizes are not rounded.
    pub fn try_allocate_bump_pointer(&mut self, size: usize) -> Result<Address> {
        if self.is_main() {
            return self.heap.commit_scope().arena.allocate(size);
        }
        self.tx_mut("allocate_bump_pointer")?.nursery.allocate(size)
    }

    pub fn allocate_bump_pointer(&mut self, size: usize) -> Address {
        self.try_allocate_bump_pointer(size).or_fatal()
    }

    /// Allocate a zeroed object of a registered type
    ///
    /// `GLOBAL` on the main thread, private everywhere else.
    pub fn try_malloc(&mut self, type_id: TypeId) -> Result<Address> {
        let size = self.heap.object_size_of(type_id)?;

        let obj = if self.is_main() {
            let mut scope = self.heap.commit_scope();
            let obj = scope.arena.allocate(size)?;
            scope
                .arena
                .set_header(obj, &ObjectHeader::new(type_id, GLOBAL))?;
            obj
        } else {
            let tx = self.tx_mut("malloc")?;
            tx.require_phase("malloc", TxPhase::Active)?;
            let obj = tx.nursery.allocate(size)?;
            tx.nursery.set_header(obj, &ObjectHeader::new(type_id, 0))?;
            obj
        };

        log::trace!(
            "thread {}: malloc {:?} ({} bytes) at {}",
            self.thread,
            type_id,
            size,
            obj
        );
        Ok(obj)
    }

    pub fn malloc(&mut self, type_id: TypeId) -> Address {
        self.try_malloc(type_id).or_fatal()
    }

    // ------------------------------------------------------------------
    // Header access
    // ------------------------------------------------------------------

    pub(crate) fn locate(&self, obj: Address) -> Result<Location> {
        if let Some(tx) = &self.tx {
            if tx.nursery.contains(obj) {
                return Ok(Location::Private);
            }
        }
        match self.heap.space_of(obj) {
            Space::Shared => Ok(Location::Shared),
            _ => Err(StmError::ForeignAddress {
                address: obj,
                thread: self.thread.0,
            }),
        }
    }

    pub fn try_header(&self, obj: Address) -> Result<ObjectHeader> {
        match self.locate(obj)? {
            Location::Private => self.tx_ref("header")?.nursery.header(obj),
            Location::Shared => self.heap.read_shared().header(obj),
        }
    }

    pub fn header(&self, obj: Address) -> ObjectHeader {
        self.try_header(obj).or_fatal()
    }

    pub fn is_global(&self, obj: Address) -> bool {
        self.header(obj).is_global()
    }

    pub fn was_copied(&self, obj: Address) -> bool {
        self.header(obj).was_copied()
    }

    pub fn version(&self, obj: Address) -> Version {
        self.header(obj).version()
    }

    /// Check that a word at payload `offset` lies inside the object
    pub(crate) fn field_address(
        &self,
        obj: Address,
        header: &ObjectHeader,
        offset: usize,
    ) -> Result<Address> {
        let payload = self
            .heap
            .layout()
            .payload_size(header.type_id())
            .ok_or(StmError::UnknownType(header.type_id()))?;
        let invalid = StmError::InvalidAccess {
            address: obj.as_usize().saturating_add(HEADER_SIZE + offset),
            len: WORD,
        };
        match offset.checked_add(WORD) {
            Some(end) if end <= payload => obj.add(HEADER_SIZE + offset).ok_or(invalid),
            _ => Err(invalid),
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Private copy of `shared` made by the open transaction
    pub fn private_copy_of(&self, shared: Address) -> Option<Address> {
        self.tx.as_ref().and_then(|tx| tx.lookup(shared))
    }

    /// `(shared, private)` pairs of the open transaction
    pub fn roots(&self) -> Vec<(Address, Address)> {
        self.tx.as_ref().map(|tx| tx.roots()).unwrap_or_default()
    }

    /// Bytes allocated in the open transaction's nursery
    pub fn nursery_used(&self) -> usize {
        self.tx.as_ref().map_or(0, |tx| tx.nursery.used())
    }
}

impl Drop for Mutator {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            if tx.phase != TxPhase::Applied {
                self.heap.stats_collector().record_abort();
                self.heap.emit(StmEvent::TransactionAbort {
                    thread: self.thread.0,
                    roots: tx.object_map.len(),
                });
            }
            log::debug!(
                "thread {}: detached with an open {:?} transaction",
                self.thread,
                tx.phase
            );
        }
        self.heap.detach(self.thread);
    }
}

impl fmt::Debug for Mutator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutator")
            .field("thread", &self.thread)
            .field("phase", &self.phase())
            .field("nursery_used", &self.nursery_used())
            .finish()
    }
}
