//! Commit protocol
//!
//! Committing a transaction publishes its private state in three steps:
//!
//! 1. **Prepare**: translate every pointer field of every root's private
//!    copy. A pointer to a root's copy becomes the root's shared address;
//!    a pointer to a fresh private object promotes that object into the
//!    shared heap and becomes the twin's address. Twins are translated in
//!    turn through an explicit worklist, and the forwarding pointer left
//!    on each promoted object keeps cycles and shared substructure from
//!    being copied twice. Weak fields are resolved once the live set is
//!    known.
//! 2. **Apply**: overwrite each root's shared payload with its translated
//!    private copy. Shared objects keep their addresses.
//! 3. **End**: drop the nursery; whatever was not promoted is gone.
//!
//! All shared-heap writes happen while holding a [`CommitScope`].

use crate::allocator::PromotionBuffer;
use crate::error::{OrFatal, Result, StmError};
use crate::heap::{CommitScope, SharedHeap};
use crate::logging::StmEvent;
use crate::mutator::{Mutator, ThreadNum};
use crate::object::address::WORD;
use crate::object::{Address, ObjectHeader, TypeLayout, Version, GLOBAL, HEADER_SIZE};
use crate::transaction::{TransactionLocal, TxPhase};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of a commit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    /// Shared objects written by the transaction
    pub roots: usize,
    /// Private objects copied into the shared heap
    pub promoted: usize,
    pub bytes_promoted: usize,
    /// Shared arena growth, including page rounding
    pub shared_bytes_consumed: usize,
    pub weak_redirected: usize,
    pub weak_cleared: usize,
}

/// An object being worked on, and which memory it lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Located {
    /// A root's private copy, in the nursery
    Nursery(Address),
    /// A promoted twin, in the shared heap
    Shared(Address),
}

pub(crate) struct Committer<'a> {
    pub(crate) layout: &'a dyn TypeLayout,
    pub(crate) shared: &'a mut SharedHeap,
    pub(crate) tx: &'a mut TransactionLocal,
    pub(crate) thread: ThreadNum,
    /// private copy -> shared original
    pub(crate) root_of: FxHashMap<Address, Address>,
    buffer: PromotionBuffer,
    worklist: Vec<Located>,
    pub(crate) weak_holders: Vec<Located>,
    pub(crate) report: CommitReport,
}

impl<'a> Committer<'a> {
    pub(crate) fn new(
        layout: &'a dyn TypeLayout,
        shared: &'a mut SharedHeap,
        tx: &'a mut TransactionLocal,
        thread: ThreadNum,
        page_size: usize,
    ) -> Self {
        let root_of = tx
            .object_map
            .iter()
            .map(|(&shared, &private)| (private, shared))
            .collect();

        Self {
            layout,
            shared,
            tx,
            thread,
            root_of,
            buffer: PromotionBuffer::new(page_size),
            worklist: Vec::new(),
            weak_holders: Vec::new(),
            report: CommitReport::default(),
        }
    }

    /// Translate every root, promote what they reach, resolve weak fields
    pub(crate) fn prepare(mut self) -> Result<CommitReport> {
        let roots = self.tx.roots();
        self.report.roots = roots.len();
        self.worklist
            .extend(roots.iter().map(|&(_, private)| Located::Nursery(private)));

        while let Some(item) = self.worklist.pop() {
            self.translate_fields(item)?;
        }

        self.resolve_weak_refs()?;

        self.report.shared_bytes_consumed = self.buffer.reserved();
        Ok(self.report)
    }

    fn translate_fields(&mut self, item: Located) -> Result<()> {
        let type_id = self.header_of(item)?.type_id();
        if self.layout.weak_field_offset(type_id).is_some() {
            self.weak_holders.push(item);
        }

        let mut offsets = Vec::new();
        self.layout.trace(type_id, &mut |offset| offsets.push(offset));

        for offset in offsets {
            let value = self.read_field(item, offset)?;
            let translated = self.translate(value)?;
            if translated != value {
                self.write_field(item, offset, translated)?;
            }
        }
        Ok(())
    }

    /// New value for a strong pointer field
    fn translate(&mut self, value: usize) -> Result<usize> {
        let Some(ptr) = Address::new(value) else {
            return Ok(0);
        };

        if let Some(&shared) = self.root_of.get(&ptr) {
            return Ok(shared.as_usize());
        }

        if self.tx.nursery.contains(ptr) {
            let header = self.tx.nursery.header(ptr)?;
            return match header.version() {
                Version::Forwarded(twin) => Ok(twin.as_usize()),
                Version::Original(shared) => Err(StmError::MissingPrivateCopy {
                    shared,
                    private: ptr,
                }),
                Version::Empty => self.promote(ptr, header).map(Address::as_usize),
            };
        }

        if self.shared.contains(ptr) {
            return Ok(value);
        }

        Err(StmError::ForeignAddress {
            address: ptr,
            thread: self.thread.0,
        })
    }

    /// Copy a fresh private object into the shared heap
    fn promote(&mut self, private: Address, mut header: ObjectHeader) -> Result<Address> {
        let type_id = header.type_id();
        let size = self.layout.object_size(type_id)?;

        let twin = self.buffer.allocate(&mut self.shared.arena, size)?;
        self.shared
            .arena
            .bytes_mut(twin, size)?
            .copy_from_slice(self.tx.nursery.bytes(private, size)?);
        self.shared
            .arena
            .set_header(twin, &ObjectHeader::new(type_id, GLOBAL))?;

        if !header.try_set_forwarding(twin) {
            return Err(StmError::violation(
                "commit",
                format!("private object {} promoted twice", private),
            ));
        }
        self.tx.nursery.set_header(private, &header)?;

        if let Some(token) = self.tx.local_ids.remove(&private) {
            self.shared.identities.insert(twin, token);
        }

        self.report.promoted += 1;
        self.report.bytes_promoted += size;
        self.worklist.push(Located::Shared(twin));

        log::trace!(
            "thread {}: promoted {} to {} ({} bytes)",
            self.thread,
            private,
            twin,
            size
        );
        Ok(twin)
    }

    pub(crate) fn header_of(&self, item: Located) -> Result<ObjectHeader> {
        match item {
            Located::Nursery(obj) => self.tx.nursery.header(obj),
            Located::Shared(obj) => self.shared.arena.header(obj),
        }
    }

    pub(crate) fn read_field(&self, item: Located, offset: usize) -> Result<usize> {
        match item {
            Located::Nursery(obj) => self.tx.nursery.read_word(field(obj, offset)?),
            Located::Shared(obj) => self.shared.arena.read_word(field(obj, offset)?),
        }
    }

    pub(crate) fn write_field(&mut self, item: Located, offset: usize, value: usize) -> Result<()> {
        match item {
            Located::Nursery(obj) => self.tx.nursery.write_word(field(obj, offset)?, value),
            Located::Shared(obj) => self.shared.arena.write_word(field(obj, offset)?, value),
        }
    }
}

fn field(obj: Address, offset: usize) -> Result<Address> {
    obj.add(HEADER_SIZE + offset).ok_or(StmError::InvalidAccess {
        address: obj.as_usize(),
        len: HEADER_SIZE + offset + WORD,
    })
}

/// Overwrite every root's shared payload with its private copy
fn apply_roots(
    layout: &dyn TypeLayout,
    shared: &mut SharedHeap,
    tx: &TransactionLocal,
) -> Result<()> {
    for (&original, &copy) in &tx.object_map {
        let size = layout.object_size(tx.nursery.header(copy)?.type_id())?;
        let payload = size - HEADER_SIZE;
        shared
            .arena
            .bytes_mut(field(original, 0)?, payload)?
            .copy_from_slice(tx.nursery.bytes(field(copy, 0)?, payload)?);
    }
    Ok(())
}

impl Mutator {
    fn prepare_in(&mut self, scope: &mut CommitScope<'_>) -> Result<CommitReport> {
        let heap = Arc::clone(&self.heap);
        let thread = self.thread();
        let tx = self.tx_mut("prepare_commit")?;
        tx.require_phase("prepare_commit", TxPhase::Active)?;
        tx.commit_started = Some(Instant::now());

        let prepared = Committer::new(
            heap.layout(),
            &mut **scope,
            &mut *tx,
            thread,
            heap.config().promotion_page_size,
        )
        .prepare();
        let report = match prepared {
            Ok(report) => report,
            Err(e) => {
                // Nursery objects may already be forwarded to shared twins
                tx.phase = TxPhase::Failed;
                log::error!("thread {}: commit preparation failed: {}", thread, e);
                return Err(e);
            }
        };

        tx.report = report.clone();
        tx.phase = TxPhase::Prepared;
        log::debug!(
            "thread {}: prepared commit of {} roots, {} promoted",
            thread,
            report.roots,
            report.promoted
        );
        Ok(report)
    }

    fn apply_in(&mut self, scope: &mut CommitScope<'_>) -> Result<()> {
        let heap = Arc::clone(&self.heap);
        let tx = self.tx_mut("apply_roots")?;
        tx.require_phase("apply_roots", TxPhase::Prepared)?;
        if let Err(e) = apply_roots(heap.layout(), &mut **scope, tx) {
            tx.phase = TxPhase::Failed;
            log::error!("applying root copies failed: {}", e);
            return Err(e);
        }
        tx.phase = TxPhase::Applied;
        Ok(())
    }

    /// Step 1 of a commit: translate, promote and resolve weak fields
    ///
    /// Shared objects that were written by the transaction are left
    /// untouched; their private copies now hold translated pointers.
    pub fn try_prepare_commit(&mut self) -> Result<CommitReport> {
        let heap = Arc::clone(&self.heap);
        let mut scope = heap.commit_scope();
        self.prepare_in(&mut scope)
    }

    pub fn prepare_commit(&mut self) -> CommitReport {
        self.try_prepare_commit().or_fatal()
    }

    /// Step 2 of a commit: write each root's private copy onto its original
    pub fn try_apply_roots(&mut self) -> Result<()> {
        let heap = Arc::clone(&self.heap);
        let mut scope = heap.commit_scope();
        self.apply_in(&mut scope)
    }

    pub fn apply_roots(&mut self) {
        self.try_apply_roots().or_fatal()
    }

    /// Step 3 of a commit: release the nursery and close the transaction
    pub fn try_end_transaction(&mut self) -> Result<CommitReport> {
        self.tx_ref("end_transaction")?
            .require_phase("end_transaction", TxPhase::Applied)?;
        let tx = self
            .tx
            .take()
            .ok_or(StmError::NoActiveTransaction {
                operation: "end_transaction",
            })?;

        let report = tx.report;
        let duration_us = tx
            .commit_started
            .map_or(0, |started| started.elapsed().as_micros() as u64);
        let thread = self.thread().0;

        self.heap.stats_collector().record_commit(
            report.promoted,
            report.bytes_promoted,
            report.weak_redirected,
            report.weak_cleared,
        );
        self.heap.emit(StmEvent::CommitEnd {
            thread,
            roots: report.roots,
            promoted: report.promoted,
            bytes_promoted: report.bytes_promoted,
            weak_redirected: report.weak_redirected,
            weak_cleared: report.weak_cleared,
            duration_us,
        });
        self.heap.emit(StmEvent::NurseryReset {
            thread,
            bytes: tx.nursery.used(),
        });
        log::debug!(
            "thread {}: committed in {} us, nursery of {} bytes released",
            thread,
            duration_us,
            tx.nursery.used()
        );
        Ok(report)
    }

    pub fn end_transaction(&mut self) -> CommitReport {
        self.try_end_transaction().or_fatal()
    }

    /// Commit the open transaction: prepare, apply and end in one go
    pub fn try_commit(&mut self) -> Result<CommitReport> {
        let heap = Arc::clone(&self.heap);
        {
            let mut scope = heap.commit_scope();
            self.tx_ref("commit")?;
            self.prepare_in(&mut scope)?;
            self.apply_in(&mut scope)?;
        }
        self.try_end_transaction()
    }

    pub fn commit(&mut self) -> CommitReport {
        self.try_commit().or_fatal()
    }
}
