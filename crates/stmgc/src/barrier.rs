//! Barriers - the only way compiled code touches heap objects
//!
//! - **Write barrier** ([`Mutator::materialize`]): before the first store
//!   to a shared object inside a transaction, make a private working copy
//!   of it and hand that out instead. Stores then go to the copy.
//! - **Read barrier** ([`Mutator::read_word`]): a shared object that some
//!   transaction has copied is read through the caller's own copy, so a
//!   transaction always sees its own writes.
//! - **Stores** ([`Mutator::write_word`]): only to objects the caller owns.
//!   A worker storing to a shared object is a broken barrier discipline.

use crate::error::{OrFatal, Result, StmError};
use crate::mutator::{Location, Mutator};
use crate::object::{Address, ObjectHeader, Version};
use crate::transaction::TxPhase;

impl Mutator {
    /// Write barrier
    ///
    /// Returns the address the caller must store through: `obj` itself on
    /// the main thread or for private objects, otherwise the one private
    /// copy of `obj` made by this transaction.
    pub fn try_materialize(&mut self, obj: Address) -> Result<Address> {
        if self.is_main() {
            return Ok(obj);
        }

        let location = self.locate(obj)?;
        if location == Location::Private {
            return Ok(obj);
        }

        let heap = std::sync::Arc::clone(&self.heap);
        let thread = self.thread();
        let tx = self.tx_mut("materialize")?;
        tx.require_phase("materialize", TxPhase::Active)?;

        if let Some(copy) = tx.lookup(obj) {
            return Ok(copy);
        }

        let mut scope = heap.commit_scope();
        let mut original = scope.header(obj)?;
        if !original.is_global() {
            return Err(StmError::violation(
                "materialize",
                format!("shared object {} is not GLOBAL", obj),
            ));
        }
        let size = heap.object_size_of(original.type_id())?;

        let copy = tx.nursery.allocate(size)?;
        tx.nursery
            .bytes_mut(copy, size)?
            .copy_from_slice(scope.arena.bytes(obj, size)?);

        let mut header = ObjectHeader::new(original.type_id(), 0);
        header.set_version(Version::Original(obj));
        tx.nursery.set_header(copy, &header)?;
        tx.insert(obj, copy)?;

        original.set_copied();
        scope.arena.set_header(obj, &original)?;
        drop(scope);

        heap.stats_collector().record_materialize();
        log::trace!("thread {}: materialized {} as {}", thread, obj, copy);
        Ok(copy)
    }

    pub fn materialize(&mut self, obj: Address) -> Address {
        self.try_materialize(obj).or_fatal()
    }

    /// Read barrier for one word at payload `offset`
    pub fn try_read_word(&self, obj: Address, offset: usize) -> Result<usize> {
        let location = self.locate(obj)?;
        if location == Location::Private {
            let nursery = &self.tx_ref("read_word")?.nursery;
            let field = self.field_address(obj, &nursery.header(obj)?, offset)?;
            return nursery.read_word(field);
        }

        let shared = self.heap.read_shared();
        let header = shared.header(obj)?;
        if header.was_copied() {
            if let Some(copy) = self.private_copy_of(obj) {
                drop(shared);
                let nursery = &self.tx_ref("read_word")?.nursery;
                let field = self.field_address(copy, &header, offset)?;
                return nursery.read_word(field);
            }
        }
        let field = self.field_address(obj, &header, offset)?;
        shared.arena.read_word(field)
    }

    pub fn read_word(&self, obj: Address, offset: usize) -> usize {
        self.try_read_word(obj, offset).or_fatal()
    }

    /// Read a pointer field; `None` is null
    pub fn try_read_ptr(&self, obj: Address, offset: usize) -> Result<Option<Address>> {
        self.try_read_word(obj, offset).map(Address::new)
    }

    pub fn read_ptr(&self, obj: Address, offset: usize) -> Option<Address> {
        self.try_read_ptr(obj, offset).or_fatal()
    }

    /// Store one word at payload `offset`
    ///
    /// Workers may only store to private objects of an active transaction;
    /// the main thread stores to shared objects directly.
    pub fn try_write_word(&mut self, obj: Address, offset: usize, value: usize) -> Result<()> {
        match self.locate(obj)? {
            Location::Shared if self.is_main() => {
                let heap = std::sync::Arc::clone(&self.heap);
                let mut scope = heap.commit_scope();
                let header = scope.header(obj)?;
                let field = self.field_address(obj, &header, offset)?;
                scope.arena.write_word(field, value)
            }
            Location::Shared => {
                log::warn!(
                    "thread {}: store to shared object {} without write barrier",
                    self.thread(),
                    obj
                );
                Err(StmError::violation(
                    "write_word",
                    format!("store to shared object {} without materialize", obj),
                ))
            }
            Location::Private => {
                let header = self.tx_ref("write_word")?.nursery.header(obj)?;
                let field = self.field_address(obj, &header, offset)?;
                let tx = self.tx_mut("write_word")?;
                tx.require_phase("write_word", TxPhase::Active)?;
                tx.nursery.write_word(field, value)
            }
        }
    }

    pub fn write_word(&mut self, obj: Address, offset: usize, value: usize) {
        self.try_write_word(obj, offset, value).or_fatal()
    }

    /// Store a pointer field; `None` stores null
    pub fn try_write_ptr(
        &mut self,
        obj: Address,
        offset: usize,
        target: Option<Address>,
    ) -> Result<()> {
        self.try_write_word(obj, offset, Address::to_word(target))
    }

    pub fn write_ptr(&mut self, obj: Address, offset: usize, target: Option<Address>) {
        self.try_write_ptr(obj, offset, target).or_fatal()
    }

    /// Map an address to the object's shared identity where one exists
    ///
    /// Null stays null, a shared object is itself, a private working copy
    /// becomes its shared original, an object promoted by a commit still in
    /// progress becomes its twin, and a fresh private object is itself.
    pub fn try_normalize_global(&self, obj: Option<Address>) -> Result<Option<Address>> {
        let Some(obj) = obj else {
            return Ok(None);
        };
        match self.locate(obj)? {
            Location::Shared => Ok(Some(obj)),
            Location::Private => {
                let header = self.tx_ref("normalize_global")?.nursery.header(obj)?;
                Ok(Some(header.version().address().unwrap_or(obj)))
            }
        }
    }

    pub fn normalize_global(&self, obj: Option<Address>) -> Option<Address> {
        self.try_normalize_global(obj).or_fatal()
    }
}
