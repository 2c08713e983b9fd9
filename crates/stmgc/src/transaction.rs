//! Per-transaction state
//!
//! A transaction owns its nursery and the object map from shared objects
//! to their private working copies. Nothing here is ever seen by another
//! thread; dropping a `TransactionLocal` is all it takes to discard a
//! transaction.

use crate::allocator::Arena;
use crate::commit::CommitReport;
use crate::error::{Result, StmError};
use crate::identity::IdentityToken;
use crate::object::Address;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::time::Instant;

/// Where a transaction stands in the commit sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPhase {
    /// Running; the barriers may be used
    Active,
    /// Pointers translated and private objects promoted; roots not yet applied
    Prepared,
    /// Root copies written onto their shared originals
    Applied,
    /// A commit step failed partway; only abort is accepted
    Failed,
}

pub(crate) struct TransactionLocal {
    pub(crate) nursery: Arena,
    /// shared original -> private copy, in materialization order
    pub(crate) object_map: IndexMap<Address, Address>,
    /// Tokens fabricated for private objects, keyed by private address
    pub(crate) local_ids: FxHashMap<Address, IdentityToken>,
    pub(crate) phase: TxPhase,
    pub(crate) report: CommitReport,
    pub(crate) commit_started: Option<Instant>,
}

impl TransactionLocal {
    pub(crate) fn new(nursery: Arena) -> Self {
        Self {
            nursery,
            object_map: IndexMap::new(),
            local_ids: FxHashMap::default(),
            phase: TxPhase::Active,
            report: CommitReport::default(),
            commit_started: None,
        }
    }

    #[inline]
    pub(crate) fn lookup(&self, shared: Address) -> Option<Address> {
        self.object_map.get(&shared).copied()
    }

    /// Record a private copy; each shared object is mapped at most once
    pub(crate) fn insert(&mut self, shared: Address, private: Address) -> Result<()> {
        if let Some(&existing) = self.object_map.get(&shared) {
            return Err(StmError::DuplicateMapping { shared, existing });
        }
        self.object_map.insert(shared, private);
        Ok(())
    }

    /// Every `(shared, private)` pair, in materialization order
    pub(crate) fn roots(&self) -> Vec<(Address, Address)> {
        self.object_map.iter().map(|(&s, &p)| (s, p)).collect()
    }

    pub(crate) fn require_phase(&self, operation: &'static str, phase: TxPhase) -> Result<()> {
        if self.phase != phase {
            return Err(StmError::violation(
                operation,
                format!("transaction is {:?}, expected {:?}", self.phase, phase),
            ));
        }
        Ok(())
    }
}
