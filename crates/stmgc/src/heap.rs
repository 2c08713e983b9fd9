//! Heap Module - Shared Heap and Thread Registry
//!
//! `StmHeap` owns everything that outlives a single transaction: the
//! shared arena, the identity tokens recorded for shared objects, the
//! table of attached threads and the counters.
//!
//! ## Access to the shared heap
//!
//! The shared heap sits behind a read-write lock. Reads take the read
//! side. Every mutation goes through a [`CommitScope`], which wraps the
//! write side: holding one is the only way to write shared memory, so
//! a commit, a main-thread store or a `WAS_COPIED` update can never
//! interleave with another.

use crate::allocator::Arena;
use crate::config::StmConfig;
use crate::error::{Result, StmError};
use crate::identity::IdentityToken;
use crate::logging::{LogLevel, StmEvent, StmLogger, StmLoggerConfig};
use crate::mutator::{Mutator, ThreadNum};
use crate::object::address::{
    nursery_window_start, Address, Space, IDENTITY_SPACE_START, NURSERY_SPACE_START,
    SHARED_SPACE_START, WORD,
};
use crate::object::{ObjectHeader, TypeId, TypeLayout};
use crate::stats::{StatsSnapshot, StmStats};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use rustc_hash::FxHashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// State of the shared heap
pub struct SharedHeap {
    pub(crate) arena: Arena,
    /// Tokens fabricated before promotion, keyed by shared address
    pub(crate) identities: FxHashMap<Address, IdentityToken>,
}

impl SharedHeap {
    pub fn used(&self) -> usize {
        self.arena.used()
    }

    pub fn header(&self, obj: Address) -> Result<ObjectHeader> {
        self.arena.header(obj)
    }

    pub fn contains(&self, obj: Address) -> bool {
        self.arena.contains(obj)
    }
}

/// Exclusive access to the shared heap
///
/// Obtained from [`StmHeap::commit_scope`]; dropping it releases the heap.
pub struct CommitScope<'h> {
    guard: RwLockWriteGuard<'h, SharedHeap>,
}

impl Deref for CommitScope<'_> {
    type Target = SharedHeap;

    fn deref(&self) -> &SharedHeap {
        &self.guard
    }
}

impl DerefMut for CommitScope<'_> {
    fn deref_mut(&mut self) -> &mut SharedHeap {
        &mut self.guard
    }
}

#[derive(Debug, Default)]
struct ThreadTable {
    main_attached: bool,
    next_worker: u32,
    free: Vec<u32>,
    live_workers: usize,
}

/// The transactional heap
///
/// ## Thread Safety
///
/// `StmHeap` is shared between threads through an `Arc`. Each thread
/// attaches once and works through its own [`Mutator`].
pub struct StmHeap {
    config: StmConfig,
    layout: Arc<dyn TypeLayout>,
    shared: RwLock<SharedHeap>,
    threads: Mutex<ThreadTable>,
    next_token: AtomicUsize,
    stats: StmStats,
    logger: StmLogger,
}

impl StmHeap {
    /// Create a new heap
    ///
    /// # Returns
    /// The heap, or `Configuration` if `config` does not validate
    pub fn new(config: StmConfig, layout: Arc<dyn TypeLayout>) -> Result<Arc<Self>> {
        config
            .validate()
            .map_err(|e| StmError::Configuration(format!("Invalid configuration: {}", e)))?;

        let arena = Arena::new(
            SHARED_SPACE_START,
            config.shared_reserve,
            config.arena_chunk_size,
        )?;

        let logger = StmLogger::new(StmLoggerConfig {
            level: LogLevel::Debug,
            console: false,
            ..Default::default()
        });
        if !config.verbose {
            logger.disable();
        }

        log::debug!(
            "stm heap: shared reserve {:#x}, nursery reserve {:#x}, promotion page {}",
            config.shared_reserve,
            config.nursery_reserve,
            config.promotion_page_size
        );

        Ok(Arc::new(Self {
            stats: StmStats::new(config.stats_enabled),
            config,
            layout,
            shared: RwLock::new(SharedHeap {
                arena,
                identities: FxHashMap::default(),
            }),
            threads: Mutex::new(ThreadTable {
                next_worker: 1,
                ..Default::default()
            }),
            next_token: AtomicUsize::new(IDENTITY_SPACE_START),
            logger,
        }))
    }

    /// Bind the main thread
    ///
    /// Only one main-thread handle may exist at a time.
    pub fn attach_main(self: &Arc<Self>) -> Result<Mutator> {
        let mut threads = self.threads.lock();
        if threads.main_attached {
            return Err(StmError::violation(
                "attach_main",
                "main thread is already attached",
            ));
        }
        threads.main_attached = true;
        log::debug!("main thread attached");
        Ok(Mutator::new(Arc::clone(self), ThreadNum::MAIN))
    }

    /// Bind a transactional worker thread with its own nursery window
    pub fn attach_worker(self: &Arc<Self>) -> Result<Mutator> {
        let mut threads = self.threads.lock();
        let num = match threads.free.pop() {
            Some(num) => num,
            None => {
                if threads.next_worker > self.config.max_workers {
                    return Err(StmError::violation(
                        "attach_worker",
                        format!("more than {} workers attached", self.config.max_workers),
                    ));
                }
                let num = threads.next_worker;
                threads.next_worker += 1;
                num
            }
        };
        threads.live_workers += 1;
        log::debug!("worker thread {} attached", num);
        Ok(Mutator::new(Arc::clone(self), ThreadNum(num)))
    }

    pub(crate) fn detach(&self, thread: ThreadNum) {
        let mut threads = self.threads.lock();
        if thread.is_main() {
            threads.main_attached = false;
        } else {
            threads.live_workers -= 1;
            threads.free.push(thread.0);
        }
        log::debug!("thread {} detached", thread);
    }

    /// Number of attached worker threads
    pub fn live_workers(&self) -> usize {
        self.threads.lock().live_workers
    }

    /// Take exclusive access to the shared heap
    pub(crate) fn commit_scope(&self) -> CommitScope<'_> {
        CommitScope {
            guard: self.shared.write(),
        }
    }

    pub(crate) fn read_shared(&self) -> RwLockReadGuard<'_, SharedHeap> {
        self.shared.read()
    }

    /// Start of the nursery window of a worker
    pub(crate) fn nursery_start(&self, thread: ThreadNum) -> Result<usize> {
        nursery_window_start(thread.0, self.config.nursery_reserve).ok_or_else(|| {
            StmError::violation("nursery", format!("thread {} has no nursery window", thread))
        })
    }

    /// Classify an address against this heap's reservations
    pub fn space_of(&self, addr: Address) -> Space {
        Space::classify(addr, self.config.shared_reserve, self.config.nursery_reserve)
    }

    pub fn config(&self) -> &StmConfig {
        &self.config
    }

    pub fn layout(&self) -> &dyn TypeLayout {
        self.layout.as_ref()
    }

    /// Object size of a registered type
    pub fn object_size_of(&self, type_id: TypeId) -> Result<usize> {
        self.layout.object_size(type_id)
    }

    /// Size of a shared object, read from its header
    pub fn object_size(&self, obj: Address) -> Result<usize> {
        let header = self.read_shared().header(obj)?;
        self.object_size_of(header.type_id())
    }

    /// Bytes handed out by the shared arena
    pub fn shared_used(&self) -> usize {
        self.read_shared().used()
    }

    /// Address the next shared allocation will return
    pub fn shared_free_pointer(&self) -> usize {
        self.read_shared().arena.free_pointer()
    }

    /// Identity of a shared object: a recorded token, else its address
    pub(crate) fn shared_identity(&self, obj: Address) -> IdentityToken {
        self.read_shared()
            .identities
            .get(&obj)
            .copied()
            .unwrap_or_else(|| IdentityToken::from_address(obj))
    }

    /// Fabricate a fresh identity token
    ///
    /// Tokens come from the identity space, so they never collide with an
    /// object address, and are never handed out twice.
    pub(crate) fn fabricate_token(&self) -> Result<IdentityToken> {
        let raw = self.next_token.fetch_add(WORD, Ordering::Relaxed);
        if raw >= NURSERY_SPACE_START {
            return Err(StmError::OutOfAddressSpace {
                requested: WORD,
                available: 0,
            });
        }
        self.stats.record_token();
        Ok(IdentityToken::fabricated(raw))
    }

    pub(crate) fn stats_collector(&self) -> &StmStats {
        &self.stats
    }

    /// Record an event and hand it on to the process-wide logger
    pub(crate) fn emit(&self, event: StmEvent) {
        if !self.logger.is_enabled() {
            return;
        }
        self.logger.log(event.clone());
        crate::logging::log_event(event);
    }

    /// Get statistics snapshot
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Event log, populated only when `verbose` is set
    pub fn logger(&self) -> &StmLogger {
        &self.logger
    }

    /// Get detailed diagnostic information
    pub fn diagnostics(&self) -> IndexMap<String, String> {
        let mut diagnostics = IndexMap::new();

        {
            let shared = self.read_shared();
            diagnostics.insert("shared_used".to_string(), shared.used().to_string());
            diagnostics.insert(
                "shared_committed".to_string(),
                shared.arena.committed().to_string(),
            );
            diagnostics.insert(
                "shared_identities".to_string(),
                shared.identities.len().to_string(),
            );
        }

        {
            let threads = self.threads.lock();
            diagnostics.insert(
                "main_attached".to_string(),
                threads.main_attached.to_string(),
            );
            diagnostics.insert(
                "live_workers".to_string(),
                threads.live_workers.to_string(),
            );
        }

        let stats = self.stats.snapshot();
        diagnostics.insert(
            "transactions_committed".to_string(),
            stats.transactions_committed.to_string(),
        );
        diagnostics.insert("promotions".to_string(), stats.promotions.to_string());

        diagnostics
    }
}

impl std::fmt::Debug for StmHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StmHeap")
            .field("config", &self.config)
            .field("shared_used", &self.shared_used())
            .finish()
    }
}
