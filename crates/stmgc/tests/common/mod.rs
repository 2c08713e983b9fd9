//! Shared fixture for the integration tests
//!
//! Registers the four object shapes the scenarios are written against:
//!
//! - `S`: three plain words
//! - `SR`: three pointer fields at offsets 0, 8 and 16
//! - `WR`: one weak field at offset 0
//! - `SWR`: one strong pointer at offset 0, used to hold a `WR`

#![allow(dead_code)]

use std::sync::Arc;
use stmgc::object::{ReferenceMap, TypeDescriptor, TypeRegistry};
use stmgc::{Address, Mutator, StmConfig, StmHeap, TypeId};

/// Object size of `S` and `SR`: header plus three words
pub const S_SIZE: usize = 40;

/// Object size of `WR` and `SWR`: header plus one word
pub const WR_SIZE: usize = 24;

#[derive(Debug, Clone, Copy)]
pub struct Types {
    pub s: TypeId,
    pub sr: TypeId,
    pub wr: TypeId,
    pub swr: TypeId,
}

pub struct StmFixture {
    pub heap: Arc<StmHeap>,
    pub types: Types,
}

impl StmFixture {
    /// Fixture with the default configuration
    pub fn new() -> Self {
        Self::with_config(StmConfig::default())
    }

    /// Fixture whose commits claim shared memory `page` bytes at a time
    pub fn with_page(page: usize) -> Self {
        Self::with_config(StmConfig {
            promotion_page_size: page,
            ..Default::default()
        })
    }

    pub fn with_config(config: StmConfig) -> Self {
        let mut registry = TypeRegistry::new();
        let s = registry
            .register(TypeDescriptor::new("S", 24))
            .expect("S registers");
        let sr = registry
            .register(
                TypeDescriptor::new("SR", 24)
                    .with_refs(ReferenceMap::new(&[0, 8, 16]).expect("valid offsets")),
            )
            .expect("SR registers");
        let wr = registry
            .register(TypeDescriptor::new("WR", 8).with_weak_field(0))
            .expect("WR registers");
        let swr = registry
            .register(
                TypeDescriptor::new("SWR", 8)
                    .with_refs(ReferenceMap::new(&[0]).expect("valid offsets")),
            )
            .expect("SWR registers");

        let heap = StmHeap::new(config, Arc::new(registry))
            .expect("heap initialization should succeed with valid config");

        Self {
            heap,
            types: Types { s, sr, wr, swr },
        }
    }

    pub fn main(&self) -> Mutator {
        self.heap.attach_main().expect("main thread attaches once")
    }

    pub fn worker(&self) -> Mutator {
        self.heap.attach_worker().expect("worker attaches")
    }

    /// A worker with an open transaction
    pub fn worker_in_transaction(&self) -> Mutator {
        let mut worker = self.worker();
        worker.start_transaction();
        worker
    }
}

impl Default for StmFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocate a shared `S` holding `(a, b, c)` from the main thread
pub fn shared_s(main: &mut Mutator, types: &Types, words: [usize; 3]) -> Address {
    let obj = main.malloc(types.s);
    for (i, word) in words.into_iter().enumerate() {
        main.write_word(obj, i * 8, word);
    }
    obj
}
