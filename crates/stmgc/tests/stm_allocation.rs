//! Allocation tests
//!
//! Bump-pointer contiguity, zeroed objects, and where each thread's
//! allocations land.

mod common;

use common::{StmFixture, S_SIZE, WR_SIZE};
use stmgc::{StmConfig, StmError};

#[test]
fn test_heap_creation_works() {
    let fixture = StmFixture::new();
    assert_eq!(fixture.heap.shared_used(), 0);
    assert_eq!(fixture.heap.live_workers(), 0);
}

#[test]
fn test_allocate_bump_pointer_is_contiguous() {
    let fixture = StmFixture::new();
    let mut worker = fixture.worker_in_transaction();

    let a3 = worker.allocate_bump_pointer(3);
    let a4 = worker.allocate_bump_pointer(4);
    let a5 = worker.allocate_bump_pointer(5);
    let a6 = worker.allocate_bump_pointer(6);

    assert_eq!(a4 - a3, 3);
    assert_eq!(a5 - a4, 4);
    assert_eq!(a6 - a5, 5);
    assert_eq!(worker.nursery_used(), 18);
}

#[test]
fn test_allocate_bump_pointer_on_main_uses_shared_arena() {
    let fixture = StmFixture::new();
    let mut main = fixture.main();

    let a = main.allocate_bump_pointer(7);
    let b = main.allocate_bump_pointer(9);
    assert_eq!(b - a, 7);
    assert_eq!(fixture.heap.shared_used(), 16);
}

#[test]
fn test_malloc_is_zeroed_and_distinct() {
    let fixture = StmFixture::new();
    let mut main = fixture.main();
    let t = fixture.types;

    let first = main.malloc(t.s);
    assert_eq!(main.read_word(first, 0), 0);
    assert_eq!(main.read_word(first, 8), 0);
    assert_eq!(main.read_word(first, 16), 0);

    let second = main.malloc(t.s);
    assert_ne!(first, second);
    assert_eq!(second - first, S_SIZE);
}

#[test]
fn test_malloc_main_vs_thread() {
    let fixture = StmFixture::new();
    let t = fixture.types;

    let mut main = fixture.main();
    let global = main.malloc(t.s);
    assert!(main.is_global(global));
    assert!(!main.was_copied(global));

    let mut worker = fixture.worker_in_transaction();
    let local = worker.malloc(t.s);
    assert!(!worker.is_global(local));
    assert!(!worker.was_copied(local));
    assert_eq!(fixture.heap.shared_used(), S_SIZE);
}

#[test]
fn test_object_sizes() {
    let fixture = StmFixture::new();
    let t = fixture.types;
    let mut main = fixture.main();

    let s = main.malloc(t.s);
    let sr = main.malloc(t.sr);
    let swr = main.malloc(t.swr);
    assert_eq!(fixture.heap.object_size(s).unwrap(), S_SIZE);
    assert_eq!(fixture.heap.object_size(sr).unwrap(), S_SIZE);
    assert_eq!(fixture.heap.object_size(swr).unwrap(), WR_SIZE);
    assert_eq!(fixture.heap.object_size_of(t.wr).unwrap(), WR_SIZE);
}

#[test]
fn test_nursery_exhaustion_reported_by_try_malloc() {
    let fixture = StmFixture::with_config(StmConfig {
        nursery_reserve: 64,
        ..Default::default()
    });
    let t = fixture.types;
    let mut worker = fixture.worker_in_transaction();

    worker.malloc(t.s);
    let err = worker.try_malloc(t.s).unwrap_err();
    assert!(err.is_exhaustion());
    assert!(matches!(err, StmError::OutOfAddressSpace { .. }));

    // The failed request did not move the bump pointer
    assert_eq!(worker.nursery_used(), S_SIZE);
    worker.abort();
}

#[test]
fn test_workers_have_disjoint_nurseries() {
    let fixture = StmFixture::new();
    let t = fixture.types;

    let mut w1 = fixture.worker_in_transaction();
    let mut w2 = fixture.worker_in_transaction();
    let a = w1.malloc(t.s);
    let b = w2.malloc(t.s);
    assert_ne!(a, b);

    // Each worker only sees its own nursery
    assert!(matches!(
        w1.try_header(b),
        Err(StmError::ForeignAddress { .. })
    ));
    assert!(matches!(
        w2.try_header(a),
        Err(StmError::ForeignAddress { .. })
    ));
}

#[test]
fn test_worker_numbers_are_recycled() {
    let fixture = StmFixture::new();
    let first = fixture.worker();
    let second = fixture.worker();
    assert_eq!(first.thread().0, 1);
    assert_eq!(second.thread().0, 2);

    drop(first);
    let third = fixture.worker();
    assert_eq!(third.thread().0, 1);
    assert_eq!(fixture.heap.live_workers(), 2);
}

#[test]
fn test_main_attaches_once() {
    let fixture = StmFixture::new();
    let main = fixture.main();
    assert!(fixture.heap.attach_main().is_err());
    drop(main);
    assert!(fixture.heap.attach_main().is_ok());
}
