//! Concurrent commits from several worker threads

mod common;

use common::StmFixture;
use std::sync::{Arc, Barrier};
use std::thread;
use stmgc::Address;

const THREADS: usize = 4;
const ROUNDS: usize = 25;
const CHAIN: usize = 8;

/// Each worker owns one root and hangs a fresh chain off it every round
#[test]
fn test_disjoint_roots_commit_concurrently() {
    let fixture = StmFixture::with_page(256);
    let t = fixture.types;
    let mut main = fixture.main();
    let roots: Vec<Address> = (0..THREADS).map(|_| main.malloc(t.sr)).collect();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = roots
        .iter()
        .enumerate()
        .map(|(n, &root)| {
            let heap = Arc::clone(&fixture.heap);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut worker = heap.attach_worker().expect("worker attaches");
                barrier.wait();
                for round in 0..ROUNDS {
                    worker.start_transaction();
                    let mut head = None;
                    for i in 0..CHAIN {
                        let node = worker.malloc(t.sr);
                        worker.write_ptr(node, 0, head);
                        let leaf = worker.malloc(t.s);
                        worker.write_word(leaf, 0, n * 10_000 + round * 100 + i);
                        worker.write_ptr(node, 8, Some(leaf));
                        head = Some(node);
                    }
                    let copy = worker.materialize(root);
                    worker.write_ptr(copy, 0, head);
                    let report = worker.commit();
                    assert_eq!(report.promoted, 2 * CHAIN);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker thread panicked");
    }

    for (n, &root) in roots.iter().enumerate() {
        let mut node = main.read_ptr(root, 0);
        let mut expected = CHAIN;
        while let Some(current) = node {
            expected -= 1;
            assert!(main.is_global(current));
            let leaf = main.read_ptr(current, 8).expect("leaf present");
            assert_eq!(
                main.read_word(leaf, 0),
                n * 10_000 + (ROUNDS - 1) * 100 + expected
            );
            node = main.read_ptr(current, 0);
        }
        assert_eq!(expected, 0);
    }

    let stats = fixture.heap.stats();
    assert_eq!(stats.transactions_committed, (THREADS * ROUNDS) as u64);
    assert_eq!(stats.promotions, (THREADS * ROUNDS * 2 * CHAIN) as u64);
    assert_eq!(fixture.heap.live_workers(), 0);
}

/// Readers on other workers never see another transaction's private state
#[test]
fn test_uncommitted_writes_are_invisible() {
    let fixture = StmFixture::new();
    let t = fixture.types;
    let mut main = fixture.main();
    let counter = main.malloc(t.s);

    let mut writer = fixture.worker_in_transaction();
    let copy = writer.materialize(counter);
    writer.write_word(copy, 0, 7);

    let heap = Arc::clone(&fixture.heap);
    let seen = thread::spawn(move || {
        let mut reader = heap.attach_worker().expect("worker attaches");
        reader.start_transaction();
        let value = reader.read_word(counter, 0);
        reader.abort();
        value
    })
    .join()
    .expect("reader thread panicked");
    assert_eq!(seen, 0);

    writer.commit();
    assert_eq!(main.read_word(counter, 0), 7);
}

/// Identity tokens handed out on different threads never collide
#[test]
fn test_identity_tokens_from_many_threads() {
    let fixture = StmFixture::new();
    let t = fixture.types;

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let heap = Arc::clone(&fixture.heap);
            thread::spawn(move || {
                let mut worker = heap.attach_worker().expect("worker attaches");
                worker.start_transaction();
                let ids: Vec<usize> = (0..64)
                    .map(|_| {
                        let obj = worker.malloc(t.s);
                        worker.identity(obj).value()
                    })
                    .collect();
                worker.abort();
                ids
            })
        })
        .collect();

    let mut all: Vec<usize> = handles
        .into_iter()
        .flat_map(|h| h.join().expect("worker thread panicked"))
        .collect();
    let total = all.len();
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len(), total);
}
