//! Weak reference resolution at commit

mod common;

use common::StmFixture;

#[test]
fn test_weakref_to_global() {
    let fixture = StmFixture::new();
    let t = fixture.types;
    let mut main = fixture.main();
    let swr1 = main.malloc(t.swr);
    let s2 = main.malloc(t.s);

    let mut worker = fixture.worker_in_transaction();
    let wr1 = worker.malloc(t.wr);
    worker.write_ptr(wr1, 0, Some(s2));
    let twr1 = worker.materialize(swr1);
    worker.write_ptr(twr1, 0, Some(wr1));

    let report = worker.commit();
    assert_eq!(report.weak_redirected, 0);
    assert_eq!(report.weak_cleared, 0);

    let wr2 = main.read_ptr(swr1, 0).expect("weakref was promoted");
    assert_ne!(wr2, wr1);
    // survives
    assert_eq!(main.read_ptr(wr2, 0), Some(s2));
}

#[test]
fn test_weakref_to_local_dying() {
    let fixture = StmFixture::new();
    let t = fixture.types;
    let mut main = fixture.main();
    let swr1 = main.malloc(t.swr);

    let mut worker = fixture.worker_in_transaction();
    let t2 = worker.malloc(t.s);
    let wr1 = worker.malloc(t.wr);
    worker.write_ptr(wr1, 0, Some(t2));
    let twr1 = worker.materialize(swr1);
    worker.write_ptr(twr1, 0, Some(wr1));

    let report = worker.commit();
    assert_eq!(report.promoted, 1);
    assert_eq!(report.weak_cleared, 1);

    let wr2 = main.read_ptr(swr1, 0).expect("weakref was promoted");
    assert_ne!(wr2, wr1);
    // dies
    assert_eq!(main.read_ptr(wr2, 0), None);
    assert_eq!(fixture.heap.stats().weak_cleared, 1);
}

#[test]
fn test_weakref_to_local_surviving() {
    let fixture = StmFixture::new();
    let t = fixture.types;
    let mut main = fixture.main();
    let sr1 = main.malloc(t.sr);
    let swr1 = main.malloc(t.swr);

    let mut worker = fixture.worker_in_transaction();
    let t2 = worker.malloc(t.s);
    let wr1 = worker.malloc(t.wr);
    worker.write_ptr(wr1, 0, Some(t2));
    let twr1 = worker.materialize(swr1);
    worker.write_ptr(twr1, 0, Some(wr1));
    let tr1 = worker.materialize(sr1);
    worker.write_ptr(tr1, 0, Some(t2));
    worker.write_word(t2, 0, 4242);

    let report = worker.commit();
    assert_eq!(report.promoted, 2);
    assert_eq!(report.weak_redirected, 1);

    let wr2 = main.read_ptr(swr1, 0).expect("weakref was promoted");
    assert_ne!(wr2, wr1);
    // survives
    let target = main.read_ptr(wr2, 0).expect("weak target survives");
    assert_ne!(target, t2);
    assert_eq!(main.read_word(target, 0), 4242);
    assert_eq!(main.read_ptr(sr1, 0), Some(target));
}

#[test]
fn test_weakref_in_root_copy_is_resolved() {
    let fixture = StmFixture::new();
    let t = fixture.types;
    let mut main = fixture.main();
    let weak = main.malloc(t.wr);
    let holder = main.malloc(t.sr);

    let mut worker = fixture.worker_in_transaction();
    let dying = worker.malloc(t.s);
    let surviving = worker.malloc(t.s);
    let holder_copy = worker.materialize(holder);
    worker.write_ptr(holder_copy, 0, Some(surviving));

    let weak_copy = worker.materialize(weak);
    worker.write_ptr(weak_copy, 0, Some(dying));
    let report = worker.prepare_commit();
    assert_eq!(report.weak_cleared, 1);
    assert_eq!(worker.read_ptr(weak_copy, 0), None);
    worker.abort();

    worker.start_transaction();
    let surviving = worker.malloc(t.s);
    let holder_copy = worker.materialize(holder);
    worker.write_ptr(holder_copy, 0, Some(surviving));
    let weak_copy = worker.materialize(weak);
    worker.write_ptr(weak_copy, 0, Some(surviving));
    worker.commit();

    let twin = main.read_ptr(holder, 0).expect("surviving object was promoted");
    assert_eq!(main.read_ptr(weak, 0), Some(twin));
}
