//! AdmissionGate concurrency-bound, timeout, and fairness suites.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use corral::observe::PrefixedNamer;
use corral::{AdmissionGate, CancelToken};
use parking_lot::Mutex;

use common::{init_test_logging, spawn_named};

#[test]
fn concurrency_never_exceeds_capacity() {
    init_test_logging();
    let gate = Arc::new(AdmissionGate::new(3).unwrap());
    let concurrent = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let namer = PrefixedNamer::new("holder");

    let mut workers = Vec::new();
    for _ in 0..10 {
        let gate = Arc::clone(&gate);
        let concurrent = Arc::clone(&concurrent);
        let peak = Arc::clone(&peak);
        workers.push(spawn_named(&namer, move || {
            let token = CancelToken::new();
            gate.enter(&token).unwrap();
            let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            concurrent.fetch_sub(1, Ordering::SeqCst);
            gate.leave().unwrap();
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3, "capacity bound violated");
    assert!(peak.load(Ordering::SeqCst) >= 2, "gate admitted one at a time");
    assert_eq!(concurrent.load(Ordering::SeqCst), 0, "holders drained");
    assert_eq!(gate.approx_available(), 3);
}

#[test]
fn try_enter_and_timeout_respect_a_full_gate() {
    init_test_logging();
    let gate = AdmissionGate::new(1).unwrap();
    let token = CancelToken::new();

    assert!(gate.try_enter(), "first admission must succeed");
    assert!(!gate.try_enter(), "non-blocking attempt must fail when full");

    let t0 = Instant::now();
    let admitted = gate
        .try_enter_for(&token, Duration::from_millis(50))
        .unwrap();
    let elapsed = t0.elapsed();
    assert!(!admitted, "timed attempt must fail while full");
    assert!(
        elapsed >= Duration::from_millis(45),
        "timeout must be respected, waited {elapsed:?}"
    );

    gate.leave().unwrap();
    assert!(gate.try_enter(), "admission must succeed after a leave");
    gate.leave().unwrap();
}

#[test]
fn admission_follows_arrival_order() {
    init_test_logging();
    // One slot, three staggered waiters: admissions must replay the order in
    // which the waiters started waiting.
    let gate = Arc::new(AdmissionGate::new(1).unwrap());
    let order = Arc::new(Mutex::new(Vec::new()));
    let namer = PrefixedNamer::new("queued");

    let token = CancelToken::new();
    gate.enter(&token).unwrap(); // hold the slot while the queue forms

    let mut starters = Vec::new();
    let mut workers = Vec::new();
    for id in 1..=3 {
        let (tx, rx) = mpsc::channel::<()>();
        starters.push(tx);
        let gate = Arc::clone(&gate);
        let order = Arc::clone(&order);
        workers.push(spawn_named(&namer, move || {
            rx.recv().unwrap();
            let token = CancelToken::new();
            gate.enter(&token).unwrap();
            order.lock().push(id);
            std::thread::sleep(Duration::from_millis(20));
            gate.leave().unwrap();
        }));
    }

    for tx in &starters {
        tx.send(()).unwrap();
        std::thread::sleep(Duration::from_millis(20));
    }
    while gate.queued() < 3 {
        std::thread::yield_now();
    }
    gate.leave().unwrap();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(*order.lock(), vec![1, 2, 3]);
}

#[test]
fn timed_waiter_keeps_its_place_in_line() {
    init_test_logging();
    // A timed waiter at the head must not be overtaken by try_enter while it
    // still has time left.
    let gate = Arc::new(AdmissionGate::new(1).unwrap());
    let token = CancelToken::new();
    gate.enter(&token).unwrap();

    let waiter = {
        let gate = Arc::clone(&gate);
        std::thread::spawn(move || {
            let token = CancelToken::new();
            gate.try_enter_for(&token, Duration::from_millis(500))
        })
    };
    while gate.queued() < 1 {
        std::thread::yield_now();
    }

    assert!(!gate.try_enter(), "barging past a queued waiter");
    gate.leave().unwrap();

    assert!(waiter.join().unwrap().unwrap(), "queued waiter admitted");
    gate.leave().unwrap();
}
