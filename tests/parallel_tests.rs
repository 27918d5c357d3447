//! Parallel Dispatcher Tests

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Barrier, Mutex};
use std::thread;

use loupe::loupe_core::{DispatchStrategy, Dispatcher};

fn pooled(workers: usize) -> Dispatcher {
    Dispatcher::new(NonZeroUsize::new(workers).unwrap())
}

#[test]
fn zero_times_never_invokes_work() {
    let calls = AtomicUsize::new(0);
    pooled(4).run_parallel(
        |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        },
        0,
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn single_invocation_runs_on_caller_thread() {
    let caller = thread::current().id();
    let observed = Mutex::new(None);
    pooled(8).run_parallel(|i| *observed.lock().unwrap() = Some((i, thread::current().id())), 1);
    assert_eq!(*observed.lock().unwrap(), Some((0, caller)));
}

#[test]
fn every_index_runs_exactly_once() {
    let counts: Vec<AtomicUsize> = (0..1000).map(|_| AtomicUsize::new(0)).collect();
    pooled(6).run_parallel(
        |i| {
            counts[i].fetch_add(1, Ordering::SeqCst);
        },
        counts.len(),
    );
    assert!(counts.iter().all(|c| c.load(Ordering::SeqCst) == 1));
}

#[test]
fn pooled_work_runs_concurrently() {
    // Deadlocks unless all four invocations are live at the same time.
    let barrier = Barrier::new(4);
    let passed = AtomicUsize::new(0);
    pooled(4).run_parallel(
        |_| {
            barrier.wait();
            passed.fetch_add(1, Ordering::SeqCst);
        },
        4,
    );
    assert_eq!(passed.load(Ordering::SeqCst), 4);
}

#[test]
fn sequential_runs_in_ascending_order_on_caller() {
    let caller = thread::current().id();
    let order = Mutex::new(Vec::new());
    let dispatcher = Dispatcher::sequential();
    assert_eq!(dispatcher.strategy(), DispatchStrategy::Sequential);
    dispatcher.run_parallel(
        |i| {
            assert_eq!(thread::current().id(), caller);
            order.lock().unwrap().push(i);
        },
        16,
    );
    assert_eq!(*order.lock().unwrap(), (0..16).collect::<Vec<_>>());
}

#[test]
fn collect_preserves_index_order() {
    let squares = pooled(3).run_parallel_collect(|i| i * i, 50);
    assert_eq!(squares, (0..50).map(|i| i * i).collect::<Vec<_>>());
}

#[test]
fn one_worker_means_sequential() {
    assert_eq!(pooled(1).strategy(), DispatchStrategy::Sequential);
    assert!(matches!(
        pooled(2).strategy(),
        DispatchStrategy::Pooled { workers } if workers.get() == 2
    ));
}
