//! Index-parameterized fan-out across worker threads.
//!
//! [`Dispatcher::run_parallel`] executes `work(i)` for every `i` in
//! `0..times`, exactly once each, and returns only after all invocations have
//! finished. Indices are claimed from a shared atomic counter, so their
//! execution order across threads is unspecified.
//!
//! A dispatcher runs with one of two strategies. [`DispatchStrategy::Pooled`]
//! spawns scoped worker threads for each call and lets the calling thread work
//! alongside them. [`DispatchStrategy::Sequential`] runs every index on the
//! calling thread in order. A pooled dispatcher that fails to spawn a worker
//! still completes the call, then switches to the sequential strategy for the
//! rest of its lifetime.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use parking_lot::Mutex;

/// How a [`Dispatcher`] distributes work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStrategy {
    /// Up to `workers` threads in total, the calling thread included.
    Pooled { workers: NonZeroUsize },
    /// Every index on the calling thread, in ascending order.
    Sequential,
}

#[derive(Debug)]
pub struct Dispatcher {
    strategy: DispatchStrategy,
    degraded: AtomicBool,
    /// Number of upcoming worker spawns to refuse.
    #[cfg(test)]
    refused_spawns: AtomicUsize,
}

impl Default for Dispatcher {
    fn default() -> Self {
        let workers = thread::available_parallelism().unwrap_or(NonZeroUsize::MIN);
        Self::new(workers)
    }
}

impl Dispatcher {
    /// Creates a pooled dispatcher. A single worker is equivalent to
    /// [`Dispatcher::sequential`].
    #[must_use]
    pub fn new(workers: NonZeroUsize) -> Self {
        let strategy = if workers.get() == 1 {
            DispatchStrategy::Sequential
        } else {
            DispatchStrategy::Pooled { workers }
        };
        Self {
            strategy,
            degraded: AtomicBool::new(false),
            #[cfg(test)]
            refused_spawns: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn sequential() -> Self {
        Self {
            strategy: DispatchStrategy::Sequential,
            degraded: AtomicBool::new(false),
            #[cfg(test)]
            refused_spawns: AtomicUsize::new(0),
        }
    }

    /// The strategy the next call will use.
    #[must_use]
    pub fn strategy(&self) -> DispatchStrategy {
        if self.degraded.load(Ordering::Acquire) {
            DispatchStrategy::Sequential
        } else {
            self.strategy
        }
    }

    /// Invokes `work(i)` once for every `i` in `0..times` and blocks until all
    /// invocations return.
    ///
    /// `times == 1` runs `work(0)` inline without touching any thread.
    pub fn run_parallel<F>(&self, work: F, times: usize)
    where
        F: Fn(usize) + Sync,
    {
        match times {
            0 => {}
            1 => work(0),
            _ => match self.strategy() {
                DispatchStrategy::Sequential => (0..times).for_each(&work),
                DispatchStrategy::Pooled { workers } => self.run_pooled(&work, times, workers),
            },
        }
    }

    /// Like [`run_parallel`](Self::run_parallel), collecting one result per
    /// index in index order.
    pub fn run_parallel_collect<T, F>(&self, work: F, times: usize) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync,
    {
        let slots: Vec<Mutex<Option<T>>> = (0..times).map(|_| Mutex::new(None)).collect();
        self.run_parallel(|i| *slots[i].lock() = Some(work(i)), times);
        slots.into_iter().filter_map(|slot| slot.into_inner()).collect()
    }

    fn run_pooled<F>(&self, work: &F, times: usize, workers: NonZeroUsize)
    where
        F: Fn(usize) + Sync,
    {
        let next = AtomicUsize::new(0);
        let drain = || {
            loop {
                let index = next.fetch_add(1, Ordering::Relaxed);
                if index >= times {
                    break;
                }
                work(index);
            }
        };

        // The calling thread counts as one worker.
        let helpers = workers.get().min(times) - 1;

        thread::scope(|scope| {
            for n in 0..helpers {
                let spawned = if self.spawn_refused() {
                    Err(std::io::Error::other("worker spawn refused"))
                } else {
                    thread::Builder::new()
                        .name(format!("loupe-dispatch-{n}"))
                        .spawn_scoped(scope, drain)
                };
                if let Err(e) = spawned {
                    log::warn!(
                        "Failed to spawn dispatch worker ({e}), falling back to sequential execution"
                    );
                    self.degraded.store(true, Ordering::Release);
                    break;
                }
            }
            drain();
        });
    }

    #[cfg(test)]
    fn spawn_refused(&self) -> bool {
        self.refused_spawns
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    #[cfg(not(test))]
    #[inline]
    fn spawn_refused(&self) -> bool {
        false
    }
}
