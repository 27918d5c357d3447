//! Frame lifecycle types and frame-latency throttling.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::backend::RetireCallback;
use crate::texture::TextureId;

/// Lifecycle state of a [`DeviceResources`](crate::device::DeviceResources).
///
/// ```text
/// Uninitialized ──initialize──▶ Ready ──begin_frame──▶ InFrame ──end_frame──▶ Ready
///                                 │                       │
///                                 └──── device loss ──────┴──▶ Lost ──reinitialize──▶ Ready
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Uninitialized,
    Ready,
    InFrame,
    Lost,
}

/// Outcome of [`begin_frame`](crate::device::DeviceResources::begin_frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// A back buffer was acquired; render into it and call `end_frame`.
    Ready(TextureId),
    /// The frame was dropped (latency wait expired or the surface was not
    /// ready). The context stays in `Ready`; do not call `end_frame`.
    Skipped,
}

/// Slice of a latency wait between two backend polls.
const POLL_SLICE: Duration = Duration::from_millis(2);

/// Bounds the number of presented frames the GPU has not yet finished.
///
/// Every present registers a retire callback from
/// [`frame_submitted`](Self::frame_submitted); the backend fires it when the
/// frame's work completes. [`wait`](Self::wait) blocks while the in-flight
/// count is at the limit.
#[derive(Debug)]
pub struct FrameLatencyWaiter {
    max_in_flight: u32,
    shared: Arc<(Mutex<u32>, Condvar)>,
}

impl FrameLatencyWaiter {
    #[must_use]
    pub fn new(max_in_flight: u32) -> Self {
        Self {
            max_in_flight: max_in_flight.max(1),
            shared: Arc::new((Mutex::new(0), Condvar::new())),
        }
    }

    #[must_use]
    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight
    }

    #[must_use]
    pub fn in_flight(&self) -> u32 {
        *self.shared.0.lock()
    }

    /// Waits until another frame may start, calling `poll` between short
    /// sleeps so that retire callbacks get a chance to run.
    ///
    /// Returns `false` if `timeout` expires first.
    pub fn wait(&self, timeout: Duration, mut poll: impl FnMut()) -> bool {
        let deadline = Instant::now() + timeout;
        let (lock, cvar) = &*self.shared;
        let mut count = lock.lock();

        while *count >= self.max_in_flight {
            let now = Instant::now();
            if now >= deadline {
                log::warn!(
                    "Frame latency wait timed out with {} frames in flight",
                    *count
                );
                return false;
            }
            // Retire callbacks may run inside poll and take the lock.
            MutexGuard::unlocked(&mut count, &mut poll);
            if *count >= self.max_in_flight {
                cvar.wait_for(&mut count, POLL_SLICE.min(deadline - now));
            }
        }
        true
    }

    /// Records a presented frame and returns the callback that retires it.
    #[must_use]
    pub fn frame_submitted(&self) -> RetireCallback {
        *self.shared.0.lock() += 1;
        let shared = Arc::clone(&self.shared);
        Box::new(move || {
            let (lock, cvar) = &*shared;
            let mut count = lock.lock();
            *count = count.saturating_sub(1);
            cvar.notify_all();
        })
    }
}
