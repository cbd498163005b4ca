//! Frame pipelining primitives.
//!
//! The context lets up to `frame_queue_depth` frames be in flight. A
//! counting semaphore is acquired before a frame starts touching its
//! per-slot transient resources and released by the command buffer's GPU
//! completion handler, so the CPU blocks only when it gets a full queue
//! ahead of the GPU.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// A counting semaphore gating in-flight frames.
#[derive(Clone)]
pub struct FrameSemaphore {
    inner: Arc<SemaphoreInner>,
}

struct SemaphoreInner {
    count: Mutex<usize>,
    available: Condvar,
}

impl FrameSemaphore {
    /// Creates a semaphore with `depth` permits.
    pub fn new(depth: usize) -> FrameSemaphore {
        FrameSemaphore {
            inner: Arc::new(SemaphoreInner {
                count: Mutex::new(depth),
                available: Condvar::new(),
            }),
        }
    }

    /// Blocks until a permit is available and takes it.
    pub fn acquire(&self) {
        let mut count = self
            .inner
            .count
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while *count == 0 {
            count = self
                .inner
                .available
                .wait(count)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        *count -= 1;
    }

    /// Returns a permit. Called from command-buffer completion handlers.
    pub fn release(&self) {
        let mut count = self
            .inner
            .count
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *count += 1;
        self.inner.available.notify_one();
    }

    /// Permits currently available (for tests and teardown checks).
    pub fn available(&self) -> usize {
        *self
            .inner
            .count
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Completion tracking for one submitted command buffer.
///
/// Queries sample these flags to decide whether their results are ready.
#[derive(Clone, Default)]
pub struct ContextEvent {
    inner: Arc<EventInner>,
}

#[derive(Default)]
struct EventInner {
    submitted: AtomicBool,
    triggered: AtomicBool,
}

impl ContextEvent {
    /// Creates an untriggered event.
    pub fn new() -> ContextEvent {
        ContextEvent::default()
    }

    /// Marks the owning command buffer as submitted.
    pub fn mark_submitted(&self) {
        self.inner.submitted.store(true, Ordering::Release);
    }

    /// Marks the owning command buffer's GPU work as finished.
    pub fn trigger(&self) {
        self.inner.triggered.store(true, Ordering::Release);
    }

    /// Whether the owning command buffer was submitted.
    pub fn is_submitted(&self) -> bool {
        self.inner.submitted.load(Ordering::Acquire)
    }

    /// Whether the owning command buffer's GPU work finished.
    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::Acquire)
    }
}
