/// SyncPoint - per-resource GPU synchronization state

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::device::handle::SemaphoreHandle;
use crate::device::types::ImageLayout;

/// Semaphore plus bookkeeping attached to a GPU image shared between queues.
///
/// `submitted` is set while a signal of the semaphore is pending on the GPU.
/// The next user of the resource must wait on the semaphore and clear the
/// flag; a resource that was never submitted needs no wait. The current image
/// layout travels with it so consecutive users know which transition to
/// record.
#[derive(Debug)]
pub struct SyncPoint {
    semaphore: AtomicU64,
    submitted: AtomicBool,
    layout: Mutex<ImageLayout>,
}

impl SyncPoint {
    pub fn new(semaphore: SemaphoreHandle, layout: ImageLayout) -> Self {
        Self {
            semaphore: AtomicU64::new(semaphore.as_raw()),
            submitted: AtomicBool::new(false),
            layout: Mutex::new(layout),
        }
    }

    pub fn semaphore(&self) -> SemaphoreHandle {
        SemaphoreHandle::from_raw(self.semaphore.load(Ordering::Acquire))
    }

    /// Swap in a different semaphore, returning the previous one.
    ///
    /// Used by swapchains that acquire with a spare semaphore before the
    /// image index is known.
    pub fn replace_semaphore(&self, semaphore: SemaphoreHandle) -> SemaphoreHandle {
        SemaphoreHandle::from_raw(self.semaphore.swap(semaphore.as_raw(), Ordering::AcqRel))
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted.load(Ordering::Acquire)
    }

    /// A signal of the semaphore is now pending on the GPU
    pub fn mark_submitted(&self) {
        self.submitted.store(true, Ordering::Release);
    }

    /// Consume the pending signal; returns whether a wait is required
    pub fn take_submitted(&self) -> bool {
        self.submitted.swap(false, Ordering::AcqRel)
    }

    pub fn layout(&self) -> ImageLayout {
        match self.layout.lock() {
            Ok(layout) => *layout,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set_layout(&self, layout: ImageLayout) {
        match self.layout.lock() {
            Ok(mut current) => *current = layout,
            Err(poisoned) => *poisoned.into_inner() = layout,
        }
    }
}
