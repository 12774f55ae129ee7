/// Frame source interface - decoded frames handed to the presenter

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::device::handle::{ImageHandle, ImageViewHandle};
use crate::device::sync::SyncPoint;
use crate::device::types::{Extent2D, MemoryType, SurfaceFormat};

/// Process-unique frame identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u64);

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

impl FrameId {
    /// Allocate a fresh identity
    pub fn next() -> Self {
        Self(NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// GPU image backing a frame once it lives in GPU memory
#[derive(Debug, Clone)]
pub struct NativeTexture {
    pub image: ImageHandle,
    pub view: ImageViewHandle,
    pub sync: Arc<SyncPoint>,
    pub size: Extent2D,
}

/// Notified when a frame is released by its last holder
pub trait FrameObserver: Send + Sync {
    fn on_frame_released(&self, frame: FrameId);
}

/// A decoded frame.
///
/// Implementations notify every registered observer exactly once when the
/// frame is released (typically from `Drop`).
pub trait Frame: Send + Sync {
    fn id(&self) -> FrameId;

    fn format(&self) -> SurfaceFormat;

    fn size(&self) -> Extent2D;

    /// Presentation timestamp relative to the start of the stream
    fn pts(&self) -> Duration;

    fn memory_type(&self) -> MemoryType;

    /// Move the frame into `memory`; no-op if it already lives there
    fn convert(&self, memory: MemoryType) -> Result<()>;

    /// GPU image of the frame, `None` while it is not GPU-resident
    fn native_texture(&self) -> Option<NativeTexture>;

    fn add_observer(&self, observer: Arc<dyn FrameObserver>);

    fn remove_observer(&self, observer: &Arc<dyn FrameObserver>);
}
