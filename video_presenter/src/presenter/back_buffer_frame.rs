/// BackBufferFrame - frame backed by a presenter-owned back buffer

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::device::{
    Extent2D, Frame, FrameId, FrameObserver, MemoryType, NativeTexture, RenderTarget, SurfaceFormat,
};
use crate::error::Result;
use crate::vp_bail;

const SOURCE: &str = "vpresent::BackBufferFrame";

/// Frame handed out by [`FramePresenter::alloc_frame`](super::FramePresenter::alloc_frame).
///
/// The producer renders straight into the back buffer, sets the timestamp and
/// passes the frame to `present`. Dropping the last reference returns the
/// back buffer to the presenter.
pub struct BackBufferFrame {
    id: FrameId,
    format: SurfaceFormat,
    index: u32,
    target: RenderTarget,
    pts: Mutex<Duration>,
    observers: Mutex<Vec<Arc<dyn FrameObserver>>>,
}

impl BackBufferFrame {
    pub(crate) fn new(format: SurfaceFormat, index: u32, target: RenderTarget) -> Self {
        Self {
            id: FrameId::next(),
            format,
            index,
            target,
            pts: Mutex::new(Duration::ZERO),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Swapchain index of the back buffer
    pub fn back_buffer_index(&self) -> u32 {
        self.index
    }

    pub fn render_target(&self) -> &RenderTarget {
        &self.target
    }

    pub fn set_pts(&self, pts: Duration) {
        match self.pts.lock() {
            Ok(mut current) => *current = pts,
            Err(poisoned) => *poisoned.into_inner() = pts,
        }
    }
}

impl Frame for BackBufferFrame {
    fn id(&self) -> FrameId {
        self.id
    }

    fn format(&self) -> SurfaceFormat {
        self.format
    }

    fn size(&self) -> Extent2D {
        self.target.size
    }

    fn pts(&self) -> Duration {
        match self.pts.lock() {
            Ok(pts) => *pts,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn memory_type(&self) -> MemoryType {
        MemoryType::Gpu
    }

    fn convert(&self, memory: MemoryType) -> Result<()> {
        if memory != MemoryType::Gpu {
            vp_bail!(SOURCE, InvalidArgument, "Back buffer frame {} cannot leave GPU memory", self.id);
        }
        Ok(())
    }

    fn native_texture(&self) -> Option<NativeTexture> {
        Some(NativeTexture {
            image: self.target.image,
            view: self.target.view,
            sync: Arc::clone(&self.target.sync),
            size: self.target.size,
        })
    }

    fn add_observer(&self, observer: Arc<dyn FrameObserver>) {
        match self.observers.lock() {
            Ok(mut observers) => observers.push(observer),
            Err(poisoned) => poisoned.into_inner().push(observer),
        }
    }

    fn remove_observer(&self, observer: &Arc<dyn FrameObserver>) {
        match self.observers.lock() {
            Ok(mut observers) => observers.retain(|o| !Arc::ptr_eq(o, observer)),
            Err(poisoned) => poisoned.into_inner().retain(|o| !Arc::ptr_eq(o, observer)),
        }
    }
}

impl Drop for BackBufferFrame {
    fn drop(&mut self) {
        let observers = match self.observers.get_mut() {
            Ok(observers) => std::mem::take(observers),
            Err(poisoned) => std::mem::take(poisoned.into_inner()),
        };
        for observer in observers {
            observer.on_frame_released(self.id);
        }
    }
}
