/*!
# Video Presenter

Core types for compositing decoded video frames onto a presentation surface.

This crate is GPU-API agnostic: every GPU entry point goes through the
[`GraphicsDevice`](crate::device::GraphicsDevice) function table carried by a
[`GpuContext`](crate::device::GpuContext). Backends (see
`video_presenter_vulkan`) implement that table and the swapchain interface.

## Architecture

- **DescriptorRegistry**: descriptor-set layouts, pool, sets and batched updates
- **PipelineObject**: one graphics pipeline plus named binding groups
- **CommandRecorder**: one reusable command buffer with semaphore synchronization
- **FramePresenter**: per-frame orchestration (acquire, render, pace, present)

External collaborators (swapchain, frame source, shader loader, window) are
consumed through the traits in [`device`] and [`presenter`].
*/

// Internal modules
mod error;
mod runtime;
pub mod log;
pub mod device;
pub mod descriptor;
pub mod pipeline;
pub mod command;
pub mod presenter;

// Main vpresent namespace module
pub mod vpresent {
    // Error types
    pub use crate::error::{Error, Result};

    // Runtime singleton (logger registry)
    pub use crate::runtime::Runtime;

    // Logging sub-module (types only, macros are exported at the crate root)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // GPU context, device function table and external interfaces
    pub mod device {
        pub use crate::device::*;
    }

    // Presentation building blocks
    pub mod render {
        pub use crate::descriptor::*;
        pub use crate::pipeline::*;
        pub use crate::command::*;
    }

    // Orchestrator
    pub mod presenter {
        pub use crate::presenter::*;
    }
}

// Re-export math library at crate root
pub use glam;
