//! Opaque GPU object handles
//!
//! Every GPU object crossing the device function table is a typed 64-bit
//! handle. Backends convert to and from their native handles with
//! [`from_raw`](BufferHandle::from_raw) / [`as_raw`](BufferHandle::as_raw);
//! zero is the null handle.

macro_rules! define_handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
            pub struct $name(u64);

            impl $name {
                pub const NULL: Self = Self(0);

                pub const fn from_raw(raw: u64) -> Self {
                    Self(raw)
                }

                pub const fn as_raw(self) -> u64 {
                    self.0
                }

                pub const fn is_null(self) -> bool {
                    self.0 == 0
                }
            }
        )*
    };
}

define_handle!(
    BufferHandle,
    ImageHandle,
    ImageViewHandle,
    SamplerHandle,
    SemaphoreHandle,
    FenceHandle,
    ShaderModuleHandle,
    DescriptorSetLayoutHandle,
    DescriptorPoolHandle,
    DescriptorSetHandle,
    PipelineLayoutHandle,
    PipelineHandle,
    RenderPassHandle,
    FramebufferHandle,
    CommandPoolHandle,
    CommandBufferHandle,
    /// Command-submission queue
    QueueHandle,
);
