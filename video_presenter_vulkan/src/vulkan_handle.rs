//! Conversions between the presenter's opaque handles and `ash` handles
//!
//! Both sides are 64-bit values, so a conversion is a bit-for-bit copy.

use ash::vk::{self, Handle};
use video_presenter::vpresent::device::*;

/// Opaque presenter handle backed by a Vulkan object
pub(crate) trait VkHandle: Copy {
    type Vk: Handle + Copy;

    fn to_vk(self) -> Self::Vk;

    fn from_vk(handle: Self::Vk) -> Self;
}

macro_rules! vk_handles {
    ($($ours:ident => $theirs:ident),* $(,)?) => {
        $(
            impl VkHandle for $ours {
                type Vk = vk::$theirs;

                fn to_vk(self) -> vk::$theirs {
                    vk::$theirs::from_raw(self.as_raw())
                }

                fn from_vk(handle: vk::$theirs) -> Self {
                    $ours::from_raw(handle.as_raw())
                }
            }
        )*
    };
}

vk_handles!(
    BufferHandle => Buffer,
    ImageHandle => Image,
    ImageViewHandle => ImageView,
    SamplerHandle => Sampler,
    SemaphoreHandle => Semaphore,
    FenceHandle => Fence,
    ShaderModuleHandle => ShaderModule,
    DescriptorSetLayoutHandle => DescriptorSetLayout,
    DescriptorPoolHandle => DescriptorPool,
    DescriptorSetHandle => DescriptorSet,
    PipelineLayoutHandle => PipelineLayout,
    PipelineHandle => Pipeline,
    RenderPassHandle => RenderPass,
    FramebufferHandle => Framebuffer,
    CommandPoolHandle => CommandPool,
    CommandBufferHandle => CommandBuffer,
    QueueHandle => Queue,
);
