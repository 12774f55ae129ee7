/// VulkanSwapchain - Vulkan implementation of the presenter's Swapchain trait

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::collections::VecDeque;
use std::sync::Arc;
use winit::window::{Fullscreen, Window};

use video_presenter::vpresent::device::{
    Extent2D, FramebufferHandle, ImageHandle, ImageLayout, ImageViewHandle, RenderPassHandle,
    RenderTarget, RenderTargetLayout, SemaphoreHandle, SurfaceFormat, Swapchain, SyncPoint,
};
use video_presenter::vpresent::Result;
use video_presenter::{vp_bail, vp_debug, vp_err, vp_info, vp_warn};

use crate::vulkan_context::{vk_error, VulkanContext, SOURCE};
use crate::vulkan_format::surface_format_to_vk;
use crate::vulkan_handle::VkHandle;

/// Ownership of one swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackBufferState {
    /// Owned by the presentation engine
    Released,
    /// Handed to the caller by `acquire_next_back_buffer`
    Acquired,
    /// Dropped by the caller; still acquired from the presentation engine
    Recycled,
}

struct BackBuffer {
    image: vk::Image,
    view: vk::ImageView,
    framebuffer: vk::Framebuffer,
    sync: Arc<SyncPoint>,
    state: BackBufferState,
}

/// Window swapchain with one framebuffer per image.
///
/// Every back buffer carries a [`SyncPoint`] whose semaphore is signaled by
/// the acquire and waited on by whoever renders to it; the render submission
/// re-signals it and `present` waits on it. Acquires use a spare semaphore
/// that is swapped into the acquired image's sync point, since the image index
/// is unknown until the acquire returns.
///
/// Dropped back buffers are not returned to the presentation engine (Vulkan
/// has no way to release an image without presenting it). They are kept on a
/// recycle list and handed out again by the next acquire.
pub struct VulkanSwapchain {
    ctx: Arc<VulkanContext>,
    window: Arc<Window>,

    surface: vk::SurfaceKHR,
    loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    render_pass: vk::RenderPass,

    format: SurfaceFormat,
    extent: vk::Extent2D,
    back_buffers: Vec<BackBuffer>,
    recycled: VecDeque<u32>,
    spare_semaphore: vk::Semaphore,

    /// Requested image count, clamped to the surface limits at creation
    requested_count: u32,
    /// Images the caller may hold at once without blocking the acquire
    max_acquired: u32,

    fullscreen: bool,
    vsync: bool,
    initialized: bool,
}

impl VulkanSwapchain {
    pub(crate) fn new(ctx: Arc<VulkanContext>, window: Arc<Window>, back_buffer_count: u32) -> Result<Self> {
        if back_buffer_count < 2 {
            vp_bail!(SOURCE, InvalidArgument, "At least 2 back buffers are required (got {})", back_buffer_count);
        }
        unsafe {
            let display_handle = window
                .display_handle()
                .map_err(|e| vp_err!(SOURCE, BackendError, "Failed to get display handle: {}", e))?;
            let window_handle = window
                .window_handle()
                .map_err(|e| vp_err!(SOURCE, BackendError, "Failed to get window handle: {}", e))?;

            let surface = ash_window::create_surface(
                &ctx.entry,
                &ctx.instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| vk_error("vkCreateSurfaceKHR", e))?;

            let supported = ctx
                .surface_loader
                .get_physical_device_surface_support(ctx.physical_device, ctx.queue_family, surface)
                .unwrap_or(false);
            if !supported {
                ctx.surface_loader.destroy_surface(surface, None);
                vp_bail!(SOURCE, NotFound, "Queue family {} cannot present to this window", ctx.queue_family);
            }

            let loader = ash::khr::swapchain::Device::new(&ctx.instance, &ctx.device);
            let fullscreen = window.fullscreen().is_some();

            Ok(Self {
                ctx,
                window,
                surface,
                loader,
                swapchain: vk::SwapchainKHR::null(),
                render_pass: vk::RenderPass::null(),
                format: SurfaceFormat::Bgra8,
                extent: vk::Extent2D { width: 0, height: 0 },
                back_buffers: Vec::new(),
                recycled: VecDeque::new(),
                spare_semaphore: vk::Semaphore::null(),
                requested_count: back_buffer_count,
                max_acquired: 0,
                fullscreen,
                vsync: true,
                initialized: false,
            })
        }
    }

    /// Window this swapchain presents into
    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    /// Number of swapchain images (0 before `init`)
    pub fn image_count(&self) -> u32 {
        self.back_buffers.len() as u32
    }

    fn held_count(&self) -> u32 {
        self.back_buffers
            .iter()
            .filter(|b| b.state != BackBufferState::Released)
            .count() as u32
    }

    fn state_of(&self, index: u32) -> Option<BackBufferState> {
        self.back_buffers.get(index as usize).map(|b| b.state)
    }

    // ===== Creation =====

    unsafe fn create_render_pass(&self, format: vk::Format) -> Result<vk::RenderPass> {
        let attachments = [vk::AttachmentDescription::default()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)];

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)];

        // Acquire semaphore waits happen at color output; keep the layout
        // transition behind them
        let dependencies = [vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            dependency_flags: vk::DependencyFlags::empty(),
        }];

        let info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        self.ctx
            .device
            .create_render_pass(&info, None)
            .map_err(|e| vk_error("vkCreateRenderPass", e))
    }

    fn choose_present_mode(&self) -> vk::PresentModeKHR {
        if self.vsync {
            return vk::PresentModeKHR::FIFO;
        }
        let modes = unsafe {
            self.ctx
                .surface_loader
                .get_physical_device_surface_present_modes(self.ctx.physical_device, self.surface)
        }
        .unwrap_or_default();
        [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
            .into_iter()
            .find(|mode| modes.contains(mode))
            .unwrap_or(vk::PresentModeKHR::FIFO)
    }

    /// (Re)create the swapchain and per-image objects, replacing the current ones
    unsafe fn create_swapchain(&mut self, width: u32, height: u32) -> Result<()> {
        let ctx = Arc::clone(&self.ctx);
        let capabilities = ctx
            .surface_loader
            .get_physical_device_surface_capabilities(ctx.physical_device, self.surface)
            .map_err(|e| vk_error("vkGetPhysicalDeviceSurfaceCapabilitiesKHR", e))?;

        let extent = if capabilities.current_extent.width != u32::MAX {
            capabilities.current_extent
        } else {
            vk::Extent2D {
                width: width.clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
                height: height.clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
            }
        };
        if extent.width == 0 || extent.height == 0 {
            vp_bail!(SOURCE, InvalidArgument, "Surface has no drawable area ({}x{})", extent.width, extent.height);
        }

        let vk_format = surface_format_to_vk(self.format);
        let surface_formats = ctx
            .surface_loader
            .get_physical_device_surface_formats(ctx.physical_device, self.surface)
            .map_err(|e| vk_error("vkGetPhysicalDeviceSurfaceFormatsKHR", e))?;
        let color_space = match surface_formats.iter().find(|f| f.format == vk_format) {
            Some(f) => f.color_space,
            None => vp_bail!(SOURCE, FormatMismatch, "Surface does not support {:?}", self.format),
        };

        let mut image_count = self.requested_count.max(capabilities.min_image_count);
        if capabilities.max_image_count > 0 {
            image_count = image_count.min(capabilities.max_image_count);
        }

        let present_mode = self.choose_present_mode();
        let old_swapchain = self.swapchain;
        let info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(vk_format)
            .image_color_space(color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = self
            .loader
            .create_swapchain(&info, None)
            .map_err(|e| vk_error("vkCreateSwapchainKHR", e))?;

        // The old swapchain is retired by the create call whatever happens next
        self.destroy_back_buffers();
        if old_swapchain != vk::SwapchainKHR::null() {
            self.loader.destroy_swapchain(old_swapchain, None);
        }
        self.swapchain = swapchain;

        let images = match self.loader.get_swapchain_images(swapchain) {
            Ok(images) => images,
            Err(e) => {
                self.destroy_swapchain();
                return Err(vk_error("vkGetSwapchainImagesKHR", e));
            }
        };

        for image in images {
            match self.create_back_buffer(image, vk_format, extent) {
                Ok(back_buffer) => self.back_buffers.push(back_buffer),
                Err(e) => {
                    self.destroy_swapchain();
                    return Err(e);
                }
            }
        }

        let image_total = self.back_buffers.len() as u32;
        self.max_acquired = image_total.saturating_sub(capabilities.min_image_count).saturating_add(1).min(image_total);
        self.extent = extent;
        self.recycled.clear();

        vp_info!(SOURCE, "Swapchain {}x{} {:?}, {} images ({} acquirable), {:?}",
            extent.width, extent.height, self.format, image_total, self.max_acquired, present_mode);
        Ok(())
    }

    unsafe fn create_back_buffer(&self, image: vk::Image, format: vk::Format, extent: vk::Extent2D) -> Result<BackBuffer> {
        let device = &self.ctx.device;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = device
            .create_image_view(&view_info, None)
            .map_err(|e| vk_error("vkCreateImageView", e))?;

        let attachments = [view];
        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(self.render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        let framebuffer = match device.create_framebuffer(&framebuffer_info, None) {
            Ok(framebuffer) => framebuffer,
            Err(e) => {
                device.destroy_image_view(view, None);
                return Err(vk_error("vkCreateFramebuffer", e));
            }
        };

        let semaphore = match device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) {
            Ok(semaphore) => semaphore,
            Err(e) => {
                device.destroy_framebuffer(framebuffer, None);
                device.destroy_image_view(view, None);
                return Err(vk_error("vkCreateSemaphore", e));
            }
        };

        Ok(BackBuffer {
            image,
            view,
            framebuffer,
            sync: Arc::new(SyncPoint::new(SemaphoreHandle::from_vk(semaphore), ImageLayout::Undefined)),
            state: BackBufferState::Released,
        })
    }

    unsafe fn create_spare_semaphore(&mut self) -> Result<()> {
        let device = &self.ctx.device;
        if self.spare_semaphore != vk::Semaphore::null() {
            device.destroy_semaphore(self.spare_semaphore, None);
            self.spare_semaphore = vk::Semaphore::null();
        }
        self.spare_semaphore = device
            .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
            .map_err(|e| vk_error("vkCreateSemaphore", e))?;
        Ok(())
    }

    // ===== Destruction =====

    unsafe fn destroy_back_buffers(&mut self) {
        let device = &self.ctx.device;
        for back_buffer in self.back_buffers.drain(..) {
            device.destroy_semaphore(back_buffer.sync.semaphore().to_vk(), None);
            device.destroy_framebuffer(back_buffer.framebuffer, None);
            device.destroy_image_view(back_buffer.view, None);
        }
        self.recycled.clear();
        self.max_acquired = 0;
    }

    unsafe fn destroy_swapchain(&mut self) {
        self.destroy_back_buffers();
        if self.swapchain != vk::SwapchainKHR::null() {
            self.loader.destroy_swapchain(self.swapchain, None);
            self.swapchain = vk::SwapchainKHR::null();
        }
    }

    fn apply_fullscreen(&mut self, fullscreen: bool) {
        let current = self.window.fullscreen().is_some();
        if current != fullscreen {
            vp_debug!(SOURCE, "Switching window to {}", if fullscreen { "fullscreen" } else { "windowed" });
            self.window.set_fullscreen(if fullscreen { Some(Fullscreen::Borderless(None)) } else { None });
        }
        self.fullscreen = fullscreen;
    }
}

impl Swapchain for VulkanSwapchain {
    fn init(&mut self, width: u32, height: u32, format: SurfaceFormat) -> Result<()> {
        if self.initialized {
            vp_bail!(SOURCE, AlreadyInitialized, "Swapchain already initialized");
        }
        if width == 0 || height == 0 {
            vp_bail!(SOURCE, InvalidArgument, "Invalid swapchain size {}x{}", width, height);
        }
        if !format.is_presentable_input() {
            vp_bail!(SOURCE, FormatMismatch, "{:?} cannot be used as a back buffer format", format);
        }

        self.format = format;
        unsafe {
            let result = self
                .create_render_pass(surface_format_to_vk(format))
                .and_then(|render_pass| {
                    self.render_pass = render_pass;
                    self.create_spare_semaphore()
                })
                .and_then(|()| self.create_swapchain(width, height));

            if let Err(e) = result {
                self.initialized = true;
                self.terminate();
                return Err(e);
            }
        }
        self.initialized = true;
        Ok(())
    }

    fn terminate(&mut self) {
        if !self.initialized {
            return;
        }
        unsafe {
            self.ctx.device.device_wait_idle().ok();
            self.destroy_swapchain();
            if self.spare_semaphore != vk::Semaphore::null() {
                self.ctx.device.destroy_semaphore(self.spare_semaphore, None);
                self.spare_semaphore = vk::Semaphore::null();
            }
            if self.render_pass != vk::RenderPass::null() {
                self.ctx.device.destroy_render_pass(self.render_pass, None);
                self.render_pass = vk::RenderPass::null();
            }
        }
        self.extent = vk::Extent2D { width: 0, height: 0 };
        self.initialized = false;
        vp_debug!(SOURCE, "Swapchain terminated");
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn acquire_next_back_buffer(&mut self) -> Result<u32> {
        if !self.initialized {
            vp_bail!(SOURCE, NotInitialized, "Swapchain not initialized");
        }

        if let Some(index) = self.recycled.pop_front() {
            if let Some(back_buffer) = self.back_buffers.get_mut(index as usize) {
                back_buffer.state = BackBufferState::Acquired;
                return Ok(index);
            }
        }

        if self.held_count() >= self.max_acquired {
            vp_bail!(SOURCE, InputFull,
                "All {} acquirable back buffers are in use", self.max_acquired);
        }

        let (index, suboptimal) = unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, self.spare_semaphore, vk::Fence::null())
        }
        .map_err(|e| vk_error("vkAcquireNextImageKHR", e))?;
        if suboptimal {
            vp_debug!(SOURCE, "Swapchain is suboptimal for the surface");
        }

        let back_buffer = match self.back_buffers.get_mut(index as usize) {
            Some(back_buffer) => back_buffer,
            None => vp_bail!(SOURCE, OutOfRange, "Acquired image index {} out of range", index),
        };
        let previous = back_buffer.sync.replace_semaphore(SemaphoreHandle::from_vk(self.spare_semaphore));
        self.spare_semaphore = previous.to_vk();
        back_buffer.sync.mark_submitted();
        back_buffer.sync.set_layout(ImageLayout::Undefined);
        back_buffer.state = BackBufferState::Acquired;
        Ok(index)
    }

    fn back_buffer(&self, index: u32) -> Result<RenderTarget> {
        if !self.initialized {
            vp_bail!(SOURCE, NotInitialized, "Swapchain not initialized");
        }
        match self.back_buffers.get(index as usize) {
            Some(back_buffer) => Ok(RenderTarget {
                image: ImageHandle::from_vk(back_buffer.image),
                view: ImageViewHandle::from_vk(back_buffer.view),
                framebuffer: FramebufferHandle::from_vk(back_buffer.framebuffer),
                sync: Arc::clone(&back_buffer.sync),
                size: self.size(),
            }),
            None => vp_bail!(SOURCE, OutOfRange,
                "Back buffer index {} out of range (count: {})", index, self.back_buffers.len()),
        }
    }

    fn is_acquired(&self, index: u32) -> bool {
        self.state_of(index) == Some(BackBufferState::Acquired)
    }

    fn present(&mut self, index: u32, wait_for_vsync: bool) -> Result<()> {
        if self.state_of(index) != Some(BackBufferState::Acquired) {
            vp_bail!(SOURCE, NotFound, "Back buffer {} is not acquired", index);
        }
        if wait_for_vsync != self.vsync {
            // Present mode is fixed per swapchain; applied on the next resize
            vp_debug!(SOURCE, "VSync {} requested", if wait_for_vsync { "on" } else { "off" });
            self.vsync = wait_for_vsync;
        }

        let back_buffer = &mut self.back_buffers[index as usize];
        let wait_semaphores = if back_buffer.sync.take_submitted() {
            vec![back_buffer.sync.semaphore().to_vk()]
        } else {
            Vec::new()
        };
        back_buffer.state = BackBufferState::Released;

        let swapchains = [self.swapchain];
        let indices = [index];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        match unsafe { self.loader.queue_present(self.ctx.queue, &info) } {
            Ok(false) => Ok(()),
            Ok(true) => {
                vp_debug!(SOURCE, "Present reported a suboptimal swapchain");
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                vp_warn!(SOURCE, "Swapchain out of date during present");
                Err(vk_error("vkQueuePresentKHR", vk::Result::ERROR_OUT_OF_DATE_KHR))
            }
            Err(e) => Err(vk_error("vkQueuePresentKHR", e)),
        }
    }

    fn drop_back_buffer(&mut self, index: u32) -> Result<()> {
        match self.back_buffers.get_mut(index as usize) {
            Some(back_buffer) if back_buffer.state == BackBufferState::Acquired => {
                back_buffer.state = BackBufferState::Recycled;
                self.recycled.push_back(index);
                Ok(())
            }
            _ => vp_bail!(SOURCE, NotFound, "Back buffer {} is not acquired", index),
        }
    }

    fn resize(&mut self, width: u32, height: u32, fullscreen: bool) -> Result<()> {
        if !self.initialized {
            vp_bail!(SOURCE, NotInitialized, "Swapchain not initialized");
        }
        if width == 0 || height == 0 {
            vp_bail!(SOURCE, InvalidArgument, "Invalid swapchain size {}x{}", width, height);
        }

        self.apply_fullscreen(fullscreen);
        unsafe {
            self.ctx
                .device
                .device_wait_idle()
                .map_err(|e| vk_error("vkDeviceWaitIdle", e))?;
            self.create_spare_semaphore()?;
            self.create_swapchain(width, height)
        }
    }

    fn size(&self) -> Extent2D {
        Extent2D::new(self.extent.width, self.extent.height)
    }

    fn fullscreen_enabled(&self) -> bool {
        self.fullscreen
    }

    fn back_buffers_available(&self) -> u32 {
        if !self.initialized {
            return 0;
        }
        self.max_acquired.saturating_sub(self.held_count()) + self.recycled.len() as u32
    }

    fn back_buffers_acquired(&self) -> u32 {
        self.back_buffers
            .iter()
            .filter(|b| b.state == BackBufferState::Acquired)
            .count() as u32
    }

    fn render_target_layout(&self) -> RenderTargetLayout {
        RenderTargetLayout {
            render_pass: RenderPassHandle::from_vk(self.render_pass),
            subpass: 0,
            format: self.format,
        }
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        self.terminate();
        unsafe { self.ctx.surface_loader.destroy_surface(self.surface, None) };
    }
}
