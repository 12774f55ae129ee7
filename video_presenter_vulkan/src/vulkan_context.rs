/// VulkanContext - instance, device, allocator and queue shared by the backend
///
/// Owned through an `Arc` by the device function table and by every
/// swapchain, so the logical device outlives all objects created from it.

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::CString;
use std::mem::ManuallyDrop;
use std::sync::Mutex;

use video_presenter::vpresent::{Error, Result};
use video_presenter::{vp_bail, vp_err, vp_error, vp_info};

use crate::vulkan_config::VulkanConfig;

pub(crate) const SOURCE: &str = "vpresent::vulkan";

/// Map a failed Vulkan call to a presenter error, logging it
pub(crate) fn vk_error(what: &str, result: vk::Result) -> Error {
    match result {
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
            vp_error!(SOURCE, "{} failed: out of memory ({:?})", what, result);
            Error::OutOfMemory
        }
        _ => vp_err!(SOURCE, BackendError, "{} failed: {:?}", what, result),
    }
}

pub struct VulkanContext {
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: ash::Device,

    /// Dropped before the device is destroyed
    pub(crate) allocator: ManuallyDrop<Mutex<Allocator>>,

    /// Graphics queue, also used for presentation
    pub(crate) queue: vk::Queue,
    pub(crate) queue_family: u32,

    pub(crate) surface_loader: ash::khr::surface::Instance,

    #[cfg(feature = "vulkan-validation")]
    debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanContext {
    /// Create instance, logical device and allocator for `window`.
    ///
    /// The queue family is the first one supporting both graphics and
    /// presentation to the window's surface.
    pub(crate) fn new<W: HasDisplayHandle + HasWindowHandle>(window: &W, config: &VulkanConfig) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load()
                .map_err(|e| vp_err!(SOURCE, BackendError, "Failed to load Vulkan library: {}", e))?;

            let app_name = CString::new(config.application_name.as_str())
                .map_err(|_| vp_err!(SOURCE, InvalidArgument, "Application name contains a NUL byte"))?;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"VideoPresenter")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_1);

            let display_handle = window
                .display_handle()
                .map_err(|e| vp_err!(SOURCE, BackendError, "Failed to get display handle: {}", e))?;
            let window_handle = window
                .window_handle()
                .map_err(|e| vp_err!(SOURCE, BackendError, "Failed to get window handle: {}", e))?;

            #[allow(unused_mut)]
            let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| vk_error("vkEnumerateInstanceExtensionProperties", e))?
                .to_vec();
            #[allow(unused_mut)]
            let mut layer_names: Vec<*const std::os::raw::c_char> = Vec::new();

            #[cfg(feature = "vulkan-validation")]
            if config.enable_validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
                layer_names.push(c"VK_LAYER_KHRONOS_validation".as_ptr());
            }

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| vk_error("vkCreateInstance", e))?;

            #[cfg(feature = "vulkan-validation")]
            let debug = if config.enable_validation {
                match crate::debug::create_messenger(&entry, &instance, config) {
                    Ok(debug) => Some(debug),
                    Err(e) => {
                        instance.destroy_instance(None);
                        return Err(e);
                    }
                }
            } else {
                None
            };

            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

            let selected = ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| vk_error("vkCreateSurfaceKHR", e))
            .and_then(|surface| {
                // Temporary surface, only used to pick a queue family
                let selected = Self::select_queue_family(&instance, &surface_loader, surface);
                surface_loader.destroy_surface(surface, None);
                selected
            });

            let (physical_device, queue_family) = match selected {
                Ok(selected) => selected,
                Err(e) => {
                    #[cfg(feature = "vulkan-validation")]
                    crate::debug::destroy_messenger(debug);
                    instance.destroy_instance(None);
                    return Err(e);
                }
            };

            let queue_priorities = [1.0];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(queue_family)
                .queue_priorities(&queue_priorities)];
            let device_extension_names = [ash::khr::swapchain::NAME.as_ptr()];
            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names);

            let device = match instance.create_device(physical_device, &device_create_info, None) {
                Ok(device) => device,
                Err(e) => {
                    #[cfg(feature = "vulkan-validation")]
                    crate::debug::destroy_messenger(debug);
                    instance.destroy_instance(None);
                    return Err(vk_error("vkCreateDevice", e));
                }
            };

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            });
            let allocator = match allocator {
                Ok(allocator) => allocator,
                Err(e) => {
                    device.destroy_device(None);
                    #[cfg(feature = "vulkan-validation")]
                    crate::debug::destroy_messenger(debug);
                    instance.destroy_instance(None);
                    vp_bail!(SOURCE, BackendError, "Failed to create GPU allocator: {}", e);
                }
            };

            let queue = device.get_device_queue(queue_family, 0);

            let properties = instance.get_physical_device_properties(physical_device);
            let name = properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string());
            vp_info!(SOURCE, "Vulkan device '{}' (queue family {})", name, queue_family);

            Ok(Self {
                entry,
                instance,
                physical_device,
                device,
                allocator: ManuallyDrop::new(Mutex::new(allocator)),
                queue,
                queue_family,
                surface_loader,
                #[cfg(feature = "vulkan-validation")]
                debug,
            })
        }
    }

    unsafe fn select_queue_family(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, u32)> {
        let physical_devices = instance
            .enumerate_physical_devices()
            .map_err(|e| vk_error("vkEnumeratePhysicalDevices", e))?;

        for physical_device in physical_devices {
            let families = instance.get_physical_device_queue_family_properties(physical_device);
            let family = families.iter().enumerate().find(|(index, family)| {
                family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                    && surface_loader
                        .get_physical_device_surface_support(physical_device, *index as u32, surface)
                        .unwrap_or(false)
            });
            if let Some((index, _)) = family {
                return Ok((physical_device, index as u32));
            }
        }

        vp_bail!(SOURCE, NotFound, "No GPU with a graphics queue that can present to the window");
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
            #[cfg(feature = "vulkan-validation")]
            crate::debug::destroy_messenger(self.debug.take());
            self.instance.destroy_instance(None);
        }
    }
}
