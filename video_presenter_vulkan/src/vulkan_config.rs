/// VulkanConfig - backend creation parameters

/// Which validation messages reach the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSeverity {
    ErrorsOnly,
    ErrorsAndWarnings,
    All,
}

/// Parameters of [`VulkanDevice::new`](crate::VulkanDevice::new) and the swapchains it creates
#[derive(Debug, Clone)]
pub struct VulkanConfig {
    /// Reported to the driver in `VkApplicationInfo`
    pub application_name: String,

    /// Enable VK_LAYER_KHRONOS_validation and the debug messenger.
    /// Only honored when built with the `vulkan-validation` feature.
    pub enable_validation: bool,

    pub debug_severity: DebugSeverity,

    /// Abort the process on the first validation error
    pub break_on_validation_error: bool,

    /// Back buffers requested from the surface (clamped to its limits)
    pub back_buffer_count: u32,
}

impl Default for VulkanConfig {
    fn default() -> Self {
        Self {
            application_name: "Video Presenter".to_string(),
            enable_validation: cfg!(debug_assertions),
            debug_severity: DebugSeverity::ErrorsAndWarnings,
            break_on_validation_error: false,
            back_buffer_count: 3,
        }
    }
}
