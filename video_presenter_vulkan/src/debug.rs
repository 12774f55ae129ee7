/// Validation layer messenger - routes driver diagnostics into the presenter log
///
/// Only compiled with the `vulkan-validation` feature.

use ash::vk;
use colored::*;
use rustc_hash::FxHashMap;
use std::ffi::CStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use video_presenter::vpresent::Result;
use video_presenter::{vp_debug, vp_error, vp_info, vp_warn};

use crate::vulkan_config::{DebugSeverity, VulkanConfig};
use crate::vulkan_context::vk_error;

const SOURCE: &str = "vpresent::vulkan::validation";

static BREAK_ON_ERROR: AtomicBool = AtomicBool::new(false);

static VALIDATION_STATS: StatsTracker = StatsTracker::new();

/// Occurrences per message text, to flag repeats
static MESSAGE_COUNTS: Mutex<Option<FxHashMap<String, u32>>> = Mutex::new(None);

/// Counts of validation messages received since the device was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

struct StatsTracker {
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
}

impl StatsTracker {
    const fn new() -> Self {
        Self {
            errors: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            info: AtomicU32::new(0),
            verbose: AtomicU32::new(0),
        }
    }

    fn snapshot(&self) -> ValidationStats {
        ValidationStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            verbose: self.verbose.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.errors.store(0, Ordering::Relaxed);
        self.warnings.store(0, Ordering::Relaxed);
        self.info.store(0, Ordering::Relaxed);
        self.verbose.store(0, Ordering::Relaxed);
    }
}

pub fn get_validation_stats() -> ValidationStats {
    VALIDATION_STATS.snapshot()
}

/// Print a colored summary of the validation messages seen so far
pub fn print_validation_stats_report() {
    let stats = get_validation_stats();

    if stats.total() == 0 {
        println!("\n{}", "No validation messages".green().bold());
        return;
    }

    println!("\n{}", "=== Validation Statistics ===".bright_blue().bold());
    if stats.errors > 0 {
        println!("  {} {}", "Errors:".red().bold(), stats.errors);
    }
    if stats.warnings > 0 {
        println!("  {} {}", "Warnings:".yellow().bold(), stats.warnings);
    }
    if stats.info > 0 {
        println!("  {} {}", "Info:".cyan(), stats.info);
    }
    if stats.verbose > 0 {
        println!("  {} {}", "Verbose:".bright_black(), stats.verbose);
    }
    println!("  {} {}", "Total:".white().bold(), stats.total());

    let repeated = match MESSAGE_COUNTS.lock() {
        Ok(counts) => counts.as_ref().map_or(0, |counts| counts.values().filter(|&&n| n > 1).count()),
        Err(_) => 0,
    };
    if repeated > 0 {
        println!("  {} message(s) appeared multiple times", repeated);
    }
    println!("{}\n", "=============================".bright_blue().bold());
}

pub(crate) fn create_messenger(
    entry: &ash::Entry,
    instance: &ash::Instance,
    config: &VulkanConfig,
) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    VALIDATION_STATS.reset();
    if let Ok(mut counts) = MESSAGE_COUNTS.lock() {
        *counts = Some(FxHashMap::default());
    }
    BREAK_ON_ERROR.store(config.break_on_validation_error, Ordering::Relaxed);

    let severity = match config.debug_severity {
        DebugSeverity::ErrorsOnly => vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        DebugSeverity::ErrorsAndWarnings => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        }
        DebugSeverity::All => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        }
    };

    let loader = ash::ext::debug_utils::Instance::new(entry, instance);
    let info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(severity)
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(vulkan_debug_callback));

    let messenger = unsafe { loader.create_debug_utils_messenger(&info, None) }
        .map_err(|e| vk_error("vkCreateDebugUtilsMessengerEXT", e))?;
    vp_debug!(SOURCE, "Validation messenger installed ({:?})", config.debug_severity);
    Ok((loader, messenger))
}

pub(crate) fn destroy_messenger(debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>) {
    if let Some((loader, messenger)) = debug {
        unsafe { loader.destroy_debug_utils_messenger(messenger, None) };
    }
}

fn count_occurrence(message: &str) -> u32 {
    match MESSAGE_COUNTS.lock() {
        Ok(mut counts) => {
            let counts = counts.get_or_insert_with(FxHashMap::default);
            let count = counts.entry(message.to_string()).or_insert(0);
            *count += 1;
            *count
        }
        Err(_) => 1,
    }
}

unsafe extern "system" fn vulkan_debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let data = &*p_callback_data;
    let message_id = if data.p_message_id_name.is_null() {
        "Unknown".into()
    } else {
        CStr::from_ptr(data.p_message_id_name).to_string_lossy()
    };
    let message = if data.p_message.is_null() {
        "No message".into()
    } else {
        CStr::from_ptr(data.p_message).to_string_lossy()
    };

    let kind = if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    };

    let occurrences = count_occurrence(&message);
    let repeat = if occurrences > 1 { format!(" [x{}]", occurrences) } else { String::new() };

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        VALIDATION_STATS.errors.fetch_add(1, Ordering::Relaxed);
        vp_error!(SOURCE, "[{}]{} {}: {}", kind, repeat, message_id, message);
        if BREAK_ON_ERROR.load(Ordering::Relaxed) {
            eprintln!("{}", "BREAK ON VALIDATION ERROR - aborting".red().bold());
            std::process::abort();
        }
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        VALIDATION_STATS.warnings.fetch_add(1, Ordering::Relaxed);
        vp_warn!(SOURCE, "[{}]{} {}: {}", kind, repeat, message_id, message);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        VALIDATION_STATS.info.fetch_add(1, Ordering::Relaxed);
        vp_info!(SOURCE, "[{}]{} {}: {}", kind, repeat, message_id, message);
    } else {
        VALIDATION_STATS.verbose.fetch_add(1, Ordering::Relaxed);
        vp_debug!(SOURCE, "[{}]{} {}: {}", kind, repeat, message_id, message);
    }

    vk::FALSE
}
