/// Vulkan Debug Messenger - routes validation layer messages to the engine logger
///
/// Messages are filtered by the configured `DebugSeverity`, counted per
/// severity, and repeated messages are tagged with their occurrence count.

use aga_engine::aga::render::{DebugSeverity, ValidationStats};
use aga_engine::{engine_error, engine_info, engine_trace, engine_warn};
use ash::vk;
use rustc_hash::FxHashMap;
use std::ffi::CStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

const SOURCE: &str = "aga::vulkan::Validation";

/// Active severity filter (None = messenger not initialized, messages ignored)
static DEBUG_SEVERITY: Mutex<Option<DebugSeverity>> = Mutex::new(None);

/// Global validation statistics (thread-safe atomic counters)
static VALIDATION_STATS: ValidationStatsTracker = ValidationStatsTracker::new();

/// Occurrence count per message text
static MESSAGE_TRACKER: Mutex<Option<FxHashMap<String, u32>>> = Mutex::new(None);

struct ValidationStatsTracker {
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
}

impl ValidationStatsTracker {
    const fn new() -> Self {
        Self {
            errors: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            info: AtomicU32::new(0),
            verbose: AtomicU32::new(0),
        }
    }

    fn get_stats(&self) -> ValidationStats {
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

/// Severities requested from the messenger for a given filter
pub fn severity_flags(severity: DebugSeverity) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    match severity {
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
    }
}

/// Initialize the filter and reset statistics
pub fn init_debug_config(severity: DebugSeverity) {
    VALIDATION_STATS.reset();
    if let Ok(mut tracker) = MESSAGE_TRACKER.lock() {
        *tracker = Some(FxHashMap::default());
    }
    if let Ok(mut config) = DEBUG_SEVERITY.lock() {
        *config = Some(severity);
    }
}

/// Stop reporting (called before the messenger is destroyed)
pub fn cleanup_debug_config() {
    if let Ok(mut config) = DEBUG_SEVERITY.lock() {
        *config = None;
    }
}

/// Get current validation statistics
pub fn get_validation_stats() -> ValidationStats {
    VALIDATION_STATS.get_stats()
}

/// Log a summary of the validation messages received so far
pub fn log_validation_stats_report() {
    let stats = get_validation_stats();
    if stats.total() == 0 {
        engine_info!(SOURCE, "No validation messages");
        return;
    }

    let repeated = MESSAGE_TRACKER
        .lock()
        .ok()
        .and_then(|tracker| tracker.as_ref().map(|m| m.values().filter(|&&count| count > 1).count()))
        .unwrap_or(0);

    let summary = format!(
        "Validation messages: {} errors, {} warnings, {} info, {} verbose ({} total, {} repeated)",
        stats.errors,
        stats.warnings,
        stats.info,
        stats.verbose,
        stats.total(),
        repeated
    );
    if stats.errors > 0 {
        engine_error!(SOURCE, "{}", summary);
    } else if stats.warnings > 0 {
        engine_warn!(SOURCE, "{}", summary);
    } else {
        engine_info!(SOURCE, "{}", summary);
    }
}

fn passes_filter(filter: DebugSeverity, severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> bool {
    severity_flags(filter).intersects(severity)
}

fn message_kind(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    }
}

fn track_message(message: &str) -> u32 {
    match MESSAGE_TRACKER.lock() {
        Ok(mut tracker) => {
            let messages = tracker.get_or_insert_with(FxHashMap::default);
            let count = messages.entry(message.to_string()).or_insert(0);
            *count += 1;
            *count
        }
        Err(_) => 1,
    }
}

/// Filter, count and log one message; returns whether it was reported
pub(crate) fn handle_message(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    message_id: &str,
    message: &str,
) -> bool {
    let filter = match DEBUG_SEVERITY.lock() {
        Ok(config) => *config,
        Err(_) => None,
    };
    let filter = match filter {
        Some(filter) => filter,
        None => return false,
    };
    if !passes_filter(filter, severity) {
        return false;
    }

    let occurrences = track_message(message);
    let repeat = if occurrences > 1 { format!(" [x{}]", occurrences) } else { String::new() };
    let kind = message_kind(message_type);

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        VALIDATION_STATS.errors.fetch_add(1, Ordering::Relaxed);
        engine_error!(SOURCE, "[{}]{} {}: {}", kind, repeat, message_id, message);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        VALIDATION_STATS.warnings.fetch_add(1, Ordering::Relaxed);
        engine_warn!(SOURCE, "[{}]{} {}: {}", kind, repeat, message_id, message);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        VALIDATION_STATS.info.fetch_add(1, Ordering::Relaxed);
        engine_info!(SOURCE, "[{}]{} {}: {}", kind, repeat, message_id, message);
    } else {
        VALIDATION_STATS.verbose.fetch_add(1, Ordering::Relaxed);
        engine_trace!(SOURCE, "[{}]{} {}: {}", kind, repeat, message_id, message);
    }
    true
}

/// Vulkan debug messenger callback
///
/// # Safety
///
/// Called by the validation layer with a valid callback-data pointer.
pub unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = &*p_callback_data;
    let message_id = if callback_data.p_message_id_name.is_null() {
        "Unknown".into()
    } else {
        CStr::from_ptr(callback_data.p_message_id_name).to_string_lossy()
    };
    let message = if callback_data.p_message.is_null() {
        "No message".into()
    } else {
        CStr::from_ptr(callback_data.p_message).to_string_lossy()
    };

    handle_message(message_severity, message_type, &message_id, &message);

    vk::FALSE
}

#[cfg(test)]
#[path = "debug_tests.rs"]
mod tests;
