//! Unit tests for debug.rs
//!
//! The filter and counters are process-wide, so every test touching them is serial.

use crate::debug::*;
use aga_engine::aga::render::DebugSeverity;
use ash::vk;
use serial_test::serial;

const ERROR: vk::DebugUtilsMessageSeverityFlagsEXT = vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
const WARNING: vk::DebugUtilsMessageSeverityFlagsEXT = vk::DebugUtilsMessageSeverityFlagsEXT::WARNING;
const INFO: vk::DebugUtilsMessageSeverityFlagsEXT = vk::DebugUtilsMessageSeverityFlagsEXT::INFO;
const VALIDATION: vk::DebugUtilsMessageTypeFlagsEXT = vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION;

// ============================================================================
// SEVERITY FLAGS
// ============================================================================

#[test]
fn test_severity_flags() {
    assert_eq!(severity_flags(DebugSeverity::ErrorsOnly), ERROR);
    assert_eq!(severity_flags(DebugSeverity::ErrorsAndWarnings), ERROR | WARNING);
    assert!(severity_flags(DebugSeverity::All).contains(INFO | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE));
}

// ============================================================================
// MESSAGE HANDLING
// ============================================================================

#[test]
#[serial]
fn test_messages_ignored_before_init() {
    cleanup_debug_config();
    assert!(!handle_message(ERROR, VALIDATION, "VUID-test", "ignored"));
}

#[test]
#[serial]
fn test_messages_counted_by_severity() {
    init_debug_config(DebugSeverity::All);

    assert!(handle_message(ERROR, VALIDATION, "VUID-a", "first error"));
    assert!(handle_message(WARNING, VALIDATION, "VUID-b", "a warning"));
    assert!(handle_message(INFO, VALIDATION, "VUID-c", "some info"));

    let stats = get_validation_stats();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.warnings, 1);
    assert_eq!(stats.info, 1);
    assert_eq!(stats.total(), 3);
    cleanup_debug_config();
}

#[test]
#[serial]
fn test_filtered_messages_are_not_counted() {
    init_debug_config(DebugSeverity::ErrorsOnly);

    assert!(!handle_message(WARNING, VALIDATION, "VUID-b", "a warning"));
    assert!(handle_message(ERROR, VALIDATION, "VUID-a", "an error"));

    let stats = get_validation_stats();
    assert_eq!(stats.warnings, 0);
    assert_eq!(stats.errors, 1);
    cleanup_debug_config();
}

#[test]
#[serial]
fn test_init_resets_statistics() {
    init_debug_config(DebugSeverity::All);
    handle_message(ERROR, VALIDATION, "VUID-a", "an error");

    init_debug_config(DebugSeverity::All);
    assert_eq!(get_validation_stats().total(), 0);
    cleanup_debug_config();
}

#[test]
#[serial]
fn test_stats_report_does_not_panic() {
    init_debug_config(DebugSeverity::All);
    log_validation_stats_report();
    handle_message(WARNING, VALIDATION, "VUID-b", "repeated");
    handle_message(WARNING, VALIDATION, "VUID-b", "repeated");
    log_validation_stats_report();
    cleanup_debug_config();
}
