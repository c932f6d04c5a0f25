//! Integration tests for DeviceContext on a real GPU
//!
//! winit allows a single event loop per process, so this file holds one test.
//!
//! Run with: cargo test --test vulkan_device_tests -- --ignored

use aga_engine::aga::platform::{WinitWindow, WindowSystem};
use aga_engine::aga::render::Config;
use aga_engine_renderer_vulkan::{
    choose_extent, choose_image_count, choose_surface_format, select_depth_format, DeviceApi,
    DeviceContext, DEPTH_FORMAT_CANDIDATES,
};
use ash::vk;
use serial_test::serial;

// ============================================================================
// DEVICE TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_device_context_surface_queries() {
    let window = WinitWindow::new("AGA Device Test", 640, 480, false).unwrap();
    let config = Config { enable_validation: false, ..Config::default() };

    let mut device = DeviceContext::new(&window, &config).unwrap();
    assert!(!device.device_name().is_empty());
    assert!(!device.validation_enabled());
    assert_ne!(device.physical_device(), vk::PhysicalDevice::null());

    let memory = device.memory_properties();
    assert!(memory.memory_type_count > 0);
    assert!(device.max_sampler_anisotropy() >= 1.0);

    let capabilities = device.surface_capabilities().unwrap();
    let formats = device.surface_formats().unwrap();
    let present_modes = device.surface_present_modes().unwrap();
    assert!(!formats.is_empty());
    assert!(present_modes.contains(&vk::PresentModeKHR::FIFO));
    assert!(choose_surface_format(&formats).is_some());

    let image_count = choose_image_count(&capabilities);
    assert!(image_count >= capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        assert!(image_count <= capabilities.max_image_count);
    }

    let extent = choose_extent(&capabilities, window.current_extent());
    assert!(extent.width >= capabilities.min_image_extent.width);
    assert!(extent.height >= capabilities.min_image_extent.height);

    let depth = select_depth_format(&device).unwrap();
    assert!(DEPTH_FORMAT_CANDIDATES.contains(&depth));

    device.destroy();
    device.destroy();
}
