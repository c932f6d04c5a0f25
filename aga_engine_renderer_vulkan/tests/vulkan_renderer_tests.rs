//! Integration tests for VulkanRenderer on a real GPU
//!
//! The renderer reads the demo's compiled shaders, so build them first:
//!
//!   glslc aga_demo/data/shaders/shader_base.vert -o aga_demo/data/shaders/shader_base.vert.spv
//!   glslc aga_demo/data/shaders/shader_base.frag -o aga_demo/data/shaders/shader_base.frag.spv
//!
//! winit allows a single event loop per process, so this file holds one test.
//!
//! Run with: cargo test --test vulkan_renderer_tests -- --ignored

use aga_engine::aga::platform::{NativeFileSystem, WinitWindow, WindowSystem};
use aga_engine::aga::render::Config;
use aga_engine::aga::Error;
use aga_engine_renderer_vulkan::{FrameState, SceneDesc, VulkanRenderer};
use serial_test::serial;

fn demo_file_system() -> NativeFileSystem {
    NativeFileSystem::new(concat!(env!("CARGO_MANIFEST_DIR"), "/../aga_demo"))
}

// ============================================================================
// FRAME LOOP TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_renderer_frame_loop() {
    let mut window = WinitWindow::new("AGA Renderer Test", 640, 480, false).unwrap();
    let config = Config { frames_in_flight: 2, ..Config::default() };

    let mut renderer = match VulkanRenderer::initialize(&mut window, &demo_file_system(), config, &SceneDesc::default()) {
        Ok(renderer) => renderer,
        Err(e) => panic!("renderer initialization failed: {:?}", e),
    };

    let image_count = renderer.swapchain().group().image_count();
    assert!(image_count >= 2);
    assert_eq!(renderer.frames().frames_in_flight(), 2);
    assert_eq!(renderer.frames().images_in_flight().len(), image_count);

    // Slots rotate 0, 1, 0, 1, ... as long as no frame is skipped
    for frame in 0..8 {
        window.pump_events();
        match renderer.draw_frame(&mut window) {
            Ok(()) => {}
            Err(Error::WindowClosed) => break,
            Err(e) => panic!("frame {} failed: {:?}", frame, e),
        }
        assert_eq!(renderer.frames().state(), FrameState::Idle);
    }

    // Forced rebuild keeps the group consistent with the new image count
    renderer.set_framebuffer_resized();
    renderer.draw_frame(&mut window).unwrap();
    let image_count = renderer.swapchain().group().image_count();
    assert_eq!(renderer.frames().images_in_flight().len(), image_count);

    renderer.destroy();
    renderer.destroy();
}
