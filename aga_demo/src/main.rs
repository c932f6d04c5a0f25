/// AGA demo - spinning textured quads on the Vulkan rendering core
///
/// Shaders are loaded from `data/shaders/*.spv` next to this crate's manifest:
///
///   glslc data/shaders/shader_base.vert -o data/shaders/shader_base.vert.spv
///   glslc data/shaders/shader_base.frag -o data/shaders/shader_base.frag.spv

use aga_engine::aga::platform::{NativeFileSystem, WinitWindow, WindowSystem};
use aga_engine::aga::render::Config;
use aga_engine::aga::{Error, Result};
use aga_engine::{engine_error, engine_info};
use aga_engine_renderer_vulkan::{log_validation_stats_report, SceneDesc, VulkanRenderer};

const SOURCE: &str = "aga::demo";

fn run() -> Result<()> {
    let mut window = WinitWindow::new("AGA Demo", 800, 600, true)?;
    let fs = NativeFileSystem::new(env!("CARGO_MANIFEST_DIR"));
    let config = Config { app_name: "AGA Demo".to_string(), ..Config::default() };
    let validation = config.enable_validation;

    let mut renderer = VulkanRenderer::initialize(&mut window, &fs, config, &SceneDesc::default())?;

    let mut frames: u64 = 0;
    while window.pump_events() {
        if window.take_resized() {
            renderer.set_framebuffer_resized();
        }
        renderer.draw_frame(&mut window)?;
        frames += 1;
    }

    engine_info!(SOURCE, "Window closed after {} frames", frames);
    renderer.destroy();

    if validation {
        log_validation_stats_report();
    }
    Ok(())
}

fn main() {
    match run() {
        Ok(()) | Err(Error::WindowClosed) => {
            engine_info!(SOURCE, "Exiting");
        }
        Err(e) => {
            engine_error!(SOURCE, "Fatal: {}", e);
            std::process::exit(1);
        }
    }
}
