/// SwapchainManager - presentable image chain and everything sized from it
///
/// The swapchain, its image views, the depth attachment, the render pass and
/// the framebuffers are built and destroyed as one group. Resources whose
/// count follows the swapchain image count (pipeline, uniform buffers,
/// descriptor pool, command buffers) live in the same group so a rebuild
/// never leaves a stale dependent behind.

use std::time::Duration;

use aga_engine::aga::platform::WindowSystem;
use aga_engine::aga::{Error, Result};
use aga_engine::{engine_debug, engine_error, engine_info};
use ash::vk;

use crate::vulkan_device::{DeviceApi, ImageDesc, RenderPassDesc, SwapchainDesc};
use crate::vulkan_pipeline::PipelineState;
use crate::vulkan_resource::{create_image, has_stencil_component, GpuBuffer, GpuImage};

/// Depth formats in order of preference
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

// ===== NEGOTIATION =====

/// B8G8R8A8_SRGB with sRGB non-linear color space if offered, else the first format
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
}

/// MAILBOX if offered, else FIFO (always available)
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Surface extent, or the window size clamped to the surface bounds when
/// the surface lets the swapchain decide (current width == u32::MAX)
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, window_extent: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    let (width, height) = window_extent;
    vk::Extent2D {
        // min/max rather than clamp: some drivers report min > max
        width: width.min(capabilities.max_image_extent.width).max(capabilities.min_image_extent.width),
        height: height.min(capabilities.max_image_extent.height).max(capabilities.min_image_extent.height),
    }
}

/// One more than the minimum, clamped to the maximum (0 = no maximum)
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        count
    }
}

/// First candidate supporting optimal-tiling depth/stencil attachments
pub fn select_depth_format<D: DeviceApi>(device: &D) -> Result<vk::Format> {
    DEPTH_FORMAT_CANDIDATES
        .iter()
        .copied()
        .find(|&format| {
            device
                .format_properties(format)
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or_else(|| {
            engine_error!("aga::vulkan::Swapchain", "No supported depth format among {:?}", DEPTH_FORMAT_CANDIDATES);
            Error::UnsupportedFormat("no supported depth/stencil format".to_string())
        })
}

/// Surface parameters negotiated for one swapchain build
#[derive(Debug, Clone, Copy)]
pub struct SurfaceDescriptor {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
}

impl SurfaceDescriptor {
    /// Query the surface again and pick format, present mode, extent and image count
    pub fn negotiate<D: DeviceApi>(device: &D, window: &dyn WindowSystem) -> Result<Self> {
        let capabilities = device.surface_capabilities()?;
        let formats = device.surface_formats()?;
        let present_modes = device.surface_present_modes()?;

        let surface_format = choose_surface_format(&formats).ok_or_else(|| {
            engine_error!("aga::vulkan::Swapchain", "Surface reports no formats");
            Error::UnsupportedFormat("surface reports no formats".to_string())
        })?;

        Ok(Self {
            capabilities,
            surface_format,
            present_mode: choose_present_mode(&present_modes),
            extent: choose_extent(&capabilities, window.current_extent()),
            image_count: choose_image_count(&capabilities),
        })
    }
}

// ===== SWAPCHAIN GROUP =====

/// Every object rebuilt with the swapchain
///
/// Images are owned by the swapchain and never destroyed individually.
pub struct SwapchainGroup {
    pub swapchain: vk::SwapchainKHR,
    pub surface: Option<SurfaceDescriptor>,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub depth: GpuImage,
    /// Depth format carries a stencil component
    pub depth_has_stencil: bool,
    pub render_pass: vk::RenderPass,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub pipeline: PipelineState,
    /// One per swapchain image
    pub uniform_buffers: Vec<GpuBuffer>,
    pub descriptor_pool: vk::DescriptorPool,
    /// One per swapchain image (freed with the pool)
    pub descriptor_sets: Vec<vk::DescriptorSet>,
    /// One per swapchain image, pre-recorded
    pub command_buffers: Vec<vk::CommandBuffer>,
}

impl Default for SwapchainGroup {
    fn default() -> Self {
        Self {
            swapchain: vk::SwapchainKHR::null(),
            surface: None,
            images: Vec::new(),
            image_views: Vec::new(),
            depth: GpuImage::default(),
            depth_has_stencil: false,
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
            pipeline: PipelineState {
                layout: vk::PipelineLayout::null(),
                pipeline: vk::Pipeline::null(),
            },
            uniform_buffers: Vec::new(),
            descriptor_pool: vk::DescriptorPool::null(),
            descriptor_sets: Vec::new(),
            command_buffers: Vec::new(),
        }
    }
}

impl SwapchainGroup {
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.surface.map(|s| s.extent).unwrap_or_default()
    }

    pub fn format(&self) -> vk::Format {
        self.surface.map(|s| s.surface_format.format).unwrap_or(vk::Format::UNDEFINED)
    }

    /// Aspects covered by depth image barriers; combined formats move both together
    pub fn depth_aspect_mask(&self) -> vk::ImageAspectFlags {
        if self.depth_has_stencil {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    }
}

// ===== SWAPCHAIN MANAGER =====

/// Owns the swapchain group and rebuilds it atomically
#[derive(Default)]
pub struct SwapchainManager {
    group: SwapchainGroup,
}

impl SwapchainManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(&self) -> &SwapchainGroup {
        &self.group
    }

    pub fn group_mut(&mut self) -> &mut SwapchainGroup {
        &mut self.group
    }

    pub fn is_built(&self) -> bool {
        self.group.swapchain != vk::SwapchainKHR::null()
    }

    /// Negotiate surface parameters and create the swapchain handle
    pub fn create_swapchain<D: DeviceApi>(&mut self, device: &D, window: &dyn WindowSystem) -> Result<()> {
        let surface = SurfaceDescriptor::negotiate(device, window)?;

        let desc = SwapchainDesc {
            image_count: surface.image_count,
            surface_format: surface.surface_format,
            extent: surface.extent,
            present_mode: surface.present_mode,
            pre_transform: surface.capabilities.current_transform,
            queue_families: device.queue_families(),
        };
        self.group.swapchain = device.create_swapchain(&desc)?;
        self.group.surface = Some(surface);

        engine_info!(
            "aga::vulkan::Swapchain",
            "Swapchain created: {}x{}, {:?}, {:?}, {} images requested, {:?} sharing",
            surface.extent.width,
            surface.extent.height,
            surface.surface_format.format,
            surface.present_mode,
            surface.image_count,
            desc.sharing_mode()
        );
        Ok(())
    }

    /// Retrieve the swapchain images and build one color view per image
    pub fn create_swapchain_images<D: DeviceApi>(&mut self, device: &D) -> Result<()> {
        self.group.images = device.swapchain_images(self.group.swapchain)?;
        let format = self.group.format();

        self.group.image_views.clear();
        for &image in &self.group.images {
            let view = device.create_image_view(image, format, vk::ImageAspectFlags::COLOR)?;
            self.group.image_views.push(view);
        }
        Ok(())
    }

    /// Depth attachment sized to the swapchain extent
    pub fn create_depth_stencil_image<D: DeviceApi>(&mut self, device: &D) -> Result<()> {
        let format = select_depth_format(device)?;
        let desc = ImageDesc {
            extent: self.group.extent(),
            format,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        };

        self.group.depth = create_image(device, &desc, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;
        self.group.depth_has_stencil = has_stencil_component(format);
        self.group.depth.view = device.create_image_view(self.group.depth.image, format, vk::ImageAspectFlags::DEPTH)?;

        engine_debug!(
            "aga::vulkan::Swapchain",
            "Depth attachment {:?} (stencil: {})",
            format,
            self.group.depth_has_stencil
        );
        Ok(())
    }

    /// Render pass description for the current color and depth formats
    pub fn render_pass_desc(&self) -> RenderPassDesc {
        let color = vk::AttachmentDescription::default()
            .format(self.group.format())
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

        let depth = vk::AttachmentDescription::default()
            .format(self.group.depth.format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        // The first color write to a reused image waits for the previous
        // presentation; the shared depth attachment is cleared at early tests
        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(stages)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(stages)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_READ
                    | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            );

        RenderPassDesc { color, depth, dependency }
    }

    pub fn create_render_pass<D: DeviceApi>(&mut self, device: &D) -> Result<()> {
        self.group.render_pass = device.create_render_pass(&self.render_pass_desc())?;
        Ok(())
    }

    /// One framebuffer per image view, all sharing the depth view
    pub fn create_frame_buffers<D: DeviceApi>(&mut self, device: &D) -> Result<()> {
        let extent = self.group.extent();
        self.group.framebuffers.clear();
        for i in 0..self.group.image_views.len() {
            let attachments = [self.group.image_views[i], self.group.depth.view];
            let framebuffer = device.create_framebuffer(self.group.render_pass, &attachments, extent)?;
            self.group.framebuffers.push(framebuffer);
        }
        Ok(())
    }

    /// Build the swapchain, views, depth attachment, render pass and framebuffers
    pub fn build<D: DeviceApi>(&mut self, device: &D, window: &dyn WindowSystem) -> Result<()> {
        self.create_swapchain(device, window)?;
        self.create_swapchain_images(device)?;
        self.create_depth_stencil_image(device)?;
        self.create_render_pass(device)?;
        self.create_frame_buffers(device)
    }

    /// Destroy the whole group in reverse dependency order
    ///
    /// Depth image, framebuffers, command buffers, pipeline, render pass,
    /// image views, swapchain, uniform buffers, descriptor pool. Null handles
    /// are skipped, so a partially built group can be torn down too.
    pub fn destroy_swapchain<D: DeviceApi>(&mut self, device: &D, command_pool: vk::CommandPool) {
        let group = &mut self.group;

        group.depth.destroy(device);

        for framebuffer in group.framebuffers.drain(..) {
            device.destroy_framebuffer(framebuffer);
        }

        if !group.command_buffers.is_empty() {
            device.free_command_buffers(command_pool, &group.command_buffers);
            group.command_buffers.clear();
        }

        group.pipeline.destroy(device);

        if group.render_pass != vk::RenderPass::null() {
            device.destroy_render_pass(group.render_pass);
            group.render_pass = vk::RenderPass::null();
        }

        for view in group.image_views.drain(..) {
            device.destroy_image_view(view);
        }
        group.images.clear();

        if group.swapchain != vk::SwapchainKHR::null() {
            device.destroy_swapchain(group.swapchain);
            group.swapchain = vk::SwapchainKHR::null();
        }

        for mut buffer in group.uniform_buffers.drain(..) {
            buffer.destroy(device);
        }

        if group.descriptor_pool != vk::DescriptorPool::null() {
            device.destroy_descriptor_pool(group.descriptor_pool);
            group.descriptor_pool = vk::DescriptorPool::null();
        }
        group.descriptor_sets.clear();
        group.surface = None;
    }

    /// Tear down and rebuild the group for the current surface
    ///
    /// Blocks while the window has zero area, pumping events. Fails with
    /// `Error::WindowClosed` if the window closes during that wait.
    /// `build_dependents` recreates the pipeline, uniform buffers,
    /// descriptors and command buffers on the fresh group.
    pub fn recreate_swapchain<D, F>(
        &mut self,
        device: &D,
        window: &mut dyn WindowSystem,
        command_pool: vk::CommandPool,
        build_dependents: F,
    ) -> Result<()>
    where
        D: DeviceApi,
        F: FnOnce(&D, &mut SwapchainGroup) -> Result<()>,
    {
        wait_for_nonzero_extent(window)?;

        device.device_wait_idle()?;
        self.destroy_swapchain(device, command_pool);

        self.build(device, window)?;
        build_dependents(device, &mut self.group)?;

        engine_debug!(
            "aga::vulkan::Swapchain",
            "Swapchain recreated with {} images",
            self.group.image_count()
        );
        Ok(())
    }
}

/// Pump events until the window has a drawable area
fn wait_for_nonzero_extent(window: &mut dyn WindowSystem) -> Result<()> {
    loop {
        let (width, height) = window.current_extent();
        if width > 0 && height > 0 {
            return Ok(());
        }
        if !window.pump_events() {
            engine_info!("aga::vulkan::Swapchain", "Window closed while minimized");
            return Err(Error::WindowClosed);
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[cfg(test)]
#[path = "vulkan_swapchain_tests.rs"]
mod tests;
