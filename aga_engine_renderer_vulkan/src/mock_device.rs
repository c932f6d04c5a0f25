/// Mock device for unit tests (no GPU required)
///
/// Records every DeviceApi call in order and simulates the GPU side of the
/// frame loop: submissions complete in queue order when a fence wait or an
/// idle wait forces them. Misuse a real driver would not report (resubmitting
/// work for an image that is still in flight, resetting a pending fence,
/// destroying an unknown handle, leaking objects past the device) is
/// collected as a violation instead of panicking, so tests can assert on it.

use std::sync::{Arc, Mutex, MutexGuard};

use aga_engine::aga::platform::WindowSystem;
use aga_engine::aga::{Error, Result};
use ash::vk;
use ash::vk::Handle;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::vulkan_device::{
    AcquireOutcome, DescriptorBinding, DescriptorWrite, DeviceApi, GraphicsPipelineDesc,
    ImageBarrier, ImageDesc, PresentOutcome, QueueFamilyIndices, RenderPassDesc, SamplerDesc,
    SubmitDesc, SwapchainDesc,
};

// ============================================================================
// Configuration
// ============================================================================

/// Device and surface properties reported by the mock
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Memory type bits reported for every buffer and image
    pub memory_type_bits: u32,
    /// Formats reporting optimal-tiling depth/stencil attachment support
    pub depth_formats: Vec<vk::Format>,
    pub queue_families: QueueFamilyIndices,
    pub max_sampler_anisotropy: f32,
}

/// Memory property table with the given types (heap 0 for all)
pub fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
    let mut properties = vk::PhysicalDeviceMemoryProperties::default();
    properties.memory_type_count = types.len() as u32;
    for (i, flags) in types.iter().enumerate() {
        properties.memory_types[i] = vk::MemoryType { property_flags: *flags, heap_index: 0 };
    }
    properties.memory_heap_count = 1;
    properties
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 3,
                current_extent: vk::Extent2D { width: 800, height: 600 },
                min_image_extent: vk::Extent2D { width: 1, height: 1 },
                max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
                max_image_array_layers: 1,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            memory_properties: memory_properties(&[
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ]),
            memory_type_bits: 0b11,
            depth_formats: vec![vk::Format::D32_SFLOAT],
            queue_families: QueueFamilyIndices { graphics: 0, present: 0 },
            max_sampler_anisotropy: 16.0,
        }
    }
}

// ============================================================================
// Simulated GPU state
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct FenceState {
    signaled: bool,
    /// Submission that will signal this fence
    pending: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct Submission {
    fence: vk::Fence,
    /// Swapchain image targeted by a frame submission
    image: Option<u32>,
    complete: bool,
}

struct MockState {
    config: MockConfig,
    calls: Vec<String>,
    next_handle: u64,
    live: FxHashMap<u64, &'static str>,
    fences: FxHashMap<u64, FenceState>,
    submissions: Vec<Submission>,
    image_last_submission: FxHashMap<u32, usize>,
    swapchain_image_count: FxHashMap<u64, u32>,
    swapchain_descs: Vec<SwapchainDesc>,
    pipeline_descs: Vec<GraphicsPipelineDesc>,
    /// Set layouts and push-constant ranges of each pipeline layout
    pipeline_layouts: Vec<(Vec<vk::DescriptorSetLayout>, Vec<vk::PushConstantRange>)>,
    view_aspects: Vec<(vk::Format, vk::ImageAspectFlags)>,
    image_barriers: Vec<ImageBarrier>,
    next_image: u32,
    acquired: Option<(u32, vk::Semaphore)>,
    acquire_count: usize,
    present_count: usize,
    out_of_date_acquires: FxHashSet<usize>,
    present_results: FxHashMap<usize, PresentOutcome>,
    failed_presents: FxHashSet<usize>,
    fail_next_write: bool,
    violations: Vec<String>,
    blocking_waits: usize,
    max_drained_per_wait: usize,
    memory_writes: Vec<(vk::DeviceMemory, Vec<u8>)>,
    device_destroyed: bool,
}

impl MockState {
    fn new(config: MockConfig) -> Self {
        Self {
            config,
            calls: Vec::new(),
            next_handle: 0x1000,
            live: FxHashMap::default(),
            fences: FxHashMap::default(),
            submissions: Vec::new(),
            image_last_submission: FxHashMap::default(),
            swapchain_image_count: FxHashMap::default(),
            swapchain_descs: Vec::new(),
            pipeline_descs: Vec::new(),
            pipeline_layouts: Vec::new(),
            view_aspects: Vec::new(),
            image_barriers: Vec::new(),
            next_image: 0,
            acquired: None,
            acquire_count: 0,
            present_count: 0,
            out_of_date_acquires: FxHashSet::default(),
            present_results: FxHashMap::default(),
            failed_presents: FxHashSet::default(),
            fail_next_write: false,
            violations: Vec::new(),
            blocking_waits: 0,
            max_drained_per_wait: 0,
            memory_writes: Vec::new(),
            device_destroyed: false,
        }
    }

    fn record(&mut self, call: &str) {
        if self.device_destroyed {
            self.violations.push(format!("{} after device destruction", call));
        }
        self.calls.push(call.to_string());
    }

    fn create(&mut self, kind: &'static str) -> u64 {
        self.record(&format!("create_{}", kind));
        self.next_handle += 1;
        self.live.insert(self.next_handle, kind);
        self.next_handle
    }

    fn destroy(&mut self, kind: &'static str, raw: u64) {
        self.record(&format!("destroy_{}", kind));
        match self.live.remove(&raw) {
            Some(found) if found == kind => {}
            Some(found) => self.violations.push(format!("destroy_{} on a {} handle", kind, found)),
            None => self.violations.push(format!("destroy_{} on unknown handle {:#x}", kind, raw)),
        }
    }

    /// Complete every submission up to and including `index`, in queue order
    fn complete_through(&mut self, index: usize) -> usize {
        let mut drained = 0;
        for i in 0..=index.min(self.submissions.len().saturating_sub(1)) {
            if self.submissions[i].complete {
                continue;
            }
            self.submissions[i].complete = true;
            drained += 1;
            let fence = self.submissions[i].fence;
            if fence != vk::Fence::null() {
                if let Some(state) = self.fences.get_mut(&fence.as_raw()) {
                    if state.pending == Some(i) {
                        state.signaled = true;
                        state.pending = None;
                    }
                }
            }
        }
        drained
    }

    fn complete_all(&mut self) {
        if !self.submissions.is_empty() {
            let last = self.submissions.len() - 1;
            self.complete_through(last);
        }
    }
}

// ============================================================================
// Mock Device
// ============================================================================

/// Recording mock implementing DeviceApi
///
/// Clones share state, so a test can keep a handle after handing the device
/// to a renderer.
#[derive(Clone)]
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new(MockConfig::default())
    }
}

impl MockDevice {
    pub fn new(config: MockConfig) -> Self {
        Self { state: Arc::new(Mutex::new(MockState::new(config))) }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    // ===== SCRIPTING =====

    /// Make the n-th acquire call (1-based) report an out-of-date surface
    pub fn fail_acquire(&self, call_number: usize) {
        self.state().out_of_date_acquires.insert(call_number);
    }

    /// Script the result of the n-th present call (1-based)
    pub fn present_result(&self, call_number: usize, outcome: PresentOutcome) {
        self.state().present_results.insert(call_number, outcome);
    }

    /// Make the n-th present call (1-based) fail outright
    pub fn fail_present(&self, call_number: usize) {
        self.state().failed_presents.insert(call_number);
    }

    /// Make the next memory write fail
    pub fn fail_next_memory_write(&self) {
        self.state().fail_next_write = true;
    }

    /// Change the surface extent reported from now on
    pub fn set_surface_extent(&self, width: u32, height: u32) {
        self.state().config.capabilities.current_extent = vk::Extent2D { width, height };
    }

    // ===== INSPECTION =====

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn count(&self, call: &str) -> usize {
        self.state().calls.iter().filter(|c| c.as_str() == call).count()
    }

    /// Index of the first occurrence of `call` at or after `from`
    pub fn position_from(&self, call: &str, from: usize) -> Option<usize> {
        self.state().calls.iter().skip(from).position(|c| c == call).map(|p| p + from)
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.position_from(call, 0)
    }

    pub fn violations(&self) -> Vec<String> {
        self.state().violations.clone()
    }

    /// Kinds of objects created and not yet destroyed
    pub fn live_objects(&self) -> Vec<&'static str> {
        let mut kinds: Vec<&'static str> = self.state().live.values().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn blocking_waits(&self) -> usize {
        self.state().blocking_waits
    }

    /// Largest number of submissions a single fence wait had to drain
    pub fn max_drained_per_wait(&self) -> usize {
        self.state().max_drained_per_wait
    }

    pub fn acquire_count(&self) -> usize {
        self.state().acquire_count
    }

    pub fn present_count(&self) -> usize {
        self.state().present_count
    }

    pub fn swapchain_descs(&self) -> Vec<SwapchainDesc> {
        self.state().swapchain_descs.clone()
    }

    pub fn pipeline_descs(&self) -> Vec<GraphicsPipelineDesc> {
        self.state().pipeline_descs.clone()
    }

    pub fn pipeline_layouts(&self) -> Vec<(Vec<vk::DescriptorSetLayout>, Vec<vk::PushConstantRange>)> {
        self.state().pipeline_layouts.clone()
    }

    pub fn view_aspects(&self) -> Vec<(vk::Format, vk::ImageAspectFlags)> {
        self.state().view_aspects.clone()
    }

    pub fn image_barriers(&self) -> Vec<ImageBarrier> {
        self.state().image_barriers.clone()
    }

    pub fn memory_writes(&self) -> Vec<(vk::DeviceMemory, Vec<u8>)> {
        self.state().memory_writes.clone()
    }

    pub fn is_device_destroyed(&self) -> bool {
        self.state().device_destroyed
    }

    /// Swapchain images referenced by frame submissions still executing
    pub fn images_in_flight(&self) -> Vec<u32> {
        self.state()
            .submissions
            .iter()
            .filter(|s| !s.complete)
            .filter_map(|s| s.image)
            .collect()
    }
}

impl DeviceApi for MockDevice {
    // ===== PHYSICAL DEVICE SNAPSHOT =====

    fn queue_families(&self) -> QueueFamilyIndices {
        self.state().config.queue_families
    }

    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        self.state().config.memory_properties
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        let state = self.state();
        let mut properties = vk::FormatProperties::default();
        if state.config.depth_formats.contains(&format) {
            properties.optimal_tiling_features = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
        }
        properties
    }

    fn max_sampler_anisotropy(&self) -> f32 {
        self.state().config.max_sampler_anisotropy
    }

    // ===== SURFACE =====

    fn surface_capabilities(&self) -> Result<vk::SurfaceCapabilitiesKHR> {
        let mut state = self.state();
        state.record("get_surface_capabilities");
        Ok(state.config.capabilities)
    }

    fn surface_formats(&self) -> Result<Vec<vk::SurfaceFormatKHR>> {
        let mut state = self.state();
        state.record("get_surface_formats");
        Ok(state.config.formats.clone())
    }

    fn surface_present_modes(&self) -> Result<Vec<vk::PresentModeKHR>> {
        let mut state = self.state();
        state.record("get_surface_present_modes");
        Ok(state.config.present_modes.clone())
    }

    // ===== SWAPCHAIN =====

    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<vk::SwapchainKHR> {
        let mut state = self.state();
        let raw = state.create("swapchain");
        state.swapchain_image_count.insert(raw, desc.image_count);
        state.swapchain_descs.push(*desc);
        state.next_image = 0;
        Ok(vk::SwapchainKHR::from_raw(raw))
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.state().destroy("swapchain", swapchain.as_raw());
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>> {
        let mut state = self.state();
        state.record("get_swapchain_images");
        let count = match state.swapchain_image_count.get(&swapchain.as_raw()) {
            Some(count) => *count,
            None => return Err(Error::BackendError("unknown swapchain".to_string())),
        };
        Ok((0..count).map(|i| vk::Image::from_raw(swapchain.as_raw() * 0x100 + i as u64)).collect())
    }

    fn acquire_next_image(&self, swapchain: vk::SwapchainKHR, signal: vk::Semaphore) -> Result<AcquireOutcome> {
        let mut state = self.state();
        state.record("acquire_next_image");
        state.acquire_count += 1;
        if state.out_of_date_acquires.contains(&state.acquire_count) {
            return Ok(AcquireOutcome::OutOfDate);
        }
        let count = state.swapchain_image_count.get(&swapchain.as_raw()).copied().unwrap_or(0);
        if count == 0 {
            return Err(Error::BackendError("acquire on unknown swapchain".to_string()));
        }
        let image_index = state.next_image % count;
        state.next_image += 1;
        state.acquired = Some((image_index, signal));
        Ok(AcquireOutcome::Acquired { image_index, suboptimal: false })
    }

    fn queue_present(&self, _swapchain: vk::SwapchainKHR, image_index: u32, _wait: vk::Semaphore) -> Result<PresentOutcome> {
        let mut state = self.state();
        state.record("queue_present");
        state.present_count += 1;
        match state.acquired.take() {
            Some((acquired, _)) if acquired == image_index => {}
            _ => state.violations.push(format!("present of image {} that was not acquired", image_index)),
        }
        let count = state.present_count;
        if state.failed_presents.contains(&count) {
            return Err(Error::BackendError("present failed".to_string()));
        }
        Ok(state.present_results.get(&count).copied().unwrap_or(PresentOutcome::Presented))
    }

    // ===== IMAGES AND SAMPLERS =====

    fn create_image(&self, _desc: &ImageDesc) -> Result<vk::Image> {
        Ok(vk::Image::from_raw(self.state().create("image")))
    }

    fn destroy_image(&self, image: vk::Image) {
        self.state().destroy("image", image.as_raw());
    }

    fn image_memory_requirements(&self, _image: vk::Image) -> vk::MemoryRequirements {
        let state = self.state();
        vk::MemoryRequirements { size: 4096, alignment: 256, memory_type_bits: state.config.memory_type_bits }
    }

    fn bind_image_memory(&self, _image: vk::Image, _memory: vk::DeviceMemory) -> Result<()> {
        self.state().record("bind_image_memory");
        Ok(())
    }

    fn create_image_view(&self, _image: vk::Image, format: vk::Format, aspect_mask: vk::ImageAspectFlags) -> Result<vk::ImageView> {
        let mut state = self.state();
        state.view_aspects.push((format, aspect_mask));
        Ok(vk::ImageView::from_raw(state.create("image_view")))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state().destroy("image_view", view.as_raw());
    }

    fn create_sampler(&self, _desc: &SamplerDesc) -> Result<vk::Sampler> {
        Ok(vk::Sampler::from_raw(self.state().create("sampler")))
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.state().destroy("sampler", sampler.as_raw());
    }

    // ===== BUFFERS AND MEMORY =====

    fn create_buffer(&self, _size: vk::DeviceSize, _usage: vk::BufferUsageFlags) -> Result<vk::Buffer> {
        Ok(vk::Buffer::from_raw(self.state().create("buffer")))
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.state().destroy("buffer", buffer.as_raw());
    }

    fn buffer_memory_requirements(&self, _buffer: vk::Buffer) -> vk::MemoryRequirements {
        let state = self.state();
        vk::MemoryRequirements { size: 1024, alignment: 64, memory_type_bits: state.config.memory_type_bits }
    }

    fn bind_buffer_memory(&self, _buffer: vk::Buffer, _memory: vk::DeviceMemory) -> Result<()> {
        self.state().record("bind_buffer_memory");
        Ok(())
    }

    fn allocate_memory(&self, _size: vk::DeviceSize, memory_type_index: u32) -> Result<vk::DeviceMemory> {
        let mut state = self.state();
        if memory_type_index >= state.config.memory_properties.memory_type_count {
            state.violations.push(format!("allocation from missing memory type {}", memory_type_index));
        }
        Ok(vk::DeviceMemory::from_raw(state.create("memory")))
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        self.state().destroy("memory", memory.as_raw());
    }

    fn write_memory(&self, memory: vk::DeviceMemory, _offset: vk::DeviceSize, data: &[u8]) -> Result<()> {
        let mut state = self.state();
        state.record("write_memory");
        if std::mem::take(&mut state.fail_next_write) {
            return Err(Error::BackendError("memory map failed".to_string()));
        }
        if !state.live.contains_key(&memory.as_raw()) {
            state.violations.push("write to unknown memory".to_string());
        }
        state.memory_writes.push((memory, data.to_vec()));
        Ok(())
    }

    // ===== RENDER PASS AND FRAMEBUFFERS =====

    fn create_render_pass(&self, _desc: &RenderPassDesc) -> Result<vk::RenderPass> {
        Ok(vk::RenderPass::from_raw(self.state().create("render_pass")))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state().destroy("render_pass", render_pass.as_raw());
    }

    fn create_framebuffer(&self, _render_pass: vk::RenderPass, _attachments: &[vk::ImageView], _extent: vk::Extent2D) -> Result<vk::Framebuffer> {
        Ok(vk::Framebuffer::from_raw(self.state().create("framebuffer")))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state().destroy("framebuffer", framebuffer.as_raw());
    }

    // ===== SHADERS AND PIPELINES =====

    fn create_shader_module(&self, _code: &[u32]) -> Result<vk::ShaderModule> {
        Ok(vk::ShaderModule::from_raw(self.state().create("shader_module")))
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.state().destroy("shader_module", module.as_raw());
    }

    fn create_descriptor_set_layout(&self, _bindings: &[DescriptorBinding]) -> Result<vk::DescriptorSetLayout> {
        Ok(vk::DescriptorSetLayout::from_raw(self.state().create("descriptor_set_layout")))
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.state().destroy("descriptor_set_layout", layout.as_raw());
    }

    fn create_pipeline_layout(&self, set_layouts: &[vk::DescriptorSetLayout], push_constants: &[vk::PushConstantRange]) -> Result<vk::PipelineLayout> {
        let mut state = self.state();
        state.pipeline_layouts.push((set_layouts.to_vec(), push_constants.to_vec()));
        Ok(vk::PipelineLayout::from_raw(state.create("pipeline_layout")))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.state().destroy("pipeline_layout", layout.as_raw());
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<vk::Pipeline> {
        let mut state = self.state();
        for module in [desc.vertex_module, desc.fragment_module] {
            if !state.live.contains_key(&module.as_raw()) {
                state.violations.push("pipeline created from a destroyed shader module".to_string());
            }
        }
        state.pipeline_descs.push(desc.clone());
        Ok(vk::Pipeline::from_raw(state.create("pipeline")))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.state().destroy("pipeline", pipeline.as_raw());
    }

    // ===== DESCRIPTORS =====

    fn create_descriptor_pool(&self, _pool_sizes: &[vk::DescriptorPoolSize], _max_sets: u32) -> Result<vk::DescriptorPool> {
        Ok(vk::DescriptorPool::from_raw(self.state().create("descriptor_pool")))
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.state().destroy("descriptor_pool", pool.as_raw());
    }

    fn allocate_descriptor_sets(&self, _pool: vk::DescriptorPool, layouts: &[vk::DescriptorSetLayout]) -> Result<Vec<vk::DescriptorSet>> {
        let mut state = self.state();
        state.record("allocate_descriptor_sets");
        let sets = layouts
            .iter()
            .map(|_| {
                state.next_handle += 1;
                vk::DescriptorSet::from_raw(state.next_handle)
            })
            .collect();
        Ok(sets)
    }

    fn update_descriptor_set(&self, _set: vk::DescriptorSet, _writes: &[DescriptorWrite]) {
        self.state().record("update_descriptor_set");
    }

    // ===== COMMAND BUFFERS =====

    fn create_command_pool(&self, _queue_family: u32) -> Result<vk::CommandPool> {
        Ok(vk::CommandPool::from_raw(self.state().create("command_pool")))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.state().destroy("command_pool", pool.as_raw());
    }

    fn allocate_command_buffers(&self, _pool: vk::CommandPool, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let mut state = self.state();
        state.record("allocate_command_buffers");
        let buffers = (0..count)
            .map(|_| {
                state.next_handle += 1;
                let raw = state.next_handle;
                state.live.insert(raw, "command_buffer");
                vk::CommandBuffer::from_raw(raw)
            })
            .collect();
        Ok(buffers)
    }

    fn free_command_buffers(&self, _pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        let mut state = self.state();
        state.record("free_command_buffers");
        for buffer in buffers {
            if state.live.remove(&buffer.as_raw()).is_none() {
                state.violations.push("free of unknown command buffer".to_string());
            }
        }
    }

    fn begin_command_buffer(&self, _command_buffer: vk::CommandBuffer, _one_time_submit: bool) -> Result<()> {
        self.state().record("begin_command_buffer");
        Ok(())
    }

    fn end_command_buffer(&self, _command_buffer: vk::CommandBuffer) -> Result<()> {
        self.state().record("end_command_buffer");
        Ok(())
    }

    fn cmd_begin_render_pass(&self, _command_buffer: vk::CommandBuffer, _render_pass: vk::RenderPass, _framebuffer: vk::Framebuffer, _extent: vk::Extent2D, _clear_values: &[vk::ClearValue]) {
        self.state().record("cmd_begin_render_pass");
    }

    fn cmd_end_render_pass(&self, _command_buffer: vk::CommandBuffer) {
        self.state().record("cmd_end_render_pass");
    }

    fn cmd_bind_pipeline(&self, _command_buffer: vk::CommandBuffer, _pipeline: vk::Pipeline) {
        self.state().record("cmd_bind_pipeline");
    }

    fn cmd_bind_vertex_buffer(&self, _command_buffer: vk::CommandBuffer, _buffer: vk::Buffer) {
        self.state().record("cmd_bind_vertex_buffer");
    }

    fn cmd_bind_index_buffer(&self, _command_buffer: vk::CommandBuffer, _buffer: vk::Buffer, _index_type: vk::IndexType) {
        self.state().record("cmd_bind_index_buffer");
    }

    fn cmd_bind_descriptor_set(&self, _command_buffer: vk::CommandBuffer, _layout: vk::PipelineLayout, _set: vk::DescriptorSet) {
        self.state().record("cmd_bind_descriptor_set");
    }

    fn cmd_draw_indexed(&self, _command_buffer: vk::CommandBuffer, _index_count: u32) {
        self.state().record("cmd_draw_indexed");
    }

    fn cmd_copy_buffer(&self, _command_buffer: vk::CommandBuffer, _src: vk::Buffer, _dst: vk::Buffer, _size: vk::DeviceSize) {
        self.state().record("cmd_copy_buffer");
    }

    fn cmd_copy_buffer_to_image(&self, _command_buffer: vk::CommandBuffer, _buffer: vk::Buffer, _image: vk::Image, _extent: vk::Extent2D) {
        self.state().record("cmd_copy_buffer_to_image");
    }

    fn cmd_image_barrier(&self, _command_buffer: vk::CommandBuffer, barrier: &ImageBarrier) {
        let mut state = self.state();
        state.record(&format!(
            "cmd_image_barrier {:?}->{:?}",
            barrier.old_layout, barrier.new_layout
        ));
        state.image_barriers.push(*barrier);
    }

    // ===== SYNCHRONIZATION =====

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        Ok(vk::Semaphore::from_raw(self.state().create("semaphore")))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state().destroy("semaphore", semaphore.as_raw());
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let mut state = self.state();
        let raw = state.create("fence");
        state.fences.insert(raw, FenceState { signaled, pending: None });
        Ok(vk::Fence::from_raw(raw))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state();
        if let Some(fence_state) = state.fences.remove(&fence.as_raw()) {
            if fence_state.pending.is_some() {
                state.violations.push("destroy of a fence still in flight".to_string());
            }
        }
        state.destroy("fence", fence.as_raw());
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> Result<()> {
        let mut state = self.state();
        state.record("wait_for_fence");
        let fence_state = match state.fences.get(&fence.as_raw()) {
            Some(fence_state) => *fence_state,
            None => {
                state.violations.push("wait on unknown fence".to_string());
                return Err(Error::BackendError("wait on unknown fence".to_string()));
            }
        };
        if fence_state.signaled {
            return Ok(());
        }
        match fence_state.pending {
            Some(index) => {
                let drained = state.complete_through(index);
                state.blocking_waits += 1;
                state.max_drained_per_wait = state.max_drained_per_wait.max(drained);
                Ok(())
            }
            None => {
                state.violations.push("wait on an unsignaled fence with no pending work".to_string());
                Err(Error::BackendError("deadlock: fence never signaled".to_string()))
            }
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        let mut state = self.state();
        state.record("reset_fence");
        let pending = match state.fences.get(&fence.as_raw()) {
            Some(fence_state) => fence_state.pending,
            None => {
                state.violations.push("reset of unknown fence".to_string());
                return Ok(());
            }
        };
        if pending.is_some() {
            state.violations.push("reset of a fence still in flight".to_string());
        }
        state.fences.insert(fence.as_raw(), FenceState { signaled: false, pending: None });
        Ok(())
    }

    // ===== QUEUES =====

    fn queue_submit(&self, submit: &SubmitDesc) -> Result<()> {
        let mut state = self.state();
        state.record("queue_submit");
        let index = state.submissions.len();

        let image = match submit.wait {
            Some((semaphore, _)) => match state.acquired {
                Some((image_index, acquire_semaphore)) => {
                    if acquire_semaphore != semaphore {
                        state.violations.push("submit waits on a semaphore no acquire signaled".to_string());
                    }
                    Some(image_index)
                }
                None => {
                    state.violations.push("frame submit without an acquired image".to_string());
                    None
                }
            },
            None => None,
        };

        if let Some(image_index) = image {
            if let Some(previous) = state.image_last_submission.get(&image_index).copied() {
                if !state.submissions[previous].complete {
                    state.violations.push(format!(
                        "image {} resubmitted while submission {} is still executing",
                        image_index, previous
                    ));
                }
            }
            state.image_last_submission.insert(image_index, index);
        }

        if submit.fence != vk::Fence::null() {
            let raw = submit.fence.as_raw();
            match state.fences.get(&raw).copied() {
                Some(fence_state) if fence_state.signaled || fence_state.pending.is_some() => {
                    state.violations.push("submit with a fence that was not reset".to_string());
                }
                Some(_) => {}
                None => state.violations.push("submit with unknown fence".to_string()),
            }
            state.fences.insert(raw, FenceState { signaled: false, pending: Some(index) });
        }

        state.submissions.push(Submission { fence: submit.fence, image, complete: false });
        Ok(())
    }

    fn queue_wait_idle(&self) -> Result<()> {
        let mut state = self.state();
        state.record("queue_wait_idle");
        state.complete_all();
        Ok(())
    }

    fn device_wait_idle(&self) -> Result<()> {
        let mut state = self.state();
        state.record("device_wait_idle");
        state.complete_all();
        Ok(())
    }

    fn destroy(&mut self) {
        let mut state = self.state();
        if state.device_destroyed {
            return;
        }
        state.record("destroy_device");
        if !state.live.is_empty() {
            let mut kinds: Vec<&'static str> = state.live.values().copied().collect();
            kinds.sort_unstable();
            state.violations.push(format!("device destroyed with live objects: {:?}", kinds));
        }
        state.device_destroyed = true;
    }
}

// ============================================================================
// Mock Window
// ============================================================================

/// Scripted window: a fixed extent, optionally minimized for a number of pumps
pub struct MockWindow {
    extent: (u32, u32),
    restore: Option<(usize, (u32, u32))>,
    open: bool,
    pub pumps: usize,
}

impl MockWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self { extent: (width, height), restore: None, open: true, pumps: 0 }
    }

    /// Report 0x0 until `pumps` more events have been pumped, then the current size
    pub fn minimize_for(&mut self, pumps: usize) {
        self.restore = Some((self.pumps + pumps, self.extent));
        self.extent = (0, 0);
    }

    pub fn set_extent(&mut self, width: u32, height: u32) {
        self.extent = (width, height);
    }

    /// Make every later pump report the window as closed
    pub fn close(&mut self) {
        self.open = false;
    }
}

impl WindowSystem for MockWindow {
    fn current_extent(&self) -> (u32, u32) {
        self.extent
    }

    fn pump_events(&mut self) -> bool {
        self.pumps += 1;
        if let Some((at, extent)) = self.restore {
            if self.pumps >= at {
                self.extent = extent;
                self.restore = None;
            }
        }
        self.open
    }
}

#[cfg(test)]
#[path = "mock_device_tests.rs"]
mod tests;
