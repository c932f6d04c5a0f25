/// FrameSynchronizer - frame slots, image-in-flight tracking, frame rotation
///
/// F frame slots each own an image-available semaphore, a render-finished
/// semaphore and a busy fence (created signaled). A separate table maps
/// every swapchain image to the fence of the slot that last used it, so an
/// image is never recorded into while older work on it is still executing,
/// whatever the relation between F and the swapchain image count.

use aga_engine::aga::{Error, Result};
use aga_engine::{engine_bail, engine_trace};
use ash::vk;

use crate::vulkan_device::{AcquireOutcome, DeviceApi, PresentOutcome, SubmitDesc};

/// Position of the current frame in the begin/submit/present sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

/// Synchronization objects of one frame in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlot {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

/// Result of starting a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginFrame {
    /// Image acquired and safe to record into
    Ready { image_index: u32, suboptimal: bool },
    /// Surface out of date: rebuild the swapchain and retry, the slot is unchanged
    OutOfDate,
}

pub struct FrameSynchronizer {
    slots: Vec<FrameSlot>,
    /// Fence of the slot that last used each swapchain image (null = none)
    images_in_flight: Vec<vk::Fence>,
    current_frame: usize,
    state: FrameState,
    image_index: Option<u32>,
}

impl Default for FrameSynchronizer {
    /// No slots; every frame operation fails until replaced by `new`
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            images_in_flight: Vec::new(),
            current_frame: 0,
            state: FrameState::Idle,
            image_index: None,
        }
    }
}

impl FrameSynchronizer {
    /// Create `frames_in_flight` slots and an empty table for `image_count` images
    pub fn new<D: DeviceApi>(device: &D, frames_in_flight: usize, image_count: usize) -> Result<Self> {
        if frames_in_flight == 0 {
            engine_bail!("aga::vulkan::FrameSync", "frames_in_flight must be at least 1");
        }

        let mut sync = Self {
            slots: Vec::with_capacity(frames_in_flight),
            images_in_flight: vec![vk::Fence::null(); image_count],
            ..Self::default()
        };

        for _ in 0..frames_in_flight {
            match Self::create_slot(device) {
                Ok(slot) => sync.slots.push(slot),
                Err(e) => {
                    sync.destroy(device);
                    return Err(e);
                }
            }
        }
        Ok(sync)
    }

    fn create_slot<D: DeviceApi>(device: &D) -> Result<FrameSlot> {
        let image_available = device.create_semaphore()?;
        let render_finished = match device.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                device.destroy_semaphore(image_available);
                return Err(e);
            }
        };
        // Signaled so the first wait on each slot returns immediately
        let in_flight = match device.create_fence(true) {
            Ok(fence) => fence,
            Err(e) => {
                device.destroy_semaphore(render_finished);
                device.destroy_semaphore(image_available);
                return Err(e);
            }
        };
        Ok(FrameSlot { image_available, render_finished, in_flight })
    }

    // ===== ACCESSORS =====

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Image acquired for the frame in progress
    pub fn image_index(&self) -> Option<u32> {
        self.image_index
    }

    pub fn current_slot(&self) -> Option<&FrameSlot> {
        self.slots.get(self.current_frame)
    }

    pub fn images_in_flight(&self) -> &[vk::Fence] {
        &self.images_in_flight
    }

    fn expect_state(&self, expected: FrameState, operation: &str) -> Result<FrameSlot> {
        if self.state != expected {
            engine_bail!(
                "aga::vulkan::FrameSync",
                "{} called in state {:?} (expected {:?})",
                operation,
                self.state,
                expected
            );
        }
        match self.slots.get(self.current_frame) {
            Some(slot) => Ok(*slot),
            None => Err(Error::BackendError("frame synchronizer has no slots".to_string())),
        }
    }

    // ===== FRAME SEQUENCE =====

    /// Wait for the current slot, acquire an image, then wait for any other
    /// slot still using that image
    pub fn begin_frame<D: DeviceApi>(&mut self, device: &D, swapchain: vk::SwapchainKHR) -> Result<BeginFrame> {
        let slot = self.expect_state(FrameState::Idle, "begin_frame")?;
        self.state = FrameState::Acquiring;

        device.wait_for_fence(slot.in_flight)?;

        let (image_index, suboptimal) = match device.acquire_next_image(swapchain, slot.image_available)? {
            AcquireOutcome::Acquired { image_index, suboptimal } => (image_index, suboptimal),
            AcquireOutcome::OutOfDate => {
                engine_trace!("aga::vulkan::FrameSync", "Acquire reported out of date on slot {}", self.current_frame);
                self.state = FrameState::Idle;
                return Ok(BeginFrame::OutOfDate);
            }
        };

        let image_fence = match self.images_in_flight.get(image_index as usize) {
            Some(fence) => *fence,
            None => {
                self.state = FrameState::Idle;
                engine_bail!(
                    "aga::vulkan::FrameSync",
                    "Acquired image {} outside the {}-image table",
                    image_index,
                    self.images_in_flight.len()
                );
            }
        };
        if image_fence != vk::Fence::null() && image_fence != slot.in_flight {
            device.wait_for_fence(image_fence)?;
        }
        self.images_in_flight[image_index as usize] = slot.in_flight;

        self.image_index = Some(image_index);
        self.state = FrameState::Recording;
        Ok(BeginFrame::Ready { image_index, suboptimal })
    }

    /// Reset the slot fence and submit, waiting for the acquired image and
    /// signaling render-finished
    pub fn submit<D: DeviceApi>(&mut self, device: &D, command_buffer: vk::CommandBuffer) -> Result<()> {
        let slot = self.expect_state(FrameState::Recording, "submit")?;

        device.reset_fence(slot.in_flight)?;
        device.queue_submit(&SubmitDesc {
            command_buffer,
            wait: Some((slot.image_available, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)),
            signal: Some(slot.render_finished),
            fence: slot.in_flight,
        })?;

        self.state = FrameState::Submitted;
        Ok(())
    }

    /// Present the acquired image once rendering has finished
    pub fn present<D: DeviceApi>(&mut self, device: &D, swapchain: vk::SwapchainKHR) -> Result<PresentOutcome> {
        let slot = self.expect_state(FrameState::Submitted, "present")?;
        let image_index = match self.image_index {
            Some(index) => index,
            None => return Err(Error::BackendError("present without an acquired image".to_string())),
        };

        self.state = FrameState::Presenting;
        device.queue_present(swapchain, image_index, slot.render_finished)
    }

    /// Move to the next slot: (index + 1) mod F
    pub fn advance(&mut self) {
        self.current_frame = (self.current_frame + 1) % self.slots.len().max(1);
        self.state = FrameState::Idle;
        self.image_index = None;
    }

    /// Drop the frame in progress without advancing (used after a failed step)
    pub fn abort_frame(&mut self) {
        self.state = FrameState::Idle;
        self.image_index = None;
    }

    /// Resize the image table for a rebuilt swapchain, all entries empty
    pub fn reset_images(&mut self, image_count: usize) {
        self.images_in_flight.clear();
        self.images_in_flight.resize(image_count, vk::Fence::null());
    }

    /// Destroy every slot; the caller makes sure the device is idle
    pub fn destroy<D: DeviceApi>(&mut self, device: &D) {
        for slot in self.slots.drain(..) {
            device.destroy_semaphore(slot.render_finished);
            device.destroy_semaphore(slot.image_available);
            device.destroy_fence(slot.in_flight);
        }
        self.images_in_flight.clear();
        self.current_frame = 0;
        self.state = FrameState::Idle;
        self.image_index = None;
    }
}

#[cfg(test)]
#[path = "vulkan_frame_sync_tests.rs"]
mod tests;
