//! Window-system capability
//!
//! The renderer only ever sees a window through [`WindowSystem`] plus the
//! `raw-window-handle` traits used for surface creation. The concrete window
//! type is picked at compile time by the application.

use std::time::Duration;
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

use crate::error::{Error, Result};

/// Operations the renderer needs from the windowing layer
pub trait WindowSystem {
    /// Current drawable size in pixels (may be 0x0 while minimized)
    fn current_extent(&self) -> (u32, u32);

    /// Process pending native events; false once the window should close
    fn pump_events(&mut self) -> bool;
}

/// Event state collected while pumping the winit event loop
#[derive(Default)]
struct WindowEvents {
    resized: bool,
    close_requested: bool,
}

impl ApplicationHandler for WindowEvents {
    fn resumed(&mut self, _event_loop: &ActiveEventLoop) {}

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.close_requested = true,
            WindowEvent::Resized(_) => self.resized = true,
            _ => {}
        }
    }
}

/// Desktop window backed by winit
///
/// Events are pumped on demand so the application owns the frame loop.
pub struct WinitWindow {
    window: Window,
    event_loop: EventLoop<()>,
    events: WindowEvents,
}

impl WinitWindow {
    /// Open a window with the given inner size in physical pixels
    #[allow(deprecated)]
    pub fn new(title: &str, width: u32, height: u32, visible: bool) -> Result<Self> {
        let event_loop = EventLoop::new()
            .map_err(|e| {
                crate::engine_error!("aga::platform", "Failed to create event loop: {}", e);
                Error::InitializationFailed(format!("Failed to create event loop: {}", e))
            })?;

        let attributes = Window::default_attributes()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_visible(visible);

        let window = event_loop.create_window(attributes)
            .map_err(|e| {
                crate::engine_error!("aga::platform", "Failed to create window: {}", e);
                Error::InitializationFailed(format!("Failed to create window: {}", e))
            })?;

        crate::engine_info!("aga::platform", "Window '{}' created ({}x{})", title, width, height);

        Ok(Self { window, event_loop, events: WindowEvents::default() })
    }

    /// Return and clear the resize latch
    pub fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.events.resized)
    }

    pub fn close_requested(&self) -> bool {
        self.events.close_requested
    }

    /// Underlying winit window
    pub fn window(&self) -> &Window {
        &self.window
    }
}

impl WindowSystem for WinitWindow {
    fn current_extent(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    fn pump_events(&mut self) -> bool {
        let status = self.event_loop.pump_app_events(Some(Duration::ZERO), &mut self.events);
        if let PumpStatus::Exit(code) = status {
            crate::engine_debug!("aga::platform", "Event loop exited with code {}", code);
            return false;
        }
        !self.events.close_requested
    }
}

impl HasWindowHandle for WinitWindow {
    fn window_handle(&self) -> std::result::Result<WindowHandle<'_>, HandleError> {
        self.window.window_handle()
    }
}

impl HasDisplayHandle for WinitWindow {
    fn display_handle(&self) -> std::result::Result<DisplayHandle<'_>, HandleError> {
        self.window.display_handle()
    }
}
