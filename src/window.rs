//! Window management using winit

use raw_window_handle::{HasWindowHandle, RawWindowHandle};
use std::sync::Arc;
use thiserror::Error;
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, WindowEvent},
    event_loop::EventLoop,
    keyboard::{Key, NamedKey},
    window::{Window as WinitWindow, WindowBuilder},
};

#[derive(Error, Debug)]
pub enum WindowError {
    #[error("failed to create event loop: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("failed to create window: {0}")]
    Creation(#[from] winit::error::OsError),
    #[error("window handle unavailable: {0}")]
    Handle(#[from] raw_window_handle::HandleError),
}

/// Windowing system a native handle belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeWindowPlatform {
    Win32,
    /// X11, through either Xlib or XCB
    Xlib,
    Wayland,
    Unknown,
}

impl NativeWindowPlatform {
    pub fn of(handle: &RawWindowHandle) -> Self {
        match handle {
            RawWindowHandle::Win32(_) => NativeWindowPlatform::Win32,
            RawWindowHandle::Xlib(_) | RawWindowHandle::Xcb(_) => NativeWindowPlatform::Xlib,
            RawWindowHandle::Wayland(_) => NativeWindowPlatform::Wayland,
            _ => NativeWindowPlatform::Unknown,
        }
    }
}

/// Platform-specific handle of a live window
#[derive(Debug, Clone, Copy)]
pub struct NativeWindowHandle {
    pub platform: NativeWindowPlatform,
    pub raw: RawWindowHandle,
}

/// Wrapper around winit window with additional state
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
    resized: bool,
    close_requested: bool,
}

impl Window {
    /// Create a new window with the given title and dimensions
    pub fn new(
        event_loop: &EventLoop<()>,
        title: &str,
        width: u32,
        height: u32,
    ) -> Result<Self, WindowError> {
        let window = Arc::new(
            WindowBuilder::new()
                .with_title(title)
                .with_inner_size(PhysicalSize::new(width, height))
                .build(event_loop)?,
        );
        let size = window.inner_size();

        Ok(Self {
            window,
            width: size.width,
            height: size.height,
            resized: false,
            close_requested: false,
        })
    }

    /// Get arc reference to window, for surface creation
    pub fn window_arc(&self) -> Arc<WinitWindow> {
        Arc::clone(&self.window)
    }

    /// Native handle and the platform it belongs to
    pub fn native_handle(&self) -> Result<NativeWindowHandle, WindowError> {
        let raw = self.window.window_handle()?.as_raw();
        let platform = NativeWindowPlatform::of(&raw);
        if platform == NativeWindowPlatform::Unknown {
            log::warn!("Unrecognized window platform: {:?}", raw);
        }
        Ok(NativeWindowHandle { platform, raw })
    }

    /// Get current window dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Check if window was resized since last frame
    pub fn was_resized(&self) -> bool {
        self.resized
    }

    /// Clear the resize flag
    pub fn clear_resize_flag(&mut self) {
        self.resized = false;
    }

    /// Check if close was requested
    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    /// Handle window events
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::Resized(size) => {
                self.width = size.width;
                self.height = size.height;
                self.resized = true;
            }
            event if is_close_request(event) => {
                self.close_requested = true;
            }
            _ => {}
        }
    }
}

/// Window close button, or Escape pressed
pub fn is_close_request(event: &WindowEvent) -> bool {
    match event {
        WindowEvent::CloseRequested => true,
        WindowEvent::KeyboardInput { event, .. } => {
            event.state == ElementState::Pressed
                && event.logical_key == Key::Named(NamedKey::Escape)
        }
        _ => false,
    }
}
