//! Main loop
//!
//! Drives an [`Engine`] on the winit event loop. Every `AboutToWait` is one
//! iteration of the state machine, so all pending window events are handled
//! before a frame is rendered.

use crate::backend::types::*;
use crate::backend::{SwapchainConfig, WgpuBackend};
use crate::engine::{Engine, EngineError, FrameOutcome};
use crate::window::{NativeWindowPlatform, Window};
use crate::AppConfig;
use winit::event::Event;
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};

pub const EXIT_SUCCESS: i32 = 0;
/// Window system or device could not be initialized
pub const EXIT_INIT_FAILURE: i32 = 1;
/// The triangle pipeline failed to compile
pub const EXIT_PIPELINE_FAILURE: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppState {
    Initializing,
    Running,
    Draining,
    Terminated,
}

impl AppState {
    /// State after the user asked to close the window
    pub fn close_requested(self) -> Self {
        match self {
            AppState::Initializing | AppState::Running => AppState::Draining,
            other => other,
        }
    }

    /// State after a frame failed to render
    pub fn frame_failed(self) -> Self {
        self.close_requested()
    }
}

/// Surface format preference of the app. Falls back to [`default_format_score`].
pub fn surface_format_score(format: TextureFormat) -> i32 {
    match format {
        TextureFormat::Rgba8Unorm => 100,
        other => default_format_score(other),
    }
}

pub fn swapchain_config(platform: NativeWindowPlatform, config: &AppConfig) -> SwapchainConfig {
    SwapchainConfig::new(platform)
        .with_format_selector(surface_format_score)
        .with_present_mode(config.present_mode)
        .with_name(&format!("{} swapchain", config.title))
}

struct App {
    state: AppState,
    // Dropped before the window, the surface borrows it
    engine: Option<Engine<WgpuBackend>>,
    window: Window,
    max_frames: Option<u64>,
    exit_code: i32,
}

impl App {
    fn handle_event(&mut self, event: Event<()>, elwt: &EventLoopWindowTarget<()>) {
        match event {
            Event::WindowEvent { event, .. } => {
                self.window.handle_event(&event);
                if self.window.should_close() {
                    self.drain();
                }
            }
            Event::AboutToWait => self.tick(elwt),
            Event::LoopExiting => {
                self.engine = None;
                self.state = AppState::Terminated;
            }
            _ => {}
        }
    }

    fn drain(&mut self) {
        let next = self.state.close_requested();
        if next != self.state {
            log::info!("Close requested, draining");
        }
        self.state = next;
    }

    fn tick(&mut self, elwt: &EventLoopWindowTarget<()>) {
        match self.state {
            AppState::Running => self.run_frame(),
            AppState::Draining => {
                self.engine = None;
                self.state = AppState::Terminated;
                elwt.exit();
            }
            AppState::Initializing | AppState::Terminated => {}
        }
    }

    fn run_frame(&mut self) {
        let Some(engine) = &mut self.engine else {
            self.state = AppState::Draining;
            return;
        };

        if self.window.was_resized() {
            let (width, height) = self.window.dimensions();
            engine.resize(width, height);
            self.window.clear_resize_flag();
        }

        match engine.render_frame() {
            Ok(FrameOutcome::Rendered(report)) => {
                log::trace!("Frame {}: {:?}", engine.frame_count(), report.executed);
                if let Some(max_frames) = self.max_frames {
                    if engine.frame_count() >= max_frames {
                        log::info!("Reached max frames limit ({}), exiting", max_frames);
                        self.drain();
                    }
                }
            }
            Ok(FrameOutcome::Skipped) => {}
            Err(err) => {
                log::error!("Frame failed: {}", err);
                self.exit_code = EXIT_INIT_FAILURE;
                self.state = self.state.frame_failed();
            }
        }
    }
}

/// Run the application until the window closes. Returns the process exit code.
pub fn run(config: AppConfig) -> i32 {
    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            log::error!("Failed to create event loop: {}", err);
            return EXIT_INIT_FAILURE;
        }
    };
    let window = match Window::new(&event_loop, &config.title, config.width, config.height) {
        Ok(window) => window,
        Err(err) => {
            log::error!("Failed to create window: {}", err);
            return EXIT_INIT_FAILURE;
        }
    };
    let native = match window.native_handle() {
        Ok(native) => native,
        Err(err) => {
            log::error!("{}", err);
            return EXIT_INIT_FAILURE;
        }
    };
    log::info!("Window platform: {:?}", native.platform);

    let backend = match WgpuBackend::new(window.window_arc(), &swapchain_config(native.platform, &config)) {
        Ok(backend) => backend,
        Err(err) => {
            log::error!("Failed to create device: {}", err);
            return EXIT_INIT_FAILURE;
        }
    };
    let engine = match Engine::new(backend, &config.engine_config()) {
        Ok(engine) => engine,
        Err(EngineError::Shader(err)) => {
            log::error!("Pipeline compilation failed: {}", err);
            eprintln!("{}", err);
            return EXIT_PIPELINE_FAILURE;
        }
        Err(err) => {
            log::error!("Failed to initialize engine: {}", err);
            return EXIT_INIT_FAILURE;
        }
    };

    let mut app = App {
        state: AppState::Running,
        engine: Some(engine),
        window,
        max_frames: config.max_frames,
        exit_code: EXIT_SUCCESS,
    };

    event_loop.set_control_flow(ControlFlow::Poll);
    if let Err(err) = event_loop.run(|event, elwt| app.handle_event(event, elwt)) {
        log::error!("Event loop error: {}", err);
        return EXIT_INIT_FAILURE;
    }

    app.exit_code
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AppState::Initializing, AppState::Draining)]
    #[case(AppState::Running, AppState::Draining)]
    #[case(AppState::Draining, AppState::Draining)]
    #[case(AppState::Terminated, AppState::Terminated)]
    fn close_request_drains(#[case] state: AppState, #[case] expected: AppState) {
        assert_eq!(state.close_requested(), expected);
    }

    #[test]
    fn rgba8_unorm_is_preferred() {
        let candidates = [
            TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgba8Unorm,
            TextureFormat::Bgra8Unorm,
        ];
        assert_eq!(
            select_format(&candidates, surface_format_score),
            Some(TextureFormat::Rgba8Unorm)
        );
        assert_eq!(
            select_format(&[TextureFormat::Bgra8Unorm, TextureFormat::Bgra8UnormSrgb], surface_format_score),
            Some(TextureFormat::Bgra8UnormSrgb)
        );
    }

    #[test]
    fn swapchain_config_follows_app_config() {
        let config = AppConfig::default().with_present_mode(PresentMode::Fifo);
        let swapchain = swapchain_config(NativeWindowPlatform::Xlib, &config);
        assert_eq!(swapchain.present_mode, PresentMode::Fifo);
        assert_eq!(swapchain.native_window_platform, NativeWindowPlatform::Xlib);
        assert!(swapchain.validate().is_ok());
    }
}
