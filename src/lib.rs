//! Green Hour - a task graph driven triangle renderer
//!
//! Opens a window, creates a wgpu device and swapchain, uploads three
//! vertices through a staging buffer and draws them every frame. GPU work is
//! declared as tasks on a [`render_graph::TaskGraph`], which derives the
//! barriers between them.
//!
//! The [`backend::HeadlessBackend`] implements the same device contract in
//! memory and is what the tests run against.

pub mod app;
pub mod backend;
pub mod engine;
pub mod pipeline;
pub mod render_graph;
pub mod scene;
pub mod shader;
pub mod window;

// Re-export Bevy ECS prelude for users
pub use bevy_ecs::prelude::*;

pub use backend::types::PresentMode;
pub use backend::wgpu_backend::WgpuBackend;
pub use engine::{Engine, EngineConfig};
pub use window::Window;

use std::path::PathBuf;

/// Prepended to the shader search roots when set
pub const SHADER_DIR_ENV: &str = "GREEN_HOUR_SHADER_DIR";
/// Exit after this many rendered frames when set
pub const MAX_FRAMES_ENV: &str = "GREEN_HOUR_MAX_FRAMES";

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Directories searched for `main.wgsl`, in order
    pub shader_root_paths: Vec<PathBuf>,
    pub present_mode: PresentMode,
    /// Stop after this many rendered frames
    pub max_frames: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Green Hour".to_string(),
            width: 640,
            height: 480,
            shader_root_paths: EngineConfig::default().shader_root_paths,
            present_mode: PresentMode::Mailbox,
            max_frames: None,
        }
    }
}

impl AppConfig {
    /// Defaults, adjusted by `GREEN_HOUR_SHADER_DIR` and `GREEN_HOUR_MAX_FRAMES`
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var_os(SHADER_DIR_ENV).map(PathBuf::from),
            std::env::var(MAX_FRAMES_ENV).ok().as_deref(),
        )
    }

    fn from_vars(shader_dir: Option<PathBuf>, max_frames: Option<&str>) -> Self {
        let mut config = Self::default();
        if let Some(dir) = shader_dir {
            config.shader_root_paths.insert(0, dir);
        }
        if let Some(value) = max_frames {
            match value.trim().parse() {
                Ok(max_frames) => config.max_frames = Some(max_frames),
                Err(_) => log::warn!("Ignoring invalid {}={:?}", MAX_FRAMES_ENV, value),
            }
        }
        config
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_shader_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.shader_root_paths.insert(0, path.into());
        self
    }

    pub fn with_present_mode(mut self, present_mode: PresentMode) -> Self {
        self.present_mode = present_mode;
        self
    }

    pub fn with_max_frames(mut self, max_frames: u64) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            shader_root_paths: self.shader_root_paths.clone(),
            ..Default::default()
        }
    }
}

/// Initialize `env_logger` with an `info` default filter. `RUST_LOG` overrides it.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AppConfig::default();
        assert_eq!(config.title, "Green Hour");
        assert_eq!((config.width, config.height), (640, 480));
        assert_eq!(config.present_mode, PresentMode::Mailbox);
        assert_eq!(config.shader_root_paths, vec![PathBuf::from("shaders")]);
        assert_eq!(config.max_frames, None);
    }

    #[test]
    fn env_shader_dir_is_searched_first() {
        let config = AppConfig::from_vars(Some(PathBuf::from("/opt/shaders")), Some("12"));
        assert_eq!(
            config.shader_root_paths,
            vec![PathBuf::from("/opt/shaders"), PathBuf::from("shaders")]
        );
        assert_eq!(config.max_frames, Some(12));
        assert_eq!(config.engine_config().shader_root_paths, config.shader_root_paths);
    }

    #[test]
    fn invalid_max_frames_is_ignored() {
        assert_eq!(AppConfig::from_vars(None, Some("soon")).max_frames, None);
    }
}
