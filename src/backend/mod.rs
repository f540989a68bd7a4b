//! Backend abstraction layer
//!
//! Provides the device contract that both the wgpu and the headless backends
//! implement.

pub mod deferred;
pub mod headless;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use headless::HeadlessBackend;
pub use traits::*;
pub use types::*;
pub use wgpu_backend::WgpuBackend;
