//! Core backend abstraction traits
//!
//! These traits define the device contract that both the wgpu and the headless
//! backends implement. The render graph records every task through it.

use crate::backend::types::*;
use crate::render_graph::Barrier;
use crate::window::NativeWindowPlatform;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to create swapchain: {0}")]
    SwapchainCreationFailed(String),
    #[error("Invalid swapchain configuration: {0}")]
    InvalidSwapchainConfig(String),
    #[error("Failed to acquire next image: {0}")]
    AcquireImageFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Unknown buffer {0:?}")]
    UnknownBuffer(BufferHandle),
    #[error("Buffer {0:?} is not host visible")]
    BufferNotHostVisible(BufferHandle),
    #[error("Write of {len} bytes at offset {offset} overflows buffer of {size} bytes")]
    BufferOverflow { offset: u64, len: u64, size: u64 },
    #[error("Failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("Surface lost")]
    SurfaceLost,
    #[error("Out of memory")]
    OutOfMemory,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a texture view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureViewHandle(pub(crate) u64);

/// Handle to a render pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPipelineHandle(pub(crate) u64);

/// Swapchain creation options
#[derive(Debug, Clone)]
pub struct SwapchainConfig {
    /// Windowing platform the surface is created for
    pub native_window_platform: NativeWindowPlatform,
    /// Scores every format the surface supports; the highest score wins
    pub surface_format_selector: fn(TextureFormat) -> i32,
    pub present_mode: PresentMode,
    pub image_usage: TextureUsage,
    pub name: String,
}

impl SwapchainConfig {
    pub fn new(native_window_platform: NativeWindowPlatform) -> Self {
        Self {
            native_window_platform,
            surface_format_selector: default_format_score,
            present_mode: PresentMode::Mailbox,
            image_usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_DST,
            name: "swapchain".to_string(),
        }
    }

    pub fn with_format_selector(mut self, selector: fn(TextureFormat) -> i32) -> Self {
        self.surface_format_selector = selector;
        self
    }

    pub fn with_present_mode(mut self, present_mode: PresentMode) -> Self {
        self.present_mode = present_mode;
        self
    }

    pub fn with_image_usage(mut self, image_usage: TextureUsage) -> Self {
        self.image_usage = image_usage;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Check the configuration before any surface is created
    pub fn validate(&self) -> BackendResult<()> {
        if !self.image_usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            return Err(BackendError::InvalidSwapchainConfig(
                "image usage must include RENDER_ATTACHMENT".into(),
            ));
        }
        if self.name.is_empty() {
            return Err(BackendError::InvalidSwapchainConfig(
                "swapchain name must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Color target of a render pipeline
#[derive(Debug, Clone)]
pub struct ColorTargetState {
    pub format: TextureFormat,
}

/// One shader stage of a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderStageSource {
    /// WGSL source, already validated
    pub source: String,
    pub entry_point: String,
}

/// Render pipeline descriptor
#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor {
    pub label: Option<String>,
    pub vertex: ShaderStageSource,
    pub fragment: ShaderStageSource,
    pub color_targets: Vec<ColorTargetState>,
    pub primitive_topology: PrimitiveTopology,
    pub front_face: FrontFace,
    pub cull_mode: CullMode,
    /// Size in bytes of the push constant block visible to the vertex stage
    pub push_constant_size: u32,
}

/// Color attachment for render pass
#[derive(Debug, Clone)]
pub struct ColorAttachment {
    pub view: TextureViewHandle,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOp {
    Clear([f32; 4]),
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    Discard,
}

/// Render pass descriptor
#[derive(Debug, Clone)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<ColorAttachment>,
    /// Render area in pixels, starting at the origin
    pub render_area: (u32, u32),
}

/// Main graphics backend trait
pub trait GraphicsBackend {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Resize the swapchain
    fn resize(&mut self, width: u32, height: u32);

    /// Get the actual surface size (may be clamped by device limits)
    fn surface_size(&self) -> (u32, u32);

    /// Get the swapchain format
    fn swapchain_format(&self) -> TextureFormat;

    /// Acquire the next swapchain image.
    ///
    /// `Ok(None)` means no image is available right now (minimized window,
    /// outdated surface); callers skip the frame.
    fn acquire_next_image(&mut self) -> BackendResult<Option<SwapchainImage>>;

    /// Present the most recently acquired image
    fn present(&mut self) -> BackendResult<()>;

    // Resource creation

    /// Create a buffer
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle>;

    /// Write to a host-visible buffer directly from the CPU
    fn write_host_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8])
        -> BackendResult<()>;

    /// GPU address of a buffer
    fn device_address(&self, buffer: BufferHandle) -> BackendResult<DeviceAddress>;

    /// Create a render pipeline
    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle>;

    // Command recording and execution

    /// Start recording commands, if not already recording
    fn begin_commands(&mut self, label: Option<&str>);

    /// Drop everything recorded since the last submission without running it
    fn discard_commands(&mut self);

    /// Synchronize a resource between two accesses
    fn pipeline_barrier(&mut self, barrier: &Barrier);

    /// Copy `size` bytes from the start of `src` to the start of `dst`
    fn copy_buffer_to_buffer(&mut self, src: BufferHandle, dst: BufferHandle, size: u64);

    /// Begin a render pass
    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor);

    /// End the current render pass
    fn end_render_pass(&mut self);

    /// Set the render pipeline
    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle);

    /// Make the buffer behind `address` readable by the bound pipeline.
    ///
    /// Backends without native buffer addresses bind it as the read-only
    /// storage buffer at group 0.
    fn use_buffer_address(&mut self, address: DeviceAddress);

    /// Set the push constant block of the bound pipeline
    fn push_constants(&mut self, data: &[u8]);

    /// Draw primitives
    fn draw(&mut self, vertices: std::ops::Range<u32>, instances: std::ops::Range<u32>);

    /// Submit recorded commands, returning the submission serial
    fn submit(&mut self) -> BackendResult<u64>;

    /// Block until all submitted work has finished
    fn wait_idle(&mut self);

    // Resource cleanup

    /// Destroy a buffer immediately
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Destroy a buffer once the GPU has finished the commands recorded so far
    fn destroy_buffer_deferred(&mut self, buffer: BufferHandle);

    /// Release deferred resources whose submissions have completed.
    ///
    /// Returns the number of resources released.
    fn collect_garbage(&mut self) -> usize;

    /// Number of resources still waiting for deferred destruction
    fn pending_destructions(&self) -> usize;
}
