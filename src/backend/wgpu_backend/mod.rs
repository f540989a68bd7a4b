//! wgpu backend implementation
//!
//! wgpu has no buffer device addresses. A [`DeviceAddress`] here is the
//! buffer's slot id, and using an address binds that buffer as the read-only
//! storage buffer at group 0, where shaders pull vertices from it.

use crate::backend::deferred::DeferredQueue;
use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::Barrier;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Buffered render pass command
#[derive(Clone)]
enum RenderCommand {
    SetPipeline(RenderPipelineHandle),
    BindAddress(DeviceAddress),
    SetPushConstants(Vec<u8>),
    Draw {
        vertices: std::ops::Range<u32>,
        instances: std::ops::Range<u32>,
    },
}

/// Pending render pass with buffered commands
struct PendingRenderPass {
    descriptor: RenderPassDescriptor,
    commands: Vec<RenderCommand>,
}

struct WgpuBuffer {
    buffer: wgpu::Buffer,
    usage: BufferUsage,
    /// Still mapped from creation, writable from the host
    mapped: bool,
}

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: wgpu::SurfaceConfiguration,
    /// Surface has a zero extent (minimized) and is not configured
    surface_suspended: bool,
    current_texture: Option<wgpu::SurfaceTexture>,
    current_view_id: u64,

    // Resource storage
    buffers: HashMap<u64, WgpuBuffer>,
    render_pipelines: HashMap<u64, wgpu::RenderPipeline>,
    address_layout: wgpu::BindGroupLayout,
    address_bind_groups: HashMap<u64, wgpu::BindGroup>,
    next_id: u64,

    // Command encoding
    encoder: Option<wgpu::CommandEncoder>,
    pending_render_pass: Option<PendingRenderPass>,

    // Submission tracking
    submitted_serial: u64,
    completed_serial: Arc<AtomicU64>,
    deferred: DeferredQueue<BufferHandle>,
}

impl WgpuBackend {
    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgb10a2Unorm => wgpu::TextureFormat::Rgb10a2Unorm,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        }
    }

    fn convert_texture_format_back(format: wgpu::TextureFormat) -> Option<TextureFormat> {
        match format {
            wgpu::TextureFormat::Rgba8Unorm => Some(TextureFormat::Rgba8Unorm),
            wgpu::TextureFormat::Rgba8UnormSrgb => Some(TextureFormat::Rgba8UnormSrgb),
            wgpu::TextureFormat::Bgra8Unorm => Some(TextureFormat::Bgra8Unorm),
            wgpu::TextureFormat::Bgra8UnormSrgb => Some(TextureFormat::Bgra8UnormSrgb),
            wgpu::TextureFormat::Rgb10a2Unorm => Some(TextureFormat::Rgb10a2Unorm),
            wgpu::TextureFormat::Rgba16Float => Some(TextureFormat::Rgba16Float),
            _ => None,
        }
    }

    fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
        let mut result = wgpu::BufferUsages::empty();
        if usage.contains(BufferUsage::MAP_READ) {
            result |= wgpu::BufferUsages::MAP_READ;
        }
        if usage.contains(BufferUsage::MAP_WRITE) {
            result |= wgpu::BufferUsages::MAP_WRITE;
        }
        if usage.contains(BufferUsage::COPY_SRC) {
            result |= wgpu::BufferUsages::COPY_SRC;
        }
        if usage.contains(BufferUsage::COPY_DST) {
            result |= wgpu::BufferUsages::COPY_DST;
        }
        if usage.contains(BufferUsage::INDEX) {
            result |= wgpu::BufferUsages::INDEX;
        }
        if usage.contains(BufferUsage::VERTEX) {
            result |= wgpu::BufferUsages::VERTEX;
        }
        if usage.contains(BufferUsage::UNIFORM) {
            result |= wgpu::BufferUsages::UNIFORM;
        }
        if usage.contains(BufferUsage::STORAGE) {
            result |= wgpu::BufferUsages::STORAGE;
        }
        result
    }

    fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
        let mut result = wgpu::TextureUsages::empty();
        if usage.contains(TextureUsage::COPY_SRC) {
            result |= wgpu::TextureUsages::COPY_SRC;
        }
        if usage.contains(TextureUsage::COPY_DST) {
            result |= wgpu::TextureUsages::COPY_DST;
        }
        if usage.contains(TextureUsage::TEXTURE_BINDING) {
            result |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if usage.contains(TextureUsage::STORAGE_BINDING) {
            result |= wgpu::TextureUsages::STORAGE_BINDING;
        }
        if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        result
    }

    fn convert_present_mode(mode: PresentMode) -> wgpu::PresentMode {
        match mode {
            PresentMode::Immediate => wgpu::PresentMode::Immediate,
            PresentMode::Mailbox => wgpu::PresentMode::Mailbox,
            PresentMode::Fifo => wgpu::PresentMode::Fifo,
        }
    }

    /// Clamp to device limits while maintaining aspect ratio
    fn clamp_extent(&self, width: u32, height: u32) -> (u32, u32) {
        let max_size = self.device.limits().max_texture_dimension_2d;
        if width > max_size || height > max_size {
            let scale = (max_size as f32 / width as f32).min(max_size as f32 / height as f32);
            (
                ((width as f32 * scale) as u32).max(1),
                ((height as f32 * scale) as u32).max(1),
            )
        } else {
            (width, height)
        }
    }
}

impl WgpuBackend {
    /// Create the instance, device and swapchain for `window`
    pub fn new(window: Arc<winit::window::Window>, config: &SwapchainConfig) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(window, config))
    }

    pub async fn new_async(
        window: Arc<winit::window::Window>,
        config: &SwapchainConfig,
    ) -> BackendResult<Self> {
        config.validate()?;
        log::info!(
            "Creating swapchain '{}' for {:?} window",
            config.name,
            config.native_window_platform
        );

        let (instance, surface, adapter, device, queue) = Self::init_native(window.clone()).await?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);

        let candidates: Vec<TextureFormat> = surface_caps
            .formats
            .iter()
            .filter_map(|&f| Self::convert_texture_format_back(f))
            .collect();
        let format = select_format(&candidates, config.surface_format_selector).ok_or_else(|| {
            BackendError::SwapchainCreationFailed(format!(
                "none of the surface formats {:?} is supported",
                surface_caps.formats
            ))
        })?;

        let requested_mode = Self::convert_present_mode(config.present_mode);
        let present_mode = if surface_caps.present_modes.contains(&requested_mode) {
            requested_mode
        } else {
            log::warn!(
                "Present mode {:?} not supported by the surface, falling back to Fifo",
                config.present_mode
            );
            wgpu::PresentMode::Fifo
        };

        let requested_usage = Self::convert_texture_usage(config.image_usage);
        let usage = requested_usage & surface_caps.usages;
        if usage != requested_usage {
            log::warn!(
                "Swapchain usage {:?} not fully supported, using {:?}",
                requested_usage,
                usage
            );
        }

        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let surface_config = wgpu::SurfaceConfiguration {
            usage,
            format: Self::convert_texture_format(format),
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let address_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("buffer address layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let mut backend = Self {
            instance,
            surface,
            adapter,
            device,
            queue,
            surface_config,
            surface_suspended: true,
            current_texture: None,
            current_view_id: 0,
            buffers: HashMap::new(),
            render_pipelines: HashMap::new(),
            address_layout,
            address_bind_groups: HashMap::new(),
            next_id: 1,
            encoder: None,
            pending_render_pass: None,
            submitted_serial: 0,
            completed_serial: Arc::new(AtomicU64::new(0)),
            deferred: DeferredQueue::new(),
        };
        backend.resize(size.width, size.height);

        log::info!(
            "Swapchain format {:?}, present mode {:?}",
            format,
            backend.surface_config.present_mode
        );
        Ok(backend)
    }

    async fn init_native(
        window: Arc<winit::window::Window>,
    ) -> BackendResult<(
        wgpu::Instance,
        wgpu::Surface<'static>,
        wgpu::Adapter,
        wgpu::Device,
        wgpu::Queue,
    )> {
        let backends = wgpu::util::backend_bits_from_env().unwrap_or(wgpu::Backends::all());

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        if !adapter.features().contains(wgpu::Features::PUSH_CONSTANTS) {
            return Err(BackendError::DeviceCreationFailed(format!(
                "{} does not support push constants",
                adapter_info.name
            )));
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Green Hour Device"),
                    required_features: wgpu::Features::PUSH_CONSTANTS,
                    required_limits: wgpu::Limits {
                        max_push_constant_size: adapter.limits().max_push_constant_size.min(128),
                        ..wgpu::Limits::default()
                    },
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        Ok((instance, surface, adapter, device, queue))
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let device = &self.device;
        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            })
        })
    }

    /// Hand a buffer mapped at creation over to the GPU
    fn unmap_if_mapped(&mut self, buffer: BufferHandle) {
        if let Some(buf) = self.buffers.get_mut(&buffer.0) {
            if buf.mapped {
                buf.buffer.unmap();
                buf.mapped = false;
            }
        }
    }

    fn release_buffer(&mut self, buffer: BufferHandle) {
        self.address_bind_groups.remove(&buffer.0);
        if let Some(buf) = self.buffers.remove(&buffer.0) {
            buf.buffer.destroy();
        }
    }

    /// Get reference to the wgpu device
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Serial of the newest submission known to be complete
    pub fn completed_serial(&self) -> u64 {
        self.completed_serial.load(Ordering::Acquire)
    }
}

impl GraphicsBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            self.surface_suspended = true;
            return;
        }
        let (width, height) = self.clamp_extent(width, height);
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(&self.device, &self.surface_config);
        self.surface_suspended = false;
    }

    fn surface_size(&self) -> (u32, u32) {
        if self.surface_suspended {
            (0, 0)
        } else {
            (self.surface_config.width, self.surface_config.height)
        }
    }

    fn swapchain_format(&self) -> TextureFormat {
        Self::convert_texture_format_back(self.surface_config.format)
            .unwrap_or(TextureFormat::Bgra8UnormSrgb)
    }

    fn acquire_next_image(&mut self) -> BackendResult<Option<SwapchainImage>> {
        if self.surface_suspended {
            return Ok(None);
        }

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Timeout) => return Ok(None),
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                log::debug!("Surface outdated, reconfiguring");
                self.surface.configure(&self.device, &self.surface_config);
                return Ok(None);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(BackendError::OutOfMemory),
        };

        // the view itself is created when a pass renders to it
        let view_id = self.alloc_id();
        self.current_view_id = view_id;
        self.current_texture = Some(output);

        Ok(Some(SwapchainImage {
            view: TextureViewHandle(view_id),
            width: self.surface_config.width,
            height: self.surface_config.height,
            format: self.swapchain_format(),
        }))
    }

    fn present(&mut self) -> BackendResult<()> {
        let texture = self.current_texture.take().ok_or_else(|| {
            BackendError::AcquireImageFailed("present called without an acquired image".into())
        })?;
        texture.present();
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        let mapped = desc.memory.is_host_visible();
        let size = if mapped {
            wgpu::util::align_to(desc.size, wgpu::COPY_BUFFER_ALIGNMENT)
        } else {
            desc.size
        };

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label.as_deref(),
            size,
            usage: Self::convert_buffer_usage(desc.usage),
            mapped_at_creation: mapped,
        });

        let id = self.alloc_id();
        self.buffers.insert(
            id,
            WgpuBuffer {
                buffer,
                usage: desc.usage,
                mapped,
            },
        );

        Ok(BufferHandle(id))
    }

    fn write_host_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> BackendResult<()> {
        let buf = self
            .buffers
            .get(&buffer.0)
            .ok_or(BackendError::UnknownBuffer(buffer))?;

        let size = buf.buffer.size();
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|&end| end <= size)
            .ok_or(BackendError::BufferOverflow {
                offset,
                len: data.len() as u64,
                size,
            })?;

        if buf.mapped {
            buf.buffer
                .slice(offset..end)
                .get_mapped_range_mut()
                .copy_from_slice(data);
            Ok(())
        } else if buf.usage.contains(BufferUsage::COPY_DST) {
            self.queue.write_buffer(&buf.buffer, offset, data);
            Ok(())
        } else {
            Err(BackendError::BufferNotHostVisible(buffer))
        }
    }

    fn device_address(&self, buffer: BufferHandle) -> BackendResult<DeviceAddress> {
        if self.buffers.contains_key(&buffer.0) {
            Ok(DeviceAddress(buffer.0))
        } else {
            Err(BackendError::UnknownBuffer(buffer))
        }
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex_module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: desc.label.as_deref(),
                source: wgpu::ShaderSource::Wgsl(desc.vertex.source.as_str().into()),
            });
        let fragment_module = if desc.fragment.source == desc.vertex.source {
            None
        } else {
            Some(
                self.device
                    .create_shader_module(wgpu::ShaderModuleDescriptor {
                        label: desc.label.as_deref(),
                        source: wgpu::ShaderSource::Wgsl(desc.fragment.source.as_str().into()),
                    }),
            )
        };

        let push_constant_ranges = if desc.push_constant_size > 0 {
            vec![wgpu::PushConstantRange {
                stages: wgpu::ShaderStages::VERTEX,
                range: 0..desc.push_constant_size,
            }]
        } else {
            Vec::new()
        };

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: desc.label.as_deref(),
                bind_group_layouts: &[&self.address_layout],
                push_constant_ranges: &push_constant_ranges,
            });

        let color_targets: Vec<Option<wgpu::ColorTargetState>> = desc
            .color_targets
            .iter()
            .map(|target| {
                Some(wgpu::ColorTargetState {
                    format: Self::convert_texture_format(target.format),
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let primitive = wgpu::PrimitiveState {
            topology: match desc.primitive_topology {
                PrimitiveTopology::PointList => wgpu::PrimitiveTopology::PointList,
                PrimitiveTopology::LineList => wgpu::PrimitiveTopology::LineList,
                PrimitiveTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
                PrimitiveTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
            },
            strip_index_format: None,
            front_face: match desc.front_face {
                FrontFace::Ccw => wgpu::FrontFace::Ccw,
                FrontFace::Cw => wgpu::FrontFace::Cw,
            },
            cull_mode: match desc.cull_mode {
                CullMode::None => None,
                CullMode::Front => Some(wgpu::Face::Front),
                CullMode::Back => Some(wgpu::Face::Back),
            },
            ..Default::default()
        };

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: desc.label.as_deref(),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex_module,
                    entry_point: &desc.vertex.entry_point,
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: fragment_module.as_ref().unwrap_or(&vertex_module),
                    entry_point: &desc.fragment.entry_point,
                    targets: &color_targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive,
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::PipelineCreationFailed(error.to_string()));
        }

        let id = self.alloc_id();
        self.render_pipelines.insert(id, pipeline);

        Ok(RenderPipelineHandle(id))
    }

    fn begin_commands(&mut self, label: Option<&str>) {
        if self.encoder.is_none() {
            self.encoder = Some(
                self.device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor { label }),
            );
        }
    }

    fn discard_commands(&mut self) {
        self.pending_render_pass = None;
        if self.encoder.take().is_some() {
            log::debug!("wgpu: discarded unsubmitted commands");
        }
    }

    fn pipeline_barrier(&mut self, barrier: &Barrier) {
        // wgpu inserts its own barriers
        log::trace!("wgpu: barrier {:?}", barrier);
    }

    fn copy_buffer_to_buffer(&mut self, src: BufferHandle, dst: BufferHandle, size: u64) {
        self.unmap_if_mapped(src);
        let size = wgpu::util::align_to(size, wgpu::COPY_BUFFER_ALIGNMENT);
        // the encoder is taken so both buffers can be borrowed from the map
        let mut encoder = self.encoder.take();
        let encoder_ref = encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                })
        });
        match (self.buffers.get(&src.0), self.buffers.get(&dst.0)) {
            (Some(src_buf), Some(dst_buf)) => {
                encoder_ref.copy_buffer_to_buffer(&src_buf.buffer, 0, &dst_buf.buffer, 0, size);
            }
            _ => log::error!("wgpu: copy between unknown buffers {:?} -> {:?}", src, dst),
        }
        self.encoder = encoder;
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        self.pending_render_pass = Some(PendingRenderPass {
            descriptor: desc.clone(),
            commands: Vec::new(),
        });
    }

    fn end_render_pass(&mut self) {
        let Some(pending) = self.pending_render_pass.take() else {
            return;
        };

        self.encoder();
        let Some(mut encoder) = self.encoder.take() else {
            return;
        };

        let swapchain_view: Option<wgpu::TextureView> = self
            .current_texture
            .as_ref()
            .map(|tex| tex.texture.create_view(&wgpu::TextureViewDescriptor::default()));

        let current_view_id = self.current_view_id;

        {
            let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = pending
                .descriptor
                .color_attachments
                .iter()
                .filter_map(|att| {
                    if att.view.0 != current_view_id {
                        log::warn!("wgpu: render target {:?} is not the swapchain image", att.view);
                        return None;
                    }
                    let view = swapchain_view.as_ref()?;
                    Some(Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: match &att.load_op {
                                LoadOp::Clear(color) => wgpu::LoadOp::Clear(wgpu::Color {
                                    r: color[0] as f64,
                                    g: color[1] as f64,
                                    b: color[2] as f64,
                                    a: color[3] as f64,
                                }),
                                LoadOp::Load => wgpu::LoadOp::Load,
                            },
                            store: match att.store_op {
                                StoreOp::Store => wgpu::StoreOp::Store,
                                StoreOp::Discard => wgpu::StoreOp::Discard,
                            },
                        },
                    }))
                })
                .collect();

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: pending.descriptor.label.as_deref(),
                color_attachments: &color_attachments,
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let (width, height) = pending.descriptor.render_area;
            if width > 0 && height > 0 {
                render_pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
            }

            for cmd in &pending.commands {
                match cmd {
                    RenderCommand::SetPipeline(handle) => {
                        if let Some(pipeline) = self.render_pipelines.get(&handle.0) {
                            render_pass.set_pipeline(pipeline);
                        }
                    }
                    RenderCommand::BindAddress(address) => {
                        if let Some(bind_group) = self.address_bind_groups.get(&address.0) {
                            render_pass.set_bind_group(0, bind_group, &[]);
                        }
                    }
                    RenderCommand::SetPushConstants(data) => {
                        render_pass.set_push_constants(wgpu::ShaderStages::VERTEX, 0, data);
                    }
                    RenderCommand::Draw {
                        vertices,
                        instances,
                    } => {
                        render_pass.draw(vertices.clone(), instances.clone());
                    }
                }
            }
        }

        self.encoder = Some(encoder);
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        if let Some(ref mut pending) = self.pending_render_pass {
            pending.commands.push(RenderCommand::SetPipeline(pipeline));
        }
    }

    fn use_buffer_address(&mut self, address: DeviceAddress) {
        if !self.address_bind_groups.contains_key(&address.0) {
            let Some(buf) = self.buffers.get(&address.0) else {
                log::error!("wgpu: no buffer at address {:#x}", address.0);
                return;
            };
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("buffer address"),
                layout: &self.address_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buf.buffer.as_entire_binding(),
                }],
            });
            self.address_bind_groups.insert(address.0, bind_group);
        }
        if let Some(ref mut pending) = self.pending_render_pass {
            pending.commands.push(RenderCommand::BindAddress(address));
        }
    }

    fn push_constants(&mut self, data: &[u8]) {
        if let Some(ref mut pending) = self.pending_render_pass {
            pending.commands.push(RenderCommand::SetPushConstants(data.to_vec()));
        }
    }

    fn draw(&mut self, vertices: std::ops::Range<u32>, instances: std::ops::Range<u32>) {
        if let Some(ref mut pending) = self.pending_render_pass {
            pending.commands.push(RenderCommand::Draw { vertices, instances });
        }
    }

    fn submit(&mut self) -> BackendResult<u64> {
        let encoder = self.encoder.take().unwrap_or_else(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None })
        });
        self.queue.submit(std::iter::once(encoder.finish()));

        self.submitted_serial += 1;
        let serial = self.submitted_serial;
        let completed = Arc::clone(&self.completed_serial);
        self.queue.on_submitted_work_done(move || {
            completed.fetch_max(serial, Ordering::AcqRel);
        });

        Ok(serial)
    }

    fn wait_idle(&mut self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
        self.completed_serial
            .fetch_max(self.submitted_serial, Ordering::AcqRel);
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.release_buffer(buffer);
    }

    fn destroy_buffer_deferred(&mut self, buffer: BufferHandle) {
        self.deferred.push(self.submitted_serial + 1, buffer);
    }

    fn collect_garbage(&mut self) -> usize {
        let _ = self.device.poll(wgpu::Maintain::Poll);
        let ready = self.deferred.drain_completed(self.completed_serial());
        for &buffer in &ready {
            self.release_buffer(buffer);
        }
        if !ready.is_empty() {
            log::trace!("wgpu: released {} deferred buffers", ready.len());
        }
        ready.len()
    }

    fn pending_destructions(&self) -> usize {
        self.deferred.len()
    }
}
