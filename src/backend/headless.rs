//! Headless backend for testing and running without a display.
//!
//! Buffers live in host memory and recorded copies are applied when the
//! commands are submitted, so uploads can be inspected byte for byte. Draws,
//! barriers and presents are only logged. Every submission completes
//! immediately.

use crate::backend::deferred::DeferredQueue;
use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::Barrier;
use std::collections::HashMap;
use std::ops::Range;

/// Formats the headless surface claims to support, in preference order
const SURFACE_FORMATS: [TextureFormat; 3] = [
    TextureFormat::Bgra8UnormSrgb,
    TextureFormat::Bgra8Unorm,
    TextureFormat::Rgba8Unorm,
];

/// Number of images the headless swapchain rotates through
const SWAPCHAIN_IMAGES: u64 = 3;

#[derive(Debug)]
struct HeadlessBuffer {
    label: Option<String>,
    data: Vec<u8>,
    memory: MemoryFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyRecord {
    pub src: BufferHandle,
    pub dst: BufferHandle,
    pub size: u64,
}

/// A draw as the headless backend saw it
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub pass_label: Option<String>,
    pub target: Option<TextureViewHandle>,
    pub clear_color: Option<[f32; 4]>,
    pub render_area: (u32, u32),
    pub pipeline: Option<RenderPipelineHandle>,
    pub bound_address: Option<DeviceAddress>,
    pub push_constants: Vec<u8>,
    pub vertices: Range<u32>,
    pub instances: Range<u32>,
}

/// Everything submitted to the headless device so far
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CommandLog {
    pub copies: Vec<CopyRecord>,
    pub draws: Vec<DrawRecord>,
    pub barriers: Vec<Barrier>,
    pub presents: Vec<TextureViewHandle>,
    pub submissions: u64,
}

#[derive(Debug, Default)]
struct Recording {
    label: Option<String>,
    copies: Vec<CopyRecord>,
    draws: Vec<DrawRecord>,
    barriers: Vec<Barrier>,
}

#[derive(Debug, Default)]
struct PassState {
    label: Option<String>,
    target: Option<TextureViewHandle>,
    clear_color: Option<[f32; 4]>,
    render_area: (u32, u32),
    pipeline: Option<RenderPipelineHandle>,
    bound_address: Option<DeviceAddress>,
    push_constants: Vec<u8>,
}

/// In-memory implementation of [`GraphicsBackend`]
pub struct HeadlessBackend {
    width: u32,
    height: u32,
    format: TextureFormat,
    present_mode: PresentMode,
    surface_available: bool,
    next_image: u64,
    acquired: Option<SwapchainImage>,

    buffers: HashMap<u64, HeadlessBuffer>,
    pipelines: HashMap<u64, String>,
    next_id: u64,

    recording: Option<Recording>,
    pass: Option<PassState>,
    log: CommandLog,

    submitted_serial: u64,
    completed_serial: u64,
    deferred: DeferredQueue<BufferHandle>,
}

impl HeadlessBackend {
    /// Create a headless device with a default swapchain configuration
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: SURFACE_FORMATS[0],
            present_mode: PresentMode::default(),
            surface_available: true,
            next_image: 0,
            acquired: None,
            buffers: HashMap::new(),
            pipelines: HashMap::new(),
            next_id: 1,
            recording: None,
            pass: None,
            log: CommandLog::default(),
            submitted_serial: 0,
            completed_serial: 0,
            deferred: DeferredQueue::new(),
        }
    }

    /// Create a headless device and swapchain from `config`
    pub fn with_swapchain(width: u32, height: u32, config: &SwapchainConfig) -> BackendResult<Self> {
        config.validate()?;
        let format = select_format(&SURFACE_FORMATS, config.surface_format_selector).ok_or_else(
            || BackendError::SwapchainCreationFailed("no surface format available".into()),
        )?;

        let mut backend = Self::new(width, height);
        backend.format = format;
        backend.present_mode = config.present_mode;
        log::info!(
            "{}: headless swapchain '{}' {:?} {:?} ({:?})",
            backend.name(),
            config.name,
            format,
            config.present_mode,
            config.native_window_platform
        );
        Ok(backend)
    }

    pub fn present_mode(&self) -> PresentMode {
        self.present_mode
    }

    /// Make subsequent acquisitions succeed or come back empty
    pub fn set_surface_available(&mut self, available: bool) {
        self.surface_available = available;
    }

    pub fn log(&self) -> &CommandLog {
        &self.log
    }

    /// Contents of a buffer as of the last submission
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(|b| b.data.as_slice())
    }

    /// Buffer a device address points at
    pub fn buffer_at(&self, address: DeviceAddress) -> Option<BufferHandle> {
        self.buffers
            .contains_key(&address.0)
            .then_some(BufferHandle(address.0))
    }

    pub fn buffer_label(&self, buffer: BufferHandle) -> Option<&str> {
        self.buffers.get(&buffer.0)?.label.as_deref()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn apply_copy(&mut self, copy: &CopyRecord) -> BackendResult<()> {
        let data = {
            let src = self
                .buffers
                .get(&copy.src.0)
                .ok_or(BackendError::UnknownBuffer(copy.src))?;
            let len = src.data.len() as u64;
            if copy.size > len {
                return Err(BackendError::BufferOverflow {
                    offset: 0,
                    len: copy.size,
                    size: len,
                });
            }
            src.data[..copy.size as usize].to_vec()
        };

        let dst = self
            .buffers
            .get_mut(&copy.dst.0)
            .ok_or(BackendError::UnknownBuffer(copy.dst))?;
        let len = dst.data.len() as u64;
        if copy.size > len {
            return Err(BackendError::BufferOverflow {
                offset: 0,
                len: copy.size,
                size: len,
            });
        }
        dst.data[..data.len()].copy_from_slice(&data);
        Ok(())
    }

    fn recording(&mut self) -> &mut Recording {
        self.recording.get_or_insert_with(Recording::default)
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "Headless"
    }

    fn resize(&mut self, width: u32, height: u32) {
        log::trace!("Headless: resize {}x{}", width, height);
        self.width = width;
        self.height = height;
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn swapchain_format(&self) -> TextureFormat {
        self.format
    }

    fn acquire_next_image(&mut self) -> BackendResult<Option<SwapchainImage>> {
        if !self.surface_available || self.width == 0 || self.height == 0 {
            return Ok(None);
        }
        let view = TextureViewHandle(u64::MAX - self.next_image % SWAPCHAIN_IMAGES);
        self.next_image += 1;
        let image = SwapchainImage {
            view,
            width: self.width,
            height: self.height,
            format: self.format,
        };
        self.acquired = Some(image);
        Ok(Some(image))
    }

    fn present(&mut self) -> BackendResult<()> {
        let image = self.acquired.take().ok_or_else(|| {
            BackendError::AcquireImageFailed("present called without an acquired image".into())
        })?;
        log::trace!("Headless: present {:?}", image.view);
        self.log.presents.push(image.view);
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        let id = self.alloc_id();
        log::trace!(
            "Headless: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        self.buffers.insert(
            id,
            HeadlessBuffer {
                label: desc.label.clone(),
                data: vec![0; desc.size as usize],
                memory: desc.memory,
            },
        );
        Ok(BufferHandle(id))
    }

    fn write_host_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> BackendResult<()> {
        let target = self
            .buffers
            .get_mut(&buffer.0)
            .ok_or(BackendError::UnknownBuffer(buffer))?;
        if !target.memory.is_host_visible() {
            return Err(BackendError::BufferNotHostVisible(buffer));
        }
        let size = target.data.len() as u64;
        let end = offset.checked_add(data.len() as u64);
        match end {
            Some(end) if end <= size => {
                target.data[offset as usize..end as usize].copy_from_slice(data);
                Ok(())
            }
            _ => Err(BackendError::BufferOverflow {
                offset,
                len: data.len() as u64,
                size,
            }),
        }
    }

    fn device_address(&self, buffer: BufferHandle) -> BackendResult<DeviceAddress> {
        if self.buffers.contains_key(&buffer.0) {
            Ok(DeviceAddress(buffer.0))
        } else {
            Err(BackendError::UnknownBuffer(buffer))
        }
    }

    fn create_render_pipeline(&mut self, desc: &RenderPipelineDescriptor) -> BackendResult<RenderPipelineHandle> {
        if desc.color_targets.is_empty() {
            return Err(BackendError::PipelineCreationFailed(
                "pipeline has no color targets".into(),
            ));
        }
        let id = self.alloc_id();
        let label = desc.label.clone().unwrap_or_default();
        log::trace!("Headless: creating pipeline '{}'", label);
        self.pipelines.insert(id, label);
        Ok(RenderPipelineHandle(id))
    }

    fn begin_commands(&mut self, label: Option<&str>) {
        let recording = self.recording();
        if recording.label.is_none() {
            recording.label = label.map(str::to_string);
        }
    }

    fn discard_commands(&mut self) {
        if let Some(recording) = self.recording.take() {
            log::trace!(
                "Headless: discarding {:?} ({} copies, {} draws)",
                recording.label,
                recording.copies.len(),
                recording.draws.len()
            );
        }
        self.pass = None;
    }

    fn pipeline_barrier(&mut self, barrier: &Barrier) {
        self.recording().barriers.push(*barrier);
    }

    fn copy_buffer_to_buffer(&mut self, src: BufferHandle, dst: BufferHandle, size: u64) {
        self.recording().copies.push(CopyRecord { src, dst, size });
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        let attachment = desc.color_attachments.first();
        self.pass = Some(PassState {
            label: desc.label.clone(),
            target: attachment.map(|a| a.view),
            clear_color: attachment.and_then(|a| match a.load_op {
                LoadOp::Clear(color) => Some(color),
                LoadOp::Load => None,
            }),
            render_area: desc.render_area,
            ..PassState::default()
        });
    }

    fn end_render_pass(&mut self) {
        self.pass = None;
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        if let Some(pass) = self.pass.as_mut() {
            pass.pipeline = Some(pipeline);
        }
    }

    fn use_buffer_address(&mut self, address: DeviceAddress) {
        if let Some(pass) = self.pass.as_mut() {
            pass.bound_address = Some(address);
        }
    }

    fn push_constants(&mut self, data: &[u8]) {
        if let Some(pass) = self.pass.as_mut() {
            pass.push_constants = data.to_vec();
        }
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        let Some(pass) = self.pass.as_ref() else {
            log::warn!("Headless: draw outside of a render pass ignored");
            return;
        };
        let record = DrawRecord {
            pass_label: pass.label.clone(),
            target: pass.target,
            clear_color: pass.clear_color,
            render_area: pass.render_area,
            pipeline: pass.pipeline,
            bound_address: pass.bound_address,
            push_constants: pass.push_constants.clone(),
            vertices,
            instances,
        };
        self.recording().draws.push(record);
    }

    fn submit(&mut self) -> BackendResult<u64> {
        let recording = self.recording.take().unwrap_or_default();
        for copy in &recording.copies {
            self.apply_copy(copy)?;
        }

        self.submitted_serial += 1;
        self.completed_serial = self.submitted_serial;
        log::trace!(
            "Headless: submit #{} {:?} ({} copies, {} draws, {} barriers)",
            self.submitted_serial,
            recording.label,
            recording.copies.len(),
            recording.draws.len(),
            recording.barriers.len()
        );

        self.log.copies.extend(recording.copies);
        self.log.draws.extend(recording.draws);
        self.log.barriers.extend(recording.barriers);
        self.log.submissions += 1;
        Ok(self.submitted_serial)
    }

    fn wait_idle(&mut self) {
        self.completed_serial = self.submitted_serial;
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
    }

    fn destroy_buffer_deferred(&mut self, buffer: BufferHandle) {
        self.deferred.push(self.submitted_serial + 1, buffer);
    }

    fn collect_garbage(&mut self) -> usize {
        let ready = self.deferred.drain_completed(self.completed_serial);
        for buffer in &ready {
            self.buffers.remove(&buffer.0);
        }
        if !ready.is_empty() {
            log::trace!("Headless: released {} deferred buffers", ready.len());
        }
        ready.len()
    }

    fn pending_destructions(&self) -> usize {
        self.deferred.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::NativeWindowPlatform;

    fn host_buffer(backend: &mut HeadlessBackend, size: u64) -> BufferHandle {
        backend
            .create_buffer(
                &BufferDescriptor::new("staging", size, BufferUsage::MAP_WRITE | BufferUsage::COPY_SRC)
                    .with_memory(MemoryFlags::HOST_ACCESS_RANDOM),
            )
            .unwrap()
    }

    #[test]
    fn copies_apply_at_submit() {
        let mut backend = HeadlessBackend::new(64, 64);
        let src = host_buffer(&mut backend, 4);
        let dst = backend
            .create_buffer(&BufferDescriptor::new("dst", 4, BufferUsage::COPY_DST))
            .unwrap();
        backend.write_host_buffer(src, 0, &[1, 2, 3, 4]).unwrap();

        backend.begin_commands(Some("copy"));
        backend.copy_buffer_to_buffer(src, dst, 4);
        assert_eq!(backend.buffer_contents(dst), Some(&[0u8; 4][..]));

        assert_eq!(backend.submit().unwrap(), 1);
        assert_eq!(backend.buffer_contents(dst), Some(&[1u8, 2, 3, 4][..]));
    }

    #[test]
    fn device_local_buffer_rejects_host_write() {
        let mut backend = HeadlessBackend::new(64, 64);
        let buffer = backend
            .create_buffer(&BufferDescriptor::new("gpu only", 8, BufferUsage::STORAGE))
            .unwrap();
        assert!(matches!(
            backend.write_host_buffer(buffer, 0, &[0; 4]),
            Err(BackendError::BufferNotHostVisible(_))
        ));
    }

    #[test]
    fn out_of_bounds_write_is_rejected() {
        let mut backend = HeadlessBackend::new(64, 64);
        let buffer = host_buffer(&mut backend, 4);
        assert!(matches!(
            backend.write_host_buffer(buffer, 2, &[0; 4]),
            Err(BackendError::BufferOverflow { offset: 2, len: 4, size: 4 })
        ));
    }

    #[test]
    fn deferred_destruction_waits_for_submission() {
        let mut backend = HeadlessBackend::new(64, 64);
        let buffer = host_buffer(&mut backend, 4);
        backend.destroy_buffer_deferred(buffer);

        assert_eq!(backend.collect_garbage(), 0);
        assert_eq!(backend.pending_destructions(), 1);
        assert!(backend.buffer_contents(buffer).is_some());

        backend.submit().unwrap();
        assert_eq!(backend.collect_garbage(), 1);
        assert_eq!(backend.pending_destructions(), 0);
        assert!(backend.buffer_contents(buffer).is_none());
    }

    #[test]
    fn empty_surface_yields_no_image() {
        let mut backend = HeadlessBackend::new(64, 64);
        backend.set_surface_available(false);
        assert_eq!(backend.acquire_next_image().unwrap(), None);

        backend.set_surface_available(true);
        backend.resize(0, 0);
        assert_eq!(backend.acquire_next_image().unwrap(), None);

        backend.resize(32, 16);
        let image = backend.acquire_next_image().unwrap().unwrap();
        assert_eq!((image.width, image.height), (32, 16));
    }

    #[test]
    fn swapchain_images_rotate() {
        let mut backend = HeadlessBackend::new(8, 8);
        let views: Vec<_> = (0..4)
            .map(|_| backend.acquire_next_image().unwrap().unwrap().view)
            .collect();
        assert_ne!(views[0], views[1]);
        assert_eq!(views[0], views[3]);
    }

    #[test]
    fn swapchain_honours_format_selector() {
        fn prefer_rgba8(format: TextureFormat) -> i32 {
            match format {
                TextureFormat::Rgba8Unorm => 100,
                other => default_format_score(other),
            }
        }
        let config =
            SwapchainConfig::new(NativeWindowPlatform::Unknown).with_format_selector(prefer_rgba8);
        let backend = HeadlessBackend::with_swapchain(8, 8, &config).unwrap();
        assert_eq!(backend.swapchain_format(), TextureFormat::Rgba8Unorm);
    }

    #[test]
    fn present_requires_acquired_image() {
        let mut backend = HeadlessBackend::new(8, 8);
        assert!(backend.present().is_err());
        backend.acquire_next_image().unwrap();
        backend.present().unwrap();
        assert_eq!(backend.log().presents.len(), 1);
    }
}
