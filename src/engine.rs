//! Main engine orchestrator
//!
//! The engine owns everything with a GPU lifetime: the backend, the triangle
//! pipeline, the vertex buffer and the task graphs. Teardown happens in
//! [`Engine::shutdown`], which also runs on drop.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::{build_loop_graph, build_upload_graph, FrameResources, TRIANGLE_VERTICES};
use crate::render_graph::*;
use crate::scene::Scene;
use crate::shader::*;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub const VERTEX_BUFFER_NAME: &str = "my vertex data";
pub const PIPELINE_NAME: &str = "my pipeline";
pub const SHADER_FILE: &str = "main.wgsl";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Shader(#[from] ShaderError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Configuration for the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directories searched for shader files
    pub shader_root_paths: Vec<PathBuf>,
    /// Log entry points of compiled shaders
    pub enable_shader_debug_info: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shader_root_paths: PipelineManagerInfo::default().root_paths,
            enable_shader_debug_info: cfg!(debug_assertions),
        }
    }
}

/// Result of one main-loop iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    Rendered(ExecutionReport),
    /// No swapchain image was available; nothing was recorded
    Skipped,
}

/// Main engine
pub struct Engine<B: GraphicsBackend> {
    backend: B,
    pipelines: PipelineManager,
    pipeline: Arc<RasterPipeline>,
    resources: PersistentResources,
    frame: FrameResources,
    vertex_buffer: Option<BufferHandle>,
    loop_graph: TaskGraph,
    scene: Scene,
    frame_count: u64,
}

impl<B: GraphicsBackend> Engine<B> {
    /// Compile the pipeline, upload the triangle and build the frame graph.
    ///
    /// Shader failures surface as [`EngineError::Shader`] before any buffer
    /// or graph exists.
    pub fn new(mut backend: B, config: &EngineConfig) -> EngineResult<Self> {
        log::info!("Initializing engine on {} backend", backend.name());

        let mut pipelines = PipelineManager::new(PipelineManagerInfo {
            root_paths: config.shader_root_paths.clone(),
            default_enable_debug_info: config.enable_shader_debug_info,
            name: "pipeline manager".to_string(),
        });
        let swapchain_format = backend.swapchain_format();
        let pipeline = pipelines.add_raster_pipeline(
            &mut backend,
            RasterPipelineInfo {
                vertex_shader: ShaderFile::new(SHADER_FILE, "vs_main"),
                fragment_shader: ShaderFile::new(SHADER_FILE, "fs_main"),
                color_attachments: vec![swapchain_format],
                push_constant_size: std::mem::size_of::<PushConstant>() as u32,
                name: PIPELINE_NAME.to_string(),
            },
        )?;

        let vertex_buffer = backend.create_buffer(&BufferDescriptor::new(
            VERTEX_BUFFER_NAME,
            std::mem::size_of_val(&TRIANGLE_VERTICES) as u64,
            BufferUsage::STORAGE | BufferUsage::COPY_DST | BufferUsage::VERTEX,
        ))?;

        let mut resources = PersistentResources::new();
        let frame = FrameResources {
            vertex_buffer: resources.create_buffer("vertex buffer", Some(vertex_buffer)),
            swapchain_image: resources.create_image(TaskImageInfo::swapchain("swapchain image")),
        };

        let loop_graph = match Self::upload_and_build(&mut backend, &resources, &frame, &pipeline) {
            Ok(graph) => graph,
            Err(err) => {
                backend.wait_idle();
                backend.collect_garbage();
                backend.destroy_buffer(vertex_buffer);
                return Err(err);
            }
        };

        let mut scene = Scene::new();
        scene.create_entity("Frog");

        log::info!("Engine initialized");

        Ok(Self {
            backend,
            pipelines,
            pipeline,
            resources,
            frame,
            vertex_buffer: Some(vertex_buffer),
            loop_graph,
            scene,
            frame_count: 0,
        })
    }

    /// Run the one-shot upload graph, then build the per-frame graph
    fn upload_and_build(
        backend: &mut B,
        resources: &PersistentResources,
        frame: &FrameResources,
        pipeline: &Arc<RasterPipeline>,
    ) -> EngineResult<TaskGraph> {
        let upload_graph = build_upload_graph(frame)?;
        let report = upload_graph.execute(backend, resources)?;
        log::debug!("Upload graph executed: {:?}", report.executed);
        backend.collect_garbage();

        Ok(build_loop_graph(frame, Arc::clone(pipeline))?)
    }

    /// Render one frame, or skip it when no swapchain image is available
    pub fn render_frame(&mut self) -> EngineResult<FrameOutcome> {
        let Some(image) = self.backend.acquire_next_image()? else {
            return Ok(FrameOutcome::Skipped);
        };

        self.resources.set_image(self.frame.swapchain_image, image);
        let result = self.loop_graph.execute(&mut self.backend, &self.resources);
        self.resources.clear_image(self.frame.swapchain_image);
        let report = result?;

        let released = self.backend.collect_garbage();
        if released > 0 {
            log::debug!("Released {} deferred resources", released);
        }

        self.frame_count += 1;
        Ok(FrameOutcome::Rendered(report))
    }

    /// Handle window resize
    pub fn resize(&mut self, width: u32, height: u32) {
        log::debug!("Resizing surface to {}x{}", width, height);
        self.backend.resize(width, height);
    }

    /// Wait for the GPU and release everything the engine created.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&mut self) {
        let Some(vertex_buffer) = self.vertex_buffer.take() else {
            return;
        };
        self.backend.wait_idle();
        self.backend.collect_garbage();
        self.backend.destroy_buffer(vertex_buffer);
        log::info!("Engine shut down after {} frames", self.frame_count);
    }

    pub fn is_shut_down(&self) -> bool {
        self.vertex_buffer.is_none()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn pipeline(&self) -> &Arc<RasterPipeline> {
        &self.pipeline
    }

    pub fn pipelines(&self) -> &PipelineManager {
        &self.pipelines
    }

    pub fn vertex_buffer(&self) -> Option<BufferHandle> {
        self.vertex_buffer
    }

    pub fn frame_resources(&self) -> &FrameResources {
        &self.frame
    }

    pub fn loop_graph(&self) -> &TaskGraph {
        &self.loop_graph
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl<B: GraphicsBackend> Drop for Engine<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessBackend;

    fn config() -> EngineConfig {
        EngineConfig {
            shader_root_paths: vec![PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("shaders")],
            enable_shader_debug_info: false,
        }
    }

    #[test]
    fn startup_creates_frog() {
        let mut engine = Engine::new(HeadlessBackend::new(640, 480), &config()).unwrap();
        let frog = engine.scene_mut().find_by_name("Frog");
        assert!(frog.is_some());
        assert_eq!(engine.scene().entity_count(), 1);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut engine = Engine::new(HeadlessBackend::new(640, 480), &config()).unwrap();
        let buffer = engine.vertex_buffer().unwrap();
        engine.shutdown();
        assert!(engine.is_shut_down());
        assert!(engine.backend().buffer_contents(buffer).is_none());
        engine.shutdown();
        assert_eq!(engine.backend().live_buffer_count(), 0);
    }

    #[test]
    fn resize_to_zero_skips_frames() {
        let mut engine = Engine::new(HeadlessBackend::new(640, 480), &config()).unwrap();
        engine.resize(0, 0);
        assert_eq!(engine.render_frame().unwrap(), FrameOutcome::Skipped);
        engine.resize(800, 600);
        assert!(matches!(engine.render_frame().unwrap(), FrameOutcome::Rendered(_)));
        assert_eq!(engine.frame_count(), 1);
    }
}
