//! Triangle rendering pipeline
//!
//! Two graphs share the same persistent resources:
//! 1. Upload graph - runs once, stages the triangle into the vertex buffer
//! 2. Loop graph - runs every frame, clears the swapchain image and draws

pub mod draw_pass;
pub mod upload_pass;

pub use draw_pass::draw_task;
pub use upload_pass::upload_task;

use crate::backend::types::Vertex;
use crate::render_graph::*;
use crate::shader::RasterPipeline;
use glam::Vec3;
use std::sync::Arc;

/// The triangle: red top-left, green top-right, blue bottom
pub const TRIANGLE_VERTICES: [Vertex; 3] = [
    Vertex::new(Vec3::new(-0.5, 0.5, 0.0), Vec3::new(1.0, 0.0, 0.0)),
    Vertex::new(Vec3::new(0.5, 0.5, 0.0), Vec3::new(0.0, 1.0, 0.0)),
    Vertex::new(Vec3::new(0.0, -0.5, 0.0), Vec3::new(0.0, 0.0, 1.0)),
];

/// Opaque black
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Persistent resources both graphs are built over
#[derive(Debug, Clone, Copy)]
pub struct FrameResources {
    pub vertex_buffer: TaskBufferId,
    pub swapchain_image: TaskImageId,
}

/// One-shot graph uploading the triangle
pub fn build_upload_graph(resources: &FrameResources) -> GraphResult<TaskGraph> {
    let mut graph = TaskGraph::new(TaskGraphInfo::new("upload"));
    graph.use_persistent_buffer(resources.vertex_buffer)?;
    graph.add_task(upload_task(
        "upload vertices",
        resources.vertex_buffer,
        &TRIANGLE_VERTICES,
    ))?;
    graph.submit()?;
    graph.complete()?;
    Ok(graph)
}

/// Per-frame graph drawing the triangle and presenting
pub fn build_loop_graph(
    resources: &FrameResources,
    pipeline: Arc<RasterPipeline>,
) -> GraphResult<TaskGraph> {
    let mut graph = TaskGraph::new(TaskGraphInfo::new("loop").with_swapchain(true));
    graph.use_persistent_image(resources.swapchain_image)?;
    graph.use_persistent_buffer(resources.vertex_buffer)?;
    graph.add_task(draw_task(
        "draw triangle",
        resources.vertex_buffer,
        resources.swapchain_image,
        pipeline,
        TRIANGLE_VERTICES.len() as u32,
        CLEAR_COLOR,
    ))?;
    graph.submit()?;
    graph.present()?;
    graph.complete()?;
    Ok(graph)
}
