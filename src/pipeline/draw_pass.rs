//! Triangle draw task

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::*;
use crate::shader::RasterPipeline;
use std::sync::Arc;

/// Task clearing `target` and drawing `vertex_count` vertices pulled from `vertices`
pub fn draw_task(
    name: &str,
    vertices: TaskBufferId,
    target: TaskImageId,
    pipeline: Arc<RasterPipeline>,
    vertex_count: u32,
    clear_color: [f32; 4],
) -> Task {
    Task::new(
        name,
        TaskOp::DrawVertices {
            vertices,
            target,
            pipeline,
            vertex_count,
            clear_color,
        },
    )
    .reads(vertices, TaskAccess::VertexShaderRead)
    .writes(target, TaskAccess::ColorAttachment)
}

pub(crate) struct DrawParams<'a> {
    pub vertices: TaskBufferId,
    pub target: TaskImageId,
    pub pipeline: &'a RasterPipeline,
    pub vertex_count: u32,
    pub clear_color: [f32; 4],
}

pub(crate) fn record_draw(ctx: &mut TaskContext<'_>, params: DrawParams<'_>) -> GraphResult<()> {
    let image = ctx.image(params.target)?;
    let buffer = ctx.buffer(params.vertices)?;
    let vertex_ptr = ctx.backend.device_address(buffer)?;

    ctx.backend.begin_render_pass(&RenderPassDescriptor {
        label: Some(ctx.task_name().to_string()),
        color_attachments: vec![ColorAttachment {
            view: image.view,
            load_op: LoadOp::Clear(params.clear_color),
            store_op: StoreOp::Store,
        }],
        render_area: (image.width, image.height),
    });

    ctx.backend.set_render_pipeline(params.pipeline.handle());
    ctx.backend.use_buffer_address(vertex_ptr);
    ctx.backend
        .push_constants(bytemuck::bytes_of(&PushConstant { vertex_ptr }));
    ctx.backend.draw(0..params.vertex_count, 0..1);
    ctx.backend.end_render_pass();

    Ok(())
}
