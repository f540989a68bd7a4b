//! Vertex upload task
//!
//! Stages vertex data in a host-visible buffer and copies it into a
//! device-local buffer. The staging buffer is released once the copy's
//! submission has completed.

use crate::backend::types::*;
use crate::render_graph::*;

pub const STAGING_BUFFER_NAME: &str = "vertex staging buffer";

/// Task writing `vertices` into the start of `target`
pub fn upload_task(name: &str, target: TaskBufferId, vertices: &[Vertex]) -> Task {
    Task::new(
        name,
        TaskOp::UploadVertices {
            target,
            vertices: vertices.to_vec(),
        },
    )
    .writes(target, TaskAccess::TransferWrite)
}

pub(crate) fn record_upload(
    ctx: &mut TaskContext<'_>,
    target: TaskBufferId,
    vertices: &[Vertex],
) -> GraphResult<()> {
    let dst = ctx.buffer(target)?;
    let bytes: &[u8] = bytemuck::cast_slice(vertices);
    if bytes.is_empty() {
        log::debug!("task '{}': nothing to upload", ctx.task_name());
        return Ok(());
    }
    let size = bytes.len() as u64;

    let staging = ctx.backend.create_buffer(
        &BufferDescriptor::new(
            STAGING_BUFFER_NAME,
            size,
            BufferUsage::MAP_WRITE | BufferUsage::COPY_SRC,
        )
        .with_memory(MemoryFlags::HOST_ACCESS_RANDOM),
    )?;
    if let Err(err) = ctx.backend.write_host_buffer(staging, 0, bytes) {
        ctx.backend.destroy_buffer(staging);
        return Err(err.into());
    }

    // queued under the serial being recorded, so it outlives the copy
    ctx.backend.destroy_buffer_deferred(staging);
    ctx.backend.copy_buffer_to_buffer(staging, dst, size);

    log::debug!(
        "task '{}': uploading {} vertices ({} bytes)",
        ctx.task_name(),
        vertices.len(),
        size
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::TRIANGLE_VERTICES;

    #[test]
    fn upload_task_declares_transfer_write() {
        let task = upload_task("upload", TaskBufferId(2), &TRIANGLE_VERTICES);
        assert_eq!(
            task.attachments,
            vec![TaskAttachment {
                resource: ResourceRef::Buffer(TaskBufferId(2)),
                access: TaskAccess::TransferWrite,
            }]
        );
        match &task.op {
            TaskOp::UploadVertices { vertices, .. } => assert_eq!(vertices.len(), 3),
            other => panic!("unexpected op {other:?}"),
        }
    }
}
