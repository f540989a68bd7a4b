//! Task definitions for the task graph
//!
//! A task is plain data: a name, the resources it touches with their access
//! intent, and the operation to run. The executor interprets the operation,
//! so tasks carry no callbacks and no borrowed state.

use crate::backend::types::Vertex;
use crate::render_graph::resource::*;
use crate::shader::RasterPipeline;
use std::sync::Arc;

/// Position of a task in its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub(crate) u32);

impl TaskId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// One declared access of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskAttachment {
    pub resource: ResourceRef,
    pub access: TaskAccess,
}

/// Kind of queue work a task records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Graphics,
    Transfer,
}

/// The operation a task performs
#[derive(Debug, Clone)]
pub enum TaskOp {
    /// Stage `vertices` in a host-visible buffer and copy them into `target`
    UploadVertices {
        target: TaskBufferId,
        vertices: Vec<Vertex>,
    },
    /// Clear `target` and draw vertices pulled from `vertices` by address
    DrawVertices {
        vertices: TaskBufferId,
        target: TaskImageId,
        pipeline: Arc<RasterPipeline>,
        vertex_count: u32,
        clear_color: [f32; 4],
    },
}

impl TaskOp {
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskOp::UploadVertices { .. } => TaskType::Transfer,
            TaskOp::DrawVertices { .. } => TaskType::Graphics,
        }
    }

    /// Resources the operation touches and how it touches them
    pub fn required_accesses(&self) -> Vec<TaskAttachment> {
        match self {
            TaskOp::UploadVertices { target, .. } => vec![TaskAttachment {
                resource: ResourceRef::Buffer(*target),
                access: TaskAccess::TransferWrite,
            }],
            TaskOp::DrawVertices {
                vertices, target, ..
            } => vec![
                TaskAttachment {
                    resource: ResourceRef::Buffer(*vertices),
                    access: TaskAccess::VertexShaderRead,
                },
                TaskAttachment {
                    resource: ResourceRef::Image(*target),
                    access: TaskAccess::ColorAttachment,
                },
            ],
        }
    }
}

/// A unit of GPU work in a task graph
#[derive(Debug, Clone)]
pub struct Task {
    pub name: String,
    pub attachments: Vec<TaskAttachment>,
    pub op: TaskOp,
}

impl Task {
    /// A task with no declared accesses yet
    pub fn new(name: &str, op: TaskOp) -> Self {
        Self {
            name: name.to_string(),
            attachments: Vec::new(),
            op,
        }
    }

    /// Declare that this task reads a resource
    pub fn reads(self, resource: impl Into<ResourceRef>, access: TaskAccess) -> Self {
        debug_assert!(access.is_read(), "{access:?} is not a read access");
        self.with_attachment(resource.into(), access)
    }

    /// Declare that this task writes a resource
    pub fn writes(self, resource: impl Into<ResourceRef>, access: TaskAccess) -> Self {
        debug_assert!(access.is_write(), "{access:?} is not a write access");
        self.with_attachment(resource.into(), access)
    }

    pub fn with_attachment(mut self, resource: ResourceRef, access: TaskAccess) -> Self {
        self.attachments.push(TaskAttachment { resource, access });
        self
    }

    pub fn task_type(&self) -> TaskType {
        self.op.task_type()
    }

    pub fn reads_resource(&self, resource: ResourceRef) -> bool {
        self.attachments
            .iter()
            .any(|a| a.resource == resource && a.access.is_read())
    }

    pub fn writes_resource(&self, resource: ResourceRef) -> bool {
        self.attachments
            .iter()
            .any(|a| a.resource == resource && a.access.is_write())
    }

    /// First required access of the op missing from the declared list
    pub(crate) fn undeclared_access(&self) -> Option<TaskAttachment> {
        self.op
            .required_accesses()
            .into_iter()
            .find(|required| !self.attachments.contains(required))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn upload_op() -> TaskOp {
        TaskOp::UploadVertices {
            target: TaskBufferId(0),
            vertices: vec![Vertex::new(Vec3::ZERO, Vec3::X)],
        }
    }

    #[test]
    fn declared_upload_has_no_gaps() {
        let task = Task::new("upload", upload_op()).writes(TaskBufferId(0), TaskAccess::TransferWrite);
        assert_eq!(task.task_type(), TaskType::Transfer);
        assert!(task.writes_resource(ResourceRef::Buffer(TaskBufferId(0))));
        assert!(!task.reads_resource(ResourceRef::Buffer(TaskBufferId(0))));
        assert_eq!(task.undeclared_access(), None);
    }

    #[test]
    fn wrong_access_counts_as_undeclared() {
        let task = Task::new("upload", upload_op()).reads(TaskBufferId(0), TaskAccess::TransferRead);
        let missing = task.undeclared_access();
        assert_eq!(
            missing,
            Some(TaskAttachment {
                resource: ResourceRef::Buffer(TaskBufferId(0)),
                access: TaskAccess::TransferWrite,
            })
        );
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "is not a write access")]
    fn read_access_declared_as_write_panics() {
        let _ = Task::new("upload", upload_op()).writes(TaskBufferId(0), TaskAccess::VertexShaderRead);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "is not a read access")]
    fn write_access_declared_as_read_panics() {
        let _ = Task::new("upload", upload_op()).reads(TaskBufferId(0), TaskAccess::TransferWrite);
    }
}
