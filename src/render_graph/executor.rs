//! Task graph executor
//!
//! Interprets the tasks of a completed graph against a backend. Every frame
//! the persistent resources are resolved to whatever is currently bound to
//! them, so the graph itself is never rebuilt.

use crate::backend::traits::*;
use crate::backend::types::SwapchainImage;
use crate::pipeline::{draw_pass, upload_pass};
use crate::render_graph::graph::*;
use crate::render_graph::resource::*;
use crate::render_graph::task::*;

/// What one execution of a graph did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Names of the executed tasks, in execution order
    pub executed: Vec<String>,
    pub barriers_issued: usize,
    /// Serial of the submission, when the graph submits
    pub submission: Option<u64>,
    pub presented: bool,
}

/// Context handed to a task operation while it records commands
pub struct TaskContext<'a> {
    pub backend: &'a mut dyn GraphicsBackend,
    resources: &'a PersistentResources,
    task_name: &'a str,
}

impl<'a> TaskContext<'a> {
    pub fn task_name(&self) -> &str {
        self.task_name
    }

    /// Concrete buffer currently bound to a persistent handle
    pub fn buffer(&self, id: TaskBufferId) -> GraphResult<BufferHandle> {
        self.resources.buffer(id).ok_or_else(|| unbound(self.resources, id.into()))
    }

    /// Concrete image currently bound to a persistent handle
    pub fn image(&self, id: TaskImageId) -> GraphResult<SwapchainImage> {
        self.resources.image(id).ok_or_else(|| unbound(self.resources, id.into()))
    }
}

fn unbound(resources: &PersistentResources, resource: ResourceRef) -> GraphError {
    GraphError::UnboundResource {
        resource,
        name: resources.name(resource).to_string(),
    }
}

impl TaskGraph {
    /// Run every task in declaration order, then submit and present as requested
    pub fn execute(
        &self,
        backend: &mut dyn GraphicsBackend,
        resources: &PersistentResources,
    ) -> GraphResult<ExecutionReport> {
        let compiled = self
            .compiled()
            .ok_or_else(|| GraphError::NotCompleted(self.name().to_string()))?;

        if let Some(resource) = self
            .registered_resources()
            .find(|&resource| !resources.is_bound(resource))
        {
            return Err(unbound(resources, resource));
        }

        let mut report = ExecutionReport::default();
        backend.begin_commands(Some(self.name()));
        if let Err(err) = self.run(compiled, backend, resources, &mut report) {
            log::debug!("graph '{}' failed, discarding its commands: {}", self.name(), err);
            backend.discard_commands();
            return Err(err);
        }

        Ok(report)
    }

    fn run(
        &self,
        compiled: &CompiledGraph,
        backend: &mut dyn GraphicsBackend,
        resources: &PersistentResources,
        report: &mut ExecutionReport,
    ) -> GraphResult<()> {
        for (index, task) in self.tasks().iter().enumerate() {
            for barrier in compiled.barriers_before(TaskId(index as u32)) {
                log::trace!("graph '{}': barrier {:?}", self.name(), barrier);
                backend.pipeline_barrier(barrier);
                report.barriers_issued += 1;
            }

            log::trace!("graph '{}': executing task '{}'", self.name(), task.name);
            let mut ctx = TaskContext {
                backend: &mut *backend,
                resources,
                task_name: &task.name,
            };
            run_task(&mut ctx, &task.op)?;
            report.executed.push(task.name.clone());
        }

        for barrier in &compiled.final_barriers {
            backend.pipeline_barrier(barrier);
            report.barriers_issued += 1;
        }

        if self.submit_requested() {
            report.submission = Some(backend.submit()?);
        }
        if self.present_requested() {
            backend.present()?;
            report.presented = true;
        }

        Ok(())
    }
}

fn run_task(ctx: &mut TaskContext<'_>, op: &TaskOp) -> GraphResult<()> {
    match op {
        TaskOp::UploadVertices { target, vertices } => {
            upload_pass::record_upload(ctx, *target, vertices)
        }
        TaskOp::DrawVertices {
            vertices,
            target,
            pipeline,
            vertex_count,
            clear_color,
        } => draw_pass::record_draw(
            ctx,
            draw_pass::DrawParams {
                vertices: *vertices,
                target: *target,
                pipeline,
                vertex_count: *vertex_count,
                clear_color: *clear_color,
            },
        ),
    }
}
