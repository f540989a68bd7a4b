//! Task graph definition and compilation

use crate::backend::traits::BackendError;
use crate::render_graph::barrier::*;
use crate::render_graph::resource::*;
use crate::render_graph::task::*;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while building or executing a task graph
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("resource {0:?} is already registered in graph '{1}'")]
    DuplicateResource(ResourceRef, String),
    #[error("task '{task}' uses resource {resource:?} which is not registered in the graph")]
    UnregisteredResource { task: String, resource: ResourceRef },
    #[error("task '{task}' declares {access:?} on {resource:?}, which does not apply to that resource kind")]
    AccessKindMismatch {
        task: String,
        resource: ResourceRef,
        access: TaskAccess,
    },
    #[error("task '{task}' performs {access:?} on {resource:?} without declaring it")]
    UndeclaredAccess {
        task: String,
        resource: ResourceRef,
        access: TaskAccess,
    },
    #[error("graph '{0}' is already completed")]
    AlreadyCompleted(String),
    #[error("graph '{0}' must be completed before execution")]
    NotCompleted(String),
    #[error("graph '{0}' cannot present: it has no swapchain image")]
    PresentWithoutSwapchain(String),
    #[error("resource '{name}' ({resource:?}) has nothing bound to it")]
    UnboundResource { resource: ResourceRef, name: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Task graph creation options
#[derive(Debug, Clone)]
pub struct TaskGraphInfo {
    pub name: String,
    /// The graph presents a swapchain image
    pub swapchain: bool,
}

impl TaskGraphInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            swapchain: false,
        }
    }

    pub fn with_swapchain(mut self, swapchain: bool) -> Self {
        self.swapchain = swapchain;
        self
    }
}

/// A retained list of tasks over persistent resources.
///
/// Tasks run in declaration order. In a swapchain graph the first registered
/// image is the one handed to [`TaskGraph::present`].
pub struct TaskGraph {
    info: TaskGraphInfo,
    buffers: Vec<TaskBufferId>,
    images: Vec<TaskImageId>,
    tasks: Vec<Task>,
    submit_requested: bool,
    present_requested: bool,
    compiled: Option<CompiledGraph>,
}

impl TaskGraph {
    pub fn new(info: TaskGraphInfo) -> Self {
        Self {
            info,
            buffers: Vec::new(),
            images: Vec::new(),
            tasks: Vec::new(),
            submit_requested: false,
            present_requested: false,
            compiled: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn is_completed(&self) -> bool {
        self.compiled.is_some()
    }

    fn ensure_open(&self) -> GraphResult<()> {
        if self.is_completed() {
            return Err(GraphError::AlreadyCompleted(self.info.name.clone()));
        }
        Ok(())
    }

    /// Make a persistent buffer usable by tasks of this graph
    pub fn use_persistent_buffer(&mut self, id: TaskBufferId) -> GraphResult<()> {
        self.ensure_open()?;
        if self.buffers.contains(&id) {
            return Err(GraphError::DuplicateResource(id.into(), self.info.name.clone()));
        }
        self.buffers.push(id);
        Ok(())
    }

    /// Make a persistent image usable by tasks of this graph
    pub fn use_persistent_image(&mut self, id: TaskImageId) -> GraphResult<()> {
        self.ensure_open()?;
        if self.images.contains(&id) {
            return Err(GraphError::DuplicateResource(id.into(), self.info.name.clone()));
        }
        self.images.push(id);
        Ok(())
    }

    pub fn is_registered(&self, resource: ResourceRef) -> bool {
        match resource {
            ResourceRef::Buffer(id) => self.buffers.contains(&id),
            ResourceRef::Image(id) => self.images.contains(&id),
        }
    }

    /// Every resource this graph uses, buffers first
    pub fn registered_resources(&self) -> impl Iterator<Item = ResourceRef> + '_ {
        self.buffers
            .iter()
            .map(|&id| ResourceRef::Buffer(id))
            .chain(self.images.iter().map(|&id| ResourceRef::Image(id)))
    }

    /// Append a task after validating its accesses
    pub fn add_task(&mut self, task: Task) -> GraphResult<TaskId> {
        self.ensure_open()?;

        for attachment in &task.attachments {
            if !self.is_registered(attachment.resource) {
                return Err(GraphError::UnregisteredResource {
                    task: task.name.clone(),
                    resource: attachment.resource,
                });
            }
            if !attachment.access.applies_to(attachment.resource.kind()) {
                return Err(GraphError::AccessKindMismatch {
                    task: task.name.clone(),
                    resource: attachment.resource,
                    access: attachment.access,
                });
            }
        }

        if let Some(missing) = task.undeclared_access() {
            return Err(GraphError::UndeclaredAccess {
                task: task.name.clone(),
                resource: missing.resource,
                access: missing.access,
            });
        }

        let id = TaskId(self.tasks.len() as u32);
        log::trace!("graph '{}': task {} '{}'", self.info.name, id.0, task.name);
        self.tasks.push(task);
        Ok(id)
    }

    /// Submit recorded work to the queue at the end of execution
    pub fn submit(&mut self) -> GraphResult<()> {
        self.ensure_open()?;
        self.submit_requested = true;
        Ok(())
    }

    /// Present the swapchain image after submission
    pub fn present(&mut self) -> GraphResult<()> {
        self.ensure_open()?;
        if !self.info.swapchain || self.images.is_empty() {
            return Err(GraphError::PresentWithoutSwapchain(self.info.name.clone()));
        }
        self.present_requested = true;
        Ok(())
    }

    pub fn submit_requested(&self) -> bool {
        self.submit_requested
    }

    pub fn present_requested(&self) -> bool {
        self.present_requested
    }

    /// Image handed to the presentation engine, if presenting
    pub fn presented_image(&self) -> Option<TaskImageId> {
        if self.present_requested {
            self.images.first().copied()
        } else {
            None
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn compiled(&self) -> Option<&CompiledGraph> {
        self.compiled.as_ref()
    }

    /// Freeze the graph and plan its synchronization
    pub fn complete(&mut self) -> GraphResult<()> {
        self.ensure_open()?;
        let compiled = self.compile();
        log::debug!(
            "graph '{}' completed: {} tasks, {} barriers",
            self.info.name,
            self.tasks.len(),
            compiled.barrier_count()
        );
        self.compiled = Some(compiled);
        Ok(())
    }

    fn compile(&self) -> CompiledGraph {
        let mut states: HashMap<ResourceRef, AccessHistory> = HashMap::new();
        let mut resource_lifetimes: HashMap<ResourceRef, ResourceLifetime> = HashMap::new();
        let mut task_barriers = Vec::with_capacity(self.tasks.len());

        for (order, task) in self.tasks.iter().enumerate() {
            let mut barriers = Vec::new();

            for attachment in &task.attachments {
                let history = states.entry(attachment.resource).or_default();
                if let Some(barrier) = history.record(attachment.resource, attachment.access) {
                    barriers.push(barrier);
                }

                let lifetime = resource_lifetimes
                    .entry(attachment.resource)
                    .or_insert(ResourceLifetime {
                        first_use: order,
                        last_use: order,
                    });
                lifetime.last_use = order;
            }

            task_barriers.push(barriers);
        }

        let mut final_barriers = Vec::new();
        if let Some(image) = self.presented_image() {
            let resource = ResourceRef::Image(image);
            let before = states
                .get(&resource)
                .and_then(|h| h.last_access)
                .map_or(ResourceState::Undefined, ResourceState::Access);
            final_barriers.push(Barrier {
                resource,
                before,
                after: ResourceState::Present,
                hazard: Hazard::PresentTransition,
            });
        }

        CompiledGraph {
            task_barriers,
            final_barriers,
            resource_lifetimes,
        }
    }
}

/// What earlier tasks did to one resource
#[derive(Debug, Default)]
struct AccessHistory {
    last_write: Option<TaskAccess>,
    reads_since_write: Vec<TaskAccess>,
    last_access: Option<TaskAccess>,
}

impl AccessHistory {
    /// Record `access` and return the barrier it needs, if any
    fn record(&mut self, resource: ResourceRef, access: TaskAccess) -> Option<Barrier> {
        let barrier = match (self.last_access, self.last_write) {
            (None, _) => match resource {
                ResourceRef::Image(_) => Some((ResourceState::Undefined, Hazard::InitialTransition)),
                ResourceRef::Buffer(_) => None,
            },
            (Some(last), _) if access.is_write() && !self.reads_since_write.is_empty() => {
                Some((ResourceState::Access(last), Hazard::WriteAfterRead))
            }
            (_, Some(write)) if access.is_write() => {
                Some((ResourceState::Access(write), Hazard::WriteAfterWrite))
            }
            (_, Some(write)) if !self.reads_since_write.contains(&access) => {
                Some((ResourceState::Access(write), Hazard::ReadAfterWrite))
            }
            _ => None,
        };

        if access.is_write() {
            self.last_write = Some(access);
            self.reads_since_write.clear();
        } else {
            self.reads_since_write.push(access);
        }
        self.last_access = Some(access);

        barrier.map(|(before, hazard)| Barrier {
            resource,
            before,
            after: ResourceState::Access(access),
            hazard,
        })
    }
}

/// Resource lifetime in terms of task execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLifetime {
    pub first_use: usize,
    pub last_use: usize,
}

/// Synchronization plan of a completed graph
#[derive(Debug)]
pub struct CompiledGraph {
    /// Barriers issued before each task, indexed like the task list
    pub task_barriers: Vec<Vec<Barrier>>,
    /// Barriers issued after the last task (present transition)
    pub final_barriers: Vec<Barrier>,
    pub resource_lifetimes: HashMap<ResourceRef, ResourceLifetime>,
}

impl CompiledGraph {
    pub fn barrier_count(&self) -> usize {
        self.task_barriers.iter().map(Vec::len).sum::<usize>() + self.final_barriers.len()
    }

    pub fn barriers_before(&self, task: TaskId) -> &[Barrier] {
        self.task_barriers
            .get(task.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Check if a resource is in use at a given execution step
    pub fn is_resource_alive(&self, resource: ResourceRef, step: usize) -> bool {
        self.resource_lifetimes
            .get(&resource)
            .is_some_and(|lifetime| step >= lifetime.first_use && step <= lifetime.last_use)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::Vertex;
    use glam::Vec3;

    fn upload(target: TaskBufferId) -> Task {
        Task::new(
            "upload",
            TaskOp::UploadVertices {
                target,
                vertices: vec![Vertex::new(Vec3::ZERO, Vec3::ONE)],
            },
        )
        .writes(target, TaskAccess::TransferWrite)
    }

    fn graph_with_buffer(swapchain: bool) -> (TaskGraph, TaskBufferId) {
        let mut resources = PersistentResources::new();
        let buffer = resources.create_buffer("vertices", None);
        let mut graph = TaskGraph::new(TaskGraphInfo::new("test").with_swapchain(swapchain));
        graph.use_persistent_buffer(buffer).unwrap();
        (graph, buffer)
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let (mut graph, buffer) = graph_with_buffer(false);
        assert!(matches!(
            graph.use_persistent_buffer(buffer),
            Err(GraphError::DuplicateResource(..))
        ));
    }

    #[test]
    fn unregistered_resource_is_rejected() {
        let mut graph = TaskGraph::new(TaskGraphInfo::new("empty"));
        let result = graph.add_task(upload(TaskBufferId(4)));
        assert!(matches!(result, Err(GraphError::UnregisteredResource { .. })));
        assert!(graph.tasks().is_empty());
    }

    #[test]
    fn access_kind_mismatch_is_rejected() {
        let (mut graph, buffer) = graph_with_buffer(false);
        let task = upload(buffer).writes(buffer, TaskAccess::ColorAttachment);
        assert!(matches!(
            graph.add_task(task),
            Err(GraphError::AccessKindMismatch { .. })
        ));
    }

    #[test]
    fn undeclared_access_is_rejected() {
        let (mut graph, buffer) = graph_with_buffer(false);
        let task = Task::new(
            "sneaky upload",
            TaskOp::UploadVertices {
                target: buffer,
                vertices: Vec::new(),
            },
        );
        assert!(matches!(
            graph.add_task(task),
            Err(GraphError::UndeclaredAccess { .. })
        ));
    }

    #[test]
    fn completed_graph_is_frozen() {
        let (mut graph, buffer) = graph_with_buffer(false);
        graph.add_task(upload(buffer)).unwrap();
        graph.submit().unwrap();
        graph.complete().unwrap();

        assert!(graph.is_completed());
        assert!(matches!(graph.add_task(upload(buffer)), Err(GraphError::AlreadyCompleted(_))));
        assert!(matches!(graph.submit(), Err(GraphError::AlreadyCompleted(_))));
        assert!(matches!(graph.complete(), Err(GraphError::AlreadyCompleted(_))));
    }

    #[test]
    fn present_requires_swapchain_graph() {
        let (mut graph, _) = graph_with_buffer(false);
        graph.use_persistent_image(TaskImageId(0)).unwrap();
        assert!(matches!(graph.present(), Err(GraphError::PresentWithoutSwapchain(_))));

        let mut graph = TaskGraph::new(TaskGraphInfo::new("no image").with_swapchain(true));
        assert!(matches!(graph.present(), Err(GraphError::PresentWithoutSwapchain(_))));
        graph.use_persistent_image(TaskImageId(0)).unwrap();
        assert!(graph.present().is_ok());
        assert_eq!(graph.presented_image(), Some(TaskImageId(0)));
    }

    #[test]
    fn write_after_write_is_synchronized() {
        let (mut graph, buffer) = graph_with_buffer(false);
        graph.add_task(upload(buffer)).unwrap();
        let second = graph.add_task(upload(buffer)).unwrap();
        graph.complete().unwrap();

        let compiled = graph.compiled().unwrap();
        assert!(compiled.barriers_before(TaskId(0)).is_empty());
        let barriers = compiled.barriers_before(second);
        assert_eq!(barriers.len(), 1);
        assert_eq!(barriers[0].hazard, Hazard::WriteAfterWrite);
        assert_eq!(compiled.barrier_count(), 1);
        assert!(compiled.is_resource_alive(buffer.into(), 1));
        assert!(!compiled.is_resource_alive(buffer.into(), 2));
    }

    #[test]
    fn access_history_plans_each_hazard() {
        let buffer = ResourceRef::Buffer(TaskBufferId(0));
        let mut history = AccessHistory::default();
        assert_eq!(history.record(buffer, TaskAccess::TransferWrite), None);

        let raw = history.record(buffer, TaskAccess::VertexShaderRead).unwrap();
        assert_eq!(raw.hazard, Hazard::ReadAfterWrite);
        assert_eq!(raw.before, ResourceState::Access(TaskAccess::TransferWrite));

        // same read again needs nothing new
        assert_eq!(history.record(buffer, TaskAccess::VertexShaderRead), None);

        let war = history.record(buffer, TaskAccess::TransferWrite).unwrap();
        assert_eq!(war.hazard, Hazard::WriteAfterRead);
        assert_eq!(war.before, ResourceState::Access(TaskAccess::VertexShaderRead));

        let image = ResourceRef::Image(TaskImageId(0));
        let mut history = AccessHistory::default();
        let initial = history.record(image, TaskAccess::ColorAttachment).unwrap();
        assert_eq!(initial.hazard, Hazard::InitialTransition);
        assert!(initial.is_layout_transition());
    }
}
