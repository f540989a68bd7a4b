//! Persistent resources for the task graph
//!
//! A persistent resource is a logical handle that outlives any single graph
//! execution. Graphs refer to it by id; the concrete buffer or swapchain
//! image behind it is looked up in [`PersistentResources`] at execute time,
//! so the same handle can be rebound every frame.

use crate::backend::traits::BufferHandle;
use crate::backend::types::SwapchainImage;

/// Logical handle to a persistent buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskBufferId(pub(crate) u32);

/// Logical handle to a persistent image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskImageId(pub(crate) u32);

/// Either kind of persistent resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceRef {
    Buffer(TaskBufferId),
    Image(TaskImageId),
}

impl ResourceRef {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceRef::Buffer(_) => ResourceKind::Buffer,
            ResourceRef::Image(_) => ResourceKind::Image,
        }
    }
}

impl From<TaskBufferId> for ResourceRef {
    fn from(id: TaskBufferId) -> Self {
        ResourceRef::Buffer(id)
    }
}

impl From<TaskImageId> for ResourceRef {
    fn from(id: TaskImageId) -> Self {
        ResourceRef::Image(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Buffer,
    Image,
}

/// How a task touches a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskAccess {
    /// Source of a copy
    TransferRead,
    /// Destination of a copy
    TransferWrite,
    /// Read from the vertex stage (vertex pulling)
    VertexShaderRead,
    /// Read from the fragment stage
    FragmentShaderRead,
    /// Written as a color render target
    ColorAttachment,
}

impl TaskAccess {
    pub fn is_write(self) -> bool {
        matches!(self, TaskAccess::TransferWrite | TaskAccess::ColorAttachment)
    }

    pub fn is_read(self) -> bool {
        !self.is_write()
    }

    /// Whether this access mode makes sense for the given resource kind
    pub fn applies_to(self, kind: ResourceKind) -> bool {
        match self {
            TaskAccess::ColorAttachment => kind == ResourceKind::Image,
            TaskAccess::VertexShaderRead => kind == ResourceKind::Buffer,
            TaskAccess::TransferRead
            | TaskAccess::TransferWrite
            | TaskAccess::FragmentShaderRead => true,
        }
    }
}

/// Creation info for a persistent image
#[derive(Debug, Clone)]
pub struct TaskImageInfo {
    pub name: String,
    /// Bound to the acquired swapchain image every frame
    pub swapchain_image: bool,
}

impl TaskImageInfo {
    pub fn swapchain(name: &str) -> Self {
        Self {
            name: name.to_string(),
            swapchain_image: true,
        }
    }
}

#[derive(Debug)]
struct BufferSlot {
    name: String,
    binding: Option<BufferHandle>,
}

#[derive(Debug)]
struct ImageSlot {
    info: TaskImageInfo,
    binding: Option<SwapchainImage>,
}

/// Table of persistent resources and what they are currently bound to
#[derive(Debug, Default)]
pub struct PersistentResources {
    buffers: Vec<BufferSlot>,
    images: Vec<ImageSlot>,
}

impl PersistentResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a persistent buffer handle, optionally bound right away
    pub fn create_buffer(&mut self, name: &str, initial: Option<BufferHandle>) -> TaskBufferId {
        let id = TaskBufferId(self.buffers.len() as u32);
        self.buffers.push(BufferSlot {
            name: name.to_string(),
            binding: initial,
        });
        id
    }

    /// Create a persistent image handle; it starts unbound
    pub fn create_image(&mut self, info: TaskImageInfo) -> TaskImageId {
        let id = TaskImageId(self.images.len() as u32);
        self.images.push(ImageSlot {
            info,
            binding: None,
        });
        id
    }

    pub fn set_buffer(&mut self, id: TaskBufferId, buffer: BufferHandle) {
        if let Some(slot) = self.buffers.get_mut(id.0 as usize) {
            slot.binding = Some(buffer);
        }
    }

    /// Bind an image for the upcoming executions
    pub fn set_image(&mut self, id: TaskImageId, image: SwapchainImage) {
        if let Some(slot) = self.images.get_mut(id.0 as usize) {
            slot.binding = Some(image);
        }
    }

    pub fn clear_image(&mut self, id: TaskImageId) {
        if let Some(slot) = self.images.get_mut(id.0 as usize) {
            slot.binding = None;
        }
    }

    pub fn buffer(&self, id: TaskBufferId) -> Option<BufferHandle> {
        self.buffers.get(id.0 as usize)?.binding
    }

    pub fn image(&self, id: TaskImageId) -> Option<SwapchainImage> {
        self.images.get(id.0 as usize)?.binding
    }

    pub fn contains(&self, resource: ResourceRef) -> bool {
        match resource {
            ResourceRef::Buffer(id) => (id.0 as usize) < self.buffers.len(),
            ResourceRef::Image(id) => (id.0 as usize) < self.images.len(),
        }
    }

    pub fn is_bound(&self, resource: ResourceRef) -> bool {
        match resource {
            ResourceRef::Buffer(id) => self.buffer(id).is_some(),
            ResourceRef::Image(id) => self.image(id).is_some(),
        }
    }

    pub fn is_swapchain_image(&self, id: TaskImageId) -> bool {
        self.images
            .get(id.0 as usize)
            .is_some_and(|slot| slot.info.swapchain_image)
    }

    pub fn name(&self, resource: ResourceRef) -> &str {
        let name = match resource {
            ResourceRef::Buffer(id) => self.buffers.get(id.0 as usize).map(|s| s.name.as_str()),
            ResourceRef::Image(id) => self.images.get(id.0 as usize).map(|s| s.info.name.as_str()),
        };
        name.unwrap_or("<unknown>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::traits::TextureViewHandle;
    use crate::backend::types::TextureFormat;

    #[test]
    fn access_classification() {
        assert!(TaskAccess::TransferWrite.is_write());
        assert!(TaskAccess::ColorAttachment.is_write());
        assert!(TaskAccess::VertexShaderRead.is_read());
        assert!(TaskAccess::TransferRead.is_read());
        assert!(!TaskAccess::ColorAttachment.applies_to(ResourceKind::Buffer));
        assert!(!TaskAccess::VertexShaderRead.applies_to(ResourceKind::Image));
        assert!(TaskAccess::TransferWrite.applies_to(ResourceKind::Buffer));
    }

    #[test]
    fn image_rebinding() {
        let mut resources = PersistentResources::new();
        let image = resources.create_image(TaskImageInfo::swapchain("swapchain image"));
        assert!(!resources.is_bound(image.into()));
        assert!(resources.is_swapchain_image(image));

        let first = SwapchainImage {
            view: TextureViewHandle(1),
            width: 640,
            height: 480,
            format: TextureFormat::Bgra8UnormSrgb,
        };
        let second = SwapchainImage {
            view: TextureViewHandle(2),
            ..first
        };

        resources.set_image(image, first);
        assert_eq!(resources.image(image), Some(first));
        resources.set_image(image, second);
        assert_eq!(resources.image(image), Some(second));
        resources.clear_image(image);
        assert_eq!(resources.image(image), None);
    }

    #[test]
    fn buffer_initial_binding() {
        let mut resources = PersistentResources::new();
        let bound = resources.create_buffer("vertices", Some(BufferHandle(3)));
        let unbound = resources.create_buffer("scratch", None);
        assert_eq!(resources.buffer(bound), Some(BufferHandle(3)));
        assert_eq!(resources.buffer(unbound), None);
        assert_eq!(resources.name(bound.into()), "vertices");
        assert!(!resources.contains(ResourceRef::Buffer(TaskBufferId(9))));
    }
}
