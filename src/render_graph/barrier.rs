//! Synchronization between task accesses
//!
//! The graph compiles one [`Barrier`] for every hazard between two accesses
//! to the same resource. Backends with explicit synchronization turn them
//! into pipeline barriers and layout transitions; wgpu tracks hazards itself.

use crate::render_graph::resource::{ResourceRef, TaskAccess};

/// Image layout implied by an access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    TransferSrc,
    TransferDst,
    ShaderReadOnly,
    ColorAttachment,
    PresentSrc,
}

impl TaskAccess {
    /// The layout an image must be in for this access
    pub fn image_layout(self) -> ImageLayout {
        match self {
            TaskAccess::TransferRead => ImageLayout::TransferSrc,
            TaskAccess::TransferWrite => ImageLayout::TransferDst,
            TaskAccess::VertexShaderRead | TaskAccess::FragmentShaderRead => {
                ImageLayout::ShaderReadOnly
            }
            TaskAccess::ColorAttachment => ImageLayout::ColorAttachment,
        }
    }
}

/// State of a resource on one side of a barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// Contents undefined, nothing touched it yet in this graph
    Undefined,
    Access(TaskAccess),
    /// Handed to the presentation engine
    Present,
}

impl ResourceState {
    pub fn image_layout(self) -> ImageLayout {
        match self {
            ResourceState::Undefined => ImageLayout::Undefined,
            ResourceState::Access(access) => access.image_layout(),
            ResourceState::Present => ImageLayout::PresentSrc,
        }
    }
}

/// Why a barrier was planned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hazard {
    ReadAfterWrite,
    WriteAfterWrite,
    WriteAfterRead,
    /// First use of an image in the graph
    InitialTransition,
    /// Image leaves the graph for presentation
    PresentTransition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Barrier {
    pub resource: ResourceRef,
    pub before: ResourceState,
    pub after: ResourceState,
    pub hazard: Hazard,
}

impl Barrier {
    /// Whether the barrier also changes the image layout
    pub fn is_layout_transition(&self) -> bool {
        matches!(self.resource, ResourceRef::Image(_))
            && self.before.image_layout() != self.after.image_layout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_graph::resource::TaskImageId;

    #[test]
    fn present_barrier_is_layout_transition() {
        let barrier = Barrier {
            resource: ResourceRef::Image(TaskImageId(0)),
            before: ResourceState::Access(TaskAccess::ColorAttachment),
            after: ResourceState::Present,
            hazard: Hazard::PresentTransition,
        };
        assert!(barrier.is_layout_transition());
        assert_eq!(barrier.after.image_layout(), ImageLayout::PresentSrc);
    }

    #[test]
    fn shader_reads_share_a_layout() {
        assert_eq!(
            TaskAccess::VertexShaderRead.image_layout(),
            TaskAccess::FragmentShaderRead.image_layout()
        );
        assert_eq!(
            ResourceState::Undefined.image_layout(),
            ImageLayout::Undefined
        );
    }
}
