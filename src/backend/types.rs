//! Common types shared between backends

use crate::backend::traits::TextureViewHandle;
use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgb10a2Unorm,
    Rgba16Float,
}

/// Default surface format score used when a selector has no opinion.
///
/// Prefers 8-bit sRGB formats, then plain 8-bit, then wide formats.
pub fn default_format_score(format: TextureFormat) -> i32 {
    match format {
        TextureFormat::Bgra8UnormSrgb | TextureFormat::Rgba8UnormSrgb => 90,
        TextureFormat::Bgra8Unorm | TextureFormat::Rgba8Unorm => 80,
        TextureFormat::Rgb10a2Unorm => 40,
        TextureFormat::Rgba16Float => 20,
    }
}

/// Pick the highest scoring format. Ties keep the earliest candidate.
pub fn select_format(
    candidates: &[TextureFormat],
    selector: fn(TextureFormat) -> i32,
) -> Option<TextureFormat> {
    let mut best: Option<(TextureFormat, i32)> = None;
    for &format in candidates {
        let score = selector(format);
        match best {
            Some((_, best_score)) if best_score >= score => {}
            _ => best = Some((format, score)),
        }
    }
    best.map(|(format, _)| format)
}

/// Texture usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureUsage(u32);

impl TextureUsage {
    pub const COPY_SRC: Self = Self(1 << 0);
    pub const COPY_DST: Self = Self(1 << 1);
    pub const TEXTURE_BINDING: Self = Self(1 << 2);
    pub const STORAGE_BINDING: Self = Self(1 << 3);
    pub const RENDER_ATTACHMENT: Self = Self(1 << 4);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for TextureUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Buffer usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferUsage(u32);

impl BufferUsage {
    pub const MAP_READ: Self = Self(1 << 0);
    pub const MAP_WRITE: Self = Self(1 << 1);
    pub const COPY_SRC: Self = Self(1 << 2);
    pub const COPY_DST: Self = Self(1 << 3);
    pub const INDEX: Self = Self(1 << 4);
    pub const VERTEX: Self = Self(1 << 5);
    pub const UNIFORM: Self = Self(1 << 6);
    pub const STORAGE: Self = Self(1 << 7);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for BufferUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Where a buffer's memory lives and how the host may touch it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryFlags(u32);

impl MemoryFlags {
    /// Device-local, not host visible
    pub const NONE: Self = Self(0);
    /// Host visible, written sequentially
    pub const HOST_ACCESS_SEQUENTIAL_WRITE: Self = Self(1 << 0);
    /// Host visible, random access
    pub const HOST_ACCESS_RANDOM: Self = Self(1 << 1);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn is_host_visible(&self) -> bool {
        self.0 != 0
    }
}

/// Buffer descriptor
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsage,
    pub memory: MemoryFlags,
}

impl BufferDescriptor {
    pub fn new(label: &str, size: u64, usage: BufferUsage) -> Self {
        Self {
            label: Some(label.to_string()),
            size,
            usage,
            memory: MemoryFlags::NONE,
        }
    }

    pub fn with_memory(mut self, memory: MemoryFlags) -> Self {
        self.memory = memory;
        self
    }
}

/// GPU address of a buffer, as pushed to shaders
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct DeviceAddress(pub u64);

/// Vertex with position and color, laid out as six tightly packed floats
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: Vec3,
    pub color: Vec3,
}

impl Vertex {
    pub const fn new(pos: Vec3, color: Vec3) -> Self {
        Self { pos, color }
    }
}

/// Push constant block for the triangle pipeline
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct PushConstant {
    pub vertex_ptr: DeviceAddress,
}

/// Presentation mode for the swapchain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PresentMode {
    /// No synchronization, may tear
    Immediate,
    /// Triple buffering, low latency without tearing
    #[default]
    Mailbox,
    /// VSync
    Fifo,
}

/// An acquired swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainImage {
    pub view: TextureViewHandle,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    TriangleList,
    TriangleStrip,
}

/// Front face winding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontFace {
    Ccw,
    Cw,
}

/// Cull mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 24);
        assert_eq!(std::mem::size_of::<PushConstant>(), 8);
    }

    #[test]
    fn select_format_prefers_highest_score() {
        let formats = [
            TextureFormat::Rgba16Float,
            TextureFormat::Bgra8Unorm,
            TextureFormat::Bgra8UnormSrgb,
        ];
        assert_eq!(
            select_format(&formats, default_format_score),
            Some(TextureFormat::Bgra8UnormSrgb)
        );

        fn prefer_rgba8(format: TextureFormat) -> i32 {
            match format {
                TextureFormat::Rgba8Unorm => 100,
                other => default_format_score(other),
            }
        }
        let formats = [TextureFormat::Bgra8UnormSrgb, TextureFormat::Rgba8Unorm];
        assert_eq!(
            select_format(&formats, prefer_rgba8),
            Some(TextureFormat::Rgba8Unorm)
        );
    }

    #[test]
    fn select_format_empty() {
        assert_eq!(select_format(&[], default_format_score), None);
    }

    #[test]
    fn memory_flags_host_visibility() {
        assert!(!MemoryFlags::NONE.is_host_visible());
        assert!(MemoryFlags::HOST_ACCESS_RANDOM.is_host_visible());
        assert!(MemoryFlags::HOST_ACCESS_SEQUENTIAL_WRITE.is_host_visible());
    }
}
