//! Shaders compiled into the binary.

/// Vertex stage of the framebuffer blit, layout `[2, 2]`.
pub const BLIT_VERTEX_SHADER: &str = include_str!("shaders/blit_vertex.wgsl");
pub const BLIT_FRAGMENT_SHADER: &str = include_str!("shaders/blit_fragment.wgsl");
