// src/gfx/resources/mod.rs
//! GPU resource wrappers
//!
//! Owning wrappers around device handles: vertex buffers, meshes, shader programs,
//! textures, materials and the off-screen framebuffer. Each wrapper releases its
//! handles through the device's release queue when dropped.

pub mod buffer;
pub mod framebuffer;
pub mod material;
pub mod mesh;
pub mod shader;
pub mod texture;

// Re-export main types
pub use buffer::GpuBuffer;
pub use framebuffer::Framebuffer;
pub use material::{Material, UniformBag, UniformBags, UniformType};
pub use mesh::Mesh;
pub use shader::{ShaderError, ShaderProgram};
pub use texture::Texture;
