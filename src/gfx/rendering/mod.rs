// src/gfx/rendering/mod.rs
//! Frame rendering
//!
//! Draws the scene into the off-screen framebuffer and presents it, either over the
//! whole window or as an image inside the editor's scene view.

pub mod renderer;
pub mod shaders;
pub mod viewport;

// Re-export main types
pub use renderer::{RendererError, SceneRenderer};
pub use viewport::ViewportImage;
