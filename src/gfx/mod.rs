//! # Graphics Module
//!
//! Everything between the editor and the GPU.
//!
//! - **Device** ([`device`]) - the [`RenderDevice`] seam, a wgpu backend and a
//!   headless recorder used by the tests
//! - **Resources** ([`resources`]) - buffers, meshes, shader programs, textures,
//!   materials and framebuffers that release their device handles on drop
//! - **Geometry** ([`geometry`]) - the built-in cube and quad
//! - **Scene** ([`scene`]) - named registries of assets, objects and entities
//! - **Rendering** ([`rendering`]) - draws a scene into the offscreen framebuffer
//!   and blits it to the window
//! - **Camera** ([`camera`]) - fly camera and its input controller
//!
//! [`RenderDevice`]: device::RenderDevice

pub mod camera;
pub mod device;
pub mod geometry;
pub mod rendering;
pub mod resources;
pub mod scene;
