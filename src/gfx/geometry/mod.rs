//! # Procedural Geometry Generation
//!
//! Built-in meshes registered by the editor at startup, so a scene can be built
//! without any model files.
//!
//! ## Supported Primitives
//!
//! - **Cube**: unit cube with per-face texture coordinates
//! - **Quad**: unit quad in the XY plane
//! - **Screen quad**: clip-space quad used to present the framebuffer
//!
//! ## Usage
//!
//! ```rust,no_run
//! use micromodeler::gfx::device::HeadlessDevice;
//! use micromodeler::gfx::geometry::generate_cube;
//!
//! let mut device = HeadlessDevice::new();
//! let mut cube = generate_cube();
//! cube.upload(&mut device);
//! ```

pub mod primitives;

pub use primitives::*;
