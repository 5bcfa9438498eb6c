//! MicroModeler 3D
//!
//! A small scene editor built on wgpu and winit. Shaders are WGSL files edited and
//! recompiled live, textures are loaded from disk, and both are combined into
//! materials, objects and finally the entities drawn in the scene view.

pub mod app;
pub mod assets;
pub mod config;
pub mod gfx;
pub mod logging;
pub mod ui;

pub use app::EditorApp;
pub use config::EditorConfig;
