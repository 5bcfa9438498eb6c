//! Assets read from disk: shader sources and texture images.

pub mod shader_library;
pub mod texture_loader;

pub use shader_library::{ShaderKind, ShaderLibrary};
pub use texture_loader::load_textures;
