//! # Render Device
//!
//! The graphics backend seam. Every GPU resource wrapper in [`crate::gfx::resources`]
//! talks to the GPU exclusively through the [`RenderDevice`] trait, which exposes a
//! small state-machine style API: create buffers, vertex arrays, shader programs,
//! textures and render targets; bind them; set uniforms; issue draws inside passes.
//!
//! ## Backends
//!
//! - [`WgpuDevice`]: the production backend used by the editor window
//! - [`HeadlessDevice`]: records every command without a GPU, used by tests
//!
//! Both backends share the WGSL front end in [`wgsl`], so a shader that compiles on
//! one compiles on the other.
//!
//! ## Handle lifetime
//!
//! Handles are plain ids and are never reference counted by the device. Resource
//! wrappers push their handles onto the device's [`ReleaseQueue`] when dropped and
//! the frame loop calls [`RenderDevice::collect_released`] once per frame, so each
//! handle is destroyed exactly once, after its last owner is gone.

pub mod headless;
pub mod wgpu_device;
pub mod wgsl;

pub use headless::{Command, HeadlessDevice, TextureRecord};
pub use wgpu_device::WgpuDevice;

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u64);

        impl $name {
            /// Raw id, unique per device across all handle kinds.
            pub fn id(&self) -> u64 {
                self.0
            }
        }
    };
}

define_handle!(
    /// A GPU buffer holding vertex or index data.
    BufferHandle
);
define_handle!(
    /// A vertex array: attribute bindings plus an optional index buffer.
    VertexArrayHandle
);
define_handle!(
    /// A compiled but unlinked shader stage.
    ShaderStageHandle
);
define_handle!(
    /// A linked shader program.
    ProgramHandle
);
define_handle!(
    /// A sampled texture.
    TextureHandle
);
define_handle!(
    /// An off-screen render target.
    FramebufferHandle
);
define_handle!(
    /// The depth/stencil attachment of a render target.
    RenderbufferHandle
);

/// Location of a named uniform inside a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub(crate) u32);

impl UniformLocation {
    pub fn index(&self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

/// Storage hint for vertex data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferUsage {
    #[default]
    Static,
    Dynamic,
}

/// Minification and magnification filter of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFilter {
    Nearest,
    #[default]
    Linear,
}

/// Layout of the pixel bytes handed to [`RenderDevice::create_texture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Three `u8` channels per pixel.
    Rgb8,
    /// Four `u8` channels per pixel.
    Rgba8,
    /// Three native-endian `f32` channels per pixel.
    RgbF32,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
            PixelFormat::RgbF32 => 12,
        }
    }
}

/// Decoded pixel rows, first row first.
#[derive(Debug, Clone, Copy)]
pub struct TextureData<'a> {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pixels: &'a [u8],
}

/// One float attribute read from a vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    /// Shader input location.
    pub location: u32,
    /// Number of `f32` components (1 to 4).
    pub components: u32,
    /// Byte stride of one vertex in the source buffer.
    pub stride: u32,
    /// Byte offset of the attribute inside one vertex.
    pub offset: u32,
}

/// A typed uniform value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    /// Column major.
    Mat3([[f32; 3]; 3]),
    /// Column major.
    Mat4([[f32; 4]; 4]),
}

impl UniformValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            UniformValue::Int(_) => "int",
            UniformValue::Float(_) => "float",
            UniformValue::Vec2(_) => "vec2",
            UniformValue::Vec3(_) => "vec3",
            UniformValue::Vec4(_) => "vec4",
            UniformValue::Mat3(_) => "mat3",
            UniformValue::Mat4(_) => "mat4",
        }
    }
}

/// Where a pass draws to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    /// The window surface of the current frame.
    Surface,
    Framebuffer(FramebufferHandle),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassDescriptor {
    pub target: RenderTarget,
    /// x, y, width, height in pixels.
    pub viewport: [u32; 4],
    /// Clear color and depth when set, otherwise keep the previous contents.
    pub clear_color: Option<[f32; 4]>,
    pub depth_test: bool,
}

/// Row that texture coordinate `v = 0` addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureOrigin {
    /// `v = 0` is the first uploaded row, displayed at the bottom (GL convention).
    BottomLeft,
    /// `v = 0` is the top row of a rendered image (wgpu convention).
    TopLeft,
}

/// Clip space depth range expected by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthRange {
    NegativeOneToOne,
    ZeroToOne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub texture_origin: TextureOrigin,
    pub depth_range: DepthRange,
    /// Largest width or height of a texture or render target.
    pub max_texture_dimension: u32,
    /// Optional shader features the backend can run; stages using others fail to compile.
    pub shader_capabilities: naga::valid::Capabilities,
}

/// The three handles that make up an off-screen render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetHandles {
    pub framebuffer: FramebufferHandle,
    pub color: TextureHandle,
    pub depth_stencil: RenderbufferHandle,
}

/// A GPU object waiting to be destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuResource {
    Buffer(BufferHandle),
    VertexArray(VertexArrayHandle),
    Program(ProgramHandle),
    Texture(TextureHandle),
    RenderTarget(RenderTargetHandles),
}

/// Handles released by dropped resource wrappers, drained by the device.
#[derive(Debug, Clone, Default)]
pub struct ReleaseQueue {
    pending: Rc<RefCell<Vec<GpuResource>>>,
}

impl ReleaseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, resource: GpuResource) {
        self.pending.borrow_mut().push(resource);
    }

    pub fn drain(&self) -> Vec<GpuResource> {
        std::mem::take(&mut *self.pending.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no compatible graphics adapter: {0}")]
    AdapterUnavailable(String),
    #[error("failed to create graphics device: {0}")]
    DeviceRequest(String),
    #[error("surface error: {0}")]
    Surface(String),
    #[error("framebuffer incomplete: {0}")]
    IncompleteFramebuffer(String),
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// GPU backend used by the resource wrappers and the scene renderer.
///
/// The API mirrors a bind-then-draw state machine: `use_program`,
/// `bind_vertex_array` and `bind_texture` select the state that the next
/// `draw_*` call inside a `begin_pass`/`end_pass` bracket consumes. Uniform
/// values written with `set_uniform` persist in the program until overwritten.
pub trait RenderDevice {
    fn capabilities(&self) -> DeviceCapabilities;

    /// Queue that resource wrappers push their handles onto when dropped.
    fn release_queue(&self) -> ReleaseQueue;

    fn create_vertex_buffer(&mut self, data: &[f32], usage: BufferUsage) -> BufferHandle;
    fn create_index_buffer(&mut self, indices: &[u32]) -> BufferHandle;
    fn create_vertex_array(&mut self) -> VertexArrayHandle;
    fn set_vertex_attribute(
        &mut self,
        array: VertexArrayHandle,
        buffer: BufferHandle,
        attribute: VertexAttribute,
    );
    fn set_index_buffer(&mut self, array: VertexArrayHandle, buffer: BufferHandle);

    /// Compiles one stage; the error is a human readable diagnostic.
    fn compile_shader(&mut self, stage: ShaderStage, source: &str)
        -> Result<ShaderStageHandle, String>;
    fn link_program(
        &mut self,
        vertex: ShaderStageHandle,
        fragment: ShaderStageHandle,
    ) -> Result<ProgramHandle, String>;
    /// Releases a stage once it has been linked (or failed to).
    fn delete_shader(&mut self, shader: ShaderStageHandle);
    /// Queries the driver for a uniform by name. Callers cache the answer.
    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;
    fn set_uniform(&mut self, program: ProgramHandle, location: UniformLocation, value: &UniformValue);

    fn create_texture(&mut self, data: &TextureData<'_>, filter: TextureFilter) -> TextureHandle;
    fn set_texture_filter(&mut self, texture: TextureHandle, filter: TextureFilter);

    /// Creates a color texture plus depth/stencil attachment of the given size.
    fn create_render_target(&mut self, width: u32, height: u32) -> DeviceResult<RenderTargetHandles>;

    fn begin_pass(&mut self, pass: &PassDescriptor);
    fn bind_vertex_array(&mut self, array: Option<VertexArrayHandle>);
    fn use_program(&mut self, program: Option<ProgramHandle>);
    fn bind_texture(&mut self, texture: Option<TextureHandle>);
    /// Indexed triangle list over the bound vertex array's index buffer.
    fn draw_indexed(&mut self, index_count: u32);
    /// Non-indexed triangle strip over the bound vertex array.
    fn draw_strip(&mut self, vertex_count: u32);
    fn end_pass(&mut self);

    fn destroy(&mut self, resource: GpuResource);

    /// Destroys everything dropped since the last call.
    fn collect_released(&mut self) -> usize {
        let released = self.release_queue().drain();
        let count = released.len();
        for resource in released {
            self.destroy(resource);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_queue_shared_between_clones() {
        let queue = ReleaseQueue::new();
        let producer = queue.clone();
        producer.push(GpuResource::Buffer(BufferHandle(1)));
        producer.push(GpuResource::Texture(TextureHandle(2)));

        assert_eq!(queue.len(), 2);
        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(producer.is_empty());
    }

    #[test]
    fn test_collect_released_destroys_each_handle_once() {
        let mut device = HeadlessDevice::new();
        let buffer = device.create_vertex_buffer(&[0.0, 1.0, 2.0], BufferUsage::Static);
        device.release_queue().push(GpuResource::Buffer(buffer));

        assert_eq!(device.collect_released(), 1);
        assert_eq!(device.collect_released(), 0);
        assert_eq!(device.destroyed_count(GpuResource::Buffer(buffer)), 1);
    }
}
