//! A window-less [`RenderDevice`] that records every command it receives.
//!
//! Shader stages go through the same WGSL front end as the wgpu backend, so compile and
//! link diagnostics and uniform reflection behave identically. Uniform location queries
//! are counted, which lets tests observe caching in the resource wrappers.

use std::collections::HashMap;

use naga::valid::Capabilities;

use super::wgsl::{self, CompiledStage, UniformBlock};
use super::{
    BufferHandle, BufferUsage, DepthRange, DeviceCapabilities, DeviceError, DeviceResult,
    FramebufferHandle, GpuResource, PassDescriptor, PixelFormat, ProgramHandle, ReleaseQueue,
    RenderDevice, RenderTargetHandles, RenderbufferHandle, ShaderStage, ShaderStageHandle,
    TextureData, TextureFilter, TextureHandle, TextureOrigin, UniformLocation, UniformValue,
    VertexArrayHandle, VertexAttribute,
};

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateVertexBuffer {
        buffer: BufferHandle,
        floats: usize,
        usage: BufferUsage,
    },
    CreateIndexBuffer {
        buffer: BufferHandle,
        indices: usize,
    },
    CreateVertexArray(VertexArrayHandle),
    SetVertexAttribute {
        array: VertexArrayHandle,
        buffer: BufferHandle,
        attribute: VertexAttribute,
    },
    SetIndexBuffer {
        array: VertexArrayHandle,
        buffer: BufferHandle,
    },
    LinkProgram(ProgramHandle),
    SetUniform {
        program: ProgramHandle,
        name: String,
        value: UniformValue,
    },
    CreateTexture {
        texture: TextureHandle,
        width: u32,
        height: u32,
        format: PixelFormat,
    },
    SetTextureFilter {
        texture: TextureHandle,
        filter: TextureFilter,
    },
    CreateRenderTarget(RenderTargetHandles),
    BeginPass(PassDescriptor),
    BindVertexArray(Option<VertexArrayHandle>),
    UseProgram(Option<ProgramHandle>),
    BindTexture(Option<TextureHandle>),
    DrawIndexed(u32),
    DrawStrip(u32),
    EndPass,
    Destroy(GpuResource),
}

/// What the device knows about a created texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureRecord {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub filter: TextureFilter,
    /// Uploaded rows, first row first. Empty for render targets.
    pub pixels: Vec<u8>,
}

pub struct HeadlessDevice {
    next_id: u64,
    capabilities: DeviceCapabilities,
    commands: Vec<Command>,
    uniform_lookups: usize,
    stages: HashMap<ShaderStageHandle, CompiledStage>,
    programs: HashMap<ProgramHandle, UniformBlock>,
    textures: HashMap<TextureHandle, TextureRecord>,
    releases: ReleaseQueue,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    /// A device with GL conventions: bottom-left texture origin, -1..1 depth.
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCapabilities {
            texture_origin: TextureOrigin::BottomLeft,
            depth_range: DepthRange::NegativeOneToOne,
            max_texture_dimension: 4096,
            shader_capabilities: Capabilities::empty(),
        })
    }

    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        Self {
            next_id: 1,
            capabilities,
            commands: Vec::new(),
            uniform_lookups: 0,
            stages: HashMap::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            releases: ReleaseQueue::new(),
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    /// Number of uniform location queries that reached the device.
    pub fn uniform_lookups(&self) -> usize {
        self.uniform_lookups
    }

    pub fn texture(&self, texture: TextureHandle) -> Option<&TextureRecord> {
        self.textures.get(&texture)
    }

    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::DrawIndexed(_) | Command::DrawStrip(_)))
            .count()
    }

    pub fn destroyed_count(&self, resource: GpuResource) -> usize {
        self.commands
            .iter()
            .filter(|c| **c == Command::Destroy(resource))
            .count()
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl RenderDevice for HeadlessDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn release_queue(&self) -> ReleaseQueue {
        self.releases.clone()
    }

    fn create_vertex_buffer(&mut self, data: &[f32], usage: BufferUsage) -> BufferHandle {
        let buffer = BufferHandle(self.next_id());
        self.commands.push(Command::CreateVertexBuffer {
            buffer,
            floats: data.len(),
            usage,
        });
        buffer
    }

    fn create_index_buffer(&mut self, indices: &[u32]) -> BufferHandle {
        let buffer = BufferHandle(self.next_id());
        self.commands.push(Command::CreateIndexBuffer {
            buffer,
            indices: indices.len(),
        });
        buffer
    }

    fn create_vertex_array(&mut self) -> VertexArrayHandle {
        let array = VertexArrayHandle(self.next_id());
        self.commands.push(Command::CreateVertexArray(array));
        array
    }

    fn set_vertex_attribute(
        &mut self,
        array: VertexArrayHandle,
        buffer: BufferHandle,
        attribute: VertexAttribute,
    ) {
        self.commands.push(Command::SetVertexAttribute {
            array,
            buffer,
            attribute,
        });
    }

    fn set_index_buffer(&mut self, array: VertexArrayHandle, buffer: BufferHandle) {
        self.commands.push(Command::SetIndexBuffer { array, buffer });
    }

    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderStageHandle, String> {
        let compiled = wgsl::compile(stage, source, self.capabilities.shader_capabilities)?;
        let handle = ShaderStageHandle(self.next_id());
        self.stages.insert(handle, compiled);
        Ok(handle)
    }

    fn link_program(
        &mut self,
        vertex: ShaderStageHandle,
        fragment: ShaderStageHandle,
    ) -> Result<ProgramHandle, String> {
        let (Some(vertex), Some(fragment)) = (self.stages.get(&vertex), self.stages.get(&fragment))
        else {
            return Err("cannot link a deleted shader stage".to_string());
        };
        let linked = wgsl::link(vertex, fragment)?;
        let program = ProgramHandle(self.next_id());
        self.programs.insert(program, linked.uniforms);
        self.commands.push(Command::LinkProgram(program));
        Ok(program)
    }

    fn delete_shader(&mut self, shader: ShaderStageHandle) {
        self.stages.remove(&shader);
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        self.uniform_lookups += 1;
        self.programs.get(&program)?.locate(name)
    }

    fn set_uniform(&mut self, program: ProgramHandle, location: UniformLocation, value: &UniformValue) {
        let Some(block) = self.programs.get(&program) else {
            log::warn!("set_uniform on unknown program {:?}", program);
            return;
        };
        let Some(member) = block.member(location) else {
            return;
        };
        if !member.kind.is_some_and(|kind| kind.accepts(value)) {
            log::debug!(
                "ignoring {} value for uniform '{}' of a different type",
                value.type_name(),
                member.name
            );
            return;
        }
        self.commands.push(Command::SetUniform {
            program,
            name: member.name.clone(),
            value: *value,
        });
    }

    fn create_texture(&mut self, data: &TextureData<'_>, filter: TextureFilter) -> TextureHandle {
        let texture = TextureHandle(self.next_id());
        self.textures.insert(
            texture,
            TextureRecord {
                width: data.width,
                height: data.height,
                format: data.format,
                filter,
                pixels: data.pixels.to_vec(),
            },
        );
        self.commands.push(Command::CreateTexture {
            texture,
            width: data.width,
            height: data.height,
            format: data.format,
        });
        texture
    }

    fn set_texture_filter(&mut self, texture: TextureHandle, filter: TextureFilter) {
        if let Some(record) = self.textures.get_mut(&texture) {
            record.filter = filter;
        }
        self.commands
            .push(Command::SetTextureFilter { texture, filter });
    }

    fn create_render_target(&mut self, width: u32, height: u32) -> DeviceResult<RenderTargetHandles> {
        let max = self.capabilities.max_texture_dimension;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(DeviceError::IncompleteFramebuffer(format!(
                "{width}x{height} is outside 1..={max}"
            )));
        }
        let handles = RenderTargetHandles {
            framebuffer: FramebufferHandle(self.next_id()),
            color: TextureHandle(self.next_id()),
            depth_stencil: RenderbufferHandle(self.next_id()),
        };
        self.textures.insert(
            handles.color,
            TextureRecord {
                width,
                height,
                format: PixelFormat::Rgba8,
                filter: TextureFilter::Linear,
                pixels: Vec::new(),
            },
        );
        self.commands.push(Command::CreateRenderTarget(handles));
        Ok(handles)
    }

    fn begin_pass(&mut self, pass: &PassDescriptor) {
        self.commands.push(Command::BeginPass(*pass));
    }

    fn bind_vertex_array(&mut self, array: Option<VertexArrayHandle>) {
        self.commands.push(Command::BindVertexArray(array));
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        self.commands.push(Command::UseProgram(program));
    }

    fn bind_texture(&mut self, texture: Option<TextureHandle>) {
        self.commands.push(Command::BindTexture(texture));
    }

    fn draw_indexed(&mut self, index_count: u32) {
        self.commands.push(Command::DrawIndexed(index_count));
    }

    fn draw_strip(&mut self, vertex_count: u32) {
        self.commands.push(Command::DrawStrip(vertex_count));
    }

    fn end_pass(&mut self) {
        self.commands.push(Command::EndPass);
    }

    fn destroy(&mut self, resource: GpuResource) {
        match resource {
            GpuResource::Program(program) => {
                self.programs.remove(&program);
            }
            GpuResource::Texture(texture) => {
                self.textures.remove(&texture);
            }
            GpuResource::RenderTarget(handles) => {
                self.textures.remove(&handles.color);
            }
            GpuResource::Buffer(_) | GpuResource::VertexArray(_) => {}
        }
        self.commands.push(Command::Destroy(resource));
    }
}
