//! wgpu implementation of [`RenderDevice`].
//!
//! wgpu records work into render passes instead of executing bind/draw calls
//! immediately, so this backend keeps the bind state on the CPU and turns every
//! `draw_*` call into a recorded draw (program, vertex array, texture, and a snapshot
//! of the program's uniform block). `end_pass` then builds any missing pipelines,
//! writes the uniform snapshots into a persistent ring buffer with a fixed 1024 byte
//! slot per draw (bound with a dynamic offset) and encodes the pass.
//!
//! Passes that run between [`WgpuDevice::begin_frame`] and [`WgpuDevice::end_frame`]
//! share the frame's encoder; off-screen passes outside a frame are submitted
//! immediately. Ring slots are handed out once per submission and reused after it.

use std::collections::HashMap;
use std::num::NonZeroU64;

use naga::valid::Capabilities;
use wgpu::util::DeviceExt;

use super::wgsl::{self, CompiledStage, LinkedProgram, MAX_UNIFORM_BLOCK_SIZE};
use super::{
    BufferHandle, BufferUsage, DepthRange, DeviceCapabilities, DeviceError, DeviceResult,
    FramebufferHandle, GpuResource, PassDescriptor, PixelFormat, ProgramHandle, ReleaseQueue,
    RenderDevice, RenderTarget, RenderTargetHandles, RenderbufferHandle, ShaderStage,
    ShaderStageHandle, TextureData, TextureFilter, TextureHandle, TextureOrigin,
    UniformLocation, UniformValue, VertexArrayHandle, VertexAttribute,
};

/// Color format of off-screen render targets and sampled textures.
pub const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// Depth/stencil format of off-screen render targets.
pub const DEPTH_STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

const INITIAL_UNIFORM_SLOTS: usize = 64;
const UNIFORM_SLOT: usize = MAX_UNIFORM_BLOCK_SIZE as usize;

struct TextureState {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: wgpu::Extent3d,
    bind_group: wgpu::BindGroup,
}

struct RenderTargetState {
    color: TextureHandle,
    depth_stencil: RenderbufferHandle,
    depth_view: wgpu::TextureView,
    size: (u32, u32),
}

struct VertexStream {
    buffer: BufferHandle,
    stride: u64,
    attributes: Vec<wgpu::VertexAttribute>,
}

#[derive(Default)]
struct VertexArrayState {
    streams: Vec<VertexStream>,
    index_buffer: Option<BufferHandle>,
}

struct ProgramState {
    vertex_module: wgpu::ShaderModule,
    fragment_module: wgpu::ShaderModule,
    linked: LinkedProgram,
    staging: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramHandle,
    array: VertexArrayHandle,
    strip: bool,
    color_format: wgpu::TextureFormat,
    /// `Some(depth_test)` when the target has a depth attachment.
    depth: Option<bool>,
}

#[derive(Debug, Clone, Copy)]
enum DrawCall {
    Indexed(u32),
    Strip(u32),
}

struct RecordedDraw {
    program: ProgramHandle,
    array: VertexArrayHandle,
    texture: Option<TextureHandle>,
    uniforms: Vec<u8>,
    call: DrawCall,
}

struct PendingPass {
    descriptor: PassDescriptor,
    draws: Vec<RecordedDraw>,
}

#[derive(Default)]
struct BoundState {
    array: Option<VertexArrayHandle>,
    program: Option<ProgramHandle>,
    texture: Option<TextureHandle>,
}

struct Frame {
    surface_texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
}

struct BindingLayouts {
    uniforms: wgpu::BindGroupLayout,
    texture: wgpu::BindGroupLayout,
    pipeline: wgpu::PipelineLayout,
}

/// Per-draw uniform slots shared by every pass of one submission.
struct UniformRing {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    capacity: usize,
    cursor: usize,
}

impl UniformRing {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, capacity: usize) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Per-draw Uniforms"),
            size: (capacity * UNIFORM_SLOT) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Per-draw Uniform Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(UNIFORM_SLOT as u64),
                }),
            }],
        });
        Self {
            buffer,
            bind_group,
            capacity,
            cursor: 0,
        }
    }

    /// Claims `count` consecutive slots and returns the first one.
    ///
    /// A full ring is replaced by a larger one. Passes already encoded keep the old
    /// buffer alive and their slots intact.
    fn reserve(
        &mut self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        count: usize,
    ) -> usize {
        if let Some(capacity) = grown_capacity(self.capacity, self.cursor, count) {
            log::debug!("Growing uniform ring to {} slots", capacity);
            *self = Self::new(device, layout, capacity);
        }
        let first = self.cursor;
        self.cursor += count;
        first
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}

/// New ring size when `count` more slots do not fit after `cursor`.
fn grown_capacity(capacity: usize, cursor: usize, count: usize) -> Option<usize> {
    (cursor + count > capacity).then(|| (capacity * 2).max(count))
}

/// Lays out uniform snapshots one per slot, truncating oversized blocks.
fn pack_uniforms<'a>(blocks: impl ExactSizeIterator<Item = &'a [u8]>) -> Vec<u8> {
    let mut bytes = vec![0u8; UNIFORM_SLOT * blocks.len()];
    for (index, block) in blocks.enumerate() {
        let len = block.len().min(UNIFORM_SLOT);
        let start = index * UNIFORM_SLOT;
        bytes[start..start + len].copy_from_slice(&block[..len]);
    }
    bytes
}

/// Shader features the device can run, as the WGSL validator names them.
fn shader_capabilities(features: wgpu::Features, downlevel: wgpu::DownlevelFlags) -> Capabilities {
    let mut capabilities = Capabilities::empty();
    let feature_map = [
        (wgpu::Features::PUSH_CONSTANTS, Capabilities::PUSH_CONSTANT),
        (wgpu::Features::SHADER_F64, Capabilities::FLOAT64),
        (wgpu::Features::SHADER_INT64, Capabilities::SHADER_INT64),
        (wgpu::Features::SHADER_PRIMITIVE_INDEX, Capabilities::PRIMITIVE_INDEX),
        (wgpu::Features::MULTIVIEW, Capabilities::MULTIVIEW),
        (wgpu::Features::SHADER_EARLY_DEPTH_TEST, Capabilities::EARLY_DEPTH_TEST),
        (wgpu::Features::DUAL_SOURCE_BLENDING, Capabilities::DUAL_SOURCE_BLENDING),
    ];
    for (feature, capability) in feature_map {
        capabilities.set(capability, features.contains(feature));
    }
    capabilities.set(
        Capabilities::CUBE_ARRAY_TEXTURES,
        downlevel.contains(wgpu::DownlevelFlags::CUBE_ARRAY_TEXTURES),
    );
    capabilities.set(
        Capabilities::MULTISAMPLED_SHADING,
        downlevel.contains(wgpu::DownlevelFlags::MULTISAMPLED_SHADING),
    );
    capabilities
}

/// Render device backed by a wgpu surface.
pub struct WgpuDevice {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    format: wgpu::TextureFormat,

    next_id: u64,
    releases: ReleaseQueue,
    buffers: HashMap<BufferHandle, wgpu::Buffer>,
    vertex_arrays: HashMap<VertexArrayHandle, VertexArrayState>,
    stages: HashMap<ShaderStageHandle, CompiledStage>,
    programs: HashMap<ProgramHandle, ProgramState>,
    textures: HashMap<TextureHandle, TextureState>,
    render_targets: HashMap<FramebufferHandle, RenderTargetState>,

    layouts: BindingLayouts,
    uniforms: UniformRing,
    shader_capabilities: Capabilities,
    // Failed pipeline builds are cached as `None` so they are reported once.
    pipelines: HashMap<PipelineKey, Option<wgpu::RenderPipeline>>,
    fallback_texture: TextureState,

    bound: BoundState,
    pass: Option<PendingPass>,
    frame: Option<Frame>,
}

impl WgpuDevice {
    /// Creates the device for the given window.
    ///
    /// # Arguments
    /// * `window` - Window surface target for rendering
    /// * `width` - Initial surface width in pixels
    /// * `height` - Initial surface height in pixels
    /// * `vsync` - Present with FIFO instead of the fastest available mode
    ///
    /// # Errors
    /// Fails when no adapter, device or surface can be created.
    pub async fn new(
        window: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> DeviceResult<WgpuDevice> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .map_err(|e| DeviceError::Surface(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| DeviceError::AdapterUnavailable(e.to_string()))?;
        log::info!("Using adapter: {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Editor Device"),
                required_features: wgpu::Features::default(),
                required_limits: wgpu::Limits {
                    max_texture_dimension_2d: 4096,
                    ..wgpu::Limits::downlevel_defaults()
                },
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| DeviceError::DeviceRequest(e.to_string()))?;

        let surface_capabilities = surface.get_capabilities(&adapter);
        let format = surface_capabilities
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_capabilities.formats.first().copied())
            .ok_or_else(|| DeviceError::Surface("surface reports no formats".to_string()))?;

        let present_mode = if !vsync
            && surface_capabilities
                .present_modes
                .contains(&wgpu::PresentMode::Immediate)
        {
            wgpu::PresentMode::Immediate
        } else {
            wgpu::PresentMode::Fifo
        };

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode,
            alpha_mode: surface_capabilities
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let shader_capabilities =
            shader_capabilities(device.features(), adapter.get_downlevel_capabilities().flags);
        log::debug!("Shader capabilities: {:?}", shader_capabilities);

        let layouts = create_binding_layouts(&device);
        let uniforms = UniformRing::new(&device, &layouts.uniforms, INITIAL_UNIFORM_SLOTS);
        let fallback_texture = upload_texture(
            &device,
            &queue,
            &layouts.texture,
            &TextureData {
                width: 1,
                height: 1,
                format: PixelFormat::Rgba8,
                pixels: &[255, 255, 255, 255],
            },
            TextureFilter::Nearest,
        );

        Ok(Self {
            surface,
            device,
            queue,
            config,
            format,
            next_id: 1,
            releases: ReleaseQueue::new(),
            buffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            stages: HashMap::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            render_targets: HashMap::new(),
            layouts,
            uniforms,
            shader_capabilities,
            pipelines: HashMap::new(),
            fallback_texture,
            bound: BoundState::default(),
            pass: None,
            frame: None,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Reconfigures the surface; zero sized windows are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// wgpu objects behind a texture handle, for registration with the GUI renderer.
    pub fn texture_parts(
        &self,
        texture: TextureHandle,
    ) -> Option<(wgpu::Texture, wgpu::TextureView, wgpu::Extent3d)> {
        self.textures
            .get(&texture)
            .map(|state| (state.texture.clone(), state.view.clone(), state.size))
    }

    /// Acquires the next surface texture and opens the frame encoder.
    pub fn begin_frame(&mut self) -> DeviceResult<()> {
        if self.frame.is_some() {
            return Ok(());
        }
        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Err(DeviceError::Surface(
                    "surface lost or outdated, reconfigured".to_string(),
                ));
            }
            Err(e) => return Err(DeviceError::Surface(e.to_string())),
        };
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        self.frame = Some(Frame {
            surface_texture,
            view,
            encoder,
        });
        Ok(())
    }

    /// Runs `overlay` on the frame encoder (GUI rendering), then submits and presents.
    pub fn end_frame<F>(&mut self, overlay: F)
    where
        F: FnOnce(&wgpu::Device, &wgpu::Queue, &mut wgpu::CommandEncoder, &wgpu::TextureView),
    {
        if self.pass.is_some() {
            log::warn!("Frame ended inside an open pass");
            self.end_pass();
        }
        let Some(mut frame) = self.frame.take() else {
            return;
        };
        overlay(&self.device, &self.queue, &mut frame.encoder, &frame.view);
        self.queue.submit(std::iter::once(frame.encoder.finish()));
        self.uniforms.reset();
        frame.surface_texture.present();
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record_draw(&mut self, call: DrawCall) {
        let Some(pass) = self.pass.as_mut() else {
            log::warn!("Draw issued outside of a pass");
            return;
        };
        let (Some(program), Some(array)) = (self.bound.program, self.bound.array) else {
            log::warn!("Draw issued without a bound program and vertex array");
            return;
        };
        let Some(state) = self.programs.get(&program) else {
            return;
        };
        if matches!(call, DrawCall::Indexed(_))
            && self
                .vertex_arrays
                .get(&array)
                .and_then(|a| a.index_buffer)
                .is_none()
        {
            log::warn!("Indexed draw on a vertex array without an index buffer");
            return;
        }
        pass.draws.push(RecordedDraw {
            program,
            array,
            texture: self.bound.texture,
            uniforms: state.staging.clone(),
            call,
        });
    }
}

impl RenderDevice for WgpuDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            texture_origin: TextureOrigin::TopLeft,
            depth_range: DepthRange::ZeroToOne,
            max_texture_dimension: self.device.limits().max_texture_dimension_2d,
            shader_capabilities: self.shader_capabilities,
        }
    }

    fn release_queue(&self) -> ReleaseQueue {
        self.releases.clone()
    }

    fn create_vertex_buffer(&mut self, data: &[f32], usage: BufferUsage) -> BufferHandle {
        let mut usages = wgpu::BufferUsages::VERTEX;
        if usage == BufferUsage::Dynamic {
            usages |= wgpu::BufferUsages::COPY_DST;
        }
        let contents: &[u8] = if data.is_empty() {
            &[0; 4]
        } else {
            bytemuck::cast_slice(data)
        };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Vertex Buffer"),
                contents,
                usage: usages,
            });
        let handle = BufferHandle(self.next_id());
        self.buffers.insert(handle, buffer);
        handle
    }

    fn create_index_buffer(&mut self, indices: &[u32]) -> BufferHandle {
        let contents: &[u8] = if indices.is_empty() {
            &[0; 4]
        } else {
            bytemuck::cast_slice(indices)
        };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Index Buffer"),
                contents,
                usage: wgpu::BufferUsages::INDEX,
            });
        let handle = BufferHandle(self.next_id());
        self.buffers.insert(handle, buffer);
        handle
    }

    fn create_vertex_array(&mut self) -> VertexArrayHandle {
        let handle = VertexArrayHandle(self.next_id());
        self.vertex_arrays.insert(handle, VertexArrayState::default());
        handle
    }

    fn set_vertex_attribute(
        &mut self,
        array: VertexArrayHandle,
        buffer: BufferHandle,
        attribute: VertexAttribute,
    ) {
        let format = match attribute.components {
            1 => wgpu::VertexFormat::Float32,
            2 => wgpu::VertexFormat::Float32x2,
            3 => wgpu::VertexFormat::Float32x3,
            4 => wgpu::VertexFormat::Float32x4,
            other => {
                log::warn!("Ignoring vertex attribute with {} components", other);
                return;
            }
        };
        let Some(state) = self.vertex_arrays.get_mut(&array) else {
            return;
        };
        let stream = match state.streams.iter().position(|s| s.buffer == buffer) {
            Some(index) => &mut state.streams[index],
            None => {
                state.streams.push(VertexStream {
                    buffer,
                    stride: attribute.stride as u64,
                    attributes: Vec::new(),
                });
                let last = state.streams.len() - 1;
                &mut state.streams[last]
            }
        };
        stream.attributes.push(wgpu::VertexAttribute {
            format,
            offset: attribute.offset as u64,
            shader_location: attribute.location,
        });
        // Cached pipelines baked the old layout.
        self.pipelines.retain(|key, _| key.array != array);
    }

    fn set_index_buffer(&mut self, array: VertexArrayHandle, buffer: BufferHandle) {
        if let Some(state) = self.vertex_arrays.get_mut(&array) {
            state.index_buffer = Some(buffer);
        }
    }

    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderStageHandle, String> {
        let compiled = wgsl::compile(stage, source, self.shader_capabilities)?;
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

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let vertex_module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Vertex Stage"),
                source: wgpu::ShaderSource::Wgsl(vertex.source.as_str().into()),
            });
        let fragment_module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Fragment Stage"),
                source: wgpu::ShaderSource::Wgsl(fragment.source.as_str().into()),
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(format!("device rejected the program: {error}"));
        }

        let staging = vec![0; linked.uniforms.size as usize];
        let handle = ProgramHandle(self.next_id());
        self.programs.insert(
            handle,
            ProgramState {
                vertex_module,
                fragment_module,
                linked,
                staging,
            },
        );
        Ok(handle)
    }

    fn delete_shader(&mut self, shader: ShaderStageHandle) {
        self.stages.remove(&shader);
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        self.programs.get(&program)?.linked.uniforms.locate(name)
    }

    fn set_uniform(&mut self, program: ProgramHandle, location: UniformLocation, value: &UniformValue) {
        let Some(state) = self.programs.get_mut(&program) else {
            return;
        };
        if !state.linked.uniforms.write(&mut state.staging, location, value) {
            log::debug!(
                "Ignoring {} write to uniform location {}",
                value.type_name(),
                location.index()
            );
        }
    }

    fn create_texture(&mut self, data: &TextureData<'_>, filter: TextureFilter) -> TextureHandle {
        let max = self.device.limits().max_texture_dimension_2d;
        let fallback = TextureData {
            width: 1,
            height: 1,
            format: PixelFormat::Rgba8,
            pixels: &[255, 255, 255, 255],
        };
        let data = if data.width > max || data.height > max {
            log::warn!(
                "{}x{} texture exceeds the {} pixel limit, uploading a white texel",
                data.width,
                data.height,
                max
            );
            &fallback
        } else {
            data
        };
        let state = upload_texture(
            &self.device,
            &self.queue,
            &self.layouts.texture,
            data,
            filter,
        );
        let handle = TextureHandle(self.next_id());
        self.textures.insert(handle, state);
        handle
    }

    fn set_texture_filter(&mut self, texture: TextureHandle, filter: TextureFilter) {
        if let Some(state) = self.textures.get_mut(&texture) {
            state.bind_group =
                texture_bind_group(&self.device, &self.layouts.texture, &state.view, filter);
        }
    }

    fn create_render_target(&mut self, width: u32, height: u32) -> DeviceResult<RenderTargetHandles> {
        let max = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(DeviceError::IncompleteFramebuffer(format!(
                "{width}x{height} is outside 1..={max}"
            )));
        }
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let color = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Framebuffer Color"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = texture_bind_group(
            &self.device,
            &self.layouts.texture,
            &color_view,
            TextureFilter::Linear,
        );

        let depth = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Framebuffer Depth Stencil"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_STENCIL_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

        let handles = RenderTargetHandles {
            framebuffer: FramebufferHandle(self.next_id()),
            color: TextureHandle(self.next_id()),
            depth_stencil: RenderbufferHandle(self.next_id()),
        };
        self.textures.insert(
            handles.color,
            TextureState {
                texture: color,
                view: color_view,
                size,
                bind_group,
            },
        );
        self.render_targets.insert(
            handles.framebuffer,
            RenderTargetState {
                color: handles.color,
                depth_stencil: handles.depth_stencil,
                depth_view,
                size: (width, height),
            },
        );
        log::debug!("Created {}x{} render target", width, height);
        Ok(handles)
    }

    fn begin_pass(&mut self, pass: &PassDescriptor) {
        if self.pass.is_some() {
            log::warn!("begin_pass called inside an open pass, closing it");
            self.end_pass();
        }
        self.pass = Some(PendingPass {
            descriptor: *pass,
            draws: Vec::new(),
        });
    }

    fn bind_vertex_array(&mut self, array: Option<VertexArrayHandle>) {
        self.bound.array = array;
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        self.bound.program = program;
    }

    fn bind_texture(&mut self, texture: Option<TextureHandle>) {
        self.bound.texture = texture;
    }

    fn draw_indexed(&mut self, index_count: u32) {
        self.record_draw(DrawCall::Indexed(index_count));
    }

    fn draw_strip(&mut self, vertex_count: u32) {
        self.record_draw(DrawCall::Strip(vertex_count));
    }

    fn end_pass(&mut self) {
        let Some(pass) = self.pass.take() else {
            log::warn!("end_pass called without an open pass");
            return;
        };

        let (color_view, color_format, depth_view, target_size) = match pass.descriptor.target {
            RenderTarget::Surface => match &self.frame {
                Some(frame) => (
                    frame.view.clone(),
                    self.format,
                    None,
                    (self.config.width, self.config.height),
                ),
                None => {
                    log::warn!("Surface pass outside of a frame dropped");
                    return;
                }
            },
            RenderTarget::Framebuffer(framebuffer) => {
                let Some(target) = self.render_targets.get(&framebuffer) else {
                    log::warn!("Pass targets unknown framebuffer {:?}", framebuffer);
                    return;
                };
                let Some(color) = self.textures.get(&target.color) else {
                    return;
                };
                (
                    color.view.clone(),
                    OFFSCREEN_FORMAT,
                    Some(target.depth_view.clone()),
                    target.size,
                )
            }
        };
        let depth_key = depth_view.as_ref().map(|_| pass.descriptor.depth_test);
        let key_for = |draw: &RecordedDraw| PipelineKey {
            program: draw.program,
            array: draw.array,
            strip: matches!(draw.call, DrawCall::Strip(_)),
            color_format,
            depth: depth_key,
        };

        // Pipelines are built before the pass borrows the encoder.
        for draw in &pass.draws {
            let key = key_for(draw);
            if self.pipelines.contains_key(&key) {
                continue;
            }
            let pipeline = match (
                self.programs.get(&draw.program),
                self.vertex_arrays.get(&draw.array),
            ) {
                (Some(program), Some(array)) => {
                    build_pipeline(&self.device, &self.layouts.pipeline, program, array, &key)
                }
                _ => None,
            };
            self.pipelines.insert(key, pipeline);
        }

        let first_slot = if pass.draws.is_empty() {
            0
        } else {
            let first = self
                .uniforms
                .reserve(&self.device, &self.layouts.uniforms, pass.draws.len());
            let bytes = pack_uniforms(pass.draws.iter().map(|draw| draw.uniforms.as_slice()));
            self.queue
                .write_buffer(&self.uniforms.buffer, (first * UNIFORM_SLOT) as u64, &bytes);
            first
        };

        let mut standalone = None;
        let encoder = match self.frame.as_mut() {
            Some(frame) => &mut frame.encoder,
            None => standalone.insert(self.device.create_command_encoder(
                &wgpu::CommandEncoderDescriptor {
                    label: Some("Offscreen Encoder"),
                },
            )),
        };

        {
            let clear = pass.descriptor.clear_color;
            let color_load = match clear {
                Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                    r: r as f64,
                    g: g as f64,
                    b: b as f64,
                    a: a as f64,
                }),
                None => wgpu::LoadOp::Load,
            };
            let (depth_load, stencil_load) = match clear {
                Some(_) => (wgpu::LoadOp::Clear(1.0), wgpu::LoadOp::Clear(0)),
                None => (wgpu::LoadOp::Load, wgpu::LoadOp::Load),
            };

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Device Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: depth_view.as_ref().map(|view| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: depth_load,
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: Some(wgpu::Operations {
                            load: stencil_load,
                            store: wgpu::StoreOp::Store,
                        }),
                    }
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            // Viewports must stay inside the attachment.
            let [x, y, width, height] = pass.descriptor.viewport;
            let x = x.min(target_size.0);
            let y = y.min(target_size.1);
            let width = width.min(target_size.0 - x);
            let height = height.min(target_size.1 - y);
            if width > 0 && height > 0 {
                render_pass.set_viewport(
                    x as f32,
                    y as f32,
                    width as f32,
                    height as f32,
                    0.0,
                    1.0,
                );
            }

            for (index, draw) in pass.draws.iter().enumerate() {
                let Some(Some(pipeline)) = self.pipelines.get(&key_for(draw)) else {
                    continue;
                };
                let Some(array) = self.vertex_arrays.get(&draw.array) else {
                    continue;
                };
                let streams: Option<Vec<&wgpu::Buffer>> = array
                    .streams
                    .iter()
                    .map(|stream| self.buffers.get(&stream.buffer))
                    .collect();
                let Some(streams) = streams else {
                    continue;
                };

                // Vertices every stream can supply.
                let available = array
                    .streams
                    .iter()
                    .zip(&streams)
                    .map(|(stream, buffer)| buffer.size() / stream.stride.max(1))
                    .min()
                    .unwrap_or(0);

                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(
                    0,
                    &self.uniforms.bind_group,
                    &[((first_slot + index) * UNIFORM_SLOT) as u32],
                );
                let texture = draw
                    .texture
                    .and_then(|texture| self.textures.get(&texture))
                    .unwrap_or(&self.fallback_texture);
                render_pass.set_bind_group(1, &texture.bind_group, &[]);
                for (slot_index, buffer) in streams.into_iter().enumerate() {
                    render_pass.set_vertex_buffer(slot_index as u32, buffer.slice(..));
                }

                match draw.call {
                    DrawCall::Indexed(count) => {
                        let Some(index_buffer) =
                            array.index_buffer.and_then(|b| self.buffers.get(&b))
                        else {
                            continue;
                        };
                        let count = clamp_draw_count(count, index_buffer.size() / 4, "index");
                        render_pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                        render_pass.draw_indexed(0..count, 0, 0..1);
                    }
                    DrawCall::Strip(count) => {
                        let count = clamp_draw_count(count, available, "vertex");
                        render_pass.draw(0..count, 0..1);
                    }
                }
            }
        }

        if let Some(encoder) = standalone {
            self.queue.submit(std::iter::once(encoder.finish()));
            self.uniforms.reset();
        }
    }

    fn destroy(&mut self, resource: GpuResource) {
        match resource {
            GpuResource::Buffer(buffer) => {
                self.buffers.remove(&buffer);
            }
            GpuResource::VertexArray(array) => {
                self.vertex_arrays.remove(&array);
                self.pipelines.retain(|key, _| key.array != array);
            }
            GpuResource::Program(program) => {
                self.programs.remove(&program);
                self.pipelines.retain(|key, _| key.program != program);
            }
            GpuResource::Texture(texture) => {
                self.textures.remove(&texture);
            }
            GpuResource::RenderTarget(handles) => {
                if let Some(target) = self.render_targets.remove(&handles.framebuffer) {
                    self.textures.remove(&target.color);
                    log::debug!("Released depth/stencil {:?}", target.depth_stencil);
                }
            }
        }
    }
}

/// Limits a draw to the elements its buffers hold.
fn clamp_draw_count(requested: u32, available: u64, what: &str) -> u32 {
    let available = u32::try_from(available).unwrap_or(u32::MAX);
    if requested > available {
        log::warn!(
            "Draw of {} {}s clamped to the {} its buffers hold",
            requested,
            what,
            available
        );
    }
    requested.min(available)
}

fn create_binding_layouts(device: &wgpu::Device) -> BindingLayouts {
    let uniforms = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Uniform Block Layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: None,
            },
            count: None,
        }],
    });

    let texture = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Texture Layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    });

    let pipeline = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Program Pipeline Layout"),
        bind_group_layouts: &[&uniforms, &texture],
        push_constant_ranges: &[],
    });

    BindingLayouts {
        uniforms,
        texture,
        pipeline,
    }
}

fn texture_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    view: &wgpu::TextureView,
    filter: TextureFilter,
) -> wgpu::BindGroup {
    let mode = match filter {
        TextureFilter::Nearest => wgpu::FilterMode::Nearest,
        TextureFilter::Linear => wgpu::FilterMode::Linear,
    };
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Texture Sampler"),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: mode,
        min_filter: mode,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    });
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Texture Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&sampler),
            },
        ],
    })
}

fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    data: &TextureData<'_>,
    filter: TextureFilter,
) -> TextureState {
    let size = wgpu::Extent3d {
        width: data.width.max(1),
        height: data.height.max(1),
        depth_or_array_layers: 1,
    };
    let mut rgba = expand_to_rgba8(data);
    rgba.resize((size.width * size.height * 4) as usize, 255);

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Material Texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: OFFSCREEN_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * size.width),
            rows_per_image: Some(size.height),
        },
        size,
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = texture_bind_group(device, layout, &view, filter);
    TextureState {
        texture,
        view,
        size,
        bind_group,
    }
}

/// Converts any supported pixel layout to tightly packed RGBA8.
fn expand_to_rgba8(data: &TextureData<'_>) -> Vec<u8> {
    match data.format {
        PixelFormat::Rgba8 => data.pixels.to_vec(),
        PixelFormat::Rgb8 => data
            .pixels
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        PixelFormat::RgbF32 => data
            .pixels
            .chunks_exact(12)
            .flat_map(|p| {
                let channel = |i: usize| {
                    let value = f32::from_ne_bytes([p[i], p[i + 1], p[i + 2], p[i + 3]]);
                    (value.clamp(0.0, 1.0) * 255.0).round() as u8
                };
                [channel(0), channel(4), channel(8), 255]
            })
            .collect(),
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    program: &ProgramState,
    array: &VertexArrayState,
    key: &PipelineKey,
) -> Option<wgpu::RenderPipeline> {
    let provided: Vec<u32> = array
        .streams
        .iter()
        .flat_map(|stream| stream.attributes.iter().map(|a| a.shader_location))
        .collect();
    if let Some(missing) = program
        .linked
        .vertex_inputs
        .iter()
        .find(|location| !provided.contains(location))
    {
        log::warn!(
            "Mesh provides no attribute for shader input @location({}), draw skipped",
            missing
        );
        return None;
    }

    let buffers: Vec<wgpu::VertexBufferLayout> = array
        .streams
        .iter()
        .map(|stream| wgpu::VertexBufferLayout {
            array_stride: stream.stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &stream.attributes,
        })
        .collect();

    let depth_stencil = key.depth.map(|test| wgpu::DepthStencilState {
        format: DEPTH_STENCIL_FORMAT,
        depth_write_enabled: test,
        depth_compare: if test {
            wgpu::CompareFunction::Less
        } else {
            wgpu::CompareFunction::Always
        },
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    });

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Program Pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &program.vertex_module,
            entry_point: Some(program.linked.vertex_entry.as_str()),
            buffers: &buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &program.fragment_module,
            entry_point: Some(program.linked.fragment_entry.as_str()),
            targets: &[Some(wgpu::ColorTargetState {
                format: key.color_format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: if key.strip {
                wgpu::PrimitiveTopology::TriangleStrip
            } else {
                wgpu::PrimitiveTopology::TriangleList
            },
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });
    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        log::warn!("Failed to build pipeline: {}", error);
        return None;
    }
    Some(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_pixels_expand_to_opaque_rgba() {
        let pixels = [10, 20, 30, 40, 50, 60];
        let rgba = expand_to_rgba8(&TextureData {
            width: 2,
            height: 1,
            format: PixelFormat::Rgb8,
            pixels: &pixels,
        });
        assert_eq!(rgba, [10, 20, 30, 255, 40, 50, 60, 255]);
    }

    #[test]
    fn test_float_pixels_are_quantized() {
        let floats = [1.0f32, 0.0, 0.5];
        let rgba = expand_to_rgba8(&TextureData {
            width: 1,
            height: 1,
            format: PixelFormat::RgbF32,
            pixels: bytemuck::cast_slice(&floats),
        });
        assert_eq!(rgba, [255, 0, 128, 255]);
    }

    #[test]
    fn test_uniform_ring_grows_only_when_full() {
        assert_eq!(grown_capacity(64, 0, 64), None);
        assert_eq!(grown_capacity(64, 60, 4), None);
        assert_eq!(grown_capacity(64, 60, 5), Some(128));
        assert_eq!(grown_capacity(64, 0, 300), Some(300));
    }

    #[test]
    fn test_uniforms_are_packed_one_slot_per_draw() {
        let small = vec![7u8; 16];
        let oversized = vec![9u8; UNIFORM_SLOT + 8];
        let bytes = pack_uniforms([small.as_slice(), oversized.as_slice()].into_iter());

        assert_eq!(bytes.len(), 2 * UNIFORM_SLOT);
        assert!(bytes[..16].iter().all(|&b| b == 7));
        assert!(bytes[16..UNIFORM_SLOT].iter().all(|&b| b == 0));
        assert!(bytes[UNIFORM_SLOT..].iter().all(|&b| b == 9));
    }

    #[test]
    fn test_draw_count_is_clamped_to_buffer_contents() {
        assert_eq!(clamp_draw_count(4, 10, "vertex"), 4);
        assert_eq!(clamp_draw_count(36, 24, "vertex"), 24);
        assert_eq!(clamp_draw_count(6, 0, "index"), 0);
    }

    #[test]
    fn test_shader_capabilities_follow_device_features() {
        let none = shader_capabilities(wgpu::Features::empty(), wgpu::DownlevelFlags::empty());
        assert_eq!(none, Capabilities::empty());

        let f64_device = shader_capabilities(
            wgpu::Features::SHADER_F64,
            wgpu::DownlevelFlags::CUBE_ARRAY_TEXTURES,
        );
        assert!(f64_device.contains(Capabilities::FLOAT64 | Capabilities::CUBE_ARRAY_TEXTURES));
        assert!(!f64_device.contains(Capabilities::PUSH_CONSTANT));
    }
}
