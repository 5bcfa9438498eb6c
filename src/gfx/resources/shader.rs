//! Linked shader programs with memoized uniform lookups.

use std::cell::RefCell;
use std::collections::HashMap;

use cgmath::{Matrix3, Matrix4, Vector2, Vector3, Vector4};
use thiserror::Error;

use crate::gfx::device::{
    GpuResource, ProgramHandle, ReleaseQueue, RenderDevice, ShaderStage, UniformLocation,
    UniformValue,
};

/// Why a program could not be built. Each variant carries the diagnostic text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShaderError {
    #[error("vertex shader failed to compile:\n{0}")]
    VertexCompile(String),
    #[error("fragment shader failed to compile:\n{0}")]
    FragmentCompile(String),
    #[error("shader program failed to link:\n{0}")]
    Link(String),
}

impl ShaderError {
    /// The compiler or linker message without the stage prefix.
    pub fn diagnostic(&self) -> &str {
        match self {
            ShaderError::VertexCompile(message)
            | ShaderError::FragmentCompile(message)
            | ShaderError::Link(message) => message,
        }
    }
}

/// A vertex and fragment stage linked into one GPU program.
///
/// Only successfully linked programs exist; construction failures are returned as
/// [`ShaderError`]. Uniform locations are looked up once per name and cached,
/// including names the program does not declare.
#[derive(Debug)]
pub struct ShaderProgram {
    handle: ProgramHandle,
    vertex_source: String,
    fragment_source: String,
    uniform_locations: RefCell<HashMap<String, Option<UniformLocation>>>,
    releases: ReleaseQueue,
}

impl ShaderProgram {
    /// Compiles both stages and links them. The fragment stage is only compiled
    /// when the vertex stage succeeded.
    pub fn new(
        device: &mut dyn RenderDevice,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self, ShaderError> {
        let vertex = device
            .compile_shader(ShaderStage::Vertex, vertex_source)
            .map_err(ShaderError::VertexCompile)?;

        let fragment = match device.compile_shader(ShaderStage::Fragment, fragment_source) {
            Ok(fragment) => fragment,
            Err(message) => {
                device.delete_shader(vertex);
                return Err(ShaderError::FragmentCompile(message));
            }
        };

        let linked = device.link_program(vertex, fragment);
        device.delete_shader(vertex);
        device.delete_shader(fragment);
        let handle = linked.map_err(ShaderError::Link)?;

        log::debug!("Linked shader program {:?}", handle);
        Ok(Self {
            handle,
            vertex_source: vertex_source.to_string(),
            fragment_source: fragment_source.to_string(),
            uniform_locations: RefCell::new(HashMap::new()),
            releases: device.release_queue(),
        })
    }

    pub fn bind(&self, device: &mut dyn RenderDevice) {
        device.use_program(Some(self.handle));
    }

    pub fn unbind(&self, device: &mut dyn RenderDevice) {
        device.use_program(None);
    }

    /// Location of a uniform, queried from the device on first use only.
    pub fn uniform_location(
        &self,
        device: &mut dyn RenderDevice,
        name: &str,
    ) -> Option<UniformLocation> {
        if let Some(cached) = self.uniform_locations.borrow().get(name) {
            return *cached;
        }
        let location = device.uniform_location(self.handle, name);
        self.uniform_locations
            .borrow_mut()
            .insert(name.to_string(), location);
        location
    }

    /// Activates the program and writes `value`. Unknown names are ignored.
    pub fn set_uniform(&self, device: &mut dyn RenderDevice, name: &str, value: UniformValue) {
        device.use_program(Some(self.handle));
        if let Some(location) = self.uniform_location(device, name) {
            device.set_uniform(self.handle, location, &value);
        }
    }

    pub fn set_int(&self, device: &mut dyn RenderDevice, name: &str, value: i32) {
        self.set_uniform(device, name, UniformValue::Int(value));
    }

    pub fn set_float(&self, device: &mut dyn RenderDevice, name: &str, value: f32) {
        self.set_uniform(device, name, UniformValue::Float(value));
    }

    pub fn set_vec2(&self, device: &mut dyn RenderDevice, name: &str, value: Vector2<f32>) {
        self.set_uniform(device, name, UniformValue::Vec2(value.into()));
    }

    pub fn set_vec3(&self, device: &mut dyn RenderDevice, name: &str, value: Vector3<f32>) {
        self.set_uniform(device, name, UniformValue::Vec3(value.into()));
    }

    pub fn set_vec4(&self, device: &mut dyn RenderDevice, name: &str, value: Vector4<f32>) {
        self.set_uniform(device, name, UniformValue::Vec4(value.into()));
    }

    pub fn set_mat3(&self, device: &mut dyn RenderDevice, name: &str, value: Matrix3<f32>) {
        self.set_uniform(device, name, UniformValue::Mat3(value.into()));
    }

    pub fn set_mat4(&self, device: &mut dyn RenderDevice, name: &str, value: Matrix4<f32>) {
        self.set_uniform(device, name, UniformValue::Mat4(value.into()));
    }

    pub fn handle(&self) -> ProgramHandle {
        self.handle
    }

    pub fn vertex_source(&self) -> &str {
        &self.vertex_source
    }

    pub fn fragment_source(&self) -> &str {
        &self.fragment_source
    }

    pub fn cached_uniform_count(&self) -> usize {
        self.uniform_locations.borrow().len()
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        self.releases.push(GpuResource::Program(self.handle));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gfx::device::{Command, HeadlessDevice};

    pub(crate) const VERTEX: &str = r#"
struct Uniforms {
    model: mat4x4<f32>,
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    tint: vec4<f32>,
};

@group(0) @binding(0) var<uniform> u: Uniforms;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) uv: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = u.proj * u.view * u.model * vec4<f32>(position, 1.0);
    out.uv = uv;
    return out;
}
"#;

    pub(crate) const FRAGMENT: &str = r#"
@group(1) @binding(0) var t_diffuse: texture_2d<f32>;
@group(1) @binding(1) var s_diffuse: sampler;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(t_diffuse, s_diffuse, uv);
}
"#;

    #[test]
    fn test_valid_sources_link() {
        let mut device = HeadlessDevice::new();
        let program = ShaderProgram::new(&mut device, VERTEX, FRAGMENT).unwrap();
        assert_eq!(program.vertex_source(), VERTEX);
        assert!(device
            .commands()
            .contains(&Command::LinkProgram(program.handle())));
    }

    #[test]
    fn test_invalid_sources_report_diagnostic() {
        let mut device = HeadlessDevice::new();

        let error = ShaderProgram::new(&mut device, "this is not wgsl", FRAGMENT).unwrap_err();
        assert!(matches!(error, ShaderError::VertexCompile(_)));
        assert!(!error.diagnostic().is_empty());

        let error = ShaderProgram::new(&mut device, VERTEX, "@fragment fn").unwrap_err();
        assert!(matches!(error, ShaderError::FragmentCompile(_)));
        assert!(!error.diagnostic().is_empty());

        assert_eq!(device.draw_count(), 0);
    }

    #[test]
    fn test_link_failure_is_reported() {
        let mut device = HeadlessDevice::new();
        let fragment = r#"
@fragment
fn fs_main(@location(5) color: vec4<f32>) -> @location(0) vec4<f32> {
    return color;
}
"#;
        let error = ShaderProgram::new(&mut device, VERTEX, fragment).unwrap_err();
        assert!(matches!(error, ShaderError::Link(_)));
        assert!(error.to_string().contains("link"));
    }

    #[test]
    fn test_uniform_lookup_is_cached() {
        let mut device = HeadlessDevice::new();
        let program = ShaderProgram::new(&mut device, VERTEX, FRAGMENT).unwrap();

        let first = program.uniform_location(&mut device, "view");
        let second = program.uniform_location(&mut device, "view");
        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(device.uniform_lookups(), 1);

        assert_eq!(program.uniform_location(&mut device, "missing"), None);
        assert_eq!(program.uniform_location(&mut device, "missing"), None);
        assert_eq!(device.uniform_lookups(), 2);
        assert_eq!(program.cached_uniform_count(), 2);
    }

    #[test]
    fn test_setters_activate_program() {
        let mut device = HeadlessDevice::new();
        let program = ShaderProgram::new(&mut device, VERTEX, FRAGMENT).unwrap();
        device.take_commands();

        program.set_vec4(&mut device, "tint", Vector4::new(1.0, 0.5, 0.25, 1.0));
        assert_eq!(
            device.commands(),
            &[
                Command::UseProgram(Some(program.handle())),
                Command::SetUniform {
                    program: program.handle(),
                    name: "tint".to_string(),
                    value: UniformValue::Vec4([1.0, 0.5, 0.25, 1.0]),
                },
            ]
        );
    }

    #[test]
    fn test_drop_releases_program() {
        let mut device = HeadlessDevice::new();
        let program = ShaderProgram::new(&mut device, VERTEX, FRAGMENT).unwrap();
        let handle = program.handle();
        drop(program);
        device.collect_released();
        assert_eq!(device.destroyed_count(GpuResource::Program(handle)), 1);
    }
}
