//! WGSL front end shared by every [`RenderDevice`](super::RenderDevice).
//!
//! A stage "compiles" when naga parses and fully validates it and it contains exactly
//! one entry point for its stage. Two stages "link" when their uniform blocks agree and
//! every fragment input location is written by the vertex stage.
//!
//! Uniforms live in one block per program: the struct bound at
//! `@group(0) @binding(0)` in the uniform address space. A uniform location is the
//! index of a member inside that block.

use std::error::Error;

use naga::valid::Capabilities;
use naga::{AddressSpace, Binding, Module, Scalar, TypeInner, VectorSize};

use super::{ShaderStage, UniformLocation, UniformValue};

/// Bind group of the per-draw uniform block.
pub const UNIFORM_GROUP: u32 = 0;
/// Bind group of the sampled texture (binding 0) and its sampler (binding 1).
pub const TEXTURE_GROUP: u32 = 1;
/// Upper bound of one program's uniform block, and the size of one per-draw slot.
pub const MAX_UNIFORM_BLOCK_SIZE: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
}

impl UniformKind {
    pub fn accepts(&self, value: &UniformValue) -> bool {
        matches!(
            (self, value),
            (UniformKind::Int, UniformValue::Int(_))
                | (UniformKind::Float, UniformValue::Float(_))
                | (UniformKind::Vec2, UniformValue::Vec2(_))
                | (UniformKind::Vec3, UniformValue::Vec3(_))
                | (UniformKind::Vec4, UniformValue::Vec4(_))
                | (UniformKind::Mat3, UniformValue::Mat3(_))
                | (UniformKind::Mat4, UniformValue::Mat4(_))
        )
    }

    /// Size in the uniform address space (`mat3x3` columns are padded to 16 bytes).
    pub fn size(&self) -> u32 {
        match self {
            UniformKind::Int | UniformKind::Float => 4,
            UniformKind::Vec2 => 8,
            UniformKind::Vec3 => 12,
            UniformKind::Vec4 => 16,
            UniformKind::Mat3 => 48,
            UniformKind::Mat4 => 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniformMember {
    pub name: String,
    pub offset: u32,
    /// `None` for member types that cannot be set from the host.
    pub kind: Option<UniformKind>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UniformBlock {
    pub members: Vec<UniformMember>,
    pub size: u32,
}

impl UniformBlock {
    pub fn locate(&self, name: &str) -> Option<UniformLocation> {
        self.members
            .iter()
            .position(|member| member.name == name && member.kind.is_some())
            .map(|index| UniformLocation(index as u32))
    }

    pub fn member(&self, location: UniformLocation) -> Option<&UniformMember> {
        self.members.get(location.0 as usize)
    }

    /// Writes `value` into a staging copy of the block. Returns false when the
    /// location is unknown or the value type does not match the member.
    pub fn write(&self, staging: &mut [u8], location: UniformLocation, value: &UniformValue) -> bool {
        let Some(member) = self.member(location) else {
            return false;
        };
        match member.kind {
            Some(kind) if kind.accepts(value) => {}
            _ => return false,
        }
        let bytes = encode_uniform(value);
        let start = member.offset as usize;
        let end = start + bytes.len();
        if end > staging.len() {
            return false;
        }
        staging[start..end].copy_from_slice(&bytes);
        true
    }
}

/// Host bytes of a uniform value in the uniform address space layout.
pub fn encode_uniform(value: &UniformValue) -> Vec<u8> {
    match value {
        UniformValue::Int(v) => v.to_ne_bytes().to_vec(),
        UniformValue::Float(v) => v.to_ne_bytes().to_vec(),
        UniformValue::Vec2(v) => bytemuck::cast_slice(v).to_vec(),
        UniformValue::Vec3(v) => bytemuck::cast_slice(v).to_vec(),
        UniformValue::Vec4(v) => bytemuck::cast_slice(v).to_vec(),
        UniformValue::Mat3(columns) => {
            let mut bytes = Vec::with_capacity(48);
            for column in columns {
                bytes.extend_from_slice(bytemuck::cast_slice(column));
                bytes.extend_from_slice(&[0; 4]);
            }
            bytes
        }
        UniformValue::Mat4(columns) => bytemuck::cast_slice(columns).to_vec(),
    }
}

/// A parsed and validated stage.
#[derive(Debug)]
pub struct CompiledStage {
    pub stage: ShaderStage,
    pub source: String,
    pub module: Module,
    pub entry_point: String,
    pub uniforms: Option<UniformBlock>,
    /// User locations read by the entry point.
    pub inputs: Vec<u32>,
    /// User locations written by the entry point.
    pub outputs: Vec<u32>,
}

/// The result of linking a vertex and a fragment stage.
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    pub vertex_entry: String,
    pub fragment_entry: String,
    pub uniforms: UniformBlock,
    /// Vertex attribute locations the program reads.
    pub vertex_inputs: Vec<u32>,
}

/// Parses and validates one stage against the features the device supports.
pub fn compile(
    stage: ShaderStage,
    source: &str,
    capabilities: Capabilities,
) -> Result<CompiledStage, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;

    let mut validator =
        naga::valid::Validator::new(naga::valid::ValidationFlags::all(), capabilities);
    validator
        .validate(&module)
        .map_err(|e| format_error_chain(&e))?;

    let naga_stage = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };
    let mut entry_points = module.entry_points.iter().filter(|ep| ep.stage == naga_stage);
    let entry = match (entry_points.next(), entry_points.next()) {
        (Some(entry), None) => entry,
        (None, _) => return Err(format!("no @{stage} entry point found")),
        (Some(_), Some(_)) => return Err(format!("more than one @{stage} entry point found")),
    };

    let mut inputs = Vec::new();
    for argument in &entry.function.arguments {
        collect_locations(&module, argument.ty, argument.binding.as_ref(), &mut inputs);
    }
    let mut outputs = Vec::new();
    if let Some(result) = &entry.function.result {
        collect_locations(&module, result.ty, result.binding.as_ref(), &mut outputs);
    }

    let entry_point = entry.name.clone();
    let uniforms = reflect_uniforms(&module)?;

    Ok(CompiledStage {
        stage,
        source: source.to_string(),
        module,
        entry_point,
        uniforms,
        inputs,
        outputs,
    })
}

pub fn link(vertex: &CompiledStage, fragment: &CompiledStage) -> Result<LinkedProgram, String> {
    if vertex.stage != ShaderStage::Vertex {
        return Err("first stage of a program must be a vertex shader".to_string());
    }
    if fragment.stage != ShaderStage::Fragment {
        return Err("second stage of a program must be a fragment shader".to_string());
    }

    let uniforms = match (&vertex.uniforms, &fragment.uniforms) {
        (Some(v), Some(f)) if v != f => {
            return Err(
                "uniform block at @group(0) @binding(0) differs between vertex and fragment stages"
                    .to_string(),
            )
        }
        (Some(block), _) | (None, Some(block)) => block.clone(),
        (None, None) => UniformBlock::default(),
    };

    for location in &fragment.inputs {
        if !vertex.outputs.contains(location) {
            return Err(format!(
                "fragment input at @location({location}) is not written by the vertex stage"
            ));
        }
    }

    Ok(LinkedProgram {
        vertex_entry: vertex.entry_point.clone(),
        fragment_entry: fragment.entry_point.clone(),
        uniforms,
        vertex_inputs: vertex.inputs.clone(),
    })
}

fn reflect_uniforms(module: &Module) -> Result<Option<UniformBlock>, String> {
    let Some((_, global)) = module.global_variables.iter().find(|(_, var)| {
        var.space == AddressSpace::Uniform
            && var
                .binding
                .as_ref()
                .is_some_and(|b| b.group == UNIFORM_GROUP && b.binding == 0)
    }) else {
        return Ok(None);
    };

    let block = match &module.types[global.ty].inner {
        TypeInner::Struct { members, span } => UniformBlock {
            members: members
                .iter()
                .map(|member| UniformMember {
                    name: member.name.clone().unwrap_or_default(),
                    offset: member.offset,
                    kind: uniform_kind(&module.types[member.ty].inner),
                })
                .collect(),
            size: *span,
        },
        inner => {
            let kind = uniform_kind(inner);
            UniformBlock {
                members: vec![UniformMember {
                    name: global.name.clone().unwrap_or_default(),
                    offset: 0,
                    kind,
                }],
                size: kind.map_or(0, |k| k.size()),
            }
        }
    };

    if block.size > MAX_UNIFORM_BLOCK_SIZE {
        return Err(format!(
            "uniform block is {} bytes, at most {} are supported",
            block.size, MAX_UNIFORM_BLOCK_SIZE
        ));
    }
    Ok(Some(block))
}

fn uniform_kind(inner: &TypeInner) -> Option<UniformKind> {
    match *inner {
        TypeInner::Scalar(scalar) if scalar == Scalar::I32 => Some(UniformKind::Int),
        TypeInner::Scalar(scalar) if scalar == Scalar::F32 => Some(UniformKind::Float),
        TypeInner::Vector { size, scalar } if scalar == Scalar::F32 => Some(match size {
            VectorSize::Bi => UniformKind::Vec2,
            VectorSize::Tri => UniformKind::Vec3,
            VectorSize::Quad => UniformKind::Vec4,
        }),
        TypeInner::Matrix {
            columns: VectorSize::Tri,
            rows: VectorSize::Tri,
            scalar,
        } if scalar == Scalar::F32 => Some(UniformKind::Mat3),
        TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            scalar,
        } if scalar == Scalar::F32 => Some(UniformKind::Mat4),
        _ => None,
    }
}

fn collect_locations(
    module: &Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&Binding>,
    out: &mut Vec<u32>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => out.push(*location),
        Some(_) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

fn format_error_chain(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = r#"
struct Uniforms {
    model: mat4x4<f32>,
    tint: vec3<f32>,
    strength: f32,
    normal_matrix: mat3x3<f32>,
    mode: i32,
};

@group(0) @binding(0) var<uniform> u: Uniforms;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) uv: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = u.model * vec4<f32>(position * u.strength, 1.0);
    out.uv = uv;
    return out;
}
"#;

    const FRAGMENT: &str = r#"
@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(uv, 0.0, 1.0);
}
"#;

    #[test]
    fn test_compile_reflects_uniform_block() {
        let stage = compile(ShaderStage::Vertex, VERTEX, Capabilities::empty()).unwrap();
        let block = stage.uniforms.unwrap();

        let names: Vec<&str> = block.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["model", "tint", "strength", "normal_matrix", "mode"]);
        assert_eq!(block.members[0].offset, 0);
        assert_eq!(block.members[1].offset, 64);
        assert_eq!(block.members[2].offset, 76);
        assert_eq!(block.members[3].kind, Some(UniformKind::Mat3));
        assert_eq!(block.members[4].kind, Some(UniformKind::Int));
        assert_eq!(stage.entry_point, "vs_main");
        assert_eq!(stage.inputs, vec![0, 1]);
        assert_eq!(stage.outputs, vec![0]);
    }

    #[test]
    fn test_compile_rejects_wrong_stage() {
        let error = compile(ShaderStage::Fragment, VERTEX, Capabilities::empty()).unwrap_err();
        assert!(error.contains("fragment"));
    }

    #[test]
    fn test_compile_reports_syntax_error() {
        let error =
            compile(ShaderStage::Vertex, "fn vs_main( {", Capabilities::empty()).unwrap_err();
        assert!(!error.is_empty());
    }

    #[test]
    fn test_compile_rejects_unsupported_capability() {
        let uses_f64 = r#"
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    let x: f64 = 1.0lf;
    return vec4<f32>(f32(x), 0.0, 0.0, 1.0);
}
"#;
        assert!(compile(ShaderStage::Fragment, uses_f64, Capabilities::empty()).is_err());
        assert!(compile(ShaderStage::Fragment, uses_f64, Capabilities::FLOAT64).is_ok());
    }

    #[test]
    fn test_link_checks_interface() {
        let vertex = compile(ShaderStage::Vertex, VERTEX, Capabilities::empty()).unwrap();
        let fragment = compile(ShaderStage::Fragment, FRAGMENT, Capabilities::empty()).unwrap();
        let program = link(&vertex, &fragment).unwrap();
        assert_eq!(program.vertex_entry, "vs_main");
        assert_eq!(program.fragment_entry, "fs_main");
        assert!(program.uniforms.locate("model").is_some());

        let reads_location_3 = r#"
@fragment
fn fs_main(@location(3) color: vec4<f32>) -> @location(0) vec4<f32> {
    return color;
}
"#;
        let fragment =
            compile(ShaderStage::Fragment, reads_location_3, Capabilities::empty()).unwrap();
        let error = link(&vertex, &fragment).unwrap_err();
        assert!(error.contains("@location(3)"));
    }

    #[test]
    fn test_block_write_pads_mat3_columns() {
        let block = compile(ShaderStage::Vertex, VERTEX, Capabilities::empty())
            .unwrap()
            .uniforms
            .unwrap();
        let mut staging = vec![0u8; block.size as usize];
        let location = block.locate("normal_matrix").unwrap();
        let identity = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

        assert!(block.write(&mut staging, location, &UniformValue::Mat3(identity)));
        let offset = block.members[3].offset as usize;
        let second_column: Vec<f32> = staging[offset + 16..offset + 32]
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(second_column, [0.0, 1.0, 0.0, 0.0]);

        assert!(!block.write(&mut staging, location, &UniformValue::Float(1.0)));
    }
}
