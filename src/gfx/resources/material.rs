//! Materials: a shader program, an optional texture and named uniform values.
//!
//! Uniform values are kept in one bag per type. Applying a material writes the bags
//! in a fixed type order (int, float, vec2, vec3, vec4, mat3, mat4), each bag in
//! insertion order.

use std::rc::Rc;

use cgmath::{Matrix3, Matrix4, SquareMatrix, Vector2, Vector3, Vector4, Zero};

use crate::gfx::device::{RenderDevice, UniformValue};

use super::shader::ShaderProgram;
use super::texture::Texture;

/// Conversion of a bag value into a device uniform.
pub trait UniformType: Copy {
    fn to_uniform(self) -> UniformValue;
    /// Value used when a uniform is added from the editor.
    fn initial() -> Self;
}

impl UniformType for i32 {
    fn to_uniform(self) -> UniformValue {
        UniformValue::Int(self)
    }
    fn initial() -> Self {
        0
    }
}

impl UniformType for f32 {
    fn to_uniform(self) -> UniformValue {
        UniformValue::Float(self)
    }
    fn initial() -> Self {
        0.0
    }
}

impl UniformType for Vector2<f32> {
    fn to_uniform(self) -> UniformValue {
        UniformValue::Vec2(self.into())
    }
    fn initial() -> Self {
        Vector2::zero()
    }
}

impl UniformType for Vector3<f32> {
    fn to_uniform(self) -> UniformValue {
        UniformValue::Vec3(self.into())
    }
    fn initial() -> Self {
        Vector3::zero()
    }
}

impl UniformType for Vector4<f32> {
    fn to_uniform(self) -> UniformValue {
        UniformValue::Vec4(self.into())
    }
    fn initial() -> Self {
        Vector4::new(1.0, 1.0, 1.0, 1.0)
    }
}

impl UniformType for Matrix3<f32> {
    fn to_uniform(self) -> UniformValue {
        UniformValue::Mat3(self.into())
    }
    fn initial() -> Self {
        Matrix3::identity()
    }
}

impl UniformType for Matrix4<f32> {
    fn to_uniform(self) -> UniformValue {
        UniformValue::Mat4(self.into())
    }
    fn initial() -> Self {
        Matrix4::identity()
    }
}

/// Named values of one type, in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformBag<T> {
    entries: Vec<(String, T)>,
}

impl<T> Default for UniformBag<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: UniformType> UniformBag<T> {
    /// Replaces the value in place when the name exists, appends otherwise.
    pub fn set(&mut self, name: &str, value: T) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<T> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| *value)
    }

    pub fn remove(&mut self, name: &str) -> Option<T> {
        let index = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut T)> {
        self.entries
            .iter_mut()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn apply(&self, shader: &ShaderProgram, device: &mut dyn RenderDevice) {
        for (name, value) in &self.entries {
            shader.set_uniform(device, name, value.to_uniform());
        }
    }
}

/// Every uniform value a material pushes to its shader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformBags {
    pub ints: UniformBag<i32>,
    pub floats: UniformBag<f32>,
    pub vec2s: UniformBag<Vector2<f32>>,
    pub vec3s: UniformBag<Vector3<f32>>,
    pub vec4s: UniformBag<Vector4<f32>>,
    pub mat3s: UniformBag<Matrix3<f32>>,
    pub mat4s: UniformBag<Matrix4<f32>>,
}

impl UniformBags {
    pub fn len(&self) -> usize {
        self.ints.len()
            + self.floats.len()
            + self.vec2s.len()
            + self.vec3s.len()
            + self.vec4s.len()
            + self.mat3s.len()
            + self.mat4s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes `name` from whichever bag holds it.
    pub fn remove(&mut self, name: &str) -> bool {
        self.ints.remove(name).is_some()
            | self.floats.remove(name).is_some()
            | self.vec2s.remove(name).is_some()
            | self.vec3s.remove(name).is_some()
            | self.vec4s.remove(name).is_some()
            | self.mat3s.remove(name).is_some()
            | self.mat4s.remove(name).is_some()
    }

    fn apply(&self, shader: &ShaderProgram, device: &mut dyn RenderDevice) {
        self.ints.apply(shader, device);
        self.floats.apply(shader, device);
        self.vec2s.apply(shader, device);
        self.vec3s.apply(shader, device);
        self.vec4s.apply(shader, device);
        self.mat3s.apply(shader, device);
        self.mat4s.apply(shader, device);
    }
}

/// A shader with an optional texture and the uniform values it is drawn with.
///
/// Cloning copies the uniform bags and shares the shader and texture.
#[derive(Debug, Clone)]
pub struct Material {
    shader: Rc<ShaderProgram>,
    texture: Option<Rc<Texture>>,
    uniforms: UniformBags,
}

impl Material {
    pub fn new(shader: Rc<ShaderProgram>, texture: Option<Rc<Texture>>) -> Self {
        Self {
            shader,
            texture,
            uniforms: UniformBags::default(),
        }
    }

    pub fn with_uniforms(mut self, uniforms: UniformBags) -> Self {
        self.uniforms = uniforms;
        self
    }

    pub fn shader(&self) -> &Rc<ShaderProgram> {
        &self.shader
    }

    pub fn set_shader(&mut self, shader: Rc<ShaderProgram>) {
        self.shader = shader;
    }

    pub fn texture(&self) -> Option<&Rc<Texture>> {
        self.texture.as_ref()
    }

    pub fn set_texture(&mut self, texture: Option<Rc<Texture>>) {
        self.texture = texture;
    }

    pub fn uniforms(&self) -> &UniformBags {
        &self.uniforms
    }

    pub fn uniforms_mut(&mut self) -> &mut UniformBags {
        &mut self.uniforms
    }

    pub fn set_int(&mut self, name: &str, value: i32) {
        self.uniforms.ints.set(name, value);
    }

    pub fn set_float(&mut self, name: &str, value: f32) {
        self.uniforms.floats.set(name, value);
    }

    pub fn set_vec2(&mut self, name: &str, value: Vector2<f32>) {
        self.uniforms.vec2s.set(name, value);
    }

    pub fn set_vec3(&mut self, name: &str, value: Vector3<f32>) {
        self.uniforms.vec3s.set(name, value);
    }

    pub fn set_vec4(&mut self, name: &str, value: Vector4<f32>) {
        self.uniforms.vec4s.set(name, value);
    }

    pub fn set_mat3(&mut self, name: &str, value: Matrix3<f32>) {
        self.uniforms.mat3s.set(name, value);
    }

    pub fn set_mat4(&mut self, name: &str, value: Matrix4<f32>) {
        self.uniforms.mat4s.set(name, value);
    }

    /// Pushes every stored value into the shader.
    pub fn update_shader_uniforms(&self, device: &mut dyn RenderDevice) {
        self.uniforms.apply(&self.shader, device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::{Command, HeadlessDevice};
    use crate::gfx::resources::shader::tests::{FRAGMENT, VERTEX};

    const ORDERED_VERTEX: &str = r#"
struct Uniforms {
    scale: f32,
    mode: i32,
    offset: vec2<f32>,
    tint: vec4<f32>,
    model: mat4x4<f32>,
};

@group(0) @binding(0) var<uniform> u: Uniforms;

@vertex
fn vs_main(@location(0) position: vec2<f32>) -> @builtin(position) vec4<f32> {
    let p = (position + u.offset) * u.scale + f32(u.mode);
    return u.model * vec4<f32>(p, 0.0, 1.0) * u.tint;
}
"#;

    const PLAIN_FRAGMENT: &str = r#"
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0);
}
"#;

    #[test]
    fn test_uniforms_apply_in_type_order() {
        let mut device = HeadlessDevice::new();
        let shader = Rc::new(ShaderProgram::new(&mut device, ORDERED_VERTEX, PLAIN_FRAGMENT).unwrap());
        let mut material = Material::new(shader, None);
        material.set_mat4("model", Matrix4::identity());
        material.set_vec4("tint", Vector4::new(1.0, 1.0, 1.0, 1.0));
        material.set_float("scale", 2.0);
        material.set_vec2("offset", Vector2::new(0.5, 0.5));
        material.set_int("mode", 1);

        device.take_commands();
        material.update_shader_uniforms(&mut device);
        let written: Vec<String> = device
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::SetUniform { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(written, ["mode", "scale", "offset", "tint", "model"]);
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut bag = UniformBag::default();
        bag.set("a", 1.0f32);
        bag.set("b", 2.0);
        bag.set("a", 3.0);

        let entries: Vec<(&str, f32)> = bag.iter().map(|(n, v)| (n, *v)).collect();
        assert_eq!(entries, [("a", 3.0), ("b", 2.0)]);
    }

    #[test]
    fn test_clone_copies_bags_and_shares_shader() {
        let mut device = HeadlessDevice::new();
        let shader = Rc::new(ShaderProgram::new(&mut device, VERTEX, FRAGMENT).unwrap());
        let mut original = Material::new(shader.clone(), None);
        original.set_float("strength", 1.0);

        let mut copy = original.clone();
        copy.set_float("strength", 5.0);

        assert_eq!(original.uniforms().floats.get("strength"), Some(1.0));
        assert_eq!(copy.uniforms().floats.get("strength"), Some(5.0));
        assert!(Rc::ptr_eq(original.shader(), copy.shader()));
        assert_eq!(Rc::strong_count(&shader), 3);
    }

    #[test]
    fn test_remove_from_any_bag() {
        let mut bags = UniformBags::default();
        bags.vec3s.set("light", Vector3::new(1.0, 1.0, 1.0));
        bags.ints.set("mode", 2);
        assert_eq!(bags.len(), 2);

        assert!(bags.remove("light"));
        assert!(!bags.remove("light"));
        assert_eq!(bags.len(), 1);
    }
}
