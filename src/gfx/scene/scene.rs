use std::cell::RefCell;
use std::rc::Rc;

use cgmath::Vector3;
use thiserror::Error;

use crate::gfx::device::RenderDevice;
use crate::gfx::geometry::{generate_cube, generate_quad};
use crate::gfx::resources::{Material, Mesh, ShaderError, ShaderProgram, Texture, UniformBags};

use super::entity::{Entity, Transform};
use super::object::Object;
use super::registry::{
    EntityId, MaterialId, MeshId, ObjectId, Registry, RegistryError, TextureId,
};

#[derive(Debug, Error)]
pub enum SceneError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("no {kind} with this id")]
    MissingAsset { kind: &'static str },
    #[error(transparent)]
    Shader(#[from] ShaderError),
}

/// Shader file names and their source text.
#[derive(Debug, Clone, Copy)]
pub struct ShaderSources<'a> {
    pub vertex_name: &'a str,
    pub vertex: &'a str,
    pub fragment_name: &'a str,
    pub fragment: &'a str,
}

/// A registered material plus where it came from, so it can be rebuilt when a
/// shader file changes.
#[derive(Debug)]
pub struct MaterialAsset {
    pub material: Rc<RefCell<Material>>,
    pub vertex_shader: String,
    pub fragment_shader: String,
    pub texture: Option<TextureId>,
}

/// Every asset and entity of the editor.
///
/// Registries hold shared handles. Deleting a registry entry only drops the
/// registry's share, so objects and entities built on it keep rendering.
#[derive(Debug, Default)]
pub struct Scene {
    textures: Registry<TextureId, Rc<Texture>>,
    meshes: Registry<MeshId, Rc<Mesh>>,
    materials: Registry<MaterialId, MaterialAsset>,
    objects: Registry<ObjectId, Rc<Object>>,
    entities: Registry<EntityId, Entity>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the built-in `cube` and `quad` meshes.
    pub fn add_builtin_meshes(&mut self, device: &mut dyn RenderDevice) -> Result<(), SceneError> {
        self.add_mesh(device, "cube", generate_cube())?;
        self.add_mesh(device, "quad", generate_quad())?;
        Ok(())
    }

    pub fn add_texture(&mut self, name: &str, texture: Texture) -> Result<TextureId, SceneError> {
        Ok(self.textures.insert(name, Rc::new(texture))?)
    }

    /// Uploads the mesh if needed and registers it.
    pub fn add_mesh(
        &mut self,
        device: &mut dyn RenderDevice,
        name: &str,
        mut mesh: Mesh,
    ) -> Result<MeshId, SceneError> {
        mesh.upload(device);
        Ok(self.meshes.insert(name, Rc::new(mesh))?)
    }

    /// Compiles the shader pair and registers a material using it.
    ///
    /// Nothing is registered when compilation fails; the error carries the
    /// diagnostic for display.
    pub fn create_material(
        &mut self,
        device: &mut dyn RenderDevice,
        name: &str,
        sources: ShaderSources<'_>,
        texture: Option<TextureId>,
        uniforms: UniformBags,
    ) -> Result<MaterialId, SceneError> {
        self.materials.check_name(name)?;
        let texture_handle = match texture {
            Some(id) => Some(
                self.textures
                    .get(id)
                    .cloned()
                    .ok_or(SceneError::MissingAsset { kind: "texture" })?,
            ),
            None => None,
        };

        let shader = ShaderProgram::new(device, sources.vertex, sources.fragment)?;
        let material = Material::new(Rc::new(shader), texture_handle).with_uniforms(uniforms);
        let id = self.materials.insert(
            name,
            MaterialAsset {
                material: Rc::new(RefCell::new(material)),
                vertex_shader: sources.vertex_name.to_string(),
                fragment_shader: sources.fragment_name.to_string(),
                texture,
            },
        )?;
        log::info!("Created material `{}`", name);
        Ok(id)
    }

    pub fn delete_material(&mut self, id: MaterialId) -> Option<MaterialAsset> {
        self.materials.remove(id)
    }

    pub fn create_object(
        &mut self,
        name: &str,
        mesh: MeshId,
        material: MaterialId,
    ) -> Result<ObjectId, SceneError> {
        let mesh_handle = self
            .meshes
            .get(mesh)
            .cloned()
            .ok_or(SceneError::MissingAsset { kind: "mesh" })?;
        let material_handle = self
            .materials
            .get(material)
            .map(|asset| asset.material.clone())
            .ok_or(SceneError::MissingAsset { kind: "material" })?;

        let object = Object::new(mesh, mesh_handle, material, material_handle);
        Ok(self.objects.insert(name, Rc::new(object))?)
    }

    pub fn delete_object(&mut self, id: ObjectId) -> Option<Rc<Object>> {
        self.objects.remove(id)
    }

    pub fn create_entity(
        &mut self,
        name: &str,
        object: ObjectId,
        translation: Vector3<f32>,
    ) -> Result<EntityId, SceneError> {
        let handle = self
            .objects
            .get(object)
            .cloned()
            .ok_or(SceneError::MissingAsset { kind: "object" })?;
        let entity = Entity::new(object, handle, Transform::at(translation));
        Ok(self.entities.insert(name, entity)?)
    }

    pub fn delete_entity(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    /// Recomputes every entity's model matrix.
    pub fn update(&mut self) {
        for entity in self.entities.values_mut() {
            entity.update();
        }
    }

    /// Rebuilds every material compiled from `file`.
    ///
    /// `lookup` returns the current text of a shader file. A material whose rebuild
    /// fails keeps its previous program; the failure is reported in the result.
    pub fn recompile_shader_file<F>(
        &mut self,
        device: &mut dyn RenderDevice,
        file: &str,
        lookup: F,
    ) -> Vec<(MaterialId, Result<(), ShaderError>)>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut results = Vec::new();
        for (id, name, asset) in self.materials.iter() {
            if asset.vertex_shader != file && asset.fragment_shader != file {
                continue;
            }
            let (Some(vertex), Some(fragment)) =
                (lookup(&asset.vertex_shader), lookup(&asset.fragment_shader))
            else {
                log::warn!("Sources of material `{}` are gone, keeping its program", name);
                continue;
            };

            let result = ShaderProgram::new(device, &vertex, &fragment).map(|program| {
                asset.material.borrow_mut().set_shader(Rc::new(program));
            });
            match &result {
                Ok(()) => log::info!("Recompiled material `{}`", name),
                Err(error) => log::warn!("Material `{}` kept its program: {}", name, error),
            }
            results.push((id, result));
        }
        results
    }

    /// Points materials built from `old` at the renamed file.
    pub fn rename_shader_file(&mut self, old: &str, new: &str) {
        for asset in self.materials.values_mut() {
            if asset.vertex_shader == old {
                asset.vertex_shader = new.to_string();
            }
            if asset.fragment_shader == old {
                asset.fragment_shader = new.to_string();
            }
        }
    }

    pub fn textures(&self) -> &Registry<TextureId, Rc<Texture>> {
        &self.textures
    }

    pub fn meshes(&self) -> &Registry<MeshId, Rc<Mesh>> {
        &self.meshes
    }

    pub fn materials(&self) -> &Registry<MaterialId, MaterialAsset> {
        &self.materials
    }

    pub fn objects(&self) -> &Registry<ObjectId, Rc<Object>> {
        &self.objects
    }

    pub fn entities(&self) -> &Registry<EntityId, Entity> {
        &self.entities
    }

    /// Mutable entity registry, for renaming.
    pub fn entities_mut(&mut self) -> &mut Registry<EntityId, Entity> {
        &mut self.entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::{GpuResource, HeadlessDevice};
    use crate::gfx::resources::shader::tests::{FRAGMENT, VERTEX};

    fn sources<'a>(vertex: &'a str, fragment: &'a str) -> ShaderSources<'a> {
        ShaderSources {
            vertex_name: "default.vert",
            vertex,
            fragment_name: "default.frag",
            fragment,
        }
    }

    fn scene_with_entity(device: &mut HeadlessDevice) -> (Scene, ObjectId, EntityId) {
        let mut scene = Scene::new();
        scene.add_builtin_meshes(device).unwrap();
        let quad = scene.meshes().id_of("quad").unwrap();
        let material = scene
            .create_material(
                device,
                "plain",
                sources(VERTEX, FRAGMENT),
                None,
                UniformBags::default(),
            )
            .unwrap();
        let object = scene.create_object("panel", quad, material).unwrap();
        let entity = scene
            .create_entity("panel 1", object, Vector3::new(0.0, 0.0, 0.0))
            .unwrap();
        (scene, object, entity)
    }

    #[test]
    fn test_failed_material_is_not_registered() {
        let mut device = HeadlessDevice::new();
        let mut scene = Scene::new();

        let error = scene
            .create_material(
                &mut device,
                "broken",
                sources("not wgsl", FRAGMENT),
                None,
                UniformBags::default(),
            )
            .unwrap_err();
        assert!(matches!(error, SceneError::Shader(ShaderError::VertexCompile(_))));
        assert!(scene.materials().is_empty());
    }

    #[test]
    fn test_object_requires_live_assets() {
        let mut device = HeadlessDevice::new();
        let (mut scene, object, _) = scene_with_entity(&mut device);
        let quad = scene.meshes().id_of("quad").unwrap();
        let material = scene.objects().get(object).unwrap().material_id();

        scene.delete_material(material);
        assert!(matches!(
            scene.create_object("other", quad, material),
            Err(SceneError::MissingAsset { kind: "material" })
        ));
    }

    #[test]
    fn test_deleted_object_lives_on_in_entity() {
        let mut device = HeadlessDevice::new();
        let (mut scene, object, entity) = scene_with_entity(&mut device);
        let mesh = scene.entities().get(entity).unwrap().object().mesh().handle();

        scene.delete_object(object);
        scene.delete_material(scene.materials().id_of("plain").unwrap());
        device.collect_released();

        let mesh = mesh.unwrap();
        assert_eq!(device.destroyed_count(GpuResource::VertexArray(mesh)), 0);
        assert!(scene.entities().get(entity).unwrap().object().mesh().is_valid());

        scene.delete_entity(entity);
        // the quad registry entry still owns the mesh
        assert_eq!(device.collect_released(), 1);
    }

    #[test]
    fn test_update_recomputes_model_matrices() {
        let mut device = HeadlessDevice::new();
        let (mut scene, _, entity) = scene_with_entity(&mut device);

        scene.entity_mut(entity).unwrap().transform.translate = Vector3::new(0.0, 2.0, 0.0);
        assert_eq!(scene.entities().get(entity).unwrap().model().w.y, 0.0);
        scene.update();
        assert_eq!(scene.entities().get(entity).unwrap().model().w.y, 2.0);
    }

    #[test]
    fn test_recompile_replaces_program_or_keeps_old() {
        let mut device = HeadlessDevice::new();
        let (mut scene, _, _) = scene_with_entity(&mut device);
        let id = scene.materials().id_of("plain").unwrap();
        let before = scene.materials().get(id).unwrap().material.borrow().shader().handle();

        let results = scene.recompile_shader_file(&mut device, "default.frag", |name| {
            Some(if name.ends_with(".vert") { VERTEX } else { "broken" }.to_string())
        });
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].1, Err(ShaderError::FragmentCompile(_))));
        let kept = scene.materials().get(id).unwrap().material.borrow().shader().handle();
        assert_eq!(kept, before);

        let results = scene.recompile_shader_file(&mut device, "default.vert", |name| {
            Some(if name.ends_with(".vert") { VERTEX } else { FRAGMENT }.to_string())
        });
        assert!(results[0].1.is_ok());
        let rebuilt = scene.materials().get(id).unwrap().material.borrow().shader().handle();
        assert_ne!(rebuilt, before);

        assert!(scene
            .recompile_shader_file(&mut device, "unrelated.frag", |_| None)
            .is_empty());
    }

    #[test]
    fn test_rename_shader_file_updates_provenance() {
        let mut device = HeadlessDevice::new();
        let (mut scene, _, _) = scene_with_entity(&mut device);
        scene.rename_shader_file("default.frag", "textured.frag");

        let (_, _, asset) = scene.materials().iter().next().unwrap();
        assert_eq!(asset.vertex_shader, "default.vert");
        assert_eq!(asset.fragment_shader, "textured.frag");
    }
}
