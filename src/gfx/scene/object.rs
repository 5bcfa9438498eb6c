use std::cell::RefCell;
use std::rc::Rc;

use crate::gfx::resources::{Material, Mesh};

use super::registry::{MaterialId, MeshId};

/// A reusable pairing of a mesh and a material.
///
/// Objects are immutable once created. They share the mesh and material with the
/// registries, so deleting either registry entry does not affect live objects.
#[derive(Debug)]
pub struct Object {
    mesh_id: MeshId,
    mesh: Rc<Mesh>,
    material_id: MaterialId,
    material: Rc<RefCell<Material>>,
}

impl Object {
    pub fn new(
        mesh_id: MeshId,
        mesh: Rc<Mesh>,
        material_id: MaterialId,
        material: Rc<RefCell<Material>>,
    ) -> Self {
        Self {
            mesh_id,
            mesh,
            material_id,
            material,
        }
    }

    pub fn mesh_id(&self) -> MeshId {
        self.mesh_id
    }

    pub fn mesh(&self) -> &Rc<Mesh> {
        &self.mesh
    }

    pub fn material_id(&self) -> MaterialId {
        self.material_id
    }

    pub fn material(&self) -> &Rc<RefCell<Material>> {
        &self.material
    }
}
