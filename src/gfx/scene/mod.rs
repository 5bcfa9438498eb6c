//! # Scene Management Module
//!
//! The editor's data model: named registries of textures, meshes and materials,
//! objects pairing a mesh with a material, and entities placing an object in the
//! world with their own transform.
//!
//! ## Key Components
//!
//! - [`Scene`] - owns every registry and drives the per-frame transform update
//! - [`Registry`] - stable ids with unique, renamable display names
//! - [`Object`] - immutable mesh + material pairing shared by its entities
//! - [`Entity`] / [`Transform`] - an object instance and its `T * R * S` placement
//!
//! ## Ownership
//!
//! Assets are shared through `Rc`. Deleting a material or object only removes the
//! registry entry; entities that still use it keep rendering until they are deleted
//! themselves, at which point the last owner releases the GPU handles.

pub mod entity;
pub mod object;
pub mod registry;
pub mod scene;

// Re-export main types
pub use entity::{Entity, Transform};
pub use object::Object;
pub use registry::{
    EntityId, MaterialId, MeshId, ObjectId, Registry, RegistryError, TextureId,
};
pub use scene::{MaterialAsset, Scene, SceneError, ShaderSources};
