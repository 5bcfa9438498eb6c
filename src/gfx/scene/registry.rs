//! Named asset registries.
//!
//! Every asset kind lives in a [`Registry`]: a slotmap gives each entry a stable id
//! that survives renames, and a sorted index maps the user-visible display name back
//! to that id. Names are unique and non-empty within one registry.

use std::collections::BTreeMap;

use slotmap::{new_key_type, Key, SlotMap};
use thiserror::Error;

new_key_type! {
    pub struct TextureId;
    pub struct MeshId;
    pub struct MaterialId;
    pub struct ObjectId;
    pub struct EntityId;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("the name `{0}` is already taken")]
    NameTaken(String),
    #[error("no entry with this id")]
    UnknownId,
}

#[derive(Debug)]
struct Named<T> {
    name: String,
    value: T,
}

#[derive(Debug)]
pub struct Registry<K: Key, T> {
    entries: SlotMap<K, Named<T>>,
    names: BTreeMap<String, K>,
}

impl<K: Key, T> Default for Registry<K, T> {
    fn default() -> Self {
        Self {
            entries: SlotMap::with_key(),
            names: BTreeMap::new(),
        }
    }
}

impl<K: Key, T> Registry<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails when `name` could not be inserted.
    pub fn check_name(&self, name: &str) -> Result<(), RegistryError> {
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.names.contains_key(name) {
            return Err(RegistryError::NameTaken(name.to_string()));
        }
        Ok(())
    }

    pub fn insert(&mut self, name: &str, value: T) -> Result<K, RegistryError> {
        self.check_name(name)?;
        let id = self.entries.insert(Named {
            name: name.to_string(),
            value,
        });
        self.names.insert(name.to_string(), id);
        Ok(id)
    }

    /// Removes the entry and hands the value back to the caller.
    pub fn remove(&mut self, id: K) -> Option<T> {
        let entry = self.entries.remove(id)?;
        self.names.remove(&entry.name);
        Some(entry.value)
    }

    /// Changes the display name, keeping the id.
    pub fn rename(&mut self, id: K, name: &str) -> Result<(), RegistryError> {
        let current = self
            .entries
            .get(id)
            .map(|entry| entry.name.clone())
            .ok_or(RegistryError::UnknownId)?;
        if current == name {
            return Ok(());
        }
        self.check_name(name)?;

        self.names.remove(&current);
        self.names.insert(name.to_string(), id);
        if let Some(entry) = self.entries.get_mut(id) {
            entry.name = name.to_string();
        }
        Ok(())
    }

    pub fn get(&self, id: K) -> Option<&T> {
        self.entries.get(id).map(|entry| &entry.value)
    }

    pub fn get_mut(&mut self, id: K) -> Option<&mut T> {
        self.entries.get_mut(id).map(|entry| &mut entry.value)
    }

    pub fn contains(&self, id: K) -> bool {
        self.entries.contains_key(id)
    }

    pub fn id_of(&self, name: &str) -> Option<K> {
        self.names.get(name).copied()
    }

    pub fn name_of(&self, id: K) -> Option<&str> {
        self.entries.get(id).map(|entry| entry.name.as_str())
    }

    /// Entries sorted by display name.
    pub fn iter(&self) -> impl Iterator<Item = (K, &str, &T)> + '_ {
        self.names.iter().filter_map(move |(name, id)| {
            self.entries
                .get(*id)
                .map(|entry| (*id, name.as_str(), &entry.value))
        })
    }

    /// Mutable access to every value, in no particular order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.entries.values_mut().map(|entry| &mut entry.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique_and_non_empty() {
        let mut registry: Registry<MeshId, u32> = Registry::new();
        registry.insert("cube", 1).unwrap();

        assert_eq!(
            registry.insert("cube", 2),
            Err(RegistryError::NameTaken("cube".to_string()))
        );
        assert_eq!(registry.insert("  ", 3), Err(RegistryError::EmptyName));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_rename_keeps_id() {
        let mut registry: Registry<MaterialId, &str> = Registry::new();
        let brick = registry.insert("brick", "a").unwrap();
        registry.insert("stone", "b").unwrap();

        assert_eq!(
            registry.rename(brick, "stone"),
            Err(RegistryError::NameTaken("stone".to_string()))
        );
        registry.rename(brick, "wall").unwrap();

        assert_eq!(registry.id_of("wall"), Some(brick));
        assert_eq!(registry.id_of("brick"), None);
        assert_eq!(registry.get(brick), Some(&"a"));
    }

    #[test]
    fn test_removed_id_is_stale() {
        let mut registry: Registry<EntityId, u8> = Registry::new();
        let id = registry.insert("first", 7).unwrap();
        assert_eq!(registry.remove(id), Some(7));

        assert!(registry.get(id).is_none());
        assert_eq!(registry.rename(id, "again"), Err(RegistryError::UnknownId));
        // the name is free again and gets a fresh id
        let reused = registry.insert("first", 8).unwrap();
        assert_ne!(reused, id);
    }

    #[test]
    fn test_iteration_is_sorted_by_name() {
        let mut registry: Registry<ObjectId, ()> = Registry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.insert(name, ()).unwrap();
        }
        let names: Vec<&str> = registry.iter().map(|(_, name, _)| name).collect();
        assert_eq!(names, ["alpha", "mid", "zeta"]);
    }
}
