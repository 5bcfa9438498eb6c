//! Shader source files on disk.
//!
//! Every `<name>.vert` and `<name>.frag` file of the shader directory is kept in
//! memory by file name. Creating, editing and deleting shaders writes through to the
//! directory, which is the only state the editor persists between runs.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

pub const DEFAULT_VERTEX_SHADER: &str = include_str!("../../resources/shaders/default.vert");
pub const DEFAULT_FRAGMENT_SHADER: &str = include_str!("../../resources/shaders/default.frag");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderKind {
    Vertex,
    Fragment,
}

impl ShaderKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ShaderKind::Vertex => "vert",
            ShaderKind::Fragment => "frag",
        }
    }

    /// The kind a file name denotes by its extension.
    pub fn of_file(file_name: &str) -> Option<Self> {
        match Path::new(file_name).extension()?.to_str()? {
            "vert" => Some(ShaderKind::Vertex),
            "frag" => Some(ShaderKind::Fragment),
            _ => None,
        }
    }

    pub fn file_name(&self, name: &str) -> String {
        format!("{}.{}", name, self.extension())
    }
}

#[derive(Debug)]
pub struct ShaderLibrary {
    directory: PathBuf,
    sources: BTreeMap<String, String>,
}

impl ShaderLibrary {
    /// Reads every shader file of `directory`, creating the directory and the
    /// default shader pair when there are none.
    pub fn load(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory).with_context(|| {
            format!("Failed to create shader directory {}", directory.display())
        })?;

        let mut library = Self {
            directory,
            sources: BTreeMap::new(),
        };
        library.read_directory()?;

        if library.sources.is_empty() {
            log::info!(
                "No shaders in {}, writing the default pair",
                library.directory.display()
            );
            library.create("default", ShaderKind::Vertex, DEFAULT_VERTEX_SHADER)?;
            library.create("default", ShaderKind::Fragment, DEFAULT_FRAGMENT_SHADER)?;
        }
        log::info!(
            "Loaded {} shaders from {}",
            library.sources.len(),
            library.directory.display()
        );
        Ok(library)
    }

    fn read_directory(&mut self) -> Result<()> {
        let entries = fs::read_dir(&self.directory)
            .with_context(|| format!("Failed to read {}", self.directory.display()))?;
        for entry in entries {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !path.is_file() || ShaderKind::of_file(file_name).is_none() {
                continue;
            }
            let source = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read shader {}", path.display()))?;
            self.sources.insert(file_name.to_string(), source);
        }
        Ok(())
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn get(&self, file_name: &str) -> Option<&str> {
        self.sources.get(file_name).map(String::as_str)
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.sources.contains_key(file_name)
    }

    /// File names of one kind, sorted.
    pub fn names(&self, kind: ShaderKind) -> impl Iterator<Item = &str> + '_ {
        self.sources
            .keys()
            .map(String::as_str)
            .filter(move |file| ShaderKind::of_file(file) == Some(kind))
    }

    /// Every file name with its source, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.sources.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Writes a new shader file and returns its file name.
    pub fn create(&mut self, name: &str, kind: ShaderKind, source: &str) -> Result<String> {
        let file_name = Self::checked_file_name(name, kind)?;
        if self.sources.contains_key(&file_name) {
            bail!("A shader named {} already exists", file_name);
        }
        self.write(&file_name, source)?;
        log::info!("Created shader {}", file_name);
        Ok(file_name)
    }

    /// Rewrites `file_name` under a possibly new name and kind, removing the old
    /// file when the name changed. Returns the new file name.
    pub fn update(
        &mut self,
        file_name: &str,
        new_name: &str,
        kind: ShaderKind,
        source: &str,
    ) -> Result<String> {
        if !self.sources.contains_key(file_name) {
            bail!("Unknown shader {}", file_name);
        }
        let new_file = Self::checked_file_name(new_name, kind)?;
        if new_file != file_name && self.sources.contains_key(&new_file) {
            bail!("A shader named {} already exists", new_file);
        }

        self.write(&new_file, source)?;
        if new_file != file_name {
            self.delete(file_name)?;
        }
        log::info!("Saved shader {} as {}", file_name, new_file);
        Ok(new_file)
    }

    pub fn delete(&mut self, file_name: &str) -> Result<()> {
        if self.sources.remove(file_name).is_none() {
            bail!("Unknown shader {}", file_name);
        }
        let path = self.directory.join(file_name);
        fs::remove_file(&path).with_context(|| format!("Failed to delete {}", path.display()))?;
        log::info!("Deleted shader {}", file_name);
        Ok(())
    }

    fn checked_file_name(name: &str, kind: ShaderKind) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            bail!("Shader name must not be empty");
        }
        if name.contains(['/', '\\']) {
            bail!("Shader name {} must not contain path separators", name);
        }
        Ok(kind.file_name(name))
    }

    fn write(&mut self, file_name: &str, source: &str) -> Result<()> {
        let path = self.directory.join(file_name);
        fs::write(&path, source).with_context(|| format!("Failed to write {}", path.display()))?;
        self.sources.insert(file_name.to_string(), source.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scratch_dir() -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let dir = std::env::temp_dir().join(format!(
            "micromodeler-shaders-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_empty_directory_gets_defaults() {
        let dir = scratch_dir();
        let library = ShaderLibrary::load(&dir).unwrap();

        assert_eq!(library.get("default.vert"), Some(DEFAULT_VERTEX_SHADER));
        assert_eq!(library.get("default.frag"), Some(DEFAULT_FRAGMENT_SHADER));
        assert!(dir.join("default.vert").is_file());
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_only_shader_files_are_loaded() {
        let dir = scratch_dir();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("lit.frag"), "fragment").unwrap();
        fs::write(dir.join("readme.txt"), "text").unwrap();

        let library = ShaderLibrary::load(&dir).unwrap();
        assert_eq!(library.len(), 1);
        assert_eq!(library.names(ShaderKind::Fragment).collect::<Vec<_>>(), ["lit.frag"]);
        assert_eq!(library.names(ShaderKind::Vertex).count(), 0);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_create_rejects_empty_and_taken_names() {
        let dir = scratch_dir();
        let mut library = ShaderLibrary::load(&dir).unwrap();

        assert!(library.create("  ", ShaderKind::Vertex, "x").is_err());
        assert!(library.create("default", ShaderKind::Vertex, "x").is_err());
        assert_eq!(
            library.create("wave", ShaderKind::Vertex, "x").unwrap(),
            "wave.vert"
        );
        assert_eq!(fs::read_to_string(dir.join("wave.vert")).unwrap(), "x");
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_update_renames_and_rewrites() {
        let dir = scratch_dir();
        let mut library = ShaderLibrary::load(&dir).unwrap();

        let renamed = library
            .update("default.frag", "flat", ShaderKind::Fragment, "new source")
            .unwrap();
        assert_eq!(renamed, "flat.frag");
        assert!(!library.contains("default.frag"));
        assert!(!dir.join("default.frag").exists());
        assert_eq!(fs::read_to_string(dir.join("flat.frag")).unwrap(), "new source");

        // saving under the same name only rewrites
        library
            .update("flat.frag", "flat", ShaderKind::Fragment, "again")
            .unwrap();
        assert_eq!(library.get("flat.frag"), Some("again"));

        assert!(library
            .update("flat.frag", "default", ShaderKind::Vertex, "clash")
            .is_err());
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_delete_removes_file() {
        let dir = scratch_dir();
        let mut library = ShaderLibrary::load(&dir).unwrap();
        library.delete("default.vert").unwrap();

        assert!(!dir.join("default.vert").exists());
        assert!(library.delete("default.vert").is_err());
        fs::remove_dir_all(dir).unwrap();
    }
}
