//! Editor configuration.

use std::env;
use std::path::PathBuf;

use crate::logging::LoggingConfig;

pub const SHADER_DIR_VAR: &str = "MICROMODELER_SHADER_DIR";
pub const TEXTURE_DIR_VAR: &str = "MICROMODELER_TEXTURE_DIR";

#[derive(Debug, Clone)]
pub struct EditorConfig {
    pub title: String,
    pub window_size: (u32, u32),
    /// Fixed size of the off-screen framebuffer; the window size when unset.
    pub framebuffer_size: Option<(u32, u32)>,
    pub clear_color: [f32; 4],
    pub shader_dir: PathBuf,
    pub texture_dir: PathBuf,
    pub vsync: bool,
    pub logging: LoggingConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            title: "MicroModeler3D".to_string(),
            window_size: (1080, 720),
            framebuffer_size: None,
            clear_color: [0.3, 0.3, 0.3, 1.0],
            shader_dir: PathBuf::from("resources/shaders"),
            texture_dir: PathBuf::from("resources/textures"),
            vsync: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl EditorConfig {
    /// Defaults with the asset directories taken from the environment when set.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|name| env::var(name).ok())
    }

    fn with_env_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = var(SHADER_DIR_VAR).filter(|dir| !dir.is_empty()) {
            self.shader_dir = dir.into();
        }
        if let Some(dir) = var(TEXTURE_DIR_VAR).filter(|dir| !dir.is_empty()) {
            self.texture_dir = dir.into();
        }
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = (width, height);
        self
    }

    pub fn with_framebuffer_size(mut self, width: u32, height: u32) -> Self {
        self.framebuffer_size = Some((width, height));
        self
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = dir.into();
        self
    }

    pub fn with_texture_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.texture_dir = dir.into();
        self
    }

    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    pub fn framebuffer_size(&self) -> (u32, u32) {
        self.framebuffer_size.unwrap_or(self.window_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EditorConfig::default();
        assert_eq!(config.title, "MicroModeler3D");
        assert_eq!(config.window_size, (1080, 720));
        assert_eq!(config.framebuffer_size(), (1080, 720));
        assert_eq!(config.clear_color, [0.3, 0.3, 0.3, 1.0]);
    }

    #[test]
    fn test_env_overrides_asset_dirs() {
        let config = EditorConfig::default().with_env_overrides(|name| match name {
            SHADER_DIR_VAR => Some("/tmp/shaders".to_string()),
            TEXTURE_DIR_VAR => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.shader_dir, PathBuf::from("/tmp/shaders"));
        assert_eq!(config.texture_dir, PathBuf::from("resources/textures"));
    }

    #[test]
    fn test_framebuffer_size_override() {
        let config = EditorConfig::default()
            .with_window_size(1920, 1080)
            .with_framebuffer_size(1024, 1024);
        assert_eq!(config.framebuffer_size(), (1024, 1024));
    }
}
