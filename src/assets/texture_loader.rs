use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::gfx::device::RenderDevice;
use crate::gfx::resources::Texture;

const TEXTURE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

fn is_texture_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            TEXTURE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Decodes every image of `directory`, named by file name and sorted.
///
/// A missing directory is created and yields no textures. Files that fail to decode
/// are still returned, as placeholders.
pub fn load_textures(
    device: &mut dyn RenderDevice,
    directory: impl AsRef<Path>,
) -> Result<Vec<(String, Texture)>> {
    let directory = directory.as_ref();
    fs::create_dir_all(directory).with_context(|| {
        format!("Failed to create texture directory {}", directory.display())
    })?;

    let mut files = Vec::new();
    for entry in fs::read_dir(directory)
        .with_context(|| format!("Failed to read {}", directory.display()))?
    {
        let path = entry?.path();
        if path.is_file() && is_texture_file(&path) {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                files.push((name.to_string(), path.clone()));
            }
        }
    }
    files.sort();

    let textures: Vec<(String, Texture)> = files
        .into_iter()
        .map(|(name, path)| (name, Texture::from_path(device, path)))
        .collect();
    log::info!(
        "Loaded {} textures from {}",
        textures.len(),
        directory.display()
    );
    Ok(textures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::HeadlessDevice;

    #[test]
    fn test_loads_images_and_skips_other_files() {
        let dir = std::env::temp_dir().join(format!("micromodeler-textures-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        image::RgbaImage::from_pixel(2, 3, image::Rgba([10, 20, 30, 255]))
            .save(dir.join("brick.png"))
            .unwrap();
        fs::write(dir.join("broken.JPG"), b"not an image").unwrap();
        fs::write(dir.join("notes.txt"), b"text").unwrap();

        let mut device = HeadlessDevice::new();
        let textures = load_textures(&mut device, &dir).unwrap();

        let names: Vec<&str> = textures.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["brick.png", "broken.JPG"]);
        let brick = &textures[0].1;
        assert_eq!((brick.width(), brick.height(), brick.channels()), (2, 3, 4));
        assert!(!brick.is_placeholder());
        assert!(textures[1].1.is_placeholder());
        fs::remove_dir_all(dir).unwrap();
    }
}
