//! Sampled textures decoded from image files.
//!
//! Decoding never fails outright: unreadable files, unsupported channel counts and
//! images larger than the device allows are replaced by a 4x4 magenta and white
//! checkerboard with nearest filtering.

use std::cell::Cell;
use std::path::{Path, PathBuf};

use crate::gfx::device::{
    GpuResource, PixelFormat, ReleaseQueue, RenderDevice, TextureData, TextureFilter,
    TextureHandle,
};

const PLACEHOLDER_SIZE: u32 = 4;

#[derive(Debug)]
pub struct Texture {
    path: PathBuf,
    width: u32,
    height: u32,
    channels: u32,
    placeholder: bool,
    filter: Cell<TextureFilter>,
    handle: TextureHandle,
    releases: ReleaseQueue,
}

impl Texture {
    /// Decodes the image at `path`, flipped vertically so the first uploaded row is
    /// the bottom of the image.
    pub fn from_path(device: &mut dyn RenderDevice, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match image::open(path) {
            Ok(decoded) => {
                let decoded = decoded.flipv();
                let (width, height) = (decoded.width(), decoded.height());
                let channels = decoded.color().channel_count() as u32;
                let pixels = match channels {
                    3 => decoded.into_rgb8().into_raw(),
                    4 => decoded.into_rgba8().into_raw(),
                    _ => decoded.into_bytes(),
                };
                Self::from_pixels(device, path, &pixels, width, height, channels)
            }
            Err(e) => {
                log::warn!("Failed to load texture {}: {}", path.display(), e);
                Self::placeholder(device, path)
            }
        }
    }

    /// Uploads already decoded pixels (rows bottom to top). Falls back to the
    /// placeholder when the channel count is not 3 or 4, the sizes disagree or either
    /// side exceeds the device's texture limit.
    pub fn from_pixels(
        device: &mut dyn RenderDevice,
        path: impl AsRef<Path>,
        pixels: &[u8],
        width: u32,
        height: u32,
        channels: u32,
    ) -> Self {
        let path = path.as_ref();
        let format = match channels {
            3 => PixelFormat::Rgb8,
            4 => PixelFormat::Rgba8,
            _ => {
                log::warn!(
                    "Unsupported channel count {} in {}",
                    channels,
                    path.display()
                );
                return Self::placeholder(device, path);
            }
        };
        let expected = width as usize * height as usize * channels as usize;
        if width == 0 || height == 0 || pixels.len() != expected {
            log::warn!(
                "Pixel data of {} does not match {}x{}x{}",
                path.display(),
                width,
                height,
                channels
            );
            return Self::placeholder(device, path);
        }
        let max = device.capabilities().max_texture_dimension;
        if width > max || height > max {
            log::warn!(
                "{} is {}x{}, larger than the {} pixel texture limit",
                path.display(),
                width,
                height,
                max
            );
            return Self::placeholder(device, path);
        }

        let filter = TextureFilter::Linear;
        let handle = device.create_texture(
            &TextureData {
                width,
                height,
                format,
                pixels,
            },
            filter,
        );
        log::debug!("Loaded texture {} ({}x{})", path.display(), width, height);
        Self {
            path: path.to_path_buf(),
            width,
            height,
            channels,
            placeholder: false,
            filter: Cell::new(filter),
            handle,
            releases: device.release_queue(),
        }
    }

    fn placeholder(device: &mut dyn RenderDevice, path: &Path) -> Self {
        let pixels = placeholder_pixels();
        let filter = TextureFilter::Nearest;
        let handle = device.create_texture(
            &TextureData {
                width: PLACEHOLDER_SIZE,
                height: PLACEHOLDER_SIZE,
                format: PixelFormat::RgbF32,
                pixels: bytemuck::cast_slice(&pixels),
            },
            filter,
        );
        Self {
            path: path.to_path_buf(),
            width: PLACEHOLDER_SIZE,
            height: PLACEHOLDER_SIZE,
            channels: 3,
            placeholder: true,
            filter: Cell::new(filter),
            handle,
            releases: device.release_queue(),
        }
    }

    /// Re-applies min and mag filtering on the live texture.
    pub fn set_filter(&self, device: &mut dyn RenderDevice, filter: TextureFilter) {
        device.set_texture_filter(self.handle, filter);
        self.filter.set(filter);
    }

    pub fn bind(&self, device: &mut dyn RenderDevice) {
        device.bind_texture(Some(self.handle));
    }

    pub fn unbind(&self, device: &mut dyn RenderDevice) {
        device.bind_texture(None);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn filter(&self) -> TextureFilter {
        self.filter.get()
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn handle(&self) -> TextureHandle {
        self.handle
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.releases.push(GpuResource::Texture(self.handle));
    }
}

/// RGB float checkerboard: rows alternate between starting magenta and white.
fn placeholder_pixels() -> Vec<f32> {
    const MAGENTA: [f32; 3] = [1.0, 0.0, 1.0];
    const WHITE: [f32; 3] = [1.0, 1.0, 1.0];
    let mut pixels = Vec::with_capacity((PLACEHOLDER_SIZE * PLACEHOLDER_SIZE * 3) as usize);
    for row in 0..PLACEHOLDER_SIZE {
        for column in 0..PLACEHOLDER_SIZE {
            let color = if (row + column) % 2 == 0 { MAGENTA } else { WHITE };
            pixels.extend_from_slice(&color);
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::{Command, HeadlessDevice};

    #[test]
    fn test_missing_file_yields_placeholder() {
        let mut device = HeadlessDevice::new();
        let texture = Texture::from_path(&mut device, "does/not/exist.png");

        assert_eq!((texture.width(), texture.height()), (4, 4));
        assert_eq!(texture.channels(), 3);
        assert_eq!(texture.filter(), TextureFilter::Nearest);
        assert!(texture.is_placeholder());

        let record = device.texture(texture.handle()).unwrap();
        assert_eq!(record.filter, TextureFilter::Nearest);
        assert_eq!(record.format, PixelFormat::RgbF32);
    }

    #[test]
    fn test_unsupported_channel_count_yields_placeholder() {
        let mut device = HeadlessDevice::new();
        let texture = Texture::from_pixels(&mut device, "gray.png", &[0; 16], 4, 4, 1);
        assert!(texture.is_placeholder());
        assert_eq!(texture.channels(), 3);
    }

    #[test]
    fn test_rgba_pixels_upload() {
        let mut device = HeadlessDevice::new();
        let texture = Texture::from_pixels(&mut device, "tile.png", &[255; 2 * 3 * 4], 2, 3, 4);

        assert!(!texture.is_placeholder());
        assert_eq!(texture.filter(), TextureFilter::Linear);
        let record = device.texture(texture.handle()).unwrap();
        assert_eq!((record.width, record.height), (2, 3));
        assert_eq!(record.format, PixelFormat::Rgba8);
    }

    #[test]
    fn test_oversized_image_yields_placeholder() {
        let mut device = HeadlessDevice::new();
        let pixels = vec![0; 5000 * 3];
        let texture = Texture::from_pixels(&mut device, "photo.jpg", &pixels, 5000, 1, 3);

        assert!(texture.is_placeholder());
        assert_eq!((texture.width(), texture.height()), (4, 4));
        assert!(!device.commands().iter().any(|command| matches!(
            command,
            Command::CreateTexture { width: 5000, .. }
        )));
    }

    #[test]
    fn test_decoded_image_uploads_bottom_row_first() {
        let dir = std::env::temp_dir().join(format!("micromodeler-flip-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("stripes.png");
        let mut image = image::RgbImage::new(1, 2);
        image.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        image.put_pixel(0, 1, image::Rgb([0, 0, 255]));
        image.save(&path).unwrap();

        let mut device = HeadlessDevice::new();
        let texture = Texture::from_path(&mut device, &path);
        std::fs::remove_dir_all(&dir).unwrap();

        assert!(!texture.is_placeholder());
        assert_eq!(texture.channels(), 3);
        let record = device.texture(texture.handle()).unwrap();
        assert_eq!(record.pixels, [0, 0, 255, 255, 0, 0]);
    }

    #[test]
    fn test_set_filter_updates_device() {
        let mut device = HeadlessDevice::new();
        let texture = Texture::from_pixels(&mut device, "tile.png", &[0; 12], 2, 2, 3);
        texture.set_filter(&mut device, TextureFilter::Nearest);

        assert_eq!(texture.filter(), TextureFilter::Nearest);
        assert_eq!(
            device.texture(texture.handle()).unwrap().filter,
            TextureFilter::Nearest
        );
    }

    #[test]
    fn test_placeholder_pattern() {
        let pixels = placeholder_pixels();
        assert_eq!(pixels.len(), 48);
        assert_eq!(&pixels[0..3], &[1.0, 0.0, 1.0]);
        assert_eq!(&pixels[3..6], &[1.0, 1.0, 1.0]);
        // second row starts white
        assert_eq!(&pixels[12..15], &[1.0, 1.0, 1.0]);
    }
}
