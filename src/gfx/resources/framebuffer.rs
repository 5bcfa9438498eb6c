//! Off-screen render target the scene is drawn into.

use crate::gfx::device::{
    DeviceResult, FramebufferHandle, GpuResource, ReleaseQueue, RenderDevice, RenderTargetHandles,
    TextureHandle,
};

/// A color texture plus depth/stencil attachment of fixed size.
///
/// Construction fails when the device reports the target incomplete.
#[derive(Debug)]
pub struct Framebuffer {
    handles: RenderTargetHandles,
    width: u32,
    height: u32,
    clear_color: [f32; 4],
    releases: ReleaseQueue,
}

impl Framebuffer {
    pub fn new(device: &mut dyn RenderDevice, width: u32, height: u32) -> DeviceResult<Self> {
        let handles = device.create_render_target(width, height).map_err(|e| {
            log::error!("Framebuffer is not complete: {}", e);
            e
        })?;
        Ok(Self {
            handles,
            width,
            height,
            clear_color: [1.0, 1.0, 1.0, 1.0],
            releases: device.release_queue(),
        })
    }

    pub fn handle(&self) -> FramebufferHandle {
        self.handles.framebuffer
    }

    /// The color attachment, sampled when presenting the scene.
    pub fn color_texture(&self) -> TextureHandle {
        self.handles.color
    }

    pub fn handles(&self) -> RenderTargetHandles {
        self.handles
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.releases.push(GpuResource::RenderTarget(self.handles));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::HeadlessDevice;

    #[test]
    fn test_framebuffer_defaults() {
        let mut device = HeadlessDevice::new();
        let framebuffer = Framebuffer::new(&mut device, 1080, 720).unwrap();
        assert_eq!(framebuffer.size(), (1080, 720));
        assert_eq!(framebuffer.clear_color(), [1.0, 1.0, 1.0, 1.0]);
        assert!((framebuffer.aspect_ratio() - 1.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_incomplete_framebuffer_is_an_error() {
        let mut device = HeadlessDevice::new();
        assert!(Framebuffer::new(&mut device, 0, 0).is_err());
    }

    #[test]
    fn test_drop_releases_all_attachments() {
        let mut device = HeadlessDevice::new();
        let framebuffer = Framebuffer::new(&mut device, 64, 64).unwrap();
        let handles = framebuffer.handles();
        drop(framebuffer);
        device.collect_released();
        assert_eq!(
            device.destroyed_count(GpuResource::RenderTarget(handles)),
            1
        );
        assert!(device.texture(handles.color).is_none());
    }
}
