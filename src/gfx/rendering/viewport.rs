//! The framebuffer as an image for the scene view panel.

use crate::gfx::device::{TextureHandle, TextureOrigin};

/// Color texture of the framebuffer plus the texture coordinates of the region the
/// GUI should show.
///
/// The region is centred in the texture. Its height fraction is
/// `min(1, projection_aspect / framebuffer_aspect)` and its width fraction
/// `min(1, framebuffer_aspect / projection_aspect)`. With a bottom-left texture
/// origin the V coordinates are negated, so a 1080x720 framebuffer viewed at aspect
/// 1.0 yields `v` from `-180/1080` to `-900/1080`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportImage {
    pub texture: TextureHandle,
    pub uv0: [f32; 2],
    pub uv1: [f32; 2],
    /// Width over height the region should be displayed at.
    pub display_aspect: f32,
}

impl ViewportImage {
    pub fn new(
        texture: TextureHandle,
        framebuffer_size: (u32, u32),
        projection_aspect: f32,
        origin: TextureOrigin,
    ) -> Self {
        let (width, height) = (
            framebuffer_size.0.max(1) as f32,
            framebuffer_size.1.max(1) as f32,
        );
        let framebuffer_aspect = width / height;
        let projection_aspect = if projection_aspect.is_finite() && projection_aspect > 0.0 {
            projection_aspect
        } else {
            framebuffer_aspect
        };

        let height_fraction = (projection_aspect / framebuffer_aspect).min(1.0);
        let width_fraction = (framebuffer_aspect / projection_aspect).min(1.0);
        let u_offset = (1.0 - width_fraction) / 2.0;
        let v_offset = (1.0 - height_fraction) / 2.0;

        let (v0, v1) = match origin {
            TextureOrigin::BottomLeft => (-v_offset, -(v_offset + height_fraction)),
            TextureOrigin::TopLeft => (v_offset, v_offset + height_fraction),
        };

        Self {
            texture,
            uv0: [u_offset, v0],
            uv1: [u_offset + width_fraction, v1],
            display_aspect: projection_aspect * width_fraction / height_fraction,
        }
    }

    /// Largest size with the display aspect that fits into `available`.
    pub fn fit(&self, available: [f32; 2]) -> [f32; 2] {
        let [width, height] = [available[0].max(0.0), available[1].max(0.0)];
        if height == 0.0 || width / height > self.display_aspect {
            [height * self.display_aspect, height]
        } else {
            [width, width / self.display_aspect]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_bottom_left_reference_coordinates() {
        let image = ViewportImage::new(
            TextureHandle(1),
            (1080, 720),
            1.0,
            TextureOrigin::BottomLeft,
        );
        assert!(close(image.uv0[0], 0.0) && close(image.uv1[0], 1.0));
        assert!(close(image.uv0[1], -180.0 / 1080.0));
        assert!(close(image.uv1[1], -900.0 / 1080.0));
    }

    #[test]
    fn test_top_left_range_is_direct() {
        let image = ViewportImage::new(TextureHandle(1), (1080, 720), 1.0, TextureOrigin::TopLeft);
        assert!(close(image.uv0[1], 180.0 / 1080.0));
        assert!(close(image.uv1[1], 900.0 / 1080.0));
    }

    #[test]
    fn test_matching_aspect_shows_whole_texture() {
        let image = ViewportImage::new(TextureHandle(1), (800, 400), 2.0, TextureOrigin::TopLeft);
        assert_eq!(image.uv0, [0.0, 0.0]);
        assert_eq!(image.uv1, [1.0, 1.0]);
        assert!(close(image.display_aspect, 2.0));
    }

    #[test]
    fn test_wide_projection_crops_width() {
        let image = ViewportImage::new(TextureHandle(1), (400, 400), 2.0, TextureOrigin::TopLeft);
        assert!(close(image.uv0[0], 0.25) && close(image.uv1[0], 0.75));
        assert_eq!(image.uv0[1], 0.0);
        assert_eq!(image.uv1[1], 1.0);
    }

    #[test]
    fn test_fit_keeps_aspect() {
        let image = ViewportImage::new(TextureHandle(1), (800, 400), 2.0, TextureOrigin::TopLeft);
        assert_eq!(image.fit([400.0, 400.0]), [400.0, 200.0]);
        assert_eq!(image.fit([1000.0, 100.0]), [200.0, 100.0]);
    }
}
