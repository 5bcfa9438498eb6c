//! # Primitive Shape Generation
//!
//! Built-in meshes. Every shape is interleaved into a single vertex buffer; the 3D
//! shapes use the `[3, 2]` layout (position, texture coordinates).

use crate::gfx::resources::{GpuBuffer, Mesh};

/// Layout of the 3D primitives: position.xyz followed by uv.
pub const POSITION_UV_LAYOUT: [u32; 2] = [3, 2];
/// Layout of the screen quad: clip-space position.xy followed by uv.
pub const SCREEN_QUAD_LAYOUT: [u32; 2] = [2, 2];

fn build_mesh(layout: &[u32], vertices: &[f32], indices: &[u32]) -> Mesh {
    let mut mesh = Mesh::new();
    mesh.push_buffer(GpuBuffer::with_vertices(layout, vertices));
    mesh.set_elements(indices);
    mesh
}

/// Generate a unit cube centered at the origin
///
/// Vertices span -0.5 to 0.5 on all axes, four per face so every face carries its
/// own 0..1 texture coordinates. 24 vertices, 36 indices.
pub fn generate_cube() -> Mesh {
    #[rustfmt::skip]
    let vertices: [f32; 120] = [
        // Front face
        -0.5, -0.5,  0.5,  0.0, 0.0,
         0.5, -0.5,  0.5,  1.0, 0.0,
         0.5,  0.5,  0.5,  1.0, 1.0,
        -0.5,  0.5,  0.5,  0.0, 1.0,
        // Back face
         0.5, -0.5, -0.5,  0.0, 0.0,
        -0.5, -0.5, -0.5,  1.0, 0.0,
        -0.5,  0.5, -0.5,  1.0, 1.0,
         0.5,  0.5, -0.5,  0.0, 1.0,
        // Left face
        -0.5, -0.5, -0.5,  0.0, 0.0,
        -0.5, -0.5,  0.5,  1.0, 0.0,
        -0.5,  0.5,  0.5,  1.0, 1.0,
        -0.5,  0.5, -0.5,  0.0, 1.0,
        // Right face
         0.5, -0.5,  0.5,  0.0, 0.0,
         0.5, -0.5, -0.5,  1.0, 0.0,
         0.5,  0.5, -0.5,  1.0, 1.0,
         0.5,  0.5,  0.5,  0.0, 1.0,
        // Top face
        -0.5,  0.5,  0.5,  0.0, 0.0,
         0.5,  0.5,  0.5,  1.0, 0.0,
         0.5,  0.5, -0.5,  1.0, 1.0,
        -0.5,  0.5, -0.5,  0.0, 1.0,
        // Bottom face
        -0.5, -0.5, -0.5,  0.0, 0.0,
         0.5, -0.5, -0.5,  1.0, 0.0,
         0.5, -0.5,  0.5,  1.0, 1.0,
        -0.5, -0.5,  0.5,  0.0, 1.0,
    ];

    // Two counter-clockwise triangles per face
    let mut indices = Vec::with_capacity(36);
    for face in 0..6u32 {
        let base = face * 4;
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }

    build_mesh(&POSITION_UV_LAYOUT, &vertices, &indices)
}

/// Generate a unit quad in the XY plane facing +Z
///
/// 4 vertices, 6 indices.
pub fn generate_quad() -> Mesh {
    #[rustfmt::skip]
    let vertices: [f32; 20] = [
        -0.5, -0.5, 0.0,  0.0, 0.0,
         0.5, -0.5, 0.0,  1.0, 0.0,
         0.5,  0.5, 0.0,  1.0, 1.0,
        -0.5,  0.5, 0.0,  0.0, 1.0,
    ];
    build_mesh(&POSITION_UV_LAYOUT, &vertices, &[0, 1, 2, 2, 3, 0])
}

/// Generate the clip-space quad used to present the framebuffer
pub fn generate_screen_quad() -> Mesh {
    #[rustfmt::skip]
    let vertices: [f32; 16] = [
        -1.0,  1.0,  0.0, 1.0,
        -1.0, -1.0,  0.0, 0.0,
         1.0, -1.0,  1.0, 0.0,
         1.0,  1.0,  1.0, 1.0,
    ];
    build_mesh(&SCREEN_QUAD_LAYOUT, &vertices, &[0, 3, 1, 1, 3, 2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_generation() {
        let cube = generate_cube();
        assert_eq!(cube.vertex_count(), 24); // 6 faces * 4 vertices
        assert_eq!(cube.element_count(), 36); // 6 faces * 2 triangles * 3 indices
        assert_eq!(cube.buffers()[0].stride(), 20);
    }

    #[test]
    fn test_quad_generation() {
        let quad = generate_quad();
        assert_eq!(quad.vertex_count(), 4);
        assert_eq!(quad.element_count(), 6);
    }

    #[test]
    fn test_screen_quad_covers_clip_space() {
        let quad = generate_screen_quad();
        let data = quad.buffers()[0].data();
        assert_eq!(quad.buffers()[0].layout(), &SCREEN_QUAD_LAYOUT);
        for vertex in data.chunks_exact(4) {
            assert_eq!(vertex[0].abs(), 1.0);
            assert_eq!(vertex[1].abs(), 1.0);
        }
    }
}
