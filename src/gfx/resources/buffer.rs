//! Interleaved vertex data staged on the CPU and uploaded once.

use crate::gfx::device::{BufferHandle, BufferUsage, GpuResource, ReleaseQueue, RenderDevice};

const FLOAT_SIZE: u32 = std::mem::size_of::<f32>() as u32;

/// A vertex buffer: interleaved per-vertex floats plus the attribute split.
///
/// The arity of the first pushed vertex fixes the per-vertex value count; later
/// vertices with a different arity are ignored. After [`GpuBuffer::upload`] the
/// buffer is immutable.
#[derive(Debug, Default)]
pub struct GpuBuffer {
    data: Vec<f32>,
    layout: Vec<u32>,
    values_per_vertex: usize,
    vertex_count: u32,
    stride: u32,
    handle: Option<BufferHandle>,
    releases: Option<ReleaseQueue>,
}

impl GpuBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer from a layout and a flat list of interleaved vertices.
    pub fn with_vertices(layout: &[u32], values: &[f32]) -> Self {
        let mut buffer = Self::new();
        buffer.set_layout(layout);
        let arity: u32 = layout.iter().sum();
        if arity > 0 {
            for vertex in values.chunks_exact(arity as usize) {
                buffer.push_vertex(vertex);
            }
        }
        buffer
    }

    /// Appends one vertex. Ignored when its arity differs from the first vertex,
    /// when it is empty, or after upload.
    pub fn push_vertex(&mut self, values: &[f32]) {
        if self.is_uploaded() {
            log::warn!("push_vertex on an uploaded buffer ignored");
            return;
        }
        if values.is_empty() {
            return;
        }
        if self.data.is_empty() {
            self.values_per_vertex = values.len();
        }
        if values.len() != self.values_per_vertex {
            log::debug!(
                "Rejected vertex with {} values, buffer expects {}",
                values.len(),
                self.values_per_vertex
            );
            return;
        }
        self.data.extend_from_slice(values);
        self.vertex_count += 1;
    }

    /// Declares how each vertex splits into attributes, e.g. `[3, 2]` for
    /// position and texture coordinates.
    pub fn set_layout(&mut self, groups: &[u32]) {
        if self.is_uploaded() {
            log::warn!("set_layout on an uploaded buffer ignored");
            return;
        }
        self.layout = groups.to_vec();
        self.stride = groups.iter().sum::<u32>() * FLOAT_SIZE;
    }

    /// Transfers the staged vertices to the GPU. Calling it again is a no-op.
    pub fn upload(&mut self, device: &mut dyn RenderDevice, usage: BufferUsage) {
        if self.is_uploaded() {
            return;
        }
        if self.layout.is_empty() {
            log::warn!("Uploading a vertex buffer without a layout");
        } else if self.stride as usize != self.values_per_vertex * FLOAT_SIZE as usize
            && self.vertex_count > 0
        {
            log::warn!(
                "Vertex layout {:?} does not match {} values per vertex",
                self.layout,
                self.values_per_vertex
            );
        }
        self.handle = Some(device.create_vertex_buffer(&self.data, usage));
        self.releases = Some(device.release_queue());
    }

    pub fn is_uploaded(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<BufferHandle> {
        self.handle
    }

    pub fn layout(&self) -> &[u32] {
        &self.layout
    }

    /// Byte distance between consecutive vertices.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn values_per_vertex(&self) -> usize {
        self.values_per_vertex
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        if let (Some(handle), Some(releases)) = (self.handle, &self.releases) {
            releases.push(GpuResource::Buffer(handle));
        }
    }
}
