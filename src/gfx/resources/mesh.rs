//! Vertex arrays: owned vertex buffers, attribute bindings and optional indices.

use crate::gfx::device::{
    BufferHandle, BufferUsage, GpuResource, ReleaseQueue, RenderDevice, VertexArrayHandle,
    VertexAttribute,
};

use super::buffer::GpuBuffer;

/// Geometry ready to draw.
///
/// A mesh owns its [`GpuBuffer`]s. Attributes are bound at sequential shader
/// locations across buffers in push order, so a `[3, 2]` buffer followed by a `[3]`
/// buffer feeds locations 0, 1 and 2.
#[derive(Debug, Default)]
pub struct Mesh {
    buffers: Vec<GpuBuffer>,
    indices: Vec<u32>,
    vertex_count: u32,
    element_count: u32,
    array: Option<VertexArrayHandle>,
    index_buffer: Option<BufferHandle>,
    releases: Option<ReleaseQueue>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of a vertex buffer. Buffers without a layout, or holding a
    /// different vertex count than the first buffer, are rejected.
    pub fn push_buffer(&mut self, buffer: GpuBuffer) {
        if self.is_valid() {
            log::warn!("push_buffer on an uploaded mesh ignored");
            return;
        }
        if buffer.layout().is_empty() {
            log::warn!("Rejected vertex buffer without a layout");
            return;
        }
        if self.buffers.is_empty() {
            self.vertex_count = buffer.vertex_count();
        } else if buffer.vertex_count() != self.vertex_count {
            log::warn!(
                "Rejected vertex buffer with {} vertices, mesh has {}",
                buffer.vertex_count(),
                self.vertex_count
            );
            return;
        }
        self.buffers.push(buffer);
    }

    /// Sets the triangle list indices. Without indices the mesh draws as a strip.
    pub fn set_elements(&mut self, indices: &[u32]) {
        if self.is_valid() {
            log::warn!("set_elements on an uploaded mesh ignored");
            return;
        }
        self.indices = indices.to_vec();
        self.element_count = indices.len() as u32;
    }

    /// Uploads pending buffers and binds every attribute. Runs once.
    pub fn upload(&mut self, device: &mut dyn RenderDevice) {
        if self.is_valid() {
            return;
        }
        let array = device.create_vertex_array();

        let mut location = 0;
        for buffer in &mut self.buffers {
            if !buffer.is_uploaded() {
                buffer.upload(device, BufferUsage::Static);
            }
            let Some(handle) = buffer.handle() else {
                continue;
            };
            let stride = buffer.stride();
            let mut offset = 0;
            for &components in buffer.layout() {
                device.set_vertex_attribute(
                    array,
                    handle,
                    VertexAttribute {
                        location,
                        components,
                        stride,
                        offset,
                    },
                );
                location += 1;
                offset += components * std::mem::size_of::<f32>() as u32;
            }
        }

        if !self.indices.is_empty() {
            let index_buffer = device.create_index_buffer(&self.indices);
            device.set_index_buffer(array, index_buffer);
            self.index_buffer = Some(index_buffer);
        }

        self.array = Some(array);
        self.releases = Some(device.release_queue());
        log::debug!(
            "Uploaded mesh with {} buffers, {} vertices, {} elements",
            self.buffers.len(),
            self.vertex_count,
            self.element_count
        );
    }

    pub fn bind(&self, device: &mut dyn RenderDevice) {
        device.bind_vertex_array(self.array);
    }

    pub fn unbind(&self, device: &mut dyn RenderDevice) {
        device.bind_vertex_array(None);
    }

    /// Indexed triangles when indices were set, otherwise a triangle strip.
    pub fn draw(&self, device: &mut dyn RenderDevice) {
        if self.element_count > 0 {
            device.draw_indexed(self.element_count);
        } else {
            device.draw_strip(self.vertex_count);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.array.is_some()
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    pub fn buffers(&self) -> &[GpuBuffer] {
        &self.buffers
    }

    pub fn handle(&self) -> Option<VertexArrayHandle> {
        self.array
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        let Some(releases) = &self.releases else {
            return;
        };
        if let Some(array) = self.array {
            releases.push(GpuResource::VertexArray(array));
        }
        if let Some(index_buffer) = self.index_buffer {
            releases.push(GpuResource::Buffer(index_buffer));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::{Command, HeadlessDevice};

    fn attributes(device: &HeadlessDevice) -> Vec<VertexAttribute> {
        device
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::SetVertexAttribute { attribute, .. } => Some(*attribute),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_attributes_are_sequential_across_buffers() {
        let mut device = HeadlessDevice::new();
        let mut mesh = Mesh::new();
        mesh.push_buffer(GpuBuffer::with_vertices(&[3, 2], &[0.0; 15]));
        mesh.push_buffer(GpuBuffer::with_vertices(&[3], &[0.0; 9]));
        mesh.upload(&mut device);

        let attributes = attributes(&device);
        assert_eq!(attributes.len(), 3);
        assert_eq!((attributes[0].location, attributes[0].offset), (0, 0));
        assert_eq!((attributes[1].location, attributes[1].offset), (1, 12));
        assert_eq!((attributes[2].location, attributes[2].offset), (2, 0));
        assert_eq!(attributes[1].stride, 20);
        assert_eq!(attributes[2].stride, 12);
        assert_eq!(mesh.vertex_count(), 3);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_buffer_without_layout_is_rejected() {
        let mut mesh = Mesh::new();
        let mut buffer = GpuBuffer::new();
        buffer.push_vertex(&[1.0, 2.0]);
        mesh.push_buffer(buffer);

        assert!(mesh.buffers().is_empty());
        assert_eq!(mesh.vertex_count(), 0);
    }

    #[test]
    fn test_buffer_with_other_vertex_count_is_rejected() {
        let mut mesh = Mesh::new();
        mesh.push_buffer(GpuBuffer::with_vertices(&[3], &[0.0; 12]));
        mesh.push_buffer(GpuBuffer::with_vertices(&[2], &[0.0; 6]));

        assert_eq!(mesh.buffers().len(), 1);
        assert_eq!(mesh.vertex_count(), 4);

        let mut device = HeadlessDevice::new();
        mesh.upload(&mut device);
        device.take_commands();
        mesh.draw(&mut device);
        assert_eq!(device.commands(), &[Command::DrawStrip(4)]);
    }

    #[test]
    fn test_draw_contract() {
        let mut device = HeadlessDevice::new();
        let mut indexed = Mesh::new();
        indexed.push_buffer(GpuBuffer::with_vertices(&[2], &[0.0; 8]));
        indexed.set_elements(&[0, 1, 2, 2, 3, 0]);
        indexed.upload(&mut device);

        let mut strip = Mesh::new();
        strip.push_buffer(GpuBuffer::with_vertices(&[2], &[0.0; 8]));
        strip.upload(&mut device);

        device.take_commands();
        indexed.draw(&mut device);
        strip.draw(&mut device);
        assert_eq!(
            device.commands(),
            &[Command::DrawIndexed(6), Command::DrawStrip(4)]
        );
    }

    #[test]
    fn test_drop_releases_array_and_all_buffers() {
        let mut device = HeadlessDevice::new();
        let mut mesh = Mesh::new();
        mesh.push_buffer(GpuBuffer::with_vertices(&[2], &[0.0; 6]));
        mesh.set_elements(&[0, 1, 2]);
        mesh.upload(&mut device);
        let array = mesh.handle().unwrap();

        drop(mesh);
        // vertex array, index buffer and the owned vertex buffer
        assert_eq!(device.collect_released(), 3);
        assert_eq!(device.destroyed_count(GpuResource::VertexArray(array)), 1);
    }
}
