//! Two-phase scene rendering: entities into the framebuffer, then the framebuffer
//! onto the window or into the GUI.

use cgmath::{Matrix4, SquareMatrix};
use thiserror::Error;

use crate::gfx::device::{
    DeviceCapabilities, DeviceError, PassDescriptor, RenderDevice, RenderTarget, TextureOrigin,
};
use crate::gfx::geometry::generate_screen_quad;
use crate::gfx::resources::{Framebuffer, Mesh, ShaderError, ShaderProgram};
use crate::gfx::scene::{Entity, Scene};

use super::shaders::{BLIT_FRAGMENT_SHADER, BLIT_VERTEX_SHADER};
use super::viewport::ViewportImage;

#[derive(Debug, Error)]
pub enum RendererError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("built-in blit shader: {0}")]
    Shader(#[from] ShaderError),
}

/// Draws the scene into an off-screen framebuffer and presents it.
#[derive(Debug)]
pub struct SceneRenderer {
    framebuffer: Framebuffer,
    screen_quad: Mesh,
    blit_shader: ShaderProgram,
    view: Matrix4<f32>,
    projection: Matrix4<f32>,
}

impl SceneRenderer {
    /// Creates the framebuffer at its fixed size and the blit resources.
    pub fn new(
        device: &mut dyn RenderDevice,
        framebuffer_size: (u32, u32),
        clear_color: [f32; 4],
    ) -> Result<Self, RendererError> {
        let mut framebuffer = Framebuffer::new(device, framebuffer_size.0, framebuffer_size.1)?;
        framebuffer.set_clear_color(clear_color);

        let mut screen_quad = generate_screen_quad();
        screen_quad.upload(device);
        let blit_shader = ShaderProgram::new(device, BLIT_VERTEX_SHADER, BLIT_FRAGMENT_SHADER)?;

        Ok(Self {
            framebuffer,
            screen_quad,
            blit_shader,
            view: Matrix4::identity(),
            projection: Matrix4::identity(),
        })
    }

    pub fn set_camera(&mut self, view: Matrix4<f32>, projection: Matrix4<f32>) {
        self.view = view;
        self.projection = projection;
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.framebuffer.clear_color()
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.framebuffer.set_clear_color(color);
    }

    /// Draws every entity into the framebuffer with depth testing. Returns the
    /// number of entities drawn.
    pub fn render_scene(&self, device: &mut dyn RenderDevice, scene: &Scene) -> usize {
        let (width, height) = self.framebuffer.size();
        device.begin_pass(&PassDescriptor {
            target: RenderTarget::Framebuffer(self.framebuffer.handle()),
            viewport: [0, 0, width, height],
            clear_color: Some(self.framebuffer.clear_color()),
            depth_test: true,
        });

        let mut drawn = 0;
        for (_, _, entity) in scene.entities().iter() {
            self.draw_entity(device, entity);
            drawn += 1;
        }

        device.end_pass();
        drawn
    }

    fn draw_entity(&self, device: &mut dyn RenderDevice, entity: &Entity) {
        let object = entity.object();
        let mesh = object.mesh();
        let material = object.material().borrow();
        let shader = material.shader();

        mesh.bind(device);
        shader.bind(device);
        if let Some(texture) = material.texture() {
            texture.bind(device);
        }
        material.update_shader_uniforms(device);
        shader.set_mat4(device, "model", entity.model());
        shader.set_mat4(device, "view", self.view);
        shader.set_mat4(device, "proj", self.projection);

        mesh.draw(device);

        if let Some(texture) = material.texture() {
            texture.unbind(device);
        }
        shader.unbind(device);
        mesh.unbind(device);
    }

    /// Blits the framebuffer's color texture over the whole window.
    pub fn present_to_surface(&self, device: &mut dyn RenderDevice, window_size: (u32, u32)) {
        let flip_y = match device.capabilities().texture_origin {
            TextureOrigin::BottomLeft => 0.0,
            TextureOrigin::TopLeft => 1.0,
        };
        device.begin_pass(&PassDescriptor {
            target: RenderTarget::Surface,
            viewport: [0, 0, window_size.0, window_size.1],
            clear_color: Some([0.0, 0.0, 0.0, 1.0]),
            depth_test: false,
        });

        self.screen_quad.bind(device);
        self.blit_shader.bind(device);
        device.bind_texture(Some(self.framebuffer.color_texture()));
        self.blit_shader.set_float(device, "flip_y", flip_y);
        self.screen_quad.draw(device);
        device.bind_texture(None);
        self.blit_shader.unbind(device);
        self.screen_quad.unbind(device);

        device.end_pass();
    }

    /// The framebuffer texture and the region the scene view panel should show.
    pub fn viewport_image(
        &self,
        capabilities: &DeviceCapabilities,
        projection_aspect: f32,
    ) -> ViewportImage {
        ViewportImage::new(
            self.framebuffer.color_texture(),
            self.framebuffer.size(),
            projection_aspect,
            capabilities.texture_origin,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::{Command, HeadlessDevice, UniformValue};
    use crate::gfx::resources::shader::tests::{FRAGMENT, VERTEX};
    use crate::gfx::resources::{Texture, UniformBags};
    use crate::gfx::scene::ShaderSources;
    use cgmath::Vector3;

    fn sources() -> ShaderSources<'static> {
        ShaderSources {
            vertex_name: "default.vert",
            vertex: VERTEX,
            fragment_name: "default.frag",
            fragment: FRAGMENT,
        }
    }

    fn quad_scene(device: &mut HeadlessDevice, textured: bool) -> Scene {
        let mut scene = Scene::new();
        scene.add_builtin_meshes(device).unwrap();
        let texture = textured.then(|| {
            let texture = Texture::from_path(device, "does/not/exist.png");
            scene.add_texture("checker", texture).unwrap()
        });
        let quad = scene.meshes().id_of("quad").unwrap();
        let material = scene
            .create_material(device, "m", sources(), texture, UniformBags::default())
            .unwrap();
        let object = scene.create_object("o", quad, material).unwrap();
        scene
            .create_entity("e", object, Vector3::new(0.0, 0.0, 0.0))
            .unwrap();
        scene
    }

    #[test]
    fn test_untextured_entity_renders_without_texture_binds() {
        let mut device = HeadlessDevice::new();
        let scene = quad_scene(&mut device, false);
        let renderer = SceneRenderer::new(&mut device, (64, 32), [0.3, 0.3, 0.3, 1.0]).unwrap();

        device.take_commands();
        assert_eq!(renderer.render_scene(&mut device, &scene), 1);
        let commands = device.take_commands();

        assert_eq!(
            commands.first(),
            Some(&Command::BeginPass(PassDescriptor {
                target: RenderTarget::Framebuffer(renderer.framebuffer().handle()),
                viewport: [0, 0, 64, 32],
                clear_color: Some([0.3, 0.3, 0.3, 1.0]),
                depth_test: true,
            }))
        );
        assert!(commands.contains(&Command::DrawIndexed(6)));
        assert_eq!(commands.last(), Some(&Command::EndPass));
        assert!(!commands
            .iter()
            .any(|c| matches!(c, Command::BindTexture(_))));
    }

    #[test]
    fn test_entity_draw_sequence_is_symmetric() {
        let mut device = HeadlessDevice::new();
        let scene = quad_scene(&mut device, true);
        let mut renderer = SceneRenderer::new(&mut device, (64, 64), [0.0; 4]).unwrap();
        renderer.set_camera(Matrix4::from_scale(2.0), Matrix4::identity());

        device.take_commands();
        renderer.render_scene(&mut device, &scene);
        let commands = device.take_commands();

        let binds: Vec<&Command> = commands
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    Command::BindVertexArray(_)
                        | Command::BindTexture(_)
                        | Command::DrawIndexed(_)
                )
            })
            .collect();
        assert!(matches!(binds[0], Command::BindVertexArray(Some(_))));
        assert!(matches!(binds[1], Command::BindTexture(Some(_))));
        assert_eq!(binds[2], &Command::DrawIndexed(6));
        assert_eq!(binds[3], &Command::BindTexture(None));
        assert_eq!(binds[4], &Command::BindVertexArray(None));

        let matrices: Vec<&str> = commands
            .iter()
            .filter_map(|c| match c {
                Command::SetUniform {
                    name,
                    value: UniformValue::Mat4(_),
                    ..
                } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(matrices, ["model", "view", "proj"]);
        assert!(commands.contains(&Command::SetUniform {
            program: scene
                .materials()
                .iter()
                .next()
                .unwrap()
                .2
                .material
                .borrow()
                .shader()
                .handle(),
            name: "view".to_string(),
            value: UniformValue::Mat4(Matrix4::from_scale(2.0).into()),
        }));
    }

    #[test]
    fn test_present_flips_for_top_left_origin() {
        let mut device = HeadlessDevice::with_capabilities(DeviceCapabilities {
            texture_origin: TextureOrigin::TopLeft,
            ..HeadlessDevice::new().capabilities()
        });
        let renderer = SceneRenderer::new(&mut device, (32, 32), [0.0; 4]).unwrap();

        device.take_commands();
        renderer.present_to_surface(&mut device, (800, 600));
        let commands = device.take_commands();

        assert!(matches!(
            commands.first(),
            Some(Command::BeginPass(PassDescriptor {
                target: RenderTarget::Surface,
                viewport: [0, 0, 800, 600],
                depth_test: false,
                ..
            }))
        ));
        assert!(commands.contains(&Command::BindTexture(Some(
            renderer.framebuffer().color_texture()
        ))));
        assert!(commands.iter().any(|c| matches!(
            c,
            Command::SetUniform { name, value: UniformValue::Float(flip), .. }
                if name == "flip_y" && *flip == 1.0
        )));
        assert!(commands.contains(&Command::DrawIndexed(6)));
    }
}
