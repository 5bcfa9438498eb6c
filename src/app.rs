use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{DeviceEvent, DeviceId, Event, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{CursorGrabMode, Window, WindowAttributes, WindowId},
};

use crate::assets::{load_textures, ShaderLibrary};
use crate::config::EditorConfig;
use crate::gfx::{
    camera::{CameraController, CursorRequest, FlyCamera},
    device::{RenderDevice, TextureHandle, WgpuDevice},
    rendering::SceneRenderer,
    scene::Scene,
};
use crate::ui::{draw_editor, EditorContext, EditorUiState, PanelResponse, UiManager};

/// Longest frame step fed to the camera, so a stalled frame does not teleport it.
const MAX_FRAME_STEP: f32 = 0.1;

/// Seconds elapsed between frames.
#[derive(Debug)]
pub struct FrameClock {
    last: Instant,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self {
            last: Instant::now(),
        }
    }
}

impl FrameClock {
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let delta = (now - self.last).as_secs_f32();
        self.last = now;
        delta.min(MAX_FRAME_STEP)
    }
}

pub struct EditorApp {
    event_loop: Option<EventLoop<()>>,
    app_state: AppState,
}

struct AppState {
    config: EditorConfig,
    window: Option<Arc<Window>>,
    runtime: Option<Runtime>,
    camera: FlyCamera,
    controller: CameraController,
    clock: FrameClock,
    init_error: Option<anyhow::Error>,
}

/// Everything that needs the window and the GPU.
struct Runtime {
    device: WgpuDevice,
    renderer: SceneRenderer,
    scene: Scene,
    library: ShaderLibrary,
    ui: UiManager,
    ui_state: EditorUiState,
    gui_textures: HashMap<TextureHandle, imgui::TextureId>,
    viewport_texture: Option<imgui::TextureId>,
    clear_color: [f32; 4],
}

impl EditorApp {
    pub fn new(config: EditorConfig) -> Result<Self> {
        let event_loop = EventLoop::new().context("Failed to create event loop")?;
        Ok(Self {
            event_loop: Some(event_loop),
            app_state: AppState {
                config,
                window: None,
                runtime: None,
                camera: FlyCamera::default(),
                controller: CameraController::new(),
                clock: FrameClock::default(),
                init_error: None,
            },
        })
    }

    /// Runs the event loop until the window closes.
    pub fn run(mut self) -> Result<()> {
        let event_loop = self
            .event_loop
            .take()
            .context("Event loop already consumed")?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop
            .run_app(&mut self.app_state)
            .context("Event loop failed")?;

        match self.app_state.init_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Runtime {
    fn new(config: &EditorConfig, window: Arc<Window>) -> Result<Self> {
        let (width, height) = window.inner_size().into();
        let mut device = pollster::block_on(WgpuDevice::new(
            window.clone(),
            width,
            height,
            config.vsync,
        ))
        .context("Failed to initialise the graphics device")?;

        let ui = UiManager::new(
            device.device(),
            device.queue(),
            device.surface_format(),
            &window,
        );

        let library = ShaderLibrary::load(&config.shader_dir)?;
        let mut scene = Scene::new();
        scene.add_builtin_meshes(&mut device)?;
        for (name, texture) in load_textures(&mut device, &config.texture_dir)? {
            if let Err(e) = scene.add_texture(&name, texture) {
                log::warn!("Skipping texture {}: {}", name, e);
            }
        }

        let renderer =
            SceneRenderer::new(&mut device, config.framebuffer_size(), config.clear_color)?;
        log::info!(
            "Editor ready: {}x{} window, {:?} framebuffer",
            width,
            height,
            renderer.framebuffer().size()
        );

        Ok(Self {
            device,
            renderer,
            scene,
            library,
            ui,
            ui_state: EditorUiState::new(),
            gui_textures: HashMap::new(),
            viewport_texture: None,
            clear_color: config.clear_color,
        })
    }

    fn register_gui_texture(&mut self, handle: TextureHandle) -> Option<imgui::TextureId> {
        let (texture, view, size) = self.device.texture_parts(handle)?;
        Some(
            self.ui
                .register_texture(self.device.device(), texture, view, size),
        )
    }

    /// Makes the framebuffer and every scene texture drawable by the GUI.
    fn sync_gui_textures(&mut self) {
        if self.viewport_texture.is_none() {
            let color = self.renderer.framebuffer().color_texture();
            self.viewport_texture = self.register_gui_texture(color);
        }
        let missing: Vec<TextureHandle> = self
            .scene
            .textures()
            .iter()
            .map(|(_, _, texture)| texture.handle())
            .filter(|handle| !self.gui_textures.contains_key(handle))
            .collect();
        for handle in missing {
            if let Some(id) = self.register_gui_texture(handle) {
                self.gui_textures.insert(handle, id);
            }
        }
    }
}

fn apply_cursor(window: &Window, request: CursorRequest) {
    match request {
        CursorRequest::Capture => {
            let grabbed = window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined));
            if let Err(e) = grabbed {
                log::warn!("Could not grab the cursor: {}", e);
            }
            window.set_cursor_visible(false);
        }
        CursorRequest::Release => {
            if let Err(e) = window.set_cursor_grab(CursorGrabMode::None) {
                log::warn!("Could not release the cursor: {}", e);
            }
            window.set_cursor_visible(true);
        }
    }
}

impl AppState {
    fn redraw(&mut self, window: &Window) {
        let Some(runtime) = self.runtime.as_mut() else {
            return;
        };

        let delta_time = self.clock.tick();
        self.controller.update(&mut self.camera, delta_time);
        runtime.scene.update();

        let (width, height) = runtime.device.surface_size();
        let aspect = width as f32 / height.max(1) as f32;
        let capabilities = runtime.device.capabilities();
        runtime.renderer.set_camera(
            self.camera.view_matrix(),
            self.camera
                .projection_matrix(aspect, capabilities.depth_range),
        );
        runtime.renderer.set_clear_color(runtime.clear_color);
        runtime.device.collect_released();

        if let Err(e) = runtime.device.begin_frame() {
            log::warn!("Skipping frame: {}", e);
            return;
        }
        runtime.renderer.render_scene(&mut runtime.device, &runtime.scene);

        if self.controller.in_scene_mode() {
            runtime
                .renderer
                .present_to_surface(&mut runtime.device, (width, height));
            runtime.device.end_frame(|_, _, _, _| {});
            return;
        }

        runtime.sync_gui_textures();
        let viewport = runtime
            .viewport_texture
            .map(|id| (id, runtime.renderer.viewport_image(&capabilities, aspect)));
        let camera_position = self.camera.position.into();
        let rt = &mut *runtime;
        let response = rt.ui.update_logic(window, |ui| {
            let mut ctx = EditorContext {
                scene: &mut rt.scene,
                library: &mut rt.library,
                device: &mut rt.device,
                camera_position,
                clear_color: &mut rt.clear_color,
                viewport,
                textures: &rt.gui_textures,
            };
            draw_editor(ui, &mut rt.ui_state, &mut ctx)
        });

        match response {
            Some(response) => {
                let ui = &mut rt.ui;
                rt.device.end_frame(|device, queue, encoder, view| {
                    ui.render(device, queue, encoder, view)
                });
                self.handle_panel_response(window, response);
            }
            None => rt.device.end_frame(|_, _, _, _| {}),
        }
    }

    fn handle_panel_response(&mut self, window: &Window, response: PanelResponse) {
        if response.enter_scene_mode {
            apply_cursor(window, self.controller.engage(true));
        } else if response.engage_camera {
            apply_cursor(window, self.controller.engage(false));
        }
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let (width, height) = self.config.window_size;
        let attributes = WindowAttributes::default()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(width, height));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                self.init_error = Some(e.into());
                event_loop.exit();
                return;
            }
        };

        match Runtime::new(&self.config, window.clone()) {
            Ok(runtime) => {
                self.runtime = Some(runtime);
                self.window = Some(window);
            }
            Err(e) => {
                log::error!("{:#}", e);
                self.init_error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.clone() else {
            return;
        };

        // The GUI only sees input while the camera is free
        if !self.controller.is_engaged() {
            if let Some(runtime) = self.runtime.as_mut() {
                let ui_event: Event<()> = Event::WindowEvent {
                    window_id,
                    event: event.clone(),
                };
                if runtime.ui.handle_input(&window, &ui_event) {
                    window.request_redraw();
                    return;
                }
            }
        }

        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let Some(request) = self.controller.process_keyed_events(&event) {
                    apply_cursor(&window, request);
                }
            }
            WindowEvent::Focused(false) if self.controller.is_engaged() => {
                apply_cursor(&window, self.controller.disengage());
            }
            WindowEvent::Resized(PhysicalSize { width, height }) => {
                if let Some(runtime) = self.runtime.as_mut() {
                    runtime.device.resize(width, height);
                }
            }
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                self.redraw(&window);
            }
            _ => (),
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        self.controller.process_events(&event);
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_clock_caps_long_frames() {
        let mut clock = FrameClock {
            last: Instant::now() - std::time::Duration::from_secs(5),
        };
        assert_eq!(clock.tick(), MAX_FRAME_STEP);
        assert!(clock.tick() < MAX_FRAME_STEP);
    }
}
