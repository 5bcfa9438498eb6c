use std::collections::HashSet;

use winit::{
    dpi::PhysicalPosition,
    event::{DeviceEvent, ElementState, KeyEvent, MouseScrollDelta},
    keyboard::{KeyCode, PhysicalKey},
};

use super::fly_camera::{CameraMovement, FlyCamera};

/// What the window should do after an input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorRequest {
    /// Hide and lock the cursor for mouse look.
    Capture,
    /// Show and free the cursor.
    Release,
}

/// Input accumulated between two frames.
#[derive(Debug, Default)]
pub struct InputState {
    held: HashSet<CameraMovement>,
    look_delta: (f32, f32),
    scroll_delta: f32,
}

impl InputState {
    pub fn is_held(&self, movement: CameraMovement) -> bool {
        self.held.contains(&movement)
    }

    pub fn pending_look(&self) -> (f32, f32) {
        self.look_delta
    }

    fn clear_motion(&mut self) {
        self.look_delta = (0.0, 0.0);
        self.scroll_delta = 0.0;
    }
}

/// Routes keyboard and mouse input to a [`FlyCamera`].
///
/// The camera only reacts while engaged: after the user enters the immersive scene
/// mode or double-clicks the scene view. Escape disengages and leaves scene mode.
#[derive(Debug, Default)]
pub struct CameraController {
    input: InputState,
    engaged: bool,
    scene_mode: bool,
}

impl CameraController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    /// True while the scene is presented full screen instead of inside the editor.
    pub fn in_scene_mode(&self) -> bool {
        self.scene_mode
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    /// Starts mouse look; `scene_mode` also switches to the full screen scene.
    pub fn engage(&mut self, scene_mode: bool) -> CursorRequest {
        self.engaged = true;
        self.scene_mode |= scene_mode;
        self.input.clear_motion();
        CursorRequest::Capture
    }

    pub fn disengage(&mut self) -> CursorRequest {
        self.engaged = false;
        self.scene_mode = false;
        self.input.held.clear();
        self.input.clear_motion();
        CursorRequest::Release
    }

    pub fn press(&mut self, movement: CameraMovement) {
        if self.engaged {
            self.input.held.insert(movement);
        }
    }

    pub fn release(&mut self, movement: CameraMovement) {
        self.input.held.remove(&movement);
    }

    /// Mouse motion in pixels, y growing downwards.
    pub fn add_look(&mut self, dx: f32, dy: f32) {
        if self.engaged {
            self.input.look_delta.0 += dx;
            self.input.look_delta.1 += dy;
        }
    }

    pub fn add_scroll(&mut self, lines: f32) {
        if self.engaged {
            self.input.scroll_delta += lines;
        }
    }

    pub fn process_keyed_events(&mut self, event: &KeyEvent) -> Option<CursorRequest> {
        let PhysicalKey::Code(code) = event.physical_key else {
            return None;
        };
        let pressed = event.state == ElementState::Pressed;
        if code == KeyCode::Escape {
            return (pressed && (self.engaged || self.scene_mode)).then(|| self.disengage());
        }
        let movement = match code {
            KeyCode::KeyW => CameraMovement::Forward,
            KeyCode::KeyS => CameraMovement::Backward,
            KeyCode::KeyA => CameraMovement::Left,
            KeyCode::KeyD => CameraMovement::Right,
            KeyCode::Space => CameraMovement::Up,
            KeyCode::ShiftLeft => CameraMovement::Down,
            _ => return None,
        };
        if pressed {
            self.press(movement);
        } else {
            self.release(movement);
        }
        None
    }

    pub fn process_events(&mut self, event: &DeviceEvent) {
        match event {
            DeviceEvent::MouseMotion { delta } => {
                self.add_look(delta.0 as f32, delta.1 as f32);
            }
            DeviceEvent::MouseWheel { delta } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, scroll) => *scroll,
                    MouseScrollDelta::PixelDelta(PhysicalPosition { y, .. }) => *y as f32 / 20.0,
                };
                self.add_scroll(lines);
            }
            _ => (),
        }
    }

    /// Applies everything accumulated since the last frame.
    pub fn update(&mut self, camera: &mut FlyCamera, delta_time: f32) {
        if self.engaged {
            for movement in &self.input.held {
                camera.process_keyboard(*movement, delta_time);
            }
            let (dx, dy) = self.input.look_delta;
            if dx != 0.0 || dy != 0.0 {
                camera.process_mouse_movement(dx, -dy, true);
            }
            if self.input.scroll_delta != 0.0 {
                camera.process_mouse_scroll(self.input.scroll_delta);
            }
        }
        self.input.clear_motion();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_ignored_until_engaged() {
        let mut controller = CameraController::new();
        let mut camera = FlyCamera::default();
        controller.press(CameraMovement::Forward);
        controller.add_look(100.0, 0.0);
        controller.update(&mut camera, 1.0);

        assert_eq!(camera.position, FlyCamera::default().position);
        assert_eq!(camera.yaw, -90.0);
    }

    #[test]
    fn test_engaged_controller_moves_camera() {
        let mut controller = CameraController::new();
        let mut camera = FlyCamera::default();
        assert_eq!(controller.engage(false), CursorRequest::Capture);

        controller.press(CameraMovement::Backward);
        controller.add_look(0.0, -50.0);
        controller.update(&mut camera, 0.25);

        assert!((camera.position.z - 4.0).abs() < 1e-5);
        // mouse moved up, camera pitches up
        assert!((camera.pitch - 5.0).abs() < 1e-5);
        assert_eq!(controller.input().pending_look(), (0.0, 0.0));
    }

    #[test]
    fn test_disengage_leaves_scene_mode() {
        let mut controller = CameraController::new();
        controller.engage(true);
        controller.press(CameraMovement::Left);
        assert!(controller.in_scene_mode());

        assert_eq!(controller.disengage(), CursorRequest::Release);
        assert!(!controller.in_scene_mode());
        assert!(!controller.is_engaged());
        assert!(!controller.input().is_held(CameraMovement::Left));
    }
}
