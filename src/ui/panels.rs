//! The editor windows.
//!
//! Panels only read and write the scene and shader library through their public
//! operations. Form buffers and selections live in [`EditorUiState`], which the
//! application keeps across frames.

use std::collections::HashMap;

use cgmath::{Vector2, Vector3, Vector4};
use imgui::{Condition, Image, MouseButton, TextureId, Ui};

use crate::assets::{ShaderKind, ShaderLibrary};
use crate::gfx::device::{RenderDevice, TextureFilter, TextureHandle};
use crate::gfx::rendering::ViewportImage;
use crate::gfx::resources::{Texture, UniformBag, UniformBags, UniformType};
use crate::gfx::scene::{
    EntityId, MaterialId, ObjectId, Scene, ShaderSources, TextureId as SceneTextureId,
};

const ERROR_COLOR: [f32; 4] = [1.0, 0.35, 0.35, 1.0];
const MUTED_COLOR: [f32; 4] = [0.7, 0.7, 0.7, 1.0];
const SHADER_KINDS: [&str; 2] = ["Vertex Shader", "Fragment Shader"];
const UNIFORM_KINDS: [&str; 5] = ["int", "float", "vec2", "vec3", "vec4"];
const NAME_LIMIT: usize = 20;
const PREVIEW_SIZE: f32 = 128.0;

fn kind_index(kind: ShaderKind) -> usize {
    match kind {
        ShaderKind::Vertex => 0,
        ShaderKind::Fragment => 1,
    }
}

fn kind_from_index(index: usize) -> ShaderKind {
    if index == 0 {
        ShaderKind::Vertex
    } else {
        ShaderKind::Fragment
    }
}

/// Selections and form contents of the editor windows.
#[derive(Debug, Default)]
pub struct EditorUiState {
    selected_entity: Option<EntityId>,
    selected_shader: Option<String>,
    selected_material: Option<MaterialId>,
    selected_object: Option<ObjectId>,
    selected_texture: Option<SceneTextureId>,

    new_shader_name: String,
    new_shader_code: String,
    new_shader_kind: usize,

    editing_shader: bool,
    edit_shader_loaded: Option<String>,
    edit_shader_code: String,
    edit_shader_name: String,
    edit_shader_kind: usize,
    shader_status: Option<String>,

    material_vertex: usize,
    material_fragment: usize,
    material_texture: usize,
    material_name: String,
    material_error: Option<String>,

    object_mesh: usize,
    object_material: usize,
    object_name: String,
    object_error: Option<String>,

    entity_object: usize,
    entity_name: String,
    entity_translation: [f32; 3],
    entity_error: Option<String>,
    entity_rename: String,

    uniform_name: String,
    uniform_kind: usize,
}

impl EditorUiState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected_entity(&self) -> Option<EntityId> {
        self.selected_entity
    }

    pub fn selected_shader(&self) -> Option<&str> {
        self.selected_shader.as_deref()
    }

    fn select_shader(&mut self, file_name: Option<String>) {
        self.selected_shader = file_name;
        self.editing_shader = false;
        self.edit_shader_loaded = None;
        self.shader_status = None;
    }
}

/// What the panels need from the application for one frame.
pub struct EditorContext<'a> {
    pub scene: &'a mut Scene,
    pub library: &'a mut ShaderLibrary,
    pub device: &'a mut dyn RenderDevice,
    pub camera_position: [f32; 3],
    pub clear_color: &'a mut [f32; 4],
    /// GUI texture of the framebuffer and the region to show.
    pub viewport: Option<(TextureId, ViewportImage)>,
    /// GUI textures of registered scene textures.
    pub textures: &'a HashMap<TextureHandle, TextureId>,
}

/// Requests from the panels to the application.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PanelResponse {
    /// Leave the editor for the full window scene with the camera engaged.
    pub enter_scene_mode: bool,
    /// Engage the camera while staying in the editor.
    pub engage_camera: bool,
}

/// Draws every editor window.
pub fn draw_editor(ui: &Ui, state: &mut EditorUiState, ctx: &mut EditorContext<'_>) -> PanelResponse {
    let mut response = PanelResponse::default();

    settings_panel(ui, ctx, &mut response);
    entities_panel(ui, state, ctx);
    edit_entity_panel(ui, state, ctx);
    create_shader_panel(ui, state, ctx);
    shaders_panel(ui, state, ctx);
    edit_shader_panel(ui, state, ctx);
    create_material_panel(ui, state, ctx);
    create_object_panel(ui, state, ctx);
    create_entity_panel(ui, state, ctx);
    objects_panel(ui, state, ctx);
    materials_panel(ui, state, ctx);
    textures_panel(ui, state, ctx);
    scene_view_panel(ui, ctx, &mut response);

    response
}

fn settings_panel(ui: &Ui, ctx: &mut EditorContext<'_>, response: &mut PanelResponse) {
    ui.window("Settings")
        .position([10.0, 10.0], Condition::FirstUseEver)
        .size([300.0, 160.0], Condition::FirstUseEver)
        .build(|| {
            ui.text(format!("{:.1} FPS", ui.io().framerate));
            let [x, y, z] = ctx.camera_position;
            ui.text(format!("Camera: ({:.2}, {:.2}, {:.2})", x, y, z));
            if ui.button("Enter scene") {
                response.enter_scene_mode = true;
            }
            ui.text_colored(MUTED_COLOR, "Escape returns to the editor");
            ui.color_edit4("Clear color", &mut *ctx.clear_color);
        });
}

fn entities_panel(ui: &Ui, state: &mut EditorUiState, ctx: &mut EditorContext<'_>) {
    ui.window("Entities")
        .position([10.0, 180.0], Condition::FirstUseEver)
        .size([300.0, 200.0], Condition::FirstUseEver)
        .build(|| {
            for (id, name, _) in ctx.scene.entities().iter() {
                let selected = state.selected_entity == Some(id);
                if ui.selectable_config(name).selected(selected).build() {
                    state.selected_entity = if selected { None } else { Some(id) };
                    state.entity_rename = name.to_string();
                }
            }
        });
}

fn edit_entity_panel(ui: &Ui, state: &mut EditorUiState, ctx: &mut EditorContext<'_>) {
    ui.window("Edit Entity")
        .position([10.0, 390.0], Condition::FirstUseEver)
        .size([300.0, 280.0], Condition::FirstUseEver)
        .build(|| {
            let Some(id) = state.selected_entity else {
                ui.text_colored(MUTED_COLOR, "No entity selected");
                return;
            };
            let object_name = ctx
                .scene
                .entities()
                .get(id)
                .and_then(|entity| ctx.scene.objects().name_of(entity.object_id()))
                .unwrap_or("(deleted object)")
                .to_string();
            let Some(entity) = ctx.scene.entity_mut(id) else {
                state.selected_entity = None;
                return;
            };

            ui.text(format!("Object: {}", object_name));
            let transform = &mut entity.transform;

            let mut translate: [f32; 3] = transform.translate.into();
            if ui.input_float3("Translation", &mut translate).build() {
                transform.translate = translate.into();
            }

            let mut axis = [
                transform.rotate.x != 0.0,
                transform.rotate.y != 0.0,
                transform.rotate.z != 0.0,
            ];
            let mut axis_changed = ui.checkbox("X", &mut axis[0]);
            ui.same_line();
            axis_changed |= ui.checkbox("Y", &mut axis[1]);
            ui.same_line();
            axis_changed |= ui.checkbox("Z", &mut axis[2]);
            if axis_changed {
                transform.rotate = Vector3::new(
                    axis[0] as u8 as f32,
                    axis[1] as u8 as f32,
                    axis[2] as u8 as f32,
                );
            }
            ui.slider("Angle", 0.0, 360.0, &mut transform.angle);

            let mut scale: [f32; 3] = transform.scale.into();
            if ui.input_float3("Scale", &mut scale).build() {
                transform.scale = scale.into();
            }

            ui.separator();
            ui.input_text("Name", &mut state.entity_rename).build();
            ui.same_line();
            if ui.button("Rename") {
                let name = state.entity_rename.trim().to_string();
                if let Err(e) = ctx.scene.entities_mut().rename(id, &name) {
                    state.entity_error = Some(e.to_string());
                } else {
                    state.entity_error = None;
                }
            }
            if let Some(error) = &state.entity_error {
                ui.text_colored(ERROR_COLOR, error);
            }
            if ui.button("Delete") {
                ctx.scene.delete_entity(id);
                state.selected_entity = None;
            }
        });
}

fn create_shader_panel(ui: &Ui, state: &mut EditorUiState, ctx: &mut EditorContext<'_>) {
    ui.window("Create Shader")
        .position([320.0, 10.0], Condition::FirstUseEver)
        .size([420.0, 320.0], Condition::FirstUseEver)
        .build(|| {
            let [width, height] = ui.content_region_avail();
            ui.input_text_multiline(
                "##Code editor",
                &mut state.new_shader_code,
                [width, (height - 60.0).max(60.0)],
            )
            .allow_tab_input(true)
            .build();
            ui.input_text("Name", &mut state.new_shader_name).build();
            ui.combo_simple_string("Type", &mut state.new_shader_kind, &SHADER_KINDS);

            if ui.button("Upload") && state.new_shader_name.len() <= NAME_LIMIT {
                let kind = kind_from_index(state.new_shader_kind);
                match ctx
                    .library
                    .create(&state.new_shader_name, kind, &state.new_shader_code)
                {
                    Ok(_) => {
                        state.new_shader_name.clear();
                        state.new_shader_code.clear();
                    }
                    Err(e) => log::warn!("Shader not created: {:#}", e),
                }
            }
        });
}

fn shaders_panel(ui: &Ui, state: &mut EditorUiState, ctx: &mut EditorContext<'_>) {
    ui.window("Shaders")
        .position([320.0, 340.0], Condition::FirstUseEver)
        .size([200.0, 200.0], Condition::FirstUseEver)
        .build(|| {
            let mut clicked = None;
            for (file_name, _) in ctx.library.iter() {
                let selected = state.selected_shader.as_deref() == Some(file_name);
                if ui.selectable_config(file_name).selected(selected).build() {
                    clicked = Some((file_name.to_string(), selected));
                }
            }
            if let Some((file_name, was_selected)) = clicked {
                state.select_shader((!was_selected).then_some(file_name));
            }
        });
}

fn edit_shader_panel(ui: &Ui, state: &mut EditorUiState, ctx: &mut EditorContext<'_>) {
    ui.window("Edit Shader")
        .position([750.0, 10.0], Condition::FirstUseEver)
        .size([420.0, 360.0], Condition::FirstUseEver)
        .build(|| {
            let Some(file_name) = state.selected_shader.clone() else {
                ui.text_colored(MUTED_COLOR, "No shader selected");
                return;
            };
            let Some(source) = ctx.library.get(&file_name) else {
                state.select_shader(None);
                return;
            };
            if state.edit_shader_loaded.as_deref() != Some(file_name.as_str()) {
                state.edit_shader_code = source.to_string();
                state.edit_shader_name = file_name
                    .rsplit_once('.')
                    .map(|(stem, _)| stem.to_string())
                    .unwrap_or_else(|| file_name.clone());
                state.edit_shader_kind =
                    kind_index(ShaderKind::of_file(&file_name).unwrap_or(ShaderKind::Vertex));
                state.edit_shader_loaded = Some(file_name.clone());
            }

            ui.text(format!("Shader: {}", file_name));
            let [width, height] = ui.content_region_avail();
            ui.input_text_multiline(
                "##Shader editor",
                &mut state.edit_shader_code,
                [width, (height - 90.0).max(60.0)],
            )
            .read_only(!state.editing_shader)
            .allow_tab_input(true)
            .build();

            if state.editing_shader {
                ui.input_text("New Name", &mut state.edit_shader_name).build();
                ui.combo_simple_string("New Type", &mut state.edit_shader_kind, &SHADER_KINDS);
                if ui.button("Save") {
                    save_shader(state, ctx, &file_name);
                }
                ui.same_line();
                if ui.button("Cancel") {
                    state.select_shader(Some(file_name.clone()));
                }
            } else if ui.button("Edit") {
                state.editing_shader = true;
            }
            ui.same_line();
            if ui.button("Delete") {
                match ctx.library.delete(&file_name) {
                    Ok(()) => state.select_shader(None),
                    Err(e) => state.shader_status = Some(format!("{:#}", e)),
                }
            }

            if let Some(status) = &state.shader_status {
                ui.text_colored(ERROR_COLOR, status);
            }
        });
}

/// Writes the edited shader and rebuilds the materials compiled from it.
fn save_shader(state: &mut EditorUiState, ctx: &mut EditorContext<'_>, file_name: &str) {
    let kind = kind_from_index(state.edit_shader_kind);
    let saved = match ctx.library.update(
        file_name,
        &state.edit_shader_name,
        kind,
        &state.edit_shader_code,
    ) {
        Ok(saved) => saved,
        Err(e) => {
            state.shader_status = Some(format!("{:#}", e));
            return;
        }
    };
    if saved != file_name {
        ctx.scene.rename_shader_file(file_name, &saved);
    }

    let library = &*ctx.library;
    let failures: Vec<String> = ctx
        .scene
        .recompile_shader_file(&mut *ctx.device, &saved, |name| {
            library.get(name).map(str::to_string)
        })
        .into_iter()
        .filter_map(|(_, result)| result.err())
        .map(|error| error.to_string())
        .collect();

    state.select_shader(Some(saved));
    if !failures.is_empty() {
        state.shader_status = Some(failures.join("\n"));
    }
}

fn create_material_panel(ui: &Ui, state: &mut EditorUiState, ctx: &mut EditorContext<'_>) {
    ui.window("Create Material")
        .position([750.0, 380.0], Condition::FirstUseEver)
        .size([360.0, 220.0], Condition::FirstUseEver)
        .build(|| {
            let vertex_files: Vec<String> =
                ctx.library.names(ShaderKind::Vertex).map(str::to_string).collect();
            let fragment_files: Vec<String> = ctx
                .library
                .names(ShaderKind::Fragment)
                .map(str::to_string)
                .collect();
            let mut texture_names = vec!["(none)".to_string()];
            let texture_ids: Vec<SceneTextureId> = ctx
                .scene
                .textures()
                .iter()
                .map(|(id, name, _)| {
                    texture_names.push(name.to_string());
                    id
                })
                .collect();

            ui.combo_simple_string("Vertex shader", &mut state.material_vertex, &vertex_files);
            ui.combo_simple_string(
                "Fragment shader",
                &mut state.material_fragment,
                &fragment_files,
            );
            ui.combo_simple_string("Texture", &mut state.material_texture, &texture_names);
            ui.input_text("Name", &mut state.material_name).build();

            if ui.button("Create") {
                let (Some(vertex_name), Some(fragment_name)) = (
                    vertex_files.get(state.material_vertex),
                    fragment_files.get(state.material_fragment),
                ) else {
                    state.material_error = Some("Pick a vertex and a fragment shader".to_string());
                    return;
                };
                let texture = state
                    .material_texture
                    .checked_sub(1)
                    .and_then(|index| texture_ids.get(index).copied());
                let sources = ShaderSources {
                    vertex_name,
                    vertex: ctx.library.get(vertex_name).unwrap_or_default(),
                    fragment_name,
                    fragment: ctx.library.get(fragment_name).unwrap_or_default(),
                };
                match ctx.scene.create_material(
                    &mut *ctx.device,
                    state.material_name.trim(),
                    sources,
                    texture,
                    UniformBags::default(),
                ) {
                    Ok(_) => {
                        state.material_error = None;
                        state.material_name.clear();
                    }
                    Err(e) => state.material_error = Some(e.to_string()),
                }
            }
            if let Some(error) = &state.material_error {
                ui.text_colored(ERROR_COLOR, error);
            }
        });
}

fn create_object_panel(ui: &Ui, state: &mut EditorUiState, ctx: &mut EditorContext<'_>) {
    ui.window("Create Object")
        .position([1120.0, 10.0], Condition::FirstUseEver)
        .size([300.0, 160.0], Condition::FirstUseEver)
        .build(|| {
            let (mesh_ids, mesh_names): (Vec<_>, Vec<String>) = ctx
                .scene
                .meshes()
                .iter()
                .map(|(id, name, _)| (id, name.to_string()))
                .unzip();
            let (material_ids, material_names): (Vec<_>, Vec<String>) = ctx
                .scene
                .materials()
                .iter()
                .map(|(id, name, _)| (id, name.to_string()))
                .unzip();

            ui.combo_simple_string("Mesh", &mut state.object_mesh, &mesh_names);
            ui.combo_simple_string("Material", &mut state.object_material, &material_names);
            ui.input_text("Name", &mut state.object_name).build();

            if ui.button("Create") {
                let (Some(mesh), Some(material)) = (
                    mesh_ids.get(state.object_mesh),
                    material_ids.get(state.object_material),
                ) else {
                    state.object_error = Some("Pick a mesh and a material".to_string());
                    return;
                };
                match ctx
                    .scene
                    .create_object(state.object_name.trim(), *mesh, *material)
                {
                    Ok(_) => {
                        state.object_error = None;
                        state.object_name.clear();
                    }
                    Err(e) => state.object_error = Some(e.to_string()),
                }
            }
            if let Some(error) = &state.object_error {
                ui.text_colored(ERROR_COLOR, error);
            }
        });
}

fn create_entity_panel(ui: &Ui, state: &mut EditorUiState, ctx: &mut EditorContext<'_>) {
    ui.window("Create Entity")
        .position([1120.0, 180.0], Condition::FirstUseEver)
        .size([300.0, 160.0], Condition::FirstUseEver)
        .build(|| {
            let (object_ids, object_names): (Vec<_>, Vec<String>) = ctx
                .scene
                .objects()
                .iter()
                .map(|(id, name, _)| (id, name.to_string()))
                .unzip();

            ui.combo_simple_string("Object", &mut state.entity_object, &object_names);
            ui.input_text("Name", &mut state.entity_name).build();
            ui.input_float3("Translation", &mut state.entity_translation)
                .build();

            if ui.button("Create") {
                let Some(object) = object_ids.get(state.entity_object) else {
                    state.entity_error = Some("Pick an object".to_string());
                    return;
                };
                match ctx.scene.create_entity(
                    state.entity_name.trim(),
                    *object,
                    state.entity_translation.into(),
                ) {
                    Ok(id) => {
                        state.entity_error = None;
                        state.entity_name.clear();
                        state.selected_entity = Some(id);
                    }
                    Err(e) => state.entity_error = Some(e.to_string()),
                }
            }
            if let Some(error) = &state.entity_error {
                ui.text_colored(ERROR_COLOR, error);
            }
        });
}

fn objects_panel(ui: &Ui, state: &mut EditorUiState, ctx: &mut EditorContext<'_>) {
    ui.window("Objects")
        .position([1120.0, 350.0], Condition::FirstUseEver)
        .size([300.0, 200.0], Condition::FirstUseEver)
        .build(|| {
            for (id, name, _) in ctx.scene.objects().iter() {
                let selected = state.selected_object == Some(id);
                if ui.selectable_config(name).selected(selected).build() {
                    state.selected_object = if selected { None } else { Some(id) };
                }
            }

            let Some(id) = state.selected_object else {
                return;
            };
            let Some(object) = ctx.scene.objects().get(id) else {
                state.selected_object = None;
                return;
            };
            ui.separator();
            let mesh = ctx.scene.meshes().name_of(object.mesh_id());
            let material = ctx.scene.materials().name_of(object.material_id());
            ui.text(format!("Mesh: {}", mesh.unwrap_or("(deleted)")));
            ui.text(format!("Material: {}", material.unwrap_or("(deleted)")));
            ui.text(format!(
                "{} vertices, {} elements",
                object.mesh().vertex_count(),
                object.mesh().element_count()
            ));
            if ui.button("Delete object") {
                ctx.scene.delete_object(id);
                state.selected_object = None;
            }
        });
}

fn texture_preview(ui: &Ui, ctx: &EditorContext<'_>, texture: &Texture) {
    if let Some(id) = ctx.textures.get(&texture.handle()) {
        let aspect = texture.width() as f32 / texture.height().max(1) as f32;
        Image::new(*id, [PREVIEW_SIZE * aspect, PREVIEW_SIZE])
            .uv0([0.0, 1.0])
            .uv1([1.0, 0.0])
            .build(ui);
    }
}

fn uniform_editor<T: UniformType>(
    ui: &Ui,
    bag: &mut UniformBag<T>,
    mut edit: impl FnMut(&Ui, &str, &mut T),
) {
    for (name, value) in bag.iter_mut() {
        edit(ui, name, value);
    }
}

fn materials_panel(ui: &Ui, state: &mut EditorUiState, ctx: &mut EditorContext<'_>) {
    ui.window("Materials")
        .position([1120.0, 560.0], Condition::FirstUseEver)
        .size([340.0, 380.0], Condition::FirstUseEver)
        .build(|| {
            for (id, name, _) in ctx.scene.materials().iter() {
                let selected = state.selected_material == Some(id);
                if ui.selectable_config(name).selected(selected).build() {
                    state.selected_material = if selected { None } else { Some(id) };
                }
            }

            let Some(id) = state.selected_material else {
                return;
            };
            let Some(asset) = ctx.scene.materials().get(id) else {
                state.selected_material = None;
                return;
            };
            ui.separator();
            ui.text(format!("Vertex: {}", asset.vertex_shader));
            ui.text(format!("Fragment: {}", asset.fragment_shader));

            {
                let material = asset.material.borrow();
                if let Some(texture) = material.texture() {
                    texture_preview(ui, ctx, texture);
                }
                ui.text_colored(MUTED_COLOR, material.shader().vertex_source());
                ui.text_colored(MUTED_COLOR, material.shader().fragment_source());
            }

            ui.separator();
            {
                let mut material = asset.material.borrow_mut();
                let uniforms = material.uniforms_mut();
                uniform_editor(ui, &mut uniforms.ints, |ui, name, value| {
                    ui.input_int(name, value).build();
                });
                uniform_editor(ui, &mut uniforms.floats, |ui, name, value| {
                    ui.input_float(name, value).build();
                });
                uniform_editor(ui, &mut uniforms.vec2s, |ui, name, value| {
                    let mut v: [f32; 2] = (*value).into();
                    if ui.input_float2(name, &mut v).build() {
                        *value = v.into();
                    }
                });
                uniform_editor(ui, &mut uniforms.vec3s, |ui, name, value| {
                    let mut v: [f32; 3] = (*value).into();
                    if ui.input_float3(name, &mut v).build() {
                        *value = v.into();
                    }
                });
                uniform_editor(ui, &mut uniforms.vec4s, |ui, name, value| {
                    let mut v: [f32; 4] = (*value).into();
                    if ui.input_float4(name, &mut v).build() {
                        *value = v.into();
                    }
                });

                ui.input_text("Uniform", &mut state.uniform_name).build();
                ui.combo_simple_string("Uniform type", &mut state.uniform_kind, &UNIFORM_KINDS);
                let name = state.uniform_name.trim();
                if ui.button("Add uniform") && !name.is_empty() {
                    match state.uniform_kind {
                        0 => uniforms.ints.set(name, i32::initial()),
                        1 => uniforms.floats.set(name, f32::initial()),
                        2 => uniforms.vec2s.set(name, Vector2::initial()),
                        3 => uniforms.vec3s.set(name, Vector3::initial()),
                        _ => uniforms.vec4s.set(name, Vector4::initial()),
                    }
                    state.uniform_name.clear();
                }
            }

            if ui.button("Delete material") {
                ctx.scene.delete_material(id);
                state.selected_material = None;
            }
        });
}

fn textures_panel(ui: &Ui, state: &mut EditorUiState, ctx: &mut EditorContext<'_>) {
    ui.window("Textures")
        .position([530.0, 550.0], Condition::FirstUseEver)
        .size([260.0, 320.0], Condition::FirstUseEver)
        .build(|| {
            for (id, name, _) in ctx.scene.textures().iter() {
                let selected = state.selected_texture == Some(id);
                if ui.selectable_config(name).selected(selected).build() {
                    state.selected_texture = if selected { None } else { Some(id) };
                }
            }

            let Some(texture) = state
                .selected_texture
                .and_then(|id| ctx.scene.textures().get(id))
                .cloned()
            else {
                return;
            };
            ui.separator();
            ui.text(format!(
                "{}x{}, {} channels",
                texture.width(),
                texture.height(),
                texture.channels()
            ));
            if texture.is_placeholder() {
                ui.text_colored(ERROR_COLOR, "Failed to decode, showing placeholder");
            }
            texture_preview(ui, ctx, &texture);

            let filter = texture.filter();
            if ui.radio_button_bool("Nearest", filter == TextureFilter::Nearest) {
                texture.set_filter(&mut *ctx.device, TextureFilter::Nearest);
            }
            ui.same_line();
            if ui.radio_button_bool("Linear", filter == TextureFilter::Linear) {
                texture.set_filter(&mut *ctx.device, TextureFilter::Linear);
            }
        });
}

fn scene_view_panel(ui: &Ui, ctx: &mut EditorContext<'_>, response: &mut PanelResponse) {
    ui.window("Scene View")
        .position([320.0, 550.0], Condition::FirstUseEver)
        .size([480.0, 360.0], Condition::FirstUseEver)
        .build(|| {
            let Some((texture, image)) = ctx.viewport else {
                ui.text_colored(MUTED_COLOR, "Framebuffer unavailable");
                return;
            };
            let size = image.fit(ui.content_region_avail());
            Image::new(texture, size)
                .uv0(image.uv0)
                .uv1(image.uv1)
                .build(ui);
            if ui.is_item_hovered() && ui.is_mouse_double_clicked(MouseButton::Left) {
                response.engage_camera = true;
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_kind_indices_round_trip() {
        for kind in [ShaderKind::Vertex, ShaderKind::Fragment] {
            assert_eq!(kind_from_index(kind_index(kind)), kind);
        }
    }

    #[test]
    fn test_selecting_shader_resets_editor() {
        let mut state = EditorUiState::new();
        state.editing_shader = true;
        state.shader_status = Some("old".to_string());
        state.select_shader(Some("default.vert".to_string()));

        assert_eq!(state.selected_shader(), Some("default.vert"));
        assert!(!state.editing_shader);
        assert!(state.shader_status.is_none());
        assert!(state.edit_shader_loaded.is_none());
    }
}
