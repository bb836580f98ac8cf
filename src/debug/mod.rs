use crate::config::{GameConfig, VehicleConfig, CONFIG_DIR};
use crate::gameplay::session::DriveSimulation;
use crate::gameplay::vehicle::{KinematicTuning, VehicleInputState};
use crate::states::GameState;
use bevy::diagnostic::{DiagnosticsStore, FrameTimeDiagnosticsPlugin};
use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPrimaryContextPass};
use std::fs;
use std::path::Path;

const HITBOX_MARKER_SIZE: f32 = 0.15;
const MIN_TUNING_VALUE: f32 = 1.0e-4;

pub struct DebugOverlayPlugin;

impl Plugin for DebugOverlayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<KeybindOverlayState>()
            .init_resource::<HitboxGizmoState>()
            .init_resource::<VehicleTuningPanelState>()
            .add_systems(Update, spawn_debug_overlay)
            .add_systems(
                Update,
                (
                    toggle_keybind_overlay,
                    toggle_hitbox_gizmos,
                    toggle_vehicle_tuning_panel,
                ),
            )
            .add_systems(Update, sync_keybind_overlay_visibility)
            .add_systems(
                Update,
                cycle_collision_profile
                    .run_if(in_state(GameState::Ready))
                    .run_if(resource_exists::<GameConfig>),
            )
            .add_systems(
                Update,
                (update_debug_overlay_text, draw_hitbox_gizmos)
                    .run_if(resource_exists::<DriveSimulation>),
            )
            .add_systems(
                EguiPrimaryContextPass,
                vehicle_tuning_panel_ui.run_if(resource_exists::<GameConfig>),
            );
    }
}

#[derive(Component)]
struct DebugOverlayText;

#[derive(Component)]
struct KeybindOverlayText;

#[derive(Resource, Debug, Clone, Default)]
struct KeybindOverlayState {
    visible: bool,
}

#[derive(Resource, Debug, Clone, Default)]
struct HitboxGizmoState {
    visible: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct VehicleTuningParams {
    acceleration: f32,
    speed_limit: f32,
    nitro_acceleration: f32,
    nitro_speed_limit: f32,
    idle_decay_step: f32,
    idle_snap_threshold: f32,
    angle_increment_deg: f32,
}

impl VehicleTuningParams {
    fn from_vehicle(vehicle: &VehicleConfig) -> Self {
        Self {
            acceleration: vehicle.acceleration,
            speed_limit: vehicle.speed_limit,
            nitro_acceleration: vehicle.nitro_acceleration,
            nitro_speed_limit: vehicle.nitro_speed_limit,
            idle_decay_step: vehicle.idle_decay_step,
            idle_snap_threshold: vehicle.idle_snap_threshold,
            angle_increment_deg: vehicle.angle_increment_deg,
        }
    }

    fn clamped(&self) -> Self {
        Self {
            acceleration: self.acceleration.max(MIN_TUNING_VALUE),
            speed_limit: self.speed_limit.max(MIN_TUNING_VALUE),
            nitro_acceleration: self.nitro_acceleration.max(MIN_TUNING_VALUE),
            nitro_speed_limit: self.nitro_speed_limit.max(MIN_TUNING_VALUE),
            idle_decay_step: self.idle_decay_step.max(MIN_TUNING_VALUE),
            idle_snap_threshold: self.idle_snap_threshold.max(0.0),
            angle_increment_deg: self.angle_increment_deg.max(0.0),
        }
    }

    fn apply_to_vehicle(&self, vehicle: &mut VehicleConfig) {
        vehicle.acceleration = self.acceleration;
        vehicle.speed_limit = self.speed_limit;
        vehicle.nitro_acceleration = self.nitro_acceleration;
        vehicle.nitro_speed_limit = self.nitro_speed_limit;
        vehicle.idle_decay_step = self.idle_decay_step;
        vehicle.idle_snap_threshold = self.idle_snap_threshold;
        vehicle.angle_increment_deg = self.angle_increment_deg;
    }

    fn entries(&self) -> [(&'static str, f32); 7] {
        [
            ("acceleration", self.acceleration),
            ("speed_limit", self.speed_limit),
            ("nitro_acceleration", self.nitro_acceleration),
            ("nitro_speed_limit", self.nitro_speed_limit),
            ("idle_decay_step", self.idle_decay_step),
            ("idle_snap_threshold", self.idle_snap_threshold),
            ("angle_increment_deg", self.angle_increment_deg),
        ]
    }
}

#[derive(Resource, Debug, Default)]
struct VehicleTuningPanelState {
    visible: bool,
    params: Option<VehicleTuningParams>,
    status: String,
}

fn spawn_debug_overlay(
    mut commands: Commands,
    keybind_overlay: Res<KeybindOverlayState>,
    config: Option<Res<GameConfig>>,
    existing_overlay: Query<Entity, With<DebugOverlayText>>,
) {
    if !existing_overlay.is_empty() {
        return;
    }

    let Some(config) = config else {
        return;
    };

    if !config.game.app.debug_overlay {
        return;
    }

    commands.spawn((
        DebugOverlayText,
        Text::new("debug overlay initializing..."),
        TextFont {
            font_size: 16.0,
            ..default()
        },
        TextColor(Color::srgb(0.92, 0.95, 0.97)),
        Node {
            position_type: PositionType::Absolute,
            left: Val::Px(12.0),
            top: Val::Px(12.0),
            ..default()
        },
        ZIndex(100),
    ));

    commands.spawn((
        KeybindOverlayText,
        Text::new(keybind_overlay_text()),
        TextFont {
            font_size: 15.0,
            ..default()
        },
        TextColor(Color::srgb(0.90, 0.94, 0.97)),
        BackgroundColor(Color::srgba(0.06, 0.08, 0.10, 0.82)),
        BorderColor::all(Color::srgba(0.60, 0.68, 0.74, 0.9)),
        Node {
            position_type: PositionType::Absolute,
            right: Val::Px(12.0),
            top: Val::Px(12.0),
            padding: UiRect::axes(Val::Px(10.0), Val::Px(8.0)),
            border: UiRect::all(Val::Px(1.0)),
            ..default()
        },
        if keybind_overlay.visible {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        },
        ZIndex(100),
    ));
}

fn update_debug_overlay_text(
    diagnostics: Res<DiagnosticsStore>,
    simulation: Res<DriveSimulation>,
    input_state: Option<Res<VehicleInputState>>,
    mut overlay_query: Query<&mut Text, With<DebugOverlayText>>,
) {
    let Ok(mut text) = overlay_query.single_mut() else {
        return;
    };

    let fps = diagnostics
        .get(&FrameTimeDiagnosticsPlugin::FPS)
        .and_then(|value| value.smoothed())
        .unwrap_or(0.0);

    let vehicle = simulation.vehicle();
    let session = simulation.session();
    let profile = simulation.profile();
    let input = input_state.map(|state| *state).unwrap_or_default();
    let flag = |held: bool| if held { "on" } else { "-" };

    *text = Text::new(format!(
        "FPS: {fps:>5.1}\nTime: {elapsed:>5.1}s / {limit:.0}s (left {remaining:.1}s)\nSpeed: {speed:>6.2} (limit {limit_speed:.1}){nitro}\nDistance: {distance:>7.1}\nCollisions: {collisions}/{threshold} | Outcome: {outcome}\nProfile: {profile} ({shape}, {samples} samples, leeway {leeway:.2})\nObstacles: {intact} intact / {total} total ({spawned} spawned)\nInput: fwd={fwd} rev={rev} right={right} left={left} nitro={nitro_key}\nHotkeys: F1 help | V tune | L hitboxes | P profile | F5 reload config",
        elapsed = session.elapsed_s(),
        limit = session.time_limit_s(),
        remaining = session.remaining_s(),
        speed = vehicle.speed(),
        limit_speed = vehicle.speed_limit(),
        nitro = if vehicle.nitro_active() { " NITRO" } else { "" },
        distance = simulation.distance(),
        collisions = session.collision_count(),
        threshold = session.loss_threshold(),
        outcome = session.outcome().label(),
        profile = profile.id,
        shape = profile.test.label(),
        samples = profile.points.len(),
        leeway = profile.leeway,
        intact = simulation.obstacles().intact_count(),
        total = simulation.obstacles().len(),
        spawned = simulation.spawner().spawned_count(),
        fwd = flag(input.forward),
        rev = flag(input.reverse),
        right = flag(input.right),
        left = flag(input.left),
        nitro_key = flag(input.nitro),
    ));
}

fn toggle_keybind_overlay(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut state: ResMut<KeybindOverlayState>,
    config: Option<Res<GameConfig>>,
) {
    let Some(config) = config else {
        return;
    };

    if !config.game.app.debug_overlay {
        return;
    }

    if keyboard.just_pressed(KeyCode::F1) {
        state.visible = !state.visible;
        info!(
            "Debug keybind panel {}.",
            if state.visible { "shown" } else { "hidden" }
        );
    }
}

fn sync_keybind_overlay_visibility(
    state: Res<KeybindOverlayState>,
    mut query: Query<&mut Visibility, With<KeybindOverlayText>>,
) {
    if !state.is_changed() {
        return;
    }

    let next_visibility = if state.visible {
        Visibility::Inherited
    } else {
        Visibility::Hidden
    };

    for mut visibility in &mut query {
        *visibility = next_visibility;
    }
}

fn toggle_hitbox_gizmos(keyboard: Res<ButtonInput<KeyCode>>, mut state: ResMut<HitboxGizmoState>) {
    if keyboard.just_pressed(KeyCode::KeyL) {
        state.visible = !state.visible;
        info!(
            "Hitbox gizmos {}.",
            if state.visible { "shown" } else { "hidden" }
        );
    }
}

fn draw_hitbox_gizmos(
    state: Res<HitboxGizmoState>,
    simulation: Res<DriveSimulation>,
    mut gizmos: Gizmos,
) {
    if !state.visible {
        return;
    }

    let profile = simulation.profile();
    let vehicle_body = profile.body(simulation.vehicle().hitbox_transform());
    draw_sample_markers(
        &mut gizmos,
        vehicle_body.world(),
        vehicle_body.sample_points(),
        Color::srgb(0.2, 0.9, 1.0),
    );

    let vehicle_z = simulation.vehicle().position().z;
    for obstacle in simulation.obstacles().iter() {
        if !simulation.spawner().is_drawn(obstacle, vehicle_z) {
            continue;
        }
        let body = obstacle.body();
        draw_sample_markers(
            &mut gizmos,
            body.world(),
            body.sample_points(),
            Color::srgb(1.0, 0.35, 0.2),
        );
    }
}

fn draw_sample_markers(gizmos: &mut Gizmos, world: Mat4, points: &[Vec3], color: Color) {
    for point in points {
        let pos = world.transform_point3(*point);
        for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
            let arm = axis * HITBOX_MARKER_SIZE;
            gizmos.line(pos + arm, pos - arm, color);
        }
    }
}

fn cycle_collision_profile(
    mut commands: Commands,
    keyboard: Res<ButtonInput<KeyCode>>,
    mut config: ResMut<GameConfig>,
) {
    if !keyboard.just_pressed(KeyCode::KeyP) {
        return;
    }

    let ids: Vec<&str> = config
        .game
        .collision
        .profiles
        .iter()
        .map(|profile| profile.id.as_str())
        .collect();
    let Some(next_id) = next_profile_id(&ids, &config.game.collision.active_profile) else {
        return;
    };
    let next_id = next_id.to_string();

    config.game.collision.active_profile = next_id.clone();
    match DriveSimulation::from_config(&config) {
        Some(simulation) => {
            info!(
                "Collision profile switched to `{next_id}` ({} samples).",
                simulation.profile().points.len()
            );
            commands.insert_resource(simulation);
        }
        None => error!("Collision profile `{next_id}` could not build a session."),
    }
}

fn next_profile_id<'a>(ids: &[&'a str], current: &str) -> Option<&'a str> {
    if ids.is_empty() {
        return None;
    }
    let next_index = ids
        .iter()
        .position(|id| *id == current)
        .map_or(0, |index| (index + 1) % ids.len());
    Some(ids[next_index])
}

fn toggle_vehicle_tuning_panel(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut panel_state: ResMut<VehicleTuningPanelState>,
    config: Option<Res<GameConfig>>,
) {
    if !keyboard.just_pressed(KeyCode::KeyV) {
        return;
    }

    panel_state.visible = !panel_state.visible;
    if panel_state.visible {
        if let Some(config) = config {
            panel_state.params = Some(VehicleTuningParams::from_vehicle(&config.vehicle.vehicle));
        }
        info!("Vehicle tuning panel shown.");
    } else {
        info!("Vehicle tuning panel hidden.");
    }
}

fn vehicle_tuning_panel_ui(
    mut egui_contexts: EguiContexts,
    mut panel_state: ResMut<VehicleTuningPanelState>,
    mut config: ResMut<GameConfig>,
    simulation: Option<ResMut<DriveSimulation>>,
) {
    if !panel_state.visible {
        return;
    }

    let mut params = panel_state
        .params
        .clone()
        .unwrap_or_else(|| VehicleTuningParams::from_vehicle(&config.vehicle.vehicle));

    let mut window_open = panel_state.visible;
    let mut params_changed = false;
    let mut reload_clicked = false;
    let mut apply_clicked = false;
    let status = panel_state.status.clone();

    let Ok(ctx) = egui_contexts.ctx_mut() else {
        return;
    };
    egui::Window::new("Vehicle Kinematics Tuning")
        .open(&mut window_open)
        .resizable(true)
        .default_width(520.0)
        .show(ctx, |ui| {
            ui.label("Changes apply to the running session on the next tick.");
            ui.separator();

            ui.collapsing("Throttle", |ui| {
                params_changed |= tuning_slider_row(
                    ui,
                    "acceleration",
                    &mut params.acceleration,
                    0.001..=0.5,
                    0.001,
                );
                params_changed |= tuning_slider_row(
                    ui,
                    "speed_limit",
                    &mut params.speed_limit,
                    0.1..=20.0,
                    0.05,
                );
                params_changed |= tuning_slider_row(
                    ui,
                    "idle_decay_step",
                    &mut params.idle_decay_step,
                    0.001..=1.0,
                    0.005,
                );
                params_changed |= tuning_slider_row(
                    ui,
                    "idle_snap_threshold",
                    &mut params.idle_snap_threshold,
                    0.0..=1.0,
                    0.005,
                );
            });

            ui.collapsing("Nitro", |ui| {
                params_changed |= tuning_slider_row(
                    ui,
                    "nitro_acceleration",
                    &mut params.nitro_acceleration,
                    0.001..=1.0,
                    0.001,
                );
                params_changed |= tuning_slider_row(
                    ui,
                    "nitro_speed_limit",
                    &mut params.nitro_speed_limit,
                    0.1..=30.0,
                    0.05,
                );
            });

            ui.collapsing("Steering", |ui| {
                params_changed |= tuning_slider_row(
                    ui,
                    "angle_increment_deg",
                    &mut params.angle_increment_deg,
                    0.0..=15.0,
                    0.05,
                );
            });

            ui.separator();
            ui.horizontal(|ui| {
                if ui.button("Reload From Config").clicked() {
                    reload_clicked = true;
                }
                if ui.button("Apply To vehicle.toml").clicked() {
                    apply_clicked = true;
                }
            });

            if !status.is_empty() {
                ui.separator();
                ui.label(status);
            }
        });

    panel_state.visible = window_open;

    if reload_clicked {
        panel_state.params = Some(VehicleTuningParams::from_vehicle(&config.vehicle.vehicle));
        panel_state.status = "Reloaded values from current config.".to_string();
        return;
    }

    let params = params.clamped();
    panel_state.params = Some(params.clone());

    if params_changed {
        params.apply_to_vehicle(&mut config.vehicle.vehicle);
        if let Some(mut simulation) = simulation {
            simulation.set_vehicle_tuning(KinematicTuning::from_config(&config.vehicle.vehicle));
        }
        panel_state.status = "Live-tuning active (in-memory config updated).".to_string();
    }

    if apply_clicked {
        match persist_vehicle_tuning_and_reload(&mut config, &params) {
            Ok(message) => {
                panel_state.status = message;
                panel_state.params =
                    Some(VehicleTuningParams::from_vehicle(&config.vehicle.vehicle));
            }
            Err(error) => panel_state.status = error,
        }
    }
}

fn tuning_slider_row(
    ui: &mut egui::Ui,
    label: &str,
    value: &mut f32,
    slider_range: std::ops::RangeInclusive<f32>,
    drag_speed: f32,
) -> bool {
    let mut changed = false;
    ui.horizontal(|ui| {
        ui.label(label);
        changed |= ui
            .add(egui::Slider::new(value, slider_range).show_value(false))
            .changed();
        changed |= ui
            .add(egui::DragValue::new(value).speed(drag_speed as f64))
            .changed();
    });
    changed
}

fn persist_vehicle_tuning_and_reload(
    config: &mut GameConfig,
    params: &VehicleTuningParams,
) -> Result<String, String> {
    let path = Path::new(CONFIG_DIR).join("vehicle.toml");
    let original_raw = fs::read_to_string(&path)
        .map_err(|error| format!("Failed reading `{}`: {error}", path.display()))?;
    let mut root: toml::Value = toml::from_str(&original_raw)
        .map_err(|error| format!("Failed parsing `{}`: {error}", path.display()))?;

    write_params_to_toml_value(&mut root, params)?;

    let updated_raw = toml::to_string_pretty(&root)
        .map_err(|error| format!("Failed serializing vehicle TOML: {error}"))?;
    fs::write(&path, updated_raw)
        .map_err(|error| format!("Failed writing `{}`: {error}", path.display()))?;

    match GameConfig::load_from_dir(Path::new(CONFIG_DIR)) {
        Ok(reloaded) => {
            adopt_vehicle_section(config, reloaded);
            Ok(format!("Applied tuning and saved to {}.", path.display()))
        }
        Err(error) => {
            if let Err(restore_error) = fs::write(&path, original_raw) {
                warn!("Could not restore `{}`: {restore_error}", path.display());
            }
            Err(format!(
                "Apply failed validation: {error}. Reverted `{}`.",
                path.display()
            ))
        }
    }
}

/// Takes only the vehicle file from a reload; session choices such as the active
/// collision profile stay as they are in memory.
fn adopt_vehicle_section(config: &mut GameConfig, reloaded: GameConfig) {
    config.vehicle = reloaded.vehicle;
}

fn write_params_to_toml_value(
    root: &mut toml::Value,
    params: &VehicleTuningParams,
) -> Result<(), String> {
    let Some(vehicle_table) = root.get_mut("vehicle").and_then(toml::Value::as_table_mut) else {
        return Err("vehicle.toml: missing or invalid `vehicle` table".to_string());
    };

    for (key, value) in params.entries() {
        set_toml_float(vehicle_table, key, value)?;
    }
    Ok(())
}

fn set_toml_float(
    table: &mut toml::map::Map<String, toml::Value>,
    key: &str,
    value: f32,
) -> Result<(), String> {
    if !value.is_finite() {
        return Err(format!("`{key}` is not a finite number"));
    }

    table.insert(key.to_string(), toml::Value::Float(value as f64));
    Ok(())
}

fn keybind_overlay_text() -> &'static str {
    "Keybinds\n\
F1 - Toggle this panel\n\
V - Toggle vehicle tuning panel\n\
L - Toggle hitbox markers\n\
P - Cycle collision profile (before start)\n\
F5 - Hot-reload config\n\
G - Start session\n\
W / Up / U - Throttle forward\n\
S / Down / J - Throttle reverse\n\
A / Left / H - Steer left\n\
D / Right / K - Steer right\n\
N / Left Shift - Nitro\n\
Esc - Pause / resume\n\
Space - Results -> new session\n\
Q - Quit from results"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{sample_config, sample_vehicle_file};

    #[test]
    fn profile_cycle_wraps_around() {
        let ids = ["sphere_coarse", "sphere_fine", "cube"];

        assert_eq!(next_profile_id(&ids, "sphere_coarse"), Some("sphere_fine"));
        assert_eq!(next_profile_id(&ids, "cube"), Some("sphere_coarse"));
        assert_eq!(next_profile_id(&ids, "unknown"), Some("sphere_coarse"));
        assert_eq!(next_profile_id(&[], "cube"), None);
    }

    #[test]
    fn clamped_params_stay_positive() {
        let mut params = VehicleTuningParams::from_vehicle(&sample_vehicle_file().vehicle);
        params.speed_limit = -3.0;
        params.idle_snap_threshold = -0.5;

        let clamped = params.clamped();

        assert!(clamped.speed_limit > 0.0);
        assert_eq!(clamped.idle_snap_threshold, 0.0);
        assert_eq!(clamped.acceleration, params.acceleration);
    }

    #[test]
    fn tuning_params_are_written_into_vehicle_table() {
        let mut root: toml::Value = toml::from_str(
            r#"
                [vehicle]
                scale = 2.0
                speed_limit = 5.0
            "#,
        )
        .expect("vehicle TOML should parse");
        let mut params = VehicleTuningParams::from_vehicle(&sample_vehicle_file().vehicle);
        params.speed_limit = 6.5;

        write_params_to_toml_value(&mut root, &params).expect("params should be written");

        let table = root
            .get("vehicle")
            .and_then(toml::Value::as_table)
            .expect("vehicle table");
        assert_eq!(table.get("speed_limit").and_then(toml::Value::as_float), Some(6.5));
        assert_eq!(table.get("scale").and_then(toml::Value::as_float), Some(2.0));
        assert!(table.contains_key("angle_increment_deg"));
    }

    #[test]
    fn saving_tuning_keeps_selected_collision_profile() {
        let mut config = sample_config();
        config.game.collision.active_profile = "sphere_fine".to_string();
        let mut reloaded = sample_config();
        reloaded.vehicle.vehicle.speed_limit = 6.5;

        adopt_vehicle_section(&mut config, reloaded);

        assert_eq!(config.game.collision.active_profile, "sphere_fine");
        assert_eq!(config.vehicle.vehicle.speed_limit, 6.5);
    }

    #[test]
    fn missing_vehicle_table_is_reported() {
        let mut root: toml::Value = toml::from_str("[other]\nvalue = 1").expect("TOML parses");
        let params = VehicleTuningParams::from_vehicle(&sample_vehicle_file().vehicle);

        let error = write_params_to_toml_value(&mut root, &params).expect_err("should fail");

        assert!(error.contains("`vehicle` table"));
    }
}
