use super::ControlEvent;
use crate::gameplay::session::DriveSimulation;
use bevy::prelude::*;

const ROAD_HALF_WIDTH_M: f32 = 9.0;
const ROAD_HALF_LENGTH_M: f32 = 400.0;
const ROAD_AHEAD_BIAS_M: f32 = 240.0;
const LANE_DASH_SPACING_M: f32 = 12.0;
const LANE_DASH_COUNT: usize = 64;
const LANE_DASH_SIZE: Vec3 = Vec3::new(0.18, 0.02, 4.0);
const LANE_DASH_BEHIND_M: f32 = 60.0;
const CHASSIS_SIZE: Vec3 = Vec3::new(1.2, 0.5, 2.0);
const CABIN_SIZE: Vec3 = Vec3::new(1.0, 0.4, 1.0);
const CABIN_OFFSET: Vec3 = Vec3::new(0.0, 0.45, 0.2);

#[derive(Component)]
pub(super) struct PlayerVehicle;

#[derive(Component)]
pub(super) struct RoadSurface;

#[derive(Component, Debug, Clone, Copy)]
pub(super) struct LaneDash {
    slot: usize,
}

#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VehicleInputState {
    pub forward: bool,
    pub reverse: bool,
    pub right: bool,
    pub left: bool,
    pub nitro: bool,
}

impl VehicleInputState {
    fn throttle_axis(self) -> i8 {
        match (self.forward, self.reverse) {
            (true, false) => 1,
            (false, true) => -1,
            _ => 0,
        }
    }

    fn steer_axis(self) -> i8 {
        match (self.right, self.left) {
            (true, false) => 1,
            (false, true) => -1,
            _ => 0,
        }
    }
}

#[derive(Resource, Debug, Clone)]
pub(super) struct VehicleInputBindings {
    forward: Vec<KeyCode>,
    reverse: Vec<KeyCode>,
    right: Vec<KeyCode>,
    left: Vec<KeyCode>,
    nitro: Vec<KeyCode>,
}

impl Default for VehicleInputBindings {
    fn default() -> Self {
        Self {
            forward: vec![KeyCode::KeyW, KeyCode::ArrowUp, KeyCode::KeyU],
            reverse: vec![KeyCode::KeyS, KeyCode::ArrowDown, KeyCode::KeyJ],
            right: vec![KeyCode::KeyD, KeyCode::ArrowRight, KeyCode::KeyK],
            left: vec![KeyCode::KeyA, KeyCode::ArrowLeft, KeyCode::KeyH],
            nitro: vec![KeyCode::KeyN, KeyCode::ShiftLeft],
        }
    }
}

pub(super) fn control_edges(
    previous: VehicleInputState,
    current: VehicleInputState,
) -> Vec<ControlEvent> {
    let mut events = Vec::new();

    let throttle = current.throttle_axis();
    if throttle != previous.throttle_axis() {
        events.push(match throttle {
            1 => ControlEvent::ThrottleForward,
            -1 => ControlEvent::ThrottleReverse,
            _ => ControlEvent::ReleaseThrottle,
        });
    }

    let steer = current.steer_axis();
    if steer != previous.steer_axis() {
        events.push(match steer {
            1 => ControlEvent::SteerRight,
            -1 => ControlEvent::SteerLeft,
            _ => ControlEvent::ReleaseSteer,
        });
    }

    if current.nitro != previous.nitro {
        events.push(if current.nitro {
            ControlEvent::NitroOn
        } else {
            ControlEvent::NitroOff
        });
    }

    events
}

pub(super) fn read_vehicle_input(
    keyboard: Res<ButtonInput<KeyCode>>,
    bindings: Res<VehicleInputBindings>,
    mut input_state: ResMut<VehicleInputState>,
    mut controls: MessageWriter<ControlEvent>,
) {
    let held = |keys: &[KeyCode]| keys.iter().any(|key| keyboard.pressed(*key));
    let current = VehicleInputState {
        forward: held(&bindings.forward),
        reverse: held(&bindings.reverse),
        right: held(&bindings.right),
        left: held(&bindings.left),
        nitro: held(&bindings.nitro),
    };

    for event in control_edges(*input_state, current) {
        controls.write(event);
    }
    *input_state = current;
}

pub(super) fn reset_vehicle_input(mut input_state: ResMut<VehicleInputState>) {
    *input_state = VehicleInputState::default();
}

pub(super) fn spawn_drive_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    commands.spawn((
        Name::new("Sun"),
        DirectionalLight {
            illuminance: 9_000.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(8.0, 20.0, 6.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    commands.spawn((
        Name::new("RoadSurface"),
        RoadSurface,
        Mesh3d(meshes.add(Plane3d::default().mesh().size(
            ROAD_HALF_WIDTH_M * 2.0,
            ROAD_HALF_LENGTH_M * 2.0,
        ))),
        MeshMaterial3d(materials.add(Color::srgb(0.18, 0.19, 0.21))),
        Transform::default(),
    ));

    let dash_mesh = meshes.add(Cuboid::from_size(LANE_DASH_SIZE));
    let dash_material = materials.add(Color::srgb(0.92, 0.90, 0.78));
    for slot in 0..LANE_DASH_COUNT {
        commands.spawn((
            Name::new("LaneDash"),
            LaneDash { slot },
            Mesh3d(dash_mesh.clone()),
            MeshMaterial3d(dash_material.clone()),
            Transform::default(),
        ));
    }

    let chassis_material = materials.add(Color::srgb(0.93, 0.34, 0.24));
    let cabin_material = materials.add(Color::srgb(0.62, 0.73, 0.84));
    commands
        .spawn((
            Name::new("PlayerVehicle"),
            PlayerVehicle,
            Transform::default(),
            Visibility::Hidden,
        ))
        .with_children(|parent| {
            parent.spawn((
                Name::new("PlayerChassis"),
                Mesh3d(meshes.add(Cuboid::from_size(CHASSIS_SIZE))),
                MeshMaterial3d(chassis_material),
            ));
            parent.spawn((
                Name::new("PlayerCabin"),
                Mesh3d(meshes.add(Cuboid::from_size(CABIN_SIZE))),
                MeshMaterial3d(cabin_material),
                Transform::from_translation(CABIN_OFFSET),
            ));
        });
}

#[allow(clippy::type_complexity)]
pub(super) fn sync_vehicle_visual(
    simulation: Option<Res<DriveSimulation>>,
    mut vehicle_query: Query<(&mut Transform, &mut Visibility), With<PlayerVehicle>>,
    mut road_query: Query<
        &mut Transform,
        (With<RoadSurface>, Without<PlayerVehicle>, Without<LaneDash>),
    >,
    mut dash_query: Query<
        (&LaneDash, &mut Transform),
        (Without<PlayerVehicle>, Without<RoadSurface>),
    >,
) {
    let Some(simulation) = simulation else {
        return;
    };
    let Ok((mut transform, mut visibility)) = vehicle_query.single_mut() else {
        return;
    };

    let vehicle = simulation.vehicle();
    *transform = Transform::from_matrix(vehicle.render_transform());
    *visibility = Visibility::Visible;

    let vehicle_z = vehicle.position().z;
    if let Ok(mut road) = road_query.single_mut() {
        road.translation.z = vehicle_z - ROAD_AHEAD_BIAS_M;
    }

    let anchor = (vehicle_z / LANE_DASH_SPACING_M).floor() * LANE_DASH_SPACING_M;
    for (dash, mut dash_transform) in &mut dash_query {
        dash_transform.translation = Vec3::new(
            0.0,
            0.01,
            anchor + LANE_DASH_BEHIND_M - dash.slot as f32 * LANE_DASH_SPACING_M,
        );
    }
}

pub(super) fn camera_follow_vehicle(
    simulation: Option<Res<DriveSimulation>>,
    mut camera_query: Query<&mut Transform, (With<Camera3d>, Without<PlayerVehicle>)>,
) {
    let Some(simulation) = simulation else {
        return;
    };
    let Ok(mut camera_transform) = camera_query.single_mut() else {
        return;
    };

    // The chase mount inherits the vehicle's scale; the camera keeps unit scale.
    let (_, rotation, translation) = simulation
        .vehicle()
        .camera_transform()
        .to_scale_rotation_translation();
    camera_transform.translation = translation;
    camera_transform.rotation = rotation;
}
