use super::ObstacleKind;
use crate::config::GameConfig;
use crate::gameplay::session::DriveSimulation;
use crate::states::GameState;
use bevy::prelude::*;

pub struct ObstacleVisualsPlugin;

impl Plugin for ObstacleVisualsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ObstacleVisualState>()
            .add_systems(OnEnter(GameState::Ready), despawn_obstacle_visuals)
            .add_systems(
                Update,
                (spawn_new_obstacle_visuals, sync_obstacle_visibility)
                    .chain()
                    .run_if(resource_exists::<DriveSimulation>)
                    .run_if(resource_exists::<GameConfig>),
            );
    }
}

#[derive(Component, Debug, Clone, Copy)]
pub struct ObstacleVisual {
    pub index: usize,
}

#[derive(Debug, Clone)]
struct ObstacleVisualAssets {
    roadblock_mesh: Handle<Mesh>,
    boulder_mesh: Handle<Mesh>,
    roadblock_material: Handle<StandardMaterial>,
    boulder_material: Handle<StandardMaterial>,
}

#[derive(Resource, Debug, Default)]
struct ObstacleVisualState {
    spawned: usize,
    assets: Option<ObstacleVisualAssets>,
}

fn despawn_obstacle_visuals(
    mut commands: Commands,
    mut state: ResMut<ObstacleVisualState>,
    visuals: Query<Entity, With<ObstacleVisual>>,
) {
    for entity in &visuals {
        commands.entity(entity).despawn();
    }
    state.spawned = 0;
}

fn spawn_new_obstacle_visuals(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    config: Res<GameConfig>,
    simulation: Res<DriveSimulation>,
    mut state: ResMut<ObstacleVisualState>,
) {
    let field = simulation.obstacles();
    if state.spawned >= field.len() {
        return;
    }

    let assets = state
        .assets
        .get_or_insert_with(|| {
            let color_for = |kind: ObstacleKind| {
                config
                    .obstacle_kind(kind)
                    .map(|entry| Color::srgb(entry.color[0], entry.color[1], entry.color[2]))
                    .unwrap_or(Color::srgb(0.8, 0.8, 0.8))
            };
            ObstacleVisualAssets {
                roadblock_mesh: meshes.add(Cuboid::new(2.0, 2.0, 2.0)),
                boulder_mesh: meshes.add(Sphere::new(1.0)),
                roadblock_material: materials.add(color_for(ObstacleKind::Roadblock)),
                boulder_material: materials.add(color_for(ObstacleKind::Boulder)),
            }
        })
        .clone();

    for index in state.spawned..field.len() {
        let Some(obstacle) = field.get(index) else {
            break;
        };
        let (mesh, material) = match obstacle.kind() {
            ObstacleKind::Roadblock => (
                assets.roadblock_mesh.clone(),
                assets.roadblock_material.clone(),
            ),
            ObstacleKind::Boulder => (
                assets.boulder_mesh.clone(),
                assets.boulder_material.clone(),
            ),
        };

        commands.spawn((
            Name::new(format!("Obstacle/{}/{index}", obstacle.kind().label())),
            ObstacleVisual { index },
            Mesh3d(mesh),
            MeshMaterial3d(material),
            Transform::from_matrix(obstacle.body().world()),
            Visibility::Hidden,
        ));
    }

    state.spawned = field.len();
}

fn sync_obstacle_visibility(
    simulation: Res<DriveSimulation>,
    mut visuals: Query<(&ObstacleVisual, &mut Visibility)>,
) {
    let field = simulation.obstacles();
    let vehicle_z = simulation.vehicle().position().z;

    for (visual, mut visibility) in &mut visuals {
        let drawn = field
            .get(visual.index)
            .is_some_and(|obstacle| simulation.spawner().is_drawn(obstacle, vehicle_z));
        let target = if drawn {
            Visibility::Visible
        } else {
            Visibility::Hidden
        };
        if *visibility != target {
            *visibility = target;
        }
    }
}
