use crate::config::GameConfig;
use crate::gameplay::obstacles::ObstacleKind;
use crate::gameplay::rng::{RandomSource, SeededRandom};
use crate::gameplay::vehicle::ControlEvent;
use crate::states::GameState;
use bevy::prelude::*;

mod simulation;

pub use simulation::{DriveSimulation, FrameClock, Outcome, SessionSummary};

pub struct SessionGameplayPlugin;

impl Plugin for SessionGameplayPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<SessionStartedEvent>()
            .add_message::<ObstacleHitEvent>()
            .add_message::<SessionEndedEvent>()
            .add_systems(
                OnEnter(GameState::Ready),
                prepare_drive_simulation.run_if(resource_exists::<GameConfig>),
            )
            .add_systems(
                Update,
                start_session_on_key
                    .run_if(in_state(GameState::Ready))
                    .run_if(resource_exists::<DriveSimulation>),
            )
            .add_systems(
                Update,
                step_drive_simulation
                    .run_if(in_state(GameState::InRun))
                    .run_if(resource_exists::<DriveSimulation>),
            );
    }
}

#[derive(Message, Debug, Clone, Copy)]
pub struct SessionStartedEvent;

#[derive(Message, Debug, Clone, Copy)]
pub struct ObstacleHitEvent {
    pub index: usize,
    pub kind: ObstacleKind,
    pub collision_count: u32,
}

#[derive(Message, Debug, Clone, Copy)]
pub struct SessionEndedEvent {
    pub outcome: Outcome,
    pub elapsed_s: f32,
    pub collision_count: u32,
}

#[derive(Resource, Debug, Clone)]
pub struct SessionRandom(pub SeededRandom);

fn prepare_drive_simulation(
    mut commands: Commands,
    config: Res<GameConfig>,
    existing_rng: Option<ResMut<SessionRandom>>,
) {
    let Some(simulation) = DriveSimulation::from_config(&config) else {
        error!(
            "Cannot build drive session: active collision profile `{}` or obstacle kinds are missing.",
            config.game.collision.active_profile
        );
        return;
    };

    match (existing_rng, config.game.app.rng_seed) {
        (Some(mut rng), Some(seed)) => rng.0.reseed(seed),
        (Some(_), None) => {}
        (None, seed) => {
            commands.insert_resource(SessionRandom(SeededRandom::from_optional_seed(seed)));
        }
    }

    info!(
        "Session ready: profile `{}` ({}, {} samples), {} seeded obstacle(s). Press G to start.",
        simulation.profile().id,
        simulation.profile().test.label(),
        simulation.profile().points.len(),
        simulation.obstacles().len(),
    );
    commands.insert_resource(simulation);
}

fn start_session_on_key(
    keyboard: Res<ButtonInput<KeyCode>>,
    time: Res<Time>,
    mut simulation: ResMut<DriveSimulation>,
    mut started: MessageWriter<SessionStartedEvent>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if !keyboard.just_pressed(KeyCode::KeyG) {
        return;
    }

    simulation.begin(time.elapsed_secs_f64());
    started.write(SessionStartedEvent);
    next_state.set(GameState::InRun);
}

fn step_drive_simulation(
    time: Res<Time>,
    mut controls: MessageReader<ControlEvent>,
    mut simulation: ResMut<DriveSimulation>,
    rng: Option<ResMut<SessionRandom>>,
    mut hits: MessageWriter<ObstacleHitEvent>,
    mut ended: MessageWriter<SessionEndedEvent>,
) {
    let Some(mut rng) = rng else {
        return;
    };

    for event in controls.read() {
        simulation.apply_control(*event);
    }

    let clock = FrameClock {
        now_s: time.elapsed_secs_f64(),
    };
    let report = simulation.tick(clock, &mut rng.0);

    if let Some(spawned) = report.spawned {
        debug!(
            "Spawned {} #{} in {:?} lane at z={:.1}{}.",
            spawned.kind.label(),
            spawned.index,
            spawned.lane,
            spawned.z,
            if spawned.forced { " (forced)" } else { "" }
        );
    }

    let session = simulation.session();
    for hit in &report.hits {
        info!(
            "Hit {} #{} ({}/{} collisions).",
            hit.kind.label(),
            hit.index,
            session.collision_count(),
            session.loss_threshold()
        );
        hits.write(ObstacleHitEvent {
            index: hit.index,
            kind: hit.kind,
            collision_count: session.collision_count(),
        });
    }

    if let Some(outcome) = report.ended {
        info!(
            "Session {} after {:.1}s with {} collision(s).",
            outcome.label(),
            session.elapsed_s(),
            session.collision_count()
        );
        ended.write(SessionEndedEvent {
            outcome,
            elapsed_s: session.elapsed_s(),
            collision_count: session.collision_count(),
        });
    }
}
