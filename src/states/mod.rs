use crate::config::GameConfig;
use crate::gameplay::session::{DriveSimulation, Outcome, SessionSummary};
use bevy::app::AppExit;
use bevy::prelude::*;
use std::fs;
use std::io;
use std::path::Path;

#[derive(States, Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum GameState {
    #[default]
    Boot,
    Ready,
    InRun,
    Pause,
    Results,
}

pub struct GameStatePlugin;

impl Plugin for GameStatePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SessionEndLinger>()
            .add_systems(Startup, setup_camera)
            .add_systems(OnEnter(GameState::Boot), enter_boot)
            .add_systems(Update, boot_to_ready.run_if(in_state(GameState::Boot)))
            .add_systems(OnEnter(GameState::Ready), enter_ready)
            .add_systems(OnExit(GameState::Ready), cleanup_ready_screen)
            .add_systems(OnEnter(GameState::InRun), enter_in_run)
            .add_systems(
                Update,
                (trigger_results_after_outcome, in_run_controls)
                    .chain()
                    .run_if(in_state(GameState::InRun)),
            )
            .add_systems(OnEnter(GameState::Pause), enter_pause)
            .add_systems(OnExit(GameState::Pause), exit_pause)
            .add_systems(Update, pause_controls.run_if(in_state(GameState::Pause)))
            .add_systems(OnEnter(GameState::Results), enter_results)
            .add_systems(OnExit(GameState::Results), cleanup_results_screen)
            .add_systems(
                Update,
                results_controls.run_if(in_state(GameState::Results)),
            );
    }
}

#[derive(Component)]
struct ReadyScreenRoot;

#[derive(Component)]
struct ResultsScreenRoot;

#[derive(Resource, Debug, Clone, Default)]
struct SessionEndLinger {
    ended_at_s: Option<f64>,
}

fn setup_camera(mut commands: Commands) {
    commands.spawn((
        Name::new("ChaseCamera"),
        Camera3d::default(),
        Transform::from_xyz(0.0, 4.0, 72.0).looking_at(Vec3::new(0.0, 0.0, 40.0), Vec3::Y),
    ));
}

fn enter_boot() {
    info!("Entered state: Boot");
}

fn boot_to_ready(config: Option<Res<GameConfig>>, mut next_state: ResMut<NextState<GameState>>) {
    if config.is_some() {
        next_state.set(GameState::Ready);
    }
}

fn enter_ready(mut commands: Commands, mut linger: ResMut<SessionEndLinger>) {
    linger.ended_at_s = None;

    commands
        .spawn((
            Name::new("ReadyOverlay"),
            ReadyScreenRoot,
            Node {
                width: Val::Percent(100.0),
                height: Val::Percent(100.0),
                justify_content: JustifyContent::Center,
                align_items: AlignItems::End,
                padding: UiRect::bottom(Val::Px(64.0)),
                ..default()
            },
            ZIndex(200),
        ))
        .with_children(|parent| {
            parent
                .spawn((
                    Node {
                        flex_direction: FlexDirection::Column,
                        align_items: AlignItems::Center,
                        row_gap: Val::Px(8.0),
                        padding: UiRect::all(Val::Px(16.0)),
                        border: UiRect::all(Val::Px(1.0)),
                        ..default()
                    },
                    BackgroundColor(Color::srgba(0.08, 0.10, 0.13, 0.90)),
                    BorderColor::all(Color::srgba(0.56, 0.62, 0.68, 0.92)),
                ))
                .with_children(|panel| {
                    panel.spawn((
                        Text::new("ENDLESS LANE"),
                        TextFont {
                            font_size: 44.0,
                            ..default()
                        },
                        TextColor(Color::srgb(0.94, 0.97, 1.00)),
                    ));
                    panel.spawn((
                        Text::new("Press G to start"),
                        TextFont {
                            font_size: 22.0,
                            ..default()
                        },
                        TextColor(Color::srgb(0.90, 0.94, 0.98)),
                    ));
                });
        });

    info!("Entered state: Ready");
}

fn cleanup_ready_screen(
    mut commands: Commands,
    ready_screen_query: Query<Entity, With<ReadyScreenRoot>>,
) {
    for entity in &ready_screen_query {
        commands.entity(entity).try_despawn();
    }
}

fn enter_in_run() {
    info!("Entered state: InRun");
}

fn trigger_results_after_outcome(
    time: Res<Time>,
    config: Option<Res<GameConfig>>,
    simulation: Option<Res<DriveSimulation>>,
    mut linger: ResMut<SessionEndLinger>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    let (Some(config), Some(simulation)) = (config, simulation) else {
        return;
    };
    if !simulation.session().outcome().is_terminal() {
        return;
    }

    let now = time.elapsed_secs_f64();
    let ended_at = *linger.ended_at_s.get_or_insert(now);
    if now - ended_at >= config.game.session.results_linger_s.max(0.0) as f64 {
        next_state.set(GameState::Results);
    }
}

fn in_run_controls(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if keyboard.just_pressed(KeyCode::Escape) {
        next_state.set(GameState::Pause);
    }
}

fn enter_pause(mut time: ResMut<Time<Virtual>>) {
    time.pause();
    info!("Entered state: Pause");
}

fn exit_pause(mut time: ResMut<Time<Virtual>>) {
    time.unpause();
}

fn pause_controls(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if keyboard.just_pressed(KeyCode::Escape) {
        next_state.set(GameState::InRun);
    }

    if keyboard.just_pressed(KeyCode::Enter) {
        next_state.set(GameState::Results);
    }
}

fn enter_results(
    mut commands: Commands,
    config: Option<Res<GameConfig>>,
    simulation: Option<Res<DriveSimulation>>,
) {
    let Some(simulation) = simulation else {
        warn!("Entered results without a drive session.");
        return;
    };
    let summary = simulation.summary();

    if let Some(path) = config
        .as_ref()
        .and_then(|config| config.game.app.summary_path.as_deref())
    {
        match export_session_summary(Path::new(path), &summary) {
            Ok(()) => info!("Session summary written to `{path}`."),
            Err(error) => error!("Failed to write session summary to `{path}`: {error}"),
        }
    }

    commands
        .spawn((
            Name::new("ResultsOverlay"),
            ResultsScreenRoot,
            Node {
                width: Val::Percent(100.0),
                height: Val::Percent(100.0),
                justify_content: JustifyContent::Center,
                align_items: AlignItems::Center,
                ..default()
            },
            BackgroundColor(Color::srgba(0.01, 0.02, 0.03, 0.94)),
            ZIndex(300),
        ))
        .with_children(|parent| {
            parent
                .spawn((
                    Node {
                        width: Val::Percent(60.0),
                        max_width: Val::Px(760.0),
                        min_width: Val::Px(420.0),
                        flex_direction: FlexDirection::Column,
                        row_gap: Val::Px(10.0),
                        padding: UiRect::all(Val::Px(16.0)),
                        border: UiRect::all(Val::Px(1.0)),
                        ..default()
                    },
                    BackgroundColor(Color::srgba(0.08, 0.10, 0.13, 0.96)),
                    BorderColor::all(Color::srgba(0.56, 0.62, 0.68, 0.92)),
                ))
                .with_children(|panel| {
                    panel.spawn((
                        Text::new(results_title(summary.outcome)),
                        TextFont {
                            font_size: 52.0,
                            ..default()
                        },
                        TextColor(Color::srgb(0.94, 0.97, 1.00)),
                    ));
                    panel.spawn((
                        Text::new(results_summary_text(&summary)),
                        TextFont {
                            font_size: 22.0,
                            ..default()
                        },
                        TextColor(Color::srgb(0.90, 0.94, 0.98)),
                    ));
                });
        });

    info!(
        "Entered state: Results ({}, {:.1}s, {} collision(s)).",
        summary.outcome.label(),
        summary.elapsed_s,
        summary.collision_count
    );
}

fn results_title(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Won => "SURVIVED",
        Outcome::Lost => "WASTED",
        Outcome::InProgress => "SESSION ENDED",
    }
}

fn results_summary_text(summary: &SessionSummary) -> String {
    format!(
        "Time: {elapsed:.1}s / {limit:.0}s\n\
Collisions: {collisions}\n\
Distance: {distance:.1}\n\
Obstacles: {spawned} spawned, {total} on the road\n\
Collision profile: {profile}\n\n\
Space - New Session\n\
Q - Quit",
        elapsed = summary.elapsed_s,
        limit = summary.time_limit_s,
        collisions = summary.collision_count,
        distance = summary.distance,
        spawned = summary.obstacles_spawned,
        total = summary.obstacles_total,
        profile = summary.collision_profile,
    )
}

fn export_session_summary(path: &Path, summary: &SessionSummary) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json)
}

fn cleanup_results_screen(
    mut commands: Commands,
    results_screen_query: Query<Entity, With<ResultsScreenRoot>>,
) {
    for entity in &results_screen_query {
        commands.entity(entity).try_despawn();
    }
}

fn results_controls(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut next_state: ResMut<NextState<GameState>>,
    mut exit: MessageWriter<AppExit>,
) {
    if keyboard.just_pressed(KeyCode::Space) {
        next_state.set(GameState::Ready);
    }

    if keyboard.just_pressed(KeyCode::KeyQ) {
        exit.write(AppExit::Success);
    }
}
