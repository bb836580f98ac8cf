use crate::assets::AssetRegistry;
use crate::config::GameConfig;
use crate::gameplay::session::{
    DriveSimulation, ObstacleHitEvent, Outcome, SessionEndedEvent, SessionStartedEvent,
};
use crate::gameplay::vehicle::ControlEvent;
use crate::states::GameState;
use bevy::audio::{AudioPlayer, AudioSource, PlaybackSettings, Volume};
use bevy::prelude::*;
use std::collections::HashSet;

const AUDIO_ID_IGNITION: &str = "sfx_ignition";
const AUDIO_ID_ACCELERATE_LOOP: &str = "sfx_accelerate_loop";
const AUDIO_ID_REVERSE_LOOP: &str = "sfx_reverse_loop";
const AUDIO_ID_NITRO: &str = "sfx_nitro";
const AUDIO_ID_COLLISION: &str = "sfx_collision";
const AUDIO_ID_WASTED: &str = "sfx_wasted";
const AUDIO_ID_WON: &str = "sfx_won";

const COLLISION_CUE_SPEED_STEP: f32 = 0.08;
const COLLISION_CUE_MAX_SPEED: f32 = 1.4;

pub struct GameplaySfxPlugin;

impl Plugin for GameplaySfxPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SfxMissingAssetWarnings>()
            .add_systems(OnEnter(GameState::Ready), clear_sfx_warnings)
            .add_systems(OnExit(GameState::InRun), cleanup_drive_loops)
            .add_systems(
                Update,
                (play_session_cues, sync_drive_loop)
                    .chain()
                    .run_if(resource_exists::<GameConfig>),
            );
    }
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
struct DriveLoopAudio {
    reverse: bool,
}

#[derive(Resource, Debug, Default)]
struct SfxMissingAssetWarnings {
    missing_ids: HashSet<String>,
}

fn clear_sfx_warnings(mut warnings: ResMut<SfxMissingAssetWarnings>) {
    warnings.missing_ids.clear();
}

fn cleanup_drive_loops(mut commands: Commands, loops: Query<Entity, With<DriveLoopAudio>>) {
    for entity in &loops {
        commands.entity(entity).try_despawn();
    }
}

#[allow(clippy::too_many_arguments)]
fn play_session_cues(
    mut commands: Commands,
    registry: Option<Res<AssetRegistry>>,
    mut warnings: ResMut<SfxMissingAssetWarnings>,
    mut started: MessageReader<SessionStartedEvent>,
    mut controls: MessageReader<ControlEvent>,
    mut hits: MessageReader<ObstacleHitEvent>,
    mut ended: MessageReader<SessionEndedEvent>,
) {
    let Some(registry) = registry else {
        let _ = started.read().count();
        let _ = controls.read().count();
        let _ = hits.read().count();
        let _ = ended.read().count();
        return;
    };

    let mut cues: Vec<(&str, f32)> = Vec::new();
    cues.extend(started.read().map(|_| (AUDIO_ID_IGNITION, 1.0)));
    cues.extend(
        controls
            .read()
            .filter(|event| **event == ControlEvent::NitroOn)
            .map(|_| (AUDIO_ID_NITRO, 1.0)),
    );
    cues.extend(
        hits.read()
            .map(|event| (AUDIO_ID_COLLISION, collision_cue_speed(event.collision_count))),
    );
    cues.extend(ended.read().map(|event| match event.outcome {
        Outcome::Won => (AUDIO_ID_WON, 1.0),
        _ => (AUDIO_ID_WASTED, 1.0),
    }));

    for (audio_id, speed) in cues {
        let Some((handle, volume)) = resolve_audio(audio_id, &registry, &mut warnings) else {
            continue;
        };
        commands.spawn((
            Name::new(format!("Sfx/{audio_id}")),
            AudioPlayer::<AudioSource>::new(handle),
            PlaybackSettings::DESPAWN
                .with_volume(Volume::Linear(volume))
                .with_speed(speed),
        ));
    }
}

// Each further hit in a session plays the crash a little higher.
fn collision_cue_speed(collision_count: u32) -> f32 {
    let extra_hits = collision_count.saturating_sub(1) as f32;
    (1.0 + extra_hits * COLLISION_CUE_SPEED_STEP).min(COLLISION_CUE_MAX_SPEED)
}

fn sync_drive_loop(
    mut commands: Commands,
    registry: Option<Res<AssetRegistry>>,
    simulation: Option<Res<DriveSimulation>>,
    state: Res<State<GameState>>,
    mut warnings: ResMut<SfxMissingAssetWarnings>,
    loops: Query<(Entity, &DriveLoopAudio)>,
) {
    let desired = match (state.get(), simulation.as_deref()) {
        (GameState::InRun, Some(simulation)) => match simulation.vehicle().acceleration_sign() {
            1 => Some(DriveLoopAudio { reverse: false }),
            -1 => Some(DriveLoopAudio { reverse: true }),
            _ => None,
        },
        _ => None,
    };

    let mut already_playing = false;
    for (entity, playing) in &loops {
        if Some(*playing) == desired && !already_playing {
            already_playing = true;
        } else {
            commands.entity(entity).try_despawn();
        }
    }

    let (Some(desired), false, Some(registry)) = (desired, already_playing, registry) else {
        return;
    };
    let audio_id = if desired.reverse {
        AUDIO_ID_REVERSE_LOOP
    } else {
        AUDIO_ID_ACCELERATE_LOOP
    };
    let Some((handle, volume)) = resolve_audio(audio_id, &registry, &mut warnings) else {
        return;
    };

    commands.spawn((
        Name::new(format!("Sfx/{audio_id}")),
        desired,
        AudioPlayer::<AudioSource>::new(handle),
        PlaybackSettings::LOOP.with_volume(Volume::Linear(volume)),
    ));
}

fn resolve_audio(
    audio_id: &str,
    registry: &AssetRegistry,
    warnings: &mut SfxMissingAssetWarnings,
) -> Option<(Handle<AudioSource>, f32)> {
    let Some(entry) = registry.audio.get(audio_id) else {
        if warnings.missing_ids.insert(audio_id.to_string()) {
            warn!("SFX audio asset `{}` is not present in registry.", audio_id);
        }
        return None;
    };

    let Some(handle) = entry.handle.clone() else {
        if warnings.missing_ids.insert(audio_id.to_string()) {
            warn!(
                "SFX audio asset `{}` path `{}` does not exist on disk.",
                audio_id, entry.path
            );
        }
        return None;
    };

    (entry.volume > f32::EPSILON).then_some((handle, entry.volume))
}
