use crate::gameplay::collision::ShapeTest;
use crate::gameplay::obstacles::{LaneSide, ObstacleKind};
use bevy::prelude::*;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_DIR: &str = "config";

pub struct ConfigPlugin;

impl Plugin for ConfigPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, load_game_config)
            .add_systems(Update, reload_game_config_hotkey);
    }
}

fn load_game_config(mut commands: Commands) {
    let config = GameConfig::load_from_dir(Path::new(CONFIG_DIR)).unwrap_or_else(|error| {
        panic!("failed to load configuration from `{CONFIG_DIR}`: {error}");
    });

    log_config_summary("Loaded", &config);
    info!("Press F5 to hot-reload config files from `{CONFIG_DIR}`.");

    commands.insert_resource(config);
}

fn reload_game_config_hotkey(
    keyboard: Res<ButtonInput<KeyCode>>,
    game_config: Option<ResMut<GameConfig>>,
) {
    if !keyboard.just_pressed(KeyCode::F5) {
        return;
    }

    let Some(mut current_config) = game_config else {
        warn!("Config hot-reload requested, but `GameConfig` resource is not initialized yet.");
        return;
    };

    match GameConfig::load_from_dir(Path::new(CONFIG_DIR)) {
        Ok(new_config) => {
            *current_config = new_config;
            log_config_summary("Hot-reloaded", &current_config);
        }
        Err(error) => {
            error!("Config hot-reload failed; keeping previous config: {error}");
        }
    }
}

fn log_config_summary(prefix: &str, config: &GameConfig) {
    info!(
        "{prefix} config: {} collision profiles (active `{}`), {} obstacle kinds, {} audio cues, time limit {:.0}s.",
        config.profiles_by_id.len(),
        config.game.collision.active_profile,
        config.obstacles.kinds.len(),
        config.audio_assets_by_id.len(),
        config.game.session.time_limit_s,
    );
}

#[derive(Resource, Debug, Clone)]
pub struct GameConfig {
    pub game: GameFile,
    pub vehicle: VehicleFile,
    pub obstacles: ObstaclesFile,
    pub assets: AssetsFile,
    pub profiles_by_id: HashMap<String, CollisionProfileConfig>,
    pub audio_assets_by_id: HashMap<String, AudioAssetConfig>,
}

impl GameConfig {
    pub fn load_from_dir(config_dir: &Path) -> Result<Self, ConfigError> {
        let game: GameFile = read_toml(&config_dir.join("game.toml"))?;
        let vehicle: VehicleFile = read_toml(&config_dir.join("vehicle.toml"))?;
        let obstacles: ObstaclesFile = read_toml(&config_dir.join("obstacles.toml"))?;
        let assets: AssetsFile = read_toml(&config_dir.join("assets.toml"))?;

        Self::from_files(game, vehicle, obstacles, assets)
    }

    pub fn from_files(
        game: GameFile,
        vehicle: VehicleFile,
        obstacles: ObstaclesFile,
        assets: AssetsFile,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            profiles_by_id: to_index("game.toml::collision.profiles", &game.collision.profiles)?,
            audio_assets_by_id: to_index("assets.toml::audio", &assets.audio)?,
            game,
            vehicle,
            obstacles,
            assets,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn active_profile(&self) -> Option<&CollisionProfileConfig> {
        self.profiles_by_id.get(&self.game.collision.active_profile)
    }

    pub fn obstacle_kind(&self, kind: ObstacleKind) -> Option<&ObstacleKindConfig> {
        self.obstacles.kinds.iter().find(|entry| entry.kind == kind)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.game.session;
        if !(session.time_limit_s.is_finite() && session.time_limit_s > 0.0) {
            return Err(ConfigError::Validation(
                "game.toml::session.time_limit_s must be > 0".to_string(),
            ));
        }
        if session.loss_collision_threshold == 0 {
            return Err(ConfigError::Validation(
                "game.toml::session.loss_collision_threshold must be >= 1".to_string(),
            ));
        }

        if self.active_profile().is_none() {
            return Err(ConfigError::Validation(format!(
                "game.toml::collision.active_profile references unknown profile id `{}`",
                self.game.collision.active_profile
            )));
        }

        for (index, profile) in self.game.collision.profiles.iter().enumerate() {
            if !(profile.leeway.is_finite() && profile.leeway > -1.0) {
                return Err(ConfigError::Validation(format!(
                    "game.toml::collision.profiles[{index}].leeway must be > -1"
                )));
            }
            if profile.shape == ShapeTest::Sphere && profile.subdivisions > 4 {
                return Err(ConfigError::Validation(format!(
                    "game.toml::collision.profiles[{index}].subdivisions must be <= 4"
                )));
            }
        }

        let vehicle = &self.vehicle.vehicle;
        for (key, value) in [
            ("scale", vehicle.scale),
            ("acceleration", vehicle.acceleration),
            ("speed_limit", vehicle.speed_limit),
            ("nitro_acceleration", vehicle.nitro_acceleration),
            ("nitro_speed_limit", vehicle.nitro_speed_limit),
            ("idle_decay_step", vehicle.idle_decay_step),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Validation(format!(
                    "vehicle.toml::vehicle.{key} must be > 0"
                )));
            }
        }
        if !(vehicle.idle_snap_threshold.is_finite() && vehicle.idle_snap_threshold >= 0.0) {
            return Err(ConfigError::Validation(
                "vehicle.toml::vehicle.idle_snap_threshold must be >= 0".to_string(),
            ));
        }
        if vehicle.hitbox_scale.iter().any(|axis| *axis <= 0.0) {
            return Err(ConfigError::Validation(
                "vehicle.toml::vehicle.hitbox_scale components must be > 0".to_string(),
            ));
        }

        let spawner = &self.obstacles.spawner;
        if !(0.0..=1.0).contains(&spawner.spawn_roll_threshold) {
            return Err(ConfigError::Validation(
                "obstacles.toml::spawner.spawn_roll_threshold must be within [0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&spawner.roadblock_weight) {
            return Err(ConfigError::Validation(
                "obstacles.toml::spawner.roadblock_weight must be within [0, 1]".to_string(),
            ));
        }
        if spawner.gate_period_ms == 0 {
            return Err(ConfigError::Validation(
                "obstacles.toml::spawner.gate_period_ms must be >= 1".to_string(),
            ));
        }
        if !(spawner.stale_distance.is_finite() && spawner.stale_distance > 0.0) {
            return Err(ConfigError::Validation(
                "obstacles.toml::spawner.stale_distance must be > 0".to_string(),
            ));
        }
        if spawner.speed_gap_factor < 0.0 {
            return Err(ConfigError::Validation(
                "obstacles.toml::spawner.speed_gap_factor must be >= 0".to_string(),
            ));
        }

        for kind in [ObstacleKind::Roadblock, ObstacleKind::Boulder] {
            let Some(entry) = self.obstacle_kind(kind) else {
                return Err(ConfigError::Validation(format!(
                    "obstacles.toml::kinds is missing an entry for `{}`",
                    kind.label()
                )));
            };
            if entry.scale <= 0.0 || entry.footprint.iter().any(|axis| *axis <= 0.0) {
                return Err(ConfigError::Validation(format!(
                    "obstacles.toml::kinds `{}` scale and footprint must be > 0",
                    kind.label()
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: Box<toml::de::Error>,
    },
    Validation(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse `{}`: {source}", path.display())
            }
            Self::Validation(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source: Box::new(source),
    })
}

fn to_index<T>(label: &str, rows: &[T]) -> Result<HashMap<String, T>, ConfigError>
where
    T: HasId + Clone,
{
    let mut map = HashMap::new();

    for row in rows {
        let id = row.id();
        if id.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{label} contains an empty id"
            )));
        }

        if map.insert(id.to_string(), row.clone()).is_some() {
            return Err(ConfigError::Validation(format!(
                "{label} contains duplicate id `{id}`"
            )));
        }
    }

    Ok(map)
}

trait HasId {
    fn id(&self) -> &str;
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameFile {
    pub app: AppConfig,
    pub session: SessionConfig,
    pub collision: CollisionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub debug_overlay: bool,
    #[serde(default)]
    pub rng_seed: Option<u64>,
    #[serde(default)]
    pub summary_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub time_limit_s: f32,
    pub loss_collision_threshold: u32,
    #[serde(default = "default_results_linger_s")]
    pub results_linger_s: f32,
}

fn default_results_linger_s() -> f32 {
    1.5
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollisionConfig {
    pub active_profile: String,
    pub profiles: Vec<CollisionProfileConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollisionProfileConfig {
    pub id: String,
    pub shape: ShapeTest,
    #[serde(default)]
    pub subdivisions: u32,
    pub leeway: f32,
}

impl HasId for CollisionProfileConfig {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VehicleFile {
    pub vehicle: VehicleConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VehicleConfig {
    pub scale: f32,
    pub start_z: f32,
    pub acceleration: f32,
    pub speed_limit: f32,
    pub nitro_acceleration: f32,
    pub nitro_speed_limit: f32,
    pub idle_decay_step: f32,
    pub idle_snap_threshold: f32,
    pub angle_increment_deg: f32,
    #[serde(default = "default_seat_offset")]
    pub seat_offset: [f32; 3],
    #[serde(default)]
    pub hitbox_pre_pitch_deg: f32,
    #[serde(default)]
    pub hitbox_offset: [f32; 3],
    #[serde(default)]
    pub hitbox_pitch_deg: f32,
    #[serde(default = "default_hitbox_scale")]
    pub hitbox_scale: [f32; 3],
    #[serde(default = "default_camera_offset")]
    pub camera_offset: [f32; 3],
    #[serde(default)]
    pub camera_pitch_deg: f32,
    #[serde(default = "default_camera_distance")]
    pub camera_distance: f32,
}

fn default_seat_offset() -> [f32; 3] {
    [0.0, 0.6, 0.0]
}

fn default_hitbox_scale() -> [f32; 3] {
    [0.6, 1.0, 1.0]
}

fn default_camera_offset() -> [f32; 3] {
    [0.0, 1.0, 0.0]
}

fn default_camera_distance() -> f32 {
    5.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObstaclesFile {
    pub spawner: SpawnerConfig,
    pub kinds: Vec<ObstacleKindConfig>,
    pub initial: Option<InitialObstacleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpawnerConfig {
    pub spawn_roll_threshold: f32,
    pub gate_period_ms: u64,
    pub min_lead: f32,
    pub stale_distance: f32,
    pub base_gap: f32,
    pub speed_gap_factor: f32,
    pub lane_offset: f32,
    pub ground_clearance: f32,
    pub roadblock_weight: f32,
    pub render_distance: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObstacleKindConfig {
    pub kind: ObstacleKind,
    pub scale: f32,
    pub footprint: [f32; 3],
    pub color: [f32; 3],
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitialObstacleConfig {
    pub kind: ObstacleKind,
    pub lane: LaneSide,
    pub z: f32,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AssetsFile {
    #[serde(default)]
    pub audio: Vec<AudioAssetConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioAssetConfig {
    pub id: String,
    pub path: String,
    #[serde(default = "default_audio_volume")]
    pub volume: f32,
}

fn default_audio_volume() -> f32 {
    1.0
}

impl HasId for AudioAssetConfig {
    fn id(&self) -> &str {
        &self.id
    }
}
