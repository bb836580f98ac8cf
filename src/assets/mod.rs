use crate::config::{AudioAssetConfig, GameConfig};
use bevy::prelude::*;
use std::collections::HashMap;
use std::path::Path;

const ASSET_ROOT_DIR: &str = "assets";

pub struct AssetRegistryPlugin;

impl Plugin for AssetRegistryPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Update,
            sync_asset_registry.run_if(resource_exists::<GameConfig>),
        );
    }
}

fn sync_asset_registry(
    mut commands: Commands,
    config: Res<GameConfig>,
    asset_server: Res<AssetServer>,
    registry: Option<ResMut<AssetRegistry>>,
) {
    if registry.is_some() && !config.is_changed() {
        return;
    }

    let new_registry =
        AssetRegistry::from_config(&config, &asset_server, Path::new(ASSET_ROOT_DIR));

    match registry {
        Some(mut existing_registry) => {
            *existing_registry = new_registry;
            log_asset_registry_summary("Updated", &existing_registry);
        }
        None => {
            log_asset_registry_summary("Initialized", &new_registry);
            commands.insert_resource(new_registry);
        }
    }
}

fn log_asset_registry_summary(prefix: &str, registry: &AssetRegistry) {
    info!(
        "{prefix} asset registry: audio {}/{} available.",
        registry.available_audio_count(),
        registry.audio.len(),
    );
}

#[derive(Resource, Debug, Clone, Default)]
pub struct AssetRegistry {
    pub audio: HashMap<String, AudioAssetEntry>,
}

impl AssetRegistry {
    pub fn from_config(config: &GameConfig, asset_server: &AssetServer, asset_root: &Path) -> Self {
        let audio = config
            .assets
            .audio
            .iter()
            .map(|entry| {
                let sound = AudioAssetEntry::from_config(entry, asset_server, asset_root);
                (entry.id.clone(), sound)
            })
            .collect();

        Self { audio }
    }

    fn available_audio_count(&self) -> usize {
        self.audio
            .values()
            .filter(|entry| entry.exists_on_disk)
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct AudioAssetEntry {
    pub path: String,
    pub volume: f32,
    pub exists_on_disk: bool,
    pub handle: Option<Handle<AudioSource>>,
}

impl AudioAssetEntry {
    fn from_config(
        config: &AudioAssetConfig,
        asset_server: &AssetServer,
        asset_root: &Path,
    ) -> Self {
        let exists_on_disk = asset_exists(asset_root, &config.path);
        let handle = exists_on_disk.then(|| asset_server.load(config.path.clone()));

        Self {
            path: config.path.clone(),
            volume: config.volume.max(0.0),
            exists_on_disk,
            handle,
        }
    }
}

fn asset_exists(asset_root: &Path, path: &str) -> bool {
    let file_path = path.split('#').next().unwrap_or(path);
    asset_root.join(file_path).exists()
}
