pub mod collision;
pub mod obstacles;
pub mod rng;
pub mod session;
pub mod sfx;
pub mod vehicle;

use bevy::prelude::*;
use obstacles::ObstacleVisualsPlugin;
use session::SessionGameplayPlugin;
use sfx::GameplaySfxPlugin;
use vehicle::VehicleGameplayPlugin;

pub struct GameplayPlugin;

impl Plugin for GameplayPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(VehicleGameplayPlugin)
            .add_plugins(SessionGameplayPlugin)
            .add_plugins(ObstacleVisualsPlugin)
            .add_plugins(GameplaySfxPlugin);
    }
}
