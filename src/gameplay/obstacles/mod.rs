use crate::config::{GameConfig, InitialObstacleConfig, SpawnerConfig};
use crate::gameplay::collision::{CollisionProfile, RigidBody};
use crate::gameplay::rng::RandomSource;
use bevy::math::{Mat4, Quat, Vec3};
use serde::Deserialize;

mod visuals;

pub use visuals::ObstacleVisualsPlugin;

pub const MIN_SPAWN_GAP: f32 = 1.0e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObstacleKind {
    Roadblock,
    Boulder,
}

impl ObstacleKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Roadblock => "roadblock",
            Self::Boulder => "boulder",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneSide {
    Left,
    Right,
}

impl LaneSide {
    pub fn sign(self) -> f32 {
        match self {
            Self::Left => -1.0,
            Self::Right => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObstacleStatus {
    Intact,
    Collided,
}

#[derive(Debug, Clone)]
pub struct Obstacle {
    placement: Mat4,
    kind: ObstacleKind,
    lane: LaneSide,
    status: ObstacleStatus,
    body: RigidBody,
}

impl Obstacle {
    pub fn new(
        placement: Mat4,
        kind: ObstacleKind,
        lane: LaneSide,
        footprint: Vec3,
        profile: &CollisionProfile,
    ) -> Self {
        Self {
            placement,
            kind,
            lane,
            status: ObstacleStatus::Intact,
            body: profile.body(placement * Mat4::from_scale(footprint)),
        }
    }

    pub fn placement(&self) -> Mat4 {
        self.placement
    }

    pub fn kind(&self) -> ObstacleKind {
        self.kind
    }

    pub fn lane(&self) -> LaneSide {
        self.lane
    }

    pub fn status(&self) -> ObstacleStatus {
        self.status
    }

    pub fn is_intact(&self) -> bool {
        self.status == ObstacleStatus::Intact
    }

    pub fn body(&self) -> &RigidBody {
        &self.body
    }

    pub fn z(&self) -> f32 {
        self.placement.w_axis.z
    }
}

/// Every obstacle spawned this session. Collided obstacles stay in place so indices are stable.
#[derive(Debug, Clone, Default)]
pub struct ObstacleField {
    obstacles: Vec<Obstacle>,
}

#[allow(clippy::len_without_is_empty)]
impl ObstacleField {
    pub fn push(&mut self, obstacle: Obstacle) -> usize {
        self.obstacles.push(obstacle);
        self.obstacles.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&Obstacle> {
        self.obstacles.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Obstacle> {
        self.obstacles.iter()
    }

    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    pub fn last(&self) -> Option<&Obstacle> {
        self.obstacles.last()
    }

    pub fn intact_count(&self) -> usize {
        self.obstacles.iter().filter(|obstacle| obstacle.is_intact()).count()
    }

    /// Returns `true` only for the intact -> collided transition.
    pub fn mark_collided(&mut self, index: usize) -> bool {
        match self.obstacles.get_mut(index) {
            Some(obstacle) if obstacle.is_intact() => {
                obstacle.status = ObstacleStatus::Collided;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct KindBlueprint {
    scale: f32,
    footprint: Vec3,
}

#[derive(Debug, Clone, Copy)]
pub struct SpawnContext {
    pub now_s: f64,
    pub vehicle_z: f32,
    pub vehicle_speed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnedObstacle {
    pub index: usize,
    pub kind: ObstacleKind,
    pub lane: LaneSide,
    pub z: f32,
    pub forced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpawnDecision {
    Skip,
    Spawn { forced: bool },
}

#[derive(Debug, Clone)]
pub struct ObstacleSpawner {
    rules: SpawnerConfig,
    roadblock: KindBlueprint,
    boulder: KindBlueprint,
    previous_vehicle_z: Option<f32>,
    spawned_count: u32,
}

impl ObstacleSpawner {
    pub fn from_config(config: &GameConfig) -> Option<Self> {
        let blueprint = |kind: ObstacleKind| {
            config.obstacle_kind(kind).map(|entry| KindBlueprint {
                scale: entry.scale,
                footprint: Vec3::from_array(entry.footprint),
            })
        };

        Some(Self {
            rules: config.obstacles.spawner.clone(),
            roadblock: blueprint(ObstacleKind::Roadblock)?,
            boulder: blueprint(ObstacleKind::Boulder)?,
            previous_vehicle_z: None,
            spawned_count: 0,
        })
    }

    pub fn rules(&self) -> &SpawnerConfig {
        &self.rules
    }

    pub fn spawned_count(&self) -> u32 {
        self.spawned_count
    }

    pub fn required_gap(&self, speed: f32) -> f32 {
        (self.rules.base_gap + self.rules.speed_gap_factor * speed.abs()).max(MIN_SPAWN_GAP)
    }

    pub fn is_drawn(&self, obstacle: &Obstacle, vehicle_z: f32) -> bool {
        obstacle.is_intact() && obstacle.z() - vehicle_z < self.rules.render_distance
    }

    pub fn place_initial(
        &mut self,
        initial: &InitialObstacleConfig,
        field: &mut ObstacleField,
        profile: &CollisionProfile,
    ) -> usize {
        field.push(self.build(initial.kind, initial.lane, initial.z, profile))
    }

    pub fn tick(
        &mut self,
        context: SpawnContext,
        field: &mut ObstacleField,
        profile: &CollisionProfile,
        rng: &mut dyn RandomSource,
    ) -> Option<SpawnedObstacle> {
        let moved = self
            .previous_vehicle_z
            .is_some_and(|previous| previous != context.vehicle_z);
        self.previous_vehicle_z = Some(context.vehicle_z);

        let last_z = field.last().map(Obstacle::z);
        let forced = match self.decide(&context, moved, last_z, rng) {
            SpawnDecision::Skip => return None,
            SpawnDecision::Spawn { forced } => forced,
        };

        let z = last_z.unwrap_or(context.vehicle_z) - self.required_gap(context.vehicle_speed);
        let (lane, kind) = pick_lane_and_kind(rng.next_unit(), self.rules.roadblock_weight);
        let index = field.push(self.build(kind, lane, z, profile));
        self.spawned_count = self.spawned_count.saturating_add(1);

        Some(SpawnedObstacle {
            index,
            kind,
            lane,
            z,
            forced,
        })
    }

    fn decide(
        &self,
        context: &SpawnContext,
        moved: bool,
        last_z: Option<f32>,
        rng: &mut dyn RandomSource,
    ) -> SpawnDecision {
        let roll = rng.next_unit();
        let Some(last_z) = last_z else {
            return SpawnDecision::Spawn { forced: true };
        };

        // Positive lead: the newest obstacle is still ahead of the vehicle.
        let lead = context.vehicle_z - last_z;
        if lead < -self.rules.stale_distance {
            return SpawnDecision::Spawn { forced: true };
        }

        if roll > self.rules.spawn_roll_threshold
            && self.time_gate_open(context.now_s)
            && moved
            && context.vehicle_speed > 0.0
            && lead < self.rules.min_lead
        {
            SpawnDecision::Spawn { forced: false }
        } else {
            SpawnDecision::Skip
        }
    }

    fn time_gate_open(&self, now_s: f64) -> bool {
        let now_ms = (now_s * 1000.0).floor().max(0.0) as u64;
        now_ms % self.rules.gate_period_ms.max(1) == 0
    }

    fn build(
        &self,
        kind: ObstacleKind,
        lane: LaneSide,
        z: f32,
        profile: &CollisionProfile,
    ) -> Obstacle {
        let blueprint = match kind {
            ObstacleKind::Roadblock => self.roadblock,
            ObstacleKind::Boulder => self.boulder,
        };
        let placement = Mat4::from_scale_rotation_translation(
            Vec3::splat(blueprint.scale),
            Quat::IDENTITY,
            Vec3::new(
                lane.sign() * self.rules.lane_offset,
                self.rules.ground_clearance,
                z,
            ),
        );
        Obstacle::new(placement, kind, lane, blueprint.footprint, profile)
    }
}

/// Maps one uniform draw onto lane and kind: the lower half picks the left lane and the
/// position inside each half picks the kind.
pub fn pick_lane_and_kind(draw: f32, roadblock_weight: f32) -> (LaneSide, ObstacleKind) {
    let scaled = draw.clamp(0.0, 0.999_999) * 2.0;
    let lane = if scaled < 1.0 {
        LaneSide::Left
    } else {
        LaneSide::Right
    };
    let kind = if scaled.fract() < roadblock_weight {
        ObstacleKind::Roadblock
    } else {
        ObstacleKind::Boulder
    };
    (lane, kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use crate::gameplay::rng::tests::ScriptedRandom;
    use crate::gameplay::rng::SeededRandom;

    fn setup() -> (ObstacleSpawner, ObstacleField, CollisionProfile) {
        let config = sample_config();
        let profile = CollisionProfile::from_config(config.active_profile().expect("profile"));
        let spawner = ObstacleSpawner::from_config(&config).expect("spawner");
        (spawner, ObstacleField::default(), profile)
    }

    fn seeded_field(
        spawner: &mut ObstacleSpawner,
        profile: &CollisionProfile,
    ) -> ObstacleField {
        let config = sample_config();
        let mut field = ObstacleField::default();
        let initial = config.obstacles.initial.as_ref().expect("initial obstacle");
        spawner.place_initial(initial, &mut field, profile);
        field
    }

    #[test]
    fn initial_obstacle_uses_lane_offset_and_clearance() {
        let (mut spawner, _, profile) = setup();
        let field = seeded_field(&mut spawner, &profile);

        let obstacle = field.get(0).expect("initial obstacle");
        let translation = obstacle.placement().w_axis;
        assert_eq!(obstacle.kind(), ObstacleKind::Roadblock);
        assert!((translation.x + 4.05).abs() < 1e-5);
        assert!((translation.y - 1.0).abs() < 1e-5);
        assert!((obstacle.z() + 69.0).abs() < 1e-5);
        assert_eq!(spawner.spawned_count(), 0);
    }

    #[test]
    fn empty_field_forces_a_spawn_ahead_of_the_vehicle() {
        let (mut spawner, mut field, profile) = setup();
        let mut rng = ScriptedRandom::new(&[0.1, 0.3], 0.0);

        let spawned = spawner
            .tick(
                SpawnContext {
                    now_s: 0.0133,
                    vehicle_z: 60.0,
                    vehicle_speed: 0.0,
                },
                &mut field,
                &profile,
                &mut rng,
            )
            .expect("forced spawn");

        assert!(spawned.forced);
        assert_eq!(spawned.lane, LaneSide::Left);
        assert_eq!(spawned.kind, ObstacleKind::Boulder);
        assert!((spawned.z - 0.0).abs() < 1e-4);
        assert_eq!(field.len(), 1);
    }

    #[test]
    fn distant_lead_obstacle_rejects_spawn() {
        let (mut spawner, _, profile) = setup();
        let mut field = seeded_field(&mut spawner, &profile);
        let mut rng = ScriptedRandom::new(&[], 0.95);

        for tick in 0..4 {
            let spawned = spawner.tick(
                SpawnContext {
                    now_s: 0.25 * tick as f64,
                    vehicle_z: 60.0 - tick as f32,
                    vehicle_speed: 1.0,
                },
                &mut field,
                &profile,
                &mut rng,
            );
            assert!(spawned.is_none());
        }
        assert_eq!(field.len(), 1);
    }

    #[test]
    fn close_lead_obstacle_spawns_when_roll_and_gate_pass() {
        let (mut spawner, _, profile) = setup();
        let mut field = seeded_field(&mut spawner, &profile);
        let mut rng = ScriptedRandom::new(&[0.1, 0.95, 0.6], 0.0);

        let first = spawner.tick(
            SpawnContext {
                now_s: 0.25,
                vehicle_z: -50.0,
                vehicle_speed: 1.0,
            },
            &mut field,
            &profile,
            &mut rng,
        );
        assert!(first.is_none());

        let spawned = spawner
            .tick(
                SpawnContext {
                    now_s: 0.5,
                    vehicle_z: -60.0,
                    vehicle_speed: 1.0,
                },
                &mut field,
                &profile,
                &mut rng,
            )
            .expect("spawn");

        assert!(!spawned.forced);
        assert_eq!(spawned.lane, LaneSide::Right);
        assert_eq!(spawned.kind, ObstacleKind::Roadblock);
        assert!((spawned.z + 199.0).abs() < 1e-3);
        assert_eq!(spawner.spawned_count(), 1);
    }

    #[test]
    fn closed_time_gate_blocks_unforced_spawns() {
        let (mut spawner, _, profile) = setup();
        let mut field = seeded_field(&mut spawner, &profile);
        let mut rng = ScriptedRandom::new(&[], 0.95);

        for (now_s, vehicle_z) in [(0.2511, -50.0), (0.5035, -60.0), (0.7542, -62.0)] {
            let spawned = spawner.tick(
                SpawnContext {
                    now_s,
                    vehicle_z,
                    vehicle_speed: 1.0,
                },
                &mut field,
                &profile,
                &mut rng,
            );
            assert!(spawned.is_none());
        }
    }

    #[test]
    fn stale_lead_obstacle_forces_spawn_regardless_of_roll() {
        let (mut spawner, _, profile) = setup();
        let mut field = seeded_field(&mut spawner, &profile);
        let mut rng = ScriptedRandom::new(&[0.0, 0.9], 0.0);

        let spawned = spawner
            .tick(
                SpawnContext {
                    now_s: 0.0133,
                    vehicle_z: -200.0,
                    vehicle_speed: 0.0,
                },
                &mut field,
                &profile,
                &mut rng,
            )
            .expect("forced spawn");

        assert!(spawned.forced);
        assert_eq!(spawned.lane, LaneSide::Right);
        assert_eq!(spawned.kind, ObstacleKind::Boulder);
        assert!((spawned.z + 129.0).abs() < 1e-3);
    }

    #[test]
    fn consecutive_spawns_respect_base_gap() {
        let (mut spawner, _, profile) = setup();
        let mut field = seeded_field(&mut spawner, &profile);
        let mut rng = SeededRandom::from_seed(1234);
        let mut vehicle_z = 60.0;

        for tick in 0..3_000 {
            vehicle_z -= 2.0 * 3.0;
            spawner.tick(
                SpawnContext {
                    now_s: tick as f64 / 60.0,
                    vehicle_z,
                    vehicle_speed: 3.0,
                },
                &mut field,
                &profile,
                &mut rng,
            );
        }

        assert!(field.len() > 10);
        let base_gap = spawner.rules().base_gap;
        let positions: Vec<f32> = field.iter().map(Obstacle::z).collect();
        for pair in positions.windows(2) {
            assert!(pair[0] - pair[1] >= base_gap);
        }
    }

    #[test]
    fn non_positive_gap_is_clamped_to_epsilon() {
        let (mut spawner, _, _) = setup();
        spawner.rules.base_gap = -10.0;
        spawner.rules.speed_gap_factor = 0.0;

        assert_eq!(spawner.required_gap(4.0), MIN_SPAWN_GAP);
    }

    #[test]
    fn single_draw_covers_every_lane_and_kind() {
        assert_eq!(
            pick_lane_and_kind(0.1, 0.5),
            (LaneSide::Left, ObstacleKind::Roadblock)
        );
        assert_eq!(
            pick_lane_and_kind(0.3, 0.5),
            (LaneSide::Left, ObstacleKind::Boulder)
        );
        assert_eq!(
            pick_lane_and_kind(0.6, 0.5),
            (LaneSide::Right, ObstacleKind::Roadblock)
        );
        assert_eq!(
            pick_lane_and_kind(0.9, 0.5),
            (LaneSide::Right, ObstacleKind::Boulder)
        );
    }

    #[test]
    fn collided_status_is_one_way() {
        let (mut spawner, _, profile) = setup();
        let mut field = seeded_field(&mut spawner, &profile);

        assert!(field.mark_collided(0));
        assert!(!field.mark_collided(0));
        assert!(!field.mark_collided(7));
        assert_eq!(field.get(0).map(Obstacle::status), Some(ObstacleStatus::Collided));
        assert_eq!(field.intact_count(), 0);
        assert_eq!(field.len(), 1);
    }

    #[test]
    fn render_culling_hides_collided_and_far_behind_obstacles() {
        let (mut spawner, _, profile) = setup();
        let mut field = seeded_field(&mut spawner, &profile);

        let obstacle = field.get(0).expect("obstacle").clone();
        assert!(spawner.is_drawn(&obstacle, 0.0));
        assert!(spawner.is_drawn(&obstacle, -140.0));
        assert!(!spawner.is_drawn(&obstacle, -150.0));

        field.mark_collided(0);
        let collided = field.get(0).expect("obstacle");
        assert!(!spawner.is_drawn(collided, 0.0));
    }
}
