use crate::config::GameConfig;
use crate::gameplay::collision::{intersects, CollisionProfile};
use crate::gameplay::obstacles::{
    ObstacleField, ObstacleKind, ObstacleSpawner, SpawnContext, SpawnedObstacle,
};
use crate::gameplay::rng::RandomSource;
use crate::gameplay::vehicle::{ControlEvent, KinematicTuning, VehicleKinematics};
use bevy::prelude::Resource;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    InProgress,
    Lost,
    Won,
}

impl Outcome {
    pub fn is_terminal(self) -> bool {
        self != Self::InProgress
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::InProgress => "in progress",
            Self::Lost => "wasted",
            Self::Won => "survived",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameClock {
    pub now_s: f64,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    collision_count: u32,
    loss_threshold: u32,
    elapsed_s: f32,
    time_limit_s: f32,
    start_offset_s: Option<f64>,
    outcome: Outcome,
}

impl SessionState {
    pub fn new(time_limit_s: f32, loss_threshold: u32) -> Self {
        Self {
            collision_count: 0,
            loss_threshold: loss_threshold.max(1),
            elapsed_s: 0.0,
            time_limit_s,
            start_offset_s: None,
            outcome: Outcome::InProgress,
        }
    }

    pub fn collision_count(&self) -> u32 {
        self.collision_count
    }

    pub fn loss_threshold(&self) -> u32 {
        self.loss_threshold
    }

    pub fn elapsed_s(&self) -> f32 {
        self.elapsed_s
    }

    pub fn time_limit_s(&self) -> f32 {
        self.time_limit_s
    }

    pub fn start_offset_s(&self) -> Option<f64> {
        self.start_offset_s
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn remaining_s(&self) -> f32 {
        (self.time_limit_s - self.elapsed_s).max(0.0)
    }

    pub fn begin(&mut self, now_s: f64) {
        self.start_offset_s.get_or_insert(now_s);
    }

    fn since_start(&self, now_s: f64) -> f32 {
        self.start_offset_s
            .map(|offset| (now_s - offset).max(0.0) as f32)
            .unwrap_or(0.0)
    }

    fn record_collision(&mut self, now_s: f64) -> Option<Outcome> {
        if self.outcome.is_terminal() {
            return None;
        }

        self.collision_count = self.collision_count.saturating_add(1);
        if self.collision_count >= self.loss_threshold {
            self.outcome = Outcome::Lost;
            self.elapsed_s = self.since_start(now_s);
            return Some(Outcome::Lost);
        }
        None
    }

    fn advance_clock(&mut self, now_s: f64) -> Option<Outcome> {
        if self.outcome.is_terminal() {
            return None;
        }

        self.begin(now_s);
        let since_start = self.since_start(now_s);
        if since_start > self.time_limit_s && self.collision_count < self.loss_threshold {
            self.outcome = Outcome::Won;
            self.elapsed_s = self.time_limit_s;
            return Some(Outcome::Won);
        }

        self.elapsed_s = since_start;
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObstacleHit {
    pub index: usize,
    pub kind: ObstacleKind,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub spawned: Option<SpawnedObstacle>,
    pub hits: Vec<ObstacleHit>,
    pub ended: Option<Outcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub outcome: Outcome,
    pub elapsed_s: f32,
    pub time_limit_s: f32,
    pub collision_count: u32,
    pub obstacles_spawned: u32,
    pub obstacles_total: usize,
    pub distance: f32,
    pub collision_profile: String,
}

#[derive(Resource, Debug, Clone)]
pub struct DriveSimulation {
    vehicle: VehicleKinematics,
    obstacles: ObstacleField,
    spawner: ObstacleSpawner,
    session: SessionState,
    profile: CollisionProfile,
    start_z: f32,
}

impl DriveSimulation {
    pub fn from_config(config: &GameConfig) -> Option<Self> {
        let profile = CollisionProfile::from_config(config.active_profile()?);
        let mut spawner = ObstacleSpawner::from_config(config)?;
        let mut obstacles = ObstacleField::default();
        if let Some(initial) = &config.obstacles.initial {
            spawner.place_initial(initial, &mut obstacles, &profile);
        }
        let vehicle = VehicleKinematics::from_config(&config.vehicle.vehicle);
        let session = &config.game.session;

        Some(Self {
            start_z: vehicle.position().z,
            vehicle,
            obstacles,
            spawner,
            session: SessionState::new(session.time_limit_s, session.loss_collision_threshold),
            profile,
        })
    }

    pub fn vehicle(&self) -> &VehicleKinematics {
        &self.vehicle
    }

    pub fn obstacles(&self) -> &ObstacleField {
        &self.obstacles
    }

    pub fn spawner(&self) -> &ObstacleSpawner {
        &self.spawner
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn profile(&self) -> &CollisionProfile {
        &self.profile
    }

    pub fn distance(&self) -> f32 {
        self.start_z - self.vehicle.position().z
    }

    pub fn begin(&mut self, now_s: f64) {
        self.session.begin(now_s);
    }

    pub fn apply_control(&mut self, event: ControlEvent) {
        self.vehicle.apply_control(event);
    }

    pub fn set_vehicle_tuning(&mut self, tuning: KinematicTuning) {
        self.vehicle.set_tuning(tuning);
    }

    /// Kinematics, then spawning, then collision, then the session clock.
    pub fn tick(&mut self, clock: FrameClock, rng: &mut dyn RandomSource) -> TickReport {
        let mut report = TickReport::default();
        let finished = self.session.outcome().is_terminal();

        self.vehicle.tick(finished);
        if finished {
            return report;
        }

        report.spawned = self.spawner.tick(
            SpawnContext {
                now_s: clock.now_s,
                vehicle_z: self.vehicle.position().z,
                vehicle_speed: self.vehicle.speed(),
            },
            &mut self.obstacles,
            &self.profile,
            rng,
        );

        let (hits, lost) = self.detect_collisions(clock.now_s);
        report.hits = hits;
        report.ended = lost.or_else(|| self.session.advance_clock(clock.now_s));
        report
    }

    fn detect_collisions(&mut self, now_s: f64) -> (Vec<ObstacleHit>, Option<Outcome>) {
        let vehicle_body = self.profile.body(self.vehicle.hitbox_transform());
        let touching: Vec<ObstacleHit> = self
            .obstacles
            .iter()
            .enumerate()
            .filter(|(_, obstacle)| obstacle.is_intact())
            .filter(|(_, obstacle)| intersects(&vehicle_body, obstacle.body(), &self.profile))
            .map(|(index, obstacle)| ObstacleHit {
                index,
                kind: obstacle.kind(),
            })
            .collect();

        let mut hits = Vec::with_capacity(touching.len());
        for hit in touching {
            if !self.obstacles.mark_collided(hit.index) {
                continue;
            }
            self.vehicle.kill_momentum();
            hits.push(hit);
            if let Some(outcome) = self.session.record_collision(now_s) {
                return (hits, Some(outcome));
            }
        }
        (hits, None)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            outcome: self.session.outcome(),
            elapsed_s: self.session.elapsed_s(),
            time_limit_s: self.session.time_limit_s(),
            collision_count: self.session.collision_count(),
            obstacles_spawned: self.spawner.spawned_count(),
            obstacles_total: self.obstacles.len(),
            distance: self.distance(),
            collision_profile: self.profile.id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use crate::gameplay::obstacles::{LaneSide, Obstacle};
    use crate::gameplay::rng::tests::ScriptedRandom;
    use bevy::math::{Mat4, Vec3};

    fn clock(now_s: f64) -> FrameClock {
        FrameClock { now_s }
    }

    fn empty_simulation() -> DriveSimulation {
        let mut config = sample_config();
        config.obstacles.initial = None;
        let mut simulation = DriveSimulation::from_config(&config).expect("simulation");
        simulation.begin(0.0);
        simulation
    }

    fn place_on_vehicle(simulation: &mut DriveSimulation) -> usize {
        let hitbox_center = simulation.vehicle.hitbox_transform().w_axis.truncate();
        let obstacle = Obstacle::new(
            Mat4::from_translation(hitbox_center),
            ObstacleKind::Boulder,
            LaneSide::Right,
            Vec3::ONE,
            &simulation.profile,
        );
        simulation.obstacles.push(obstacle)
    }

    fn quiet_rng() -> ScriptedRandom {
        ScriptedRandom::new(&[], 0.0)
    }

    #[test]
    fn obstacle_inside_resting_vehicle_registers_one_hit() {
        let mut simulation = empty_simulation();
        let index = place_on_vehicle(&mut simulation);
        let obstacle = simulation.obstacles.get(index).expect("obstacle").clone();
        let vehicle_body = simulation
            .profile
            .body(simulation.vehicle.hitbox_transform());
        assert!(intersects(&vehicle_body, obstacle.body(), &simulation.profile));

        let report = simulation.tick(clock(0.1), &mut quiet_rng());

        assert_eq!(
            report.hits,
            vec![ObstacleHit {
                index,
                kind: ObstacleKind::Boulder
            }]
        );
        assert_eq!(simulation.session.collision_count(), 1);
        assert_eq!(simulation.vehicle.speed(), 0.0);
        assert!(!simulation.obstacles.get(index).expect("obstacle").is_intact());
        assert_eq!(simulation.session.outcome(), Outcome::InProgress);
    }

    #[test]
    fn collided_obstacle_is_not_counted_twice() {
        let mut simulation = empty_simulation();
        place_on_vehicle(&mut simulation);
        let mut rng = quiet_rng();

        simulation.tick(clock(0.1), &mut rng);
        let second = simulation.tick(clock(0.2), &mut rng);

        assert!(second.hits.is_empty());
        assert_eq!(simulation.session.collision_count(), 1);
        assert_eq!(simulation.obstacles.len(), 1);
    }

    #[test]
    fn third_collision_loses_and_freezes_vehicle() {
        let mut simulation = empty_simulation();
        let mut rng = quiet_rng();
        let mut previous_count = 0;

        for (tick, now_s) in [1.0, 2.0, 3.0].into_iter().enumerate() {
            place_on_vehicle(&mut simulation);
            let report = simulation.tick(clock(now_s), &mut rng);
            assert!(simulation.session.collision_count() > previous_count);
            previous_count = simulation.session.collision_count();
            if tick < 2 {
                assert_eq!(report.ended, None);
            } else {
                assert_eq!(report.ended, Some(Outcome::Lost));
            }
        }

        assert_eq!(simulation.session.outcome(), Outcome::Lost);
        assert!((simulation.session.elapsed_s() - 3.0).abs() < 1e-5);

        let frozen = simulation.vehicle.car_transform();
        simulation.apply_control(ControlEvent::ThrottleForward);
        for step in 0..30 {
            let report = simulation.tick(clock(3.0 + step as f64 * 0.1), &mut rng);
            assert_eq!(report, TickReport::default());
        }
        assert_eq!(simulation.vehicle.car_transform(), frozen);
        assert_eq!(simulation.session.outcome(), Outcome::Lost);
        assert!((simulation.session.elapsed_s() - 3.0).abs() < 1e-5);
    }

    #[test]
    fn surviving_past_time_limit_wins_and_latches_elapsed() {
        let mut simulation = empty_simulation();
        let mut rng = quiet_rng();

        let report = simulation.tick(clock(30.0), &mut rng);
        assert_eq!(report.ended, None);
        assert!((simulation.session.elapsed_s() - 30.0).abs() < 1e-5);

        let report = simulation.tick(clock(60.5), &mut rng);
        assert_eq!(report.ended, Some(Outcome::Won));
        assert_eq!(simulation.session.outcome(), Outcome::Won);
        assert_eq!(simulation.session.elapsed_s(), 60.0);

        let report = simulation.tick(clock(90.0), &mut rng);
        assert_eq!(report.ended, None);
        assert_eq!(simulation.session.outcome(), Outcome::Won);
        assert_eq!(simulation.session.elapsed_s(), 60.0);
    }

    #[test]
    fn time_limit_counts_from_start_offset() {
        let mut config = sample_config();
        config.obstacles.initial = None;
        let mut simulation = DriveSimulation::from_config(&config).expect("simulation");
        let mut rng = quiet_rng();

        simulation.begin(100.0);
        simulation.begin(120.0);
        assert_eq!(simulation.session.start_offset_s(), Some(100.0));

        simulation.tick(clock(159.0), &mut rng);
        assert_eq!(simulation.session.outcome(), Outcome::InProgress);
        assert!((simulation.session.elapsed_s() - 59.0).abs() < 1e-4);

        simulation.tick(clock(160.5), &mut rng);
        assert_eq!(simulation.session.outcome(), Outcome::Won);
    }

    #[test]
    fn outcome_changes_at_most_once() {
        let mut session = SessionState::new(10.0, 2);
        session.begin(0.0);

        assert_eq!(session.record_collision(1.0), None);
        assert_eq!(session.advance_clock(5.0), None);
        assert_eq!(session.record_collision(6.0), Some(Outcome::Lost));
        assert_eq!(session.record_collision(7.0), None);
        assert_eq!(session.advance_clock(50.0), None);
        assert_eq!(session.collision_count(), 2);
        assert_eq!(session.outcome(), Outcome::Lost);
        assert!((session.elapsed_s() - 6.0).abs() < 1e-5);
    }

    #[test]
    fn driving_forward_spawns_ahead_and_reports_distance() {
        let mut config = sample_config();
        config.obstacles.initial = None;
        // Keep both lanes clear of the vehicle's path.
        config.obstacles.spawner.lane_offset = 20.0;
        let mut simulation = DriveSimulation::from_config(&config).expect("simulation");
        simulation.begin(0.0);
        let mut rng = ScriptedRandom::new(&[], 0.99);
        simulation.apply_control(ControlEvent::ThrottleForward);

        let mut spawned = 0;
        for frame in 1..=240 {
            let report = simulation.tick(clock(frame as f64 / 60.0), &mut rng);
            if let Some(obstacle) = report.spawned {
                assert!(obstacle.z < simulation.vehicle().position().z);
                spawned += 1;
            }
            assert!(report.hits.is_empty());
        }

        assert!(simulation.distance() > 0.0);
        assert!(spawned > 0);
        let summary = simulation.summary();
        assert_eq!(summary.obstacles_spawned, spawned);
        assert_eq!(summary.obstacles_total, spawned as usize);
        assert_eq!(summary.collision_profile, "cube");
    }

    #[test]
    fn summary_serializes_outcome_in_snake_case() {
        let simulation = empty_simulation();
        let json = serde_json::to_string(&simulation.summary()).expect("summary json");

        assert!(json.contains("\"outcome\":\"in_progress\""));
        assert!(json.contains("\"collision_count\":0"));
    }
}
