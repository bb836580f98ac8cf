use crate::config::{GameConfig, VehicleConfig};
use crate::states::GameState;
use bevy::math::{Mat4, Vec3};
use bevy::prelude::*;
use bevy::transform::TransformSystems;

mod runtime;

pub use runtime::VehicleInputState;

pub struct VehicleGameplayPlugin;

impl Plugin for VehicleGameplayPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<ControlEvent>()
            .init_resource::<runtime::VehicleInputBindings>()
            .init_resource::<VehicleInputState>()
            .add_systems(Startup, runtime::spawn_drive_scene)
            .add_systems(OnEnter(GameState::Ready), runtime::reset_vehicle_input)
            .add_systems(
                Update,
                runtime::read_vehicle_input
                    .run_if(in_state(GameState::InRun))
                    .run_if(resource_exists::<GameConfig>),
            )
            .add_systems(
                PostUpdate,
                (runtime::sync_vehicle_visual, runtime::camera_follow_vehicle)
                    .before(TransformSystems::Propagate),
            );
    }
}

#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    ThrottleForward,
    ThrottleReverse,
    ReleaseThrottle,
    SteerRight,
    SteerLeft,
    ReleaseSteer,
    NitroOn,
    NitroOff,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KinematicTuning {
    pub acceleration: f32,
    pub speed_limit: f32,
    pub nitro_acceleration: f32,
    pub nitro_speed_limit: f32,
    pub idle_decay_step: f32,
    pub idle_snap_threshold: f32,
    pub angle_increment_rad: f32,
}

impl KinematicTuning {
    pub fn from_config(config: &VehicleConfig) -> Self {
        Self {
            acceleration: config.acceleration,
            speed_limit: config.speed_limit,
            nitro_acceleration: config.nitro_acceleration,
            nitro_speed_limit: config.nitro_speed_limit,
            idle_decay_step: config.idle_decay_step,
            idle_snap_threshold: config.idle_snap_threshold,
            angle_increment_rad: config.angle_increment_deg.to_radians(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct VehicleMounts {
    seat: Mat4,
    hitbox: Mat4,
    camera: Mat4,
}

impl VehicleMounts {
    fn from_config(config: &VehicleConfig) -> Self {
        Self {
            seat: Mat4::from_translation(Vec3::from_array(config.seat_offset)),
            hitbox: Mat4::from_rotation_x(config.hitbox_pre_pitch_deg.to_radians())
                * Mat4::from_translation(Vec3::from_array(config.hitbox_offset))
                * Mat4::from_rotation_x(config.hitbox_pitch_deg.to_radians())
                * Mat4::from_scale(Vec3::from_array(config.hitbox_scale)),
            camera: Mat4::from_translation(Vec3::from_array(config.camera_offset))
                * Mat4::from_rotation_x(config.camera_pitch_deg.to_radians())
                * Mat4::from_translation(Vec3::new(0.0, 0.0, config.camera_distance)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VehicleKinematics {
    car_transform: Mat4,
    speed: f32,
    acceleration_sign: i8,
    turn_sign: i8,
    nitro: bool,
    pending_translation: Vec3,
    pending_yaw: f32,
    tuning: KinematicTuning,
    mounts: VehicleMounts,
}

impl VehicleKinematics {
    pub fn from_config(config: &VehicleConfig) -> Self {
        Self {
            car_transform: Mat4::from_scale(Vec3::splat(config.scale))
                * Mat4::from_translation(Vec3::new(0.0, 0.0, config.start_z)),
            speed: 0.0,
            acceleration_sign: 0,
            turn_sign: 0,
            nitro: false,
            pending_translation: Vec3::ZERO,
            pending_yaw: 0.0,
            tuning: KinematicTuning::from_config(config),
            mounts: VehicleMounts::from_config(config),
        }
    }

    pub fn tuning(&self) -> KinematicTuning {
        self.tuning
    }

    pub fn set_tuning(&mut self, tuning: KinematicTuning) {
        self.tuning = tuning;
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn speed_limit(&self) -> f32 {
        if self.nitro {
            self.tuning.nitro_speed_limit
        } else {
            self.tuning.speed_limit
        }
    }

    pub fn acceleration(&self) -> f32 {
        if self.nitro {
            self.tuning.nitro_acceleration
        } else {
            self.tuning.acceleration
        }
    }

    pub fn acceleration_sign(&self) -> i8 {
        self.acceleration_sign
    }

    pub fn turn_sign(&self) -> i8 {
        self.turn_sign
    }

    pub fn nitro_active(&self) -> bool {
        self.nitro
    }

    pub fn car_transform(&self) -> Mat4 {
        self.car_transform
    }

    pub fn position(&self) -> Vec3 {
        self.car_transform.w_axis.truncate()
    }

    pub fn render_transform(&self) -> Mat4 {
        self.car_transform * self.mounts.seat
    }

    pub fn hitbox_transform(&self) -> Mat4 {
        self.render_transform() * self.mounts.hitbox
    }

    pub fn camera_transform(&self) -> Mat4 {
        self.car_transform * self.mounts.camera
    }

    pub fn apply_control(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::ThrottleForward => self.acceleration_sign = 1,
            ControlEvent::ThrottleReverse => self.acceleration_sign = -1,
            ControlEvent::ReleaseThrottle => {
                self.commit_pending();
                self.acceleration_sign = 0;
            }
            ControlEvent::SteerRight => self.turn_sign = 1,
            ControlEvent::SteerLeft => self.turn_sign = -1,
            ControlEvent::ReleaseSteer => {
                self.commit_pending();
                self.turn_sign = 0;
            }
            ControlEvent::NitroOn => self.nitro = true,
            ControlEvent::NitroOff => self.nitro = false,
        }
    }

    pub fn kill_momentum(&mut self) {
        self.commit_pending();
        self.acceleration_sign = 0;
        self.speed = 0.0;
    }

    pub fn tick(&mut self, frozen: bool) {
        if frozen {
            self.speed = 0.0;
            self.acceleration_sign = 0;
            self.pending_translation = Vec3::ZERO;
            self.pending_yaw = 0.0;
            return;
        }

        if self.acceleration_sign != 0 {
            self.speed += self.acceleration() * f32::from(self.acceleration_sign);
            if self.turn_sign != 0 {
                let turn = self.tuning.angle_increment_rad * f32::from(self.turn_sign);
                self.pending_yaw -= turn;
                self.pending_translation.x += turn;
            }
        } else {
            self.decay_idle_speed();
        }

        let limit = self.speed_limit();
        self.speed = self.speed.clamp(-limit, limit);
        self.pending_translation.z -= self.speed;
        self.commit_pending();
    }

    fn decay_idle_speed(&mut self) {
        let snap = self
            .tuning
            .idle_decay_step
            .max(self.tuning.idle_snap_threshold);
        if self.speed.abs() <= snap {
            self.speed = 0.0;
        } else {
            self.speed -= self.tuning.idle_decay_step * self.speed.signum();
        }
    }

    fn commit_pending(&mut self) {
        if self.pending_translation == Vec3::ZERO && self.pending_yaw == 0.0 {
            return;
        }

        self.car_transform = self.car_transform
            * Mat4::from_translation(self.pending_translation)
            * Mat4::from_rotation_y(self.pending_yaw);
        self.pending_translation = Vec3::ZERO;
        self.pending_yaw = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_vehicle_file;

    fn vehicle() -> VehicleKinematics {
        VehicleKinematics::from_config(&sample_vehicle_file().vehicle)
    }

    #[test]
    fn starts_scaled_at_configured_position() {
        let vehicle = vehicle();

        assert!((vehicle.position() - Vec3::new(0.0, 0.0, 60.0)).length() < 1e-5);
        assert_eq!(vehicle.speed(), 0.0);
        assert_eq!(vehicle.acceleration_sign(), 0);
    }

    #[test]
    fn speed_stays_within_limit_in_both_directions() {
        let mut vehicle = vehicle();
        vehicle.apply_control(ControlEvent::ThrottleForward);
        for _ in 0..400 {
            vehicle.tick(false);
            assert!(vehicle.speed().abs() <= vehicle.speed_limit());
        }
        assert!((vehicle.speed() - 5.0).abs() < 1e-5);

        vehicle.apply_control(ControlEvent::NitroOn);
        for _ in 0..200 {
            vehicle.tick(false);
            assert!(vehicle.speed() <= 8.0);
        }
        assert!((vehicle.speed() - 8.0).abs() < 1e-5);

        vehicle.apply_control(ControlEvent::NitroOff);
        vehicle.tick(false);
        assert!((vehicle.speed() - 5.0).abs() < 1e-5);

        vehicle.apply_control(ControlEvent::ThrottleReverse);
        for _ in 0..800 {
            vehicle.tick(false);
            assert!(vehicle.speed().abs() <= vehicle.speed_limit());
        }
        assert!((vehicle.speed() + 5.0).abs() < 1e-5);
    }

    #[test]
    fn idle_decay_is_monotonic_and_never_flips_sign() {
        for start in [4.97_f32, 0.07, -0.07, -3.33] {
            let mut vehicle = vehicle();
            vehicle.speed = start;
            let mut previous = start.abs();

            for _ in 0..100 {
                vehicle.tick(false);
                let speed = vehicle.speed();
                assert!(speed.abs() <= previous);
                assert!(speed == 0.0 || speed.signum() == start.signum());
                previous = speed.abs();
            }
            assert_eq!(vehicle.speed(), 0.0);
        }
    }

    #[test]
    fn forward_displacement_matches_integrated_speed() {
        let mut vehicle = vehicle();
        let start = vehicle.position();
        vehicle.apply_control(ControlEvent::ThrottleForward);

        let mut expected_speed_sum = 0.0_f32;
        let mut speed = 0.0_f32;
        for _ in 0..50 {
            vehicle.tick(false);
            speed = (speed + 0.02).min(5.0);
            expected_speed_sum += speed;
        }

        let displacement = vehicle.position() - start;
        assert!((displacement.z + 2.0 * expected_speed_sum).abs() < 1e-3);
        assert!(displacement.x.abs() < 1e-6);
        assert!(displacement.y.abs() < 1e-6);
    }

    #[test]
    fn steering_only_applies_under_power() {
        let mut coasting = vehicle();
        coasting.speed = 3.0;
        coasting.apply_control(ControlEvent::SteerRight);
        for _ in 0..10 {
            coasting.tick(false);
        }
        assert!(coasting.position().x.abs() < 1e-6);

        let mut powered = vehicle();
        powered.apply_control(ControlEvent::ThrottleForward);
        powered.apply_control(ControlEvent::SteerRight);
        for _ in 0..10 {
            powered.tick(false);
        }
        assert!(powered.position().x > 0.0);
    }

    #[test]
    fn frozen_vehicle_keeps_transform_and_rests() {
        let mut vehicle = vehicle();
        vehicle.apply_control(ControlEvent::ThrottleForward);
        for _ in 0..20 {
            vehicle.tick(false);
        }
        let held = vehicle.car_transform();

        vehicle.apply_control(ControlEvent::SteerLeft);
        for _ in 0..20 {
            vehicle.tick(true);
        }

        assert_eq!(vehicle.car_transform(), held);
        assert_eq!(vehicle.speed(), 0.0);
        assert_eq!(vehicle.acceleration_sign(), 0);
    }

    #[test]
    fn releasing_controls_commits_pending_motion() {
        let mut vehicle = vehicle();
        vehicle.pending_translation = Vec3::new(0.5, 0.0, -1.0);
        vehicle.pending_yaw = 0.1;
        let before = vehicle.position();

        vehicle.apply_control(ControlEvent::ReleaseSteer);

        assert_eq!(vehicle.pending_translation, Vec3::ZERO);
        assert_eq!(vehicle.pending_yaw, 0.0);
        let moved = vehicle.position() - before;
        assert!((moved - Vec3::new(1.0, 0.0, -2.0)).length() < 1e-5);
        assert_eq!(vehicle.turn_sign(), 0);
    }

    #[test]
    fn kill_momentum_forces_idle_at_rest() {
        let mut vehicle = vehicle();
        vehicle.apply_control(ControlEvent::ThrottleReverse);
        for _ in 0..30 {
            vehicle.tick(false);
        }
        assert!(vehicle.speed() < 0.0);

        vehicle.kill_momentum();

        assert_eq!(vehicle.speed(), 0.0);
        assert_eq!(vehicle.acceleration_sign(), 0);
    }

    #[test]
    fn hitbox_and_camera_follow_committed_transform() {
        let mut vehicle = vehicle();
        let hitbox_before = vehicle.hitbox_transform().w_axis;
        let camera_before = vehicle.camera_transform().w_axis;

        vehicle.apply_control(ControlEvent::ThrottleForward);
        for _ in 0..10 {
            vehicle.tick(false);
        }

        let travelled = vehicle.position().z - 60.0;
        assert!(travelled < 0.0);
        assert!((vehicle.hitbox_transform().w_axis.z - hitbox_before.z - travelled).abs() < 1e-4);
        assert!((vehicle.camera_transform().w_axis.z - camera_before.z - travelled).abs() < 1e-4);
        assert!(vehicle.camera_transform().w_axis.z > vehicle.position().z);
    }

    #[test]
    fn hitbox_drops_below_the_seat_after_the_pre_pitch() {
        let vehicle = vehicle();
        let expected = vehicle.render_transform()
            * Mat4::from_rotation_x((-15.0_f32).to_radians())
            * Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0))
            * Mat4::from_rotation_x(22.5_f32.to_radians())
            * Mat4::from_scale(Vec3::new(0.6, 1.0, 1.0));

        assert!(vehicle.hitbox_transform().abs_diff_eq(expected, 1e-5));
        let seat_y = vehicle.render_transform().w_axis.y;
        let hitbox = vehicle.hitbox_transform().w_axis;
        assert!((seat_y - hitbox.y - 2.0 * 15.0_f32.to_radians().cos()).abs() < 1e-4);
        assert!(hitbox.z > vehicle.render_transform().w_axis.z);
    }
}
