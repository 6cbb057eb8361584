//! Startup configuration from the command line, and the keyboard controls
//! that adjust it while running.

use std::path::PathBuf;

use clap::Parser;
use winit::keyboard::KeyCode;

use crate::bodies::SpawnSettings;
use crate::camera::CameraSettings;
use crate::physics::PhysicsConstants;

pub const BODY_COUNT_STEP: u32 = 10;
pub const RESTITUTION_STEP: f32 = 0.1;

#[derive(Parser, Debug, Clone)]
#[command(name = "nbody-sim", about = "Interactive GPU N-body simulation")]
pub struct SimConfig {
    /// Bodies spawned at startup
    #[arg(short = 'n', long, default_value_t = 50)]
    pub bodies: u32,

    /// Capacity of the body buffers, fixed for the whole run
    #[arg(long, default_value_t = 512)]
    pub max_bodies: u32,

    /// Fraction of energy kept by a collision, 0-1
    #[arg(short, long, default_value_t = 1.0)]
    pub restitution: f32,

    #[arg(long, default_value_t = 1.0)]
    pub body_radius: f32,

    #[arg(long, default_value_t = 1.0)]
    pub body_mass: f32,

    /// Spawn velocity components are drawn from +-speed * radius
    #[arg(long, default_value_t = 1e-3)]
    pub spawn_speed: f32,

    #[arg(short = 'g', long, default_value_t = 1e-4)]
    pub gravitational_constant: f32,

    /// Added to squared distances in the force sum
    #[arg(long, default_value_t = 0.01)]
    pub softening: f32,

    /// Camera speed in world units per millisecond
    #[arg(long, default_value_t = 0.01)]
    pub movement_speed: f32,

    /// Degrees of rotation per pixel of mouse motion
    #[arg(long, default_value_t = 0.1)]
    pub mouse_sensitivity: f32,

    #[arg(long, default_value = "assets")]
    pub assets: PathBuf,

    /// Seed for body placement, random when absent
    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, default_value_t = false)]
    pub no_vsync: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::parse_from(["nbody-sim"])
    }
}

impl SimConfig {
    pub fn spawn_settings(&self, materials: u32) -> SpawnSettings {
        SpawnSettings {
            max_bodies: self.max_bodies,
            body_radius: self.body_radius,
            body_mass: self.body_mass,
            speed: self.spawn_speed,
            materials,
        }
    }

    pub fn camera_settings(&self, aspect_ratio: f32) -> CameraSettings {
        CameraSettings {
            aspect_ratio,
            movement_speed: self.movement_speed,
            mouse_sensitivity: self.mouse_sensitivity,
            ..Default::default()
        }
    }

    pub fn physics_constants(&self) -> PhysicsConstants {
        PhysicsConstants {
            gravitational_constant: self.gravitational_constant,
            softening: self.softening,
        }
    }

    pub fn rng(&self) -> fastrand::Rng {
        match self.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        }
    }
}

/// A value the user asked to change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlChange {
    BodyCount(u32),
    Restitution(f32),
}

/// The numeric controls shown to the user, with their current values.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeControls {
    pub body_count: u32,
    pub max_bodies: u32,
    pub restitution: f32,
}

impl RuntimeControls {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            body_count: config.bodies.min(config.max_bodies),
            max_bodies: config.max_bodies,
            restitution: round_to_tenth(config.restitution.clamp(0.0, 1.0)),
        }
    }

    /// Maps a key press to a control change, or `None` for keys that do not
    /// drive a control or do not change its value.
    pub fn handle_key(&mut self, key: KeyCode) -> Option<ControlChange> {
        match key {
            KeyCode::ArrowUp => self.set_body_count(self.body_count.saturating_add(BODY_COUNT_STEP)),
            KeyCode::ArrowDown => self.set_body_count(self.body_count.saturating_sub(BODY_COUNT_STEP)),
            KeyCode::ArrowRight => self.set_restitution(self.restitution + RESTITUTION_STEP),
            KeyCode::ArrowLeft => self.set_restitution(self.restitution - RESTITUTION_STEP),
            _ => None,
        }
    }

    pub fn set_body_count(&mut self, count: u32) -> Option<ControlChange> {
        let count = count.min(self.max_bodies);
        if count == self.body_count {
            return None;
        }

        self.body_count = count;
        Some(ControlChange::BodyCount(count))
    }

    pub fn set_restitution(&mut self, restitution: f32) -> Option<ControlChange> {
        let restitution = round_to_tenth(restitution.clamp(0.0, 1.0));
        if restitution == self.restitution {
            return None;
        }

        self.restitution = restitution;
        Some(ControlChange::Restitution(restitution))
    }
}

fn round_to_tenth(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controls() -> RuntimeControls {
        RuntimeControls::new(&SimConfig::default())
    }

    #[test]
    fn defaults() {
        let config = SimConfig::default();
        assert_eq!(config.bodies, 50);
        assert_eq!(config.max_bodies, 512);
        assert_eq!(config.restitution, 1.0);
        assert_eq!(config.movement_speed, 0.01);
        assert_eq!(config.mouse_sensitivity, 0.1);
        assert!(config.seed.is_none());
    }

    #[test]
    fn command_line_overrides() {
        let config =
            SimConfig::parse_from(["nbody-sim", "-n", "200", "--restitution", "0.4", "--seed", "3"]);
        assert_eq!(config.bodies, 200);
        assert_eq!(config.restitution, 0.4);
        assert_eq!(config.seed, Some(3));
    }

    #[test]
    fn body_count_steps_by_ten_within_bounds() {
        let mut controls = controls();

        assert_eq!(controls.handle_key(KeyCode::ArrowUp), Some(ControlChange::BodyCount(60)));
        assert_eq!(controls.handle_key(KeyCode::ArrowDown), Some(ControlChange::BodyCount(50)));

        controls.body_count = 5;
        assert_eq!(controls.handle_key(KeyCode::ArrowDown), Some(ControlChange::BodyCount(0)));
        assert_eq!(controls.handle_key(KeyCode::ArrowDown), None);

        controls.body_count = 508;
        assert_eq!(controls.handle_key(KeyCode::ArrowUp), Some(ControlChange::BodyCount(512)));
        assert_eq!(controls.handle_key(KeyCode::ArrowUp), None);
    }

    #[test]
    fn restitution_steps_by_a_tenth_within_bounds() {
        let mut controls = controls();

        assert_eq!(controls.handle_key(KeyCode::ArrowRight), None);
        assert_eq!(controls.handle_key(KeyCode::ArrowLeft), Some(ControlChange::Restitution(0.9)));

        for _ in 0..20 {
            controls.handle_key(KeyCode::ArrowLeft);
        }
        assert_eq!(controls.restitution, 0.0);

        for _ in 0..3 {
            controls.handle_key(KeyCode::ArrowRight);
        }
        assert_eq!(controls.restitution, 0.3);
    }

    #[test]
    fn initial_values_are_clamped() {
        let config = SimConfig::parse_from(["nbody-sim", "-n", "9000", "--restitution", "1.26"]);
        let controls = RuntimeControls::new(&config);

        assert_eq!(controls.body_count, 512);
        assert_eq!(controls.restitution, 1.0);
    }

    #[test]
    fn unrelated_keys_are_ignored() {
        let mut controls = controls();
        assert_eq!(controls.handle_key(KeyCode::KeyW), None);
        assert_eq!(controls, RuntimeControls::new(&SimConfig::default()));
    }
}
