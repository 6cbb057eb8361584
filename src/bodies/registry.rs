//! Authoritative list of simulated bodies.
//!
//! The registry owns every [`Body`] and turns population changes into
//! scene-pool and GPU buffer updates. Bodies are only ever removed from the
//! tail, so body `i` always occupies slot `i` of the bodies sub-scene and of
//! both body-state buffers.

use std::ops::Range;

use palette::{FromColor, Hsv, Srgb};
use ultraviolet::Vec3;

use super::body::{Body, BodyState};
use crate::gpu::{BufferSlot, GpuDevice};
use crate::scene::{ScenePool, SubSceneId};

/// Upper bound of the random mass/radius factor.
pub const MAX_SIZE_FACTOR: f32 = 1.75;

/// Placement attempts per body before spawning gives up.
const MAX_PLACEMENT_ATTEMPTS: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnSettings {
    pub max_bodies: u32,
    pub body_radius: f32,
    pub body_mass: f32,
    /// Velocity components are drawn from `±speed * radius`.
    pub speed: f32,
    /// Number of material layers to pick from.
    pub materials: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PopulationChange {
    Unchanged,
    /// Indices of the newly spawned bodies.
    Grew(Range<usize>),
    /// Removed bodies, in their former index order.
    Shrunk(Vec<Body>),
}

pub struct BodyRegistry {
    settings: SpawnSettings,
    bodies: Vec<Body>,
    rng: fastrand::Rng,
}

impl BodyRegistry {
    pub fn new(settings: SpawnSettings, rng: fastrand::Rng) -> Self {
        Self {
            bodies: Vec::with_capacity(settings.max_bodies as usize),
            settings,
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn max_bodies(&self) -> u32 {
        self.settings.max_bodies
    }

    /// Radius of the ball new bodies are placed in for a given population.
    pub fn spawn_radius(&self, population: usize) -> f32 {
        self.settings.body_radius * population.max(2) as f32
    }

    /// Adds up to `count` bodies, bounded by the remaining capacity, and
    /// returns the index range of the ones actually added.
    ///
    /// Positions are rejection sampled: a candidate is redrawn while it sits
    /// closer to any existing body than the sum of both radii.
    pub fn spawn(&mut self, count: usize) -> Range<usize> {
        let start = self.bodies.len();
        let capacity = (self.settings.max_bodies as usize).saturating_sub(start);

        if count > capacity {
            log::warn!(
                "Cannot spawn {} bodies, only {} of {} slots free",
                count,
                capacity,
                self.settings.max_bodies
            );
        }

        let count = count.min(capacity);
        let spawn_radius = self.spawn_radius(start + count);

        for _ in 0..count {
            let size = self.rng.f32() * (MAX_SIZE_FACTOR - 1.0) + 1.0;
            let radius = self.settings.body_radius * size;
            let mass = self.settings.body_mass * size;

            let Some(pos) = self.place(radius, spawn_radius) else {
                log::warn!(
                    "No free position for body {} within radius {:.1}, spawned {} of {}",
                    self.bodies.len(),
                    spawn_radius,
                    self.bodies.len() - start,
                    count
                );
                break;
            };

            let vel = self.random_in_cube() * (self.settings.speed * radius);
            let colour = self.random_colour();
            let material = self.rng.u32(0..self.settings.materials.max(1));

            self.bodies
                .push(Body::new(pos, vel, mass, radius).with_appearance(colour, material));
        }

        start..self.bodies.len()
    }

    /// Grows or shrinks the population to `target` (clamped to
    /// `[0, max_bodies]`) and mirrors the change into the pool and GPU.
    pub fn set_population(
        &mut self,
        target: u32,
        pool: &mut ScenePool,
        sub_scene: SubSceneId,
        gpu: &mut impl GpuDevice,
    ) -> PopulationChange {
        let target = target.min(self.settings.max_bodies) as usize;
        let current = self.bodies.len();

        let change = if target > current {
            let spawned = self.spawn(target - current);
            let appended = pool.try_append(
                sub_scene,
                self.bodies[spawned.clone()].iter().map(|body| body.instance),
            );

            // keep registry and pool slot-for-slot
            let spawned = spawned.start..spawned.start + appended;
            self.bodies.truncate(spawned.end);

            pool.update_transforms(sub_scene, appended, gpu);
            self.upload_states(spawned.clone(), gpu);

            PopulationChange::Grew(spawned)
        } else if target < current {
            let removed = self.bodies.split_off(target);
            pool.remove(sub_scene, current - target);

            PopulationChange::Shrunk(removed)
        } else {
            PopulationChange::Unchanged
        };

        if change != PopulationChange::Unchanged {
            log::debug!("Population {} -> {}", current, self.bodies.len());
        }

        pool.sync_draw_args(sub_scene, gpu);
        change
    }

    /// Writes the state records of `range` into both body-state halves.
    pub fn upload_states(&self, range: Range<usize>, gpu: &mut impl GpuDevice) {
        if range.is_empty() {
            return;
        }

        let states: Vec<BodyState> = self.bodies[range.clone()].iter().map(Body::state).collect();
        let offset = range.start as u64 * BodyState::BYTE_LENGTH;

        for half in 0..2 {
            gpu.write_buffer(
                BufferSlot::BodyStates(half),
                offset,
                bytemuck::cast_slice(&states),
            );
        }
    }

    fn place(&mut self, radius: f32, spawn_radius: f32) -> Option<Vec3> {
        for _ in 0..MAX_PLACEMENT_ATTEMPTS {
            let candidate = self.random_in_ball() * spawn_radius;
            let free = self.bodies.iter().all(|body| {
                let min_distance = body.radius + radius;
                (body.pos() - candidate).mag_sq() >= min_distance * min_distance
            });

            if free {
                return Some(candidate);
            }
        }

        None
    }

    fn random_in_cube(&mut self) -> Vec3 {
        Vec3::new(
            self.rng.f32() * 2.0 - 1.0,
            self.rng.f32() * 2.0 - 1.0,
            self.rng.f32() * 2.0 - 1.0,
        )
    }

    fn random_in_ball(&mut self) -> Vec3 {
        loop {
            let point = self.random_in_cube();
            if point.mag_sq() <= 1.0 {
                return point;
            }
        }
    }

    fn random_colour(&mut self) -> Vec3 {
        let hsv: Hsv = Hsv::new(self.rng.f32() * 360.0, 0.35, 1.0);
        let rgb = Srgb::from_color(hsv).into_linear();
        Vec3::new(rgb.red, rgb.green, rgb.blue)
    }
}
