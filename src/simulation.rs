//! Simulation lifecycle and per-tick orchestration.
//!
//! [`NBodySimulation`] ties the body registry, scene pool and physics step to
//! one [`GpuDevice`]. Resources are created exactly once by
//! [`NBodySimulation::initialise`]; ticking before that does nothing.

use crate::bodies::{BodyRegistry, BodyState, PopulationChange, SpawnSettings};
use crate::error::{InitError, InitResult};
use crate::gpu::{GpuDevice, ResourceLayout};
use crate::physics::{PhysicsSettings, PhysicsStep};
use crate::scene::{ScenePool, SubSceneId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    Uninitialized,
    Initializing,
    Ready,
}

pub struct NBodySimulation {
    state: InitState,
    registry: BodyRegistry,
    pool: ScenePool,
    bodies_sub_scene: Option<SubSceneId>,
    physics: PhysicsStep,
    /// Index count of the mesh every body is drawn with.
    body_index_count: u32,
    /// Population requested before the device was ready.
    pending_population: u32,
}

impl NBodySimulation {
    pub fn new(
        settings: SpawnSettings,
        rng: fastrand::Rng,
        initial_population: u32,
        restitution: f32,
        body_index_count: u32,
    ) -> Self {
        Self {
            state: InitState::Uninitialized,
            pool: ScenePool::with_capacities(&[settings.max_bodies]),
            registry: BodyRegistry::new(settings, rng),
            bodies_sub_scene: None,
            physics: PhysicsStep::new(restitution),
            body_index_count,
            pending_population: initial_population,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == InitState::Ready
    }

    /// Buffer sizes the device must provide, derived from `max_bodies`.
    pub fn resource_layout(&self) -> ResourceLayout {
        let first_body_object = self
            .bodies_sub_scene
            .map(|id| self.pool.first_object(id))
            .unwrap_or_default();

        ResourceLayout {
            scene_bytes: self.pool.capacity_bytes(),
            sub_scenes: self.pool.max_sub_scenes(),
            body_state_bytes: self.registry.max_bodies() as u64 * BodyState::BYTE_LENGTH,
            settings_bytes: PhysicsSettings::BYTE_LENGTH,
            first_body_object,
        }
    }

    /// Registers the bodies sub-scene, allocates every device resource and
    /// uploads the initial population.
    ///
    /// Calling this more than once is a no-op.
    pub fn initialise(&mut self, gpu: &mut impl GpuDevice) -> InitResult<()> {
        if self.state != InitState::Uninitialized {
            log::debug!("Simulation already {:?}, skipping initialisation", self.state);
            return Ok(());
        }
        self.state = InitState::Initializing;

        let max_bodies = self.registry.max_bodies();
        let Some(id) = self.pool.register_sub_scene(max_bodies, self.body_index_count) else {
            self.state = InitState::Uninitialized;
            return Err(InitError::SceneLayout(max_bodies));
        };
        self.bodies_sub_scene = Some(id);

        gpu.allocate(&self.resource_layout());

        self.state = InitState::Ready;
        log::info!("Simulation ready, capacity {} bodies", max_bodies);

        let population = self.pending_population;
        self.set_population(population, gpu);

        Ok(())
    }

    /// Advances the physics by `delta_time_ms`. Does nothing until ready.
    pub fn tick(&mut self, delta_time_ms: f32, gpu: &mut impl GpuDevice) {
        if !self.is_ready() {
            return;
        }

        self.physics.run(delta_time_ms, self.registry.len() as u32, gpu);
    }

    pub fn set_population(&mut self, target: u32, gpu: &mut impl GpuDevice) -> PopulationChange {
        let Some(id) = self.bodies_sub_scene.filter(|_| self.is_ready()) else {
            self.pending_population = target;
            return PopulationChange::Unchanged;
        };

        self.registry.set_population(target, &mut self.pool, id, gpu)
    }

    /// Not clamped, callers keep it within `[0, 1]`.
    pub fn set_restitution(&mut self, restitution: f32) {
        self.physics.restitution = restitution;
    }

    pub fn restitution(&self) -> f32 {
        self.physics.restitution
    }

    pub fn body_count(&self) -> usize {
        self.registry.len()
    }

    pub fn pool(&self) -> &ScenePool {
        &self.pool
    }
}
