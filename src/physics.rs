//! Per-tick physics: settings upload and compute dispatch.
//!
//! The kernel itself lives in `shaders/physics.wgsl`. The tests carry a CPU
//! transcription of it that pins down the integration and collision rules.

use bytemuck::{AnyBitPattern, NoUninit};

use crate::gpu::{BufferSlot, GpuDevice};

/// Threads per workgroup, must match `@workgroup_size` in the kernel.
pub const WORKGROUP_SIZE: u32 = 64;

#[derive(Clone, Copy, Debug, PartialEq, NoUninit, AnyBitPattern)]
#[repr(C)]
pub struct PhysicsSettings {
    pub body_count: u32,
    pub delta_time_ms: f32,
    pub restitution: f32,
    pub _padding: u32,
}

impl PhysicsSettings {
    pub const BYTE_LENGTH: u64 = std::mem::size_of::<Self>() as u64;
}

/// Constants baked into the physics pipeline at creation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsConstants {
    pub gravitational_constant: f32,
    pub softening: f32,
}

impl Default for PhysicsConstants {
    fn default() -> Self {
        Self {
            gravitational_constant: 1e-4,
            softening: 0.01,
        }
    }
}

pub struct PhysicsStep {
    /// Energy kept by a collision, nominally in `[0, 1]`. Not clamped here.
    pub restitution: f32,
    read_half: usize,
}

impl PhysicsStep {
    pub fn new(restitution: f32) -> Self {
        Self {
            restitution,
            read_half: 0,
        }
    }

    /// Uploads this tick's settings and dispatches one thread per live body.
    ///
    /// With no live bodies nothing is dispatched at all.
    pub fn run(&mut self, delta_time_ms: f32, body_count: u32, gpu: &mut impl GpuDevice) {
        let settings = PhysicsSettings {
            body_count,
            delta_time_ms,
            restitution: self.restitution,
            _padding: 0,
        };
        gpu.write_buffer(BufferSlot::PhysicsSettings, 0, bytemuck::bytes_of(&settings));

        let workgroups = workgroup_count(body_count);
        if workgroups == 0 {
            return;
        }

        gpu.dispatch_physics(self.read_half, workgroups);
        self.read_half ^= 1;
    }
}

pub fn workgroup_count(body_count: u32) -> u32 {
    body_count.div_ceil(WORKGROUP_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::testing::RecordingDevice;
    use crate::wgpu_stuff::shaders;
    use approx::assert_relative_eq;
    use ultraviolet::Vec3;

    /// CPU transcription of `integrate_velocity` and `integrate_position`.
    mod reference {
        use crate::physics::PhysicsConstants;
        use ultraviolet::Vec3;

        /// What the kernel knows about one body during a tick.
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub struct BodySnapshot {
            pub position: Vec3,
            pub velocity: Vec3,
            pub mass: f32,
            pub radius: f32,
        }

        /// Velocity change `a` receives from touching `b`, if any.
        ///
        /// Only pairs strictly closer than the sum of their radii that are still
        /// approaching each other respond.
        pub fn collision_impulse(a: &BodySnapshot, b: &BodySnapshot, restitution: f32) -> Option<Vec3> {
            let offset = b.position - a.position;
            let distance = offset.mag();

            if distance >= a.radius + b.radius || distance <= 1e-6 {
                return None;
            }

            let normal = offset / distance;
            let approach = (a.velocity - b.velocity).dot(normal);
            if approach <= 0.0 {
                return None;
            }

            Some(normal * (-(1.0 + restitution) * b.mass / (a.mass + b.mass) * approach))
        }

        /// One semi-implicit Euler tick over all pairs, as the kernel performs it.
        pub fn reference_step(
            bodies: &mut [BodySnapshot],
            delta_time_ms: f32,
            restitution: f32,
            constants: PhysicsConstants,
        ) {
            let before = bodies.to_vec();

            for (i, body) in bodies.iter_mut().enumerate() {
                let current = before[i];
                let mut acceleration = Vec3::zero();
                let mut impulse = Vec3::zero();

                for (j, other) in before.iter().enumerate() {
                    if i == j {
                        continue;
                    }

                    let offset = other.position - current.position;
                    let distance_sq = offset.mag_sq() + constants.softening;
                    acceleration +=
                        offset * (constants.gravitational_constant * other.mass / (distance_sq * distance_sq.sqrt()));

                    if let Some(delta) = collision_impulse(&current, other, restitution) {
                        impulse += delta;
                    }
                }

                body.velocity = current.velocity + impulse + acceleration * delta_time_ms;
                body.position = current.position + body.velocity * delta_time_ms;
            }
        }
    }

    use reference::*;

    fn body(x: f32, vx: f32, radius: f32) -> BodySnapshot {
        BodySnapshot {
            position: Vec3::new(x, 0.0, 0.0),
            velocity: Vec3::new(vx, 0.0, 0.0),
            mass: 1.0,
            radius,
        }
    }

    #[test]
    fn settings_record_is_one_aligned_block() {
        assert_eq!(PhysicsSettings::BYTE_LENGTH, 16);
    }

    #[test]
    fn no_bodies_means_no_dispatch() {
        let mut step = PhysicsStep::new(1.0);
        let mut gpu = RecordingDevice::default();

        step.run(16.0, 0, &mut gpu);

        assert!(gpu.dispatches.is_empty());
        assert_eq!(step.read_half, 0);
    }

    #[test]
    fn workgroups_round_up() {
        assert_eq!(workgroup_count(0), 0);
        assert_eq!(workgroup_count(1), 1);
        assert_eq!(workgroup_count(64), 1);
        assert_eq!(workgroup_count(65), 2);
        assert_eq!(workgroup_count(500), 8);
    }

    #[test]
    fn dispatch_alternates_state_halves() {
        let mut step = PhysicsStep::new(0.5);
        let mut gpu = RecordingDevice::default();

        step.run(16.0, 100, &mut gpu);
        step.run(16.0, 100, &mut gpu);
        step.run(16.0, 100, &mut gpu);

        assert_eq!(gpu.dispatches, vec![(0, 2), (1, 2), (0, 2)]);
    }

    #[test]
    fn settings_carry_count_time_and_restitution() {
        let mut step = PhysicsStep::new(0.3);
        let mut gpu = RecordingDevice::default();

        step.run(12.5, 7, &mut gpu);

        let write = gpu.last_write_to(BufferSlot::PhysicsSettings).unwrap();
        let settings: PhysicsSettings = bytemuck::pod_read_unaligned(&write.data);
        assert_eq!(settings.body_count, 7);
        assert_eq!(settings.delta_time_ms, 12.5);
        assert_eq!(settings.restitution, 0.3);
    }

    fn kernel_line(needle: &str) -> &'static str {
        let mut lines = shaders::PHYSICS.lines().filter(|line| line.contains(needle));
        let line = lines.next().unwrap_or_else(|| panic!("no kernel line contains {needle:?}"));
        assert!(lines.next().is_none(), "{needle:?} is ambiguous");
        line.trim()
    }

    #[test]
    fn kernel_collides_only_strictly_inside_the_radius_sum() {
        assert_eq!(
            kernel_line("body.radius + other.radius"),
            "if (distance < body.radius + other.radius && distance > 1e-6) {"
        );
        assert_eq!(kernel_line("let approach"), "let approach = dot(body.vel - other.vel, normal);");
        assert_eq!(kernel_line("if (approach"), "if (approach > 0.0) {");
        assert_eq!(
            kernel_line("impulse -="),
            "impulse -= normal * ((1.0 + settings.restitution) * share * approach);"
        );
    }

    #[test]
    fn kernel_workgroup_matches_dispatch_size() {
        let module = shaders::validation::validate(shaders::PHYSICS, wgpu::naga::valid::Capabilities::all()).unwrap();

        for entry in &module.entry_points {
            assert_eq!(entry.workgroup_size, [WORKGROUP_SIZE, 1, 1], "{}", entry.name);
        }
        assert_eq!(module.entry_points.len(), 2);
    }

    #[test]
    fn touching_bodies_do_not_collide() {
        let a = body(0.0, 1.0, 1.0);
        let b = body(2.5, -1.0, 1.5);
        assert_eq!(collision_impulse(&a, &b, 1.0), None);

        let b = body(1.5, -1.0, 1.5);
        assert!(collision_impulse(&a, &b, 1.0).is_some());
    }

    #[test]
    fn separating_bodies_do_not_collide() {
        let a = body(0.0, -1.0, 1.0);
        let b = body(1.0, 1.0, 1.0);
        assert_eq!(collision_impulse(&a, &b, 1.0), None);
    }

    #[test]
    fn elastic_head_on_collision_swaps_velocities() {
        let a = body(0.0, 1.0, 1.0);
        let b = body(1.5, -1.0, 1.0);

        let da = collision_impulse(&a, &b, 1.0).unwrap();
        let db = collision_impulse(&b, &a, 1.0).unwrap();

        assert_relative_eq!(a.velocity.x + da.x, -1.0, epsilon = 1e-6);
        assert_relative_eq!(b.velocity.x + db.x, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn inelastic_collision_conserves_momentum() {
        let mut a = body(0.0, 2.0, 1.0);
        a.mass = 3.0;
        let b = body(1.0, -1.0, 1.0);

        let da = collision_impulse(&a, &b, 0.0).unwrap();
        let db = collision_impulse(&b, &a, 0.0).unwrap();
        let va = a.velocity.x + da.x;
        let vb = b.velocity.x + db.x;

        assert_relative_eq!(a.mass * va + b.mass * vb, 3.0 * 2.0 - 1.0, epsilon = 1e-5);
        assert_relative_eq!(va, vb, epsilon = 1e-5);
    }

    #[test]
    fn gravity_pulls_bodies_together() {
        let mut bodies = [body(-10.0, 0.0, 1.0), body(10.0, 0.0, 1.0)];
        reference_step(&mut bodies, 16.0, 1.0, PhysicsConstants::default());

        assert!(bodies[0].velocity.x > 0.0);
        assert!(bodies[1].velocity.x < 0.0);
        assert_relative_eq!(bodies[0].velocity.x, -bodies[1].velocity.x, epsilon = 1e-9);
        assert!(bodies[0].position.x > -10.0);
    }

    #[test]
    fn position_uses_the_updated_velocity() {
        let mut bodies = [body(0.0, 0.5, 1.0)];
        reference_step(&mut bodies, 10.0, 1.0, PhysicsConstants::default());

        assert_relative_eq!(bodies[0].position.x, 5.0, epsilon = 1e-6);
    }
}
