use bytemuck::{AnyBitPattern, NoUninit};
use ultraviolet::Vec3;

use crate::scene::Instance;

/// Per-body physical state as the physics kernel reads it (32 bytes).
///
/// Position lives in the body's scene record, not here.
#[derive(Clone, Copy, Debug, PartialEq, NoUninit, AnyBitPattern)]
#[repr(C)]
pub struct BodyState {
    pub vel: Vec3,
    pub mass: f32,
    pub radius: f32,
    pub _padding: [f32; 3],
}

impl BodyState {
    pub const BYTE_LENGTH: u64 = std::mem::size_of::<Self>() as u64;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Body {
    pub instance: Instance,
    pub radius: f32,
    pub mass: f32,
    /// Spawn velocity. The GPU owns the live value after upload.
    pub vel: Vec3,
}

impl Body {
    pub fn new(pos: Vec3, vel: Vec3, mass: f32, radius: f32) -> Self {
        debug_assert!(radius > 0.0 && mass > 0.0);

        Self {
            instance: Instance {
                position: pos,
                scale: Vec3::new(radius, radius, radius),
                ..Default::default()
            },
            radius,
            mass,
            vel,
        }
    }

    pub fn with_appearance(mut self, colour: Vec3, material: u32) -> Self {
        self.instance.colour = colour;
        self.instance.material = material;
        self
    }

    pub fn pos(&self) -> Vec3 {
        self.instance.position
    }

    pub fn state(&self) -> BodyState {
        BodyState {
            vel: self.vel,
            mass: self.mass,
            radius: self.radius,
            _padding: [0.0; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_record_is_thirty_two_bytes() {
        assert_eq!(BodyState::BYTE_LENGTH, 32);
    }

    #[test]
    fn state_record_survives_encoding() {
        let body = Body::new(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(-0.0125, 0.003, 1e-7),
            1.337,
            0.6180339,
        );
        let state = body.state();
        let decoded: BodyState = bytemuck::pod_read_unaligned(bytemuck::bytes_of(&state));

        assert_eq!(decoded.vel.x.to_bits(), body.vel.x.to_bits());
        assert_eq!(decoded.vel.y.to_bits(), body.vel.y.to_bits());
        assert_eq!(decoded.vel.z.to_bits(), body.vel.z.to_bits());
        assert_eq!(decoded.mass.to_bits(), body.mass.to_bits());
        assert_eq!(decoded.radius.to_bits(), body.radius.to_bits());
    }

    #[test]
    fn velocity_leads_the_record() {
        let body = Body::new(Vec3::zero(), Vec3::new(5.0, 6.0, 7.0), 2.0, 1.0);
        let state = body.state();
        let bytes = bytemuck::bytes_of(&state);

        assert_eq!(&bytes[0..4], &5.0f32.to_ne_bytes());
        assert_eq!(&bytes[12..16], &2.0f32.to_ne_bytes());
        assert_eq!(&bytes[16..20], &1.0f32.to_ne_bytes());
    }

    #[test]
    fn scale_follows_radius() {
        let body = Body::new(Vec3::zero(), Vec3::zero(), 1.0, 1.5)
            .with_appearance(Vec3::new(1.0, 0.0, 0.0), 2);

        assert_eq!(body.instance.scale, Vec3::new(1.5, 1.5, 1.5));
        assert_eq!(body.instance.material, 2);
    }
}
