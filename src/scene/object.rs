use bytemuck::{AnyBitPattern, NoUninit};

use crate::math::{self, Mat4, Vec3};

/// Renderable instance: where an object sits, how big it is, how it looks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Instance {
    pub position: Vec3,
    pub scale: Vec3,
    /// Linear RGB, 0-1.
    pub colour: Vec3,
    /// Layer of the material texture array.
    pub material: u32,
}

impl Default for Instance {
    fn default() -> Self {
        Self {
            position: Vec3::zero(),
            scale: Vec3::one(),
            colour: Vec3::one(),
            material: 0,
        }
    }
}

impl Instance {
    pub fn model_matrix(&self) -> Mat4 {
        math::model_matrix(self.position, self.scale)
    }

    pub fn to_record(&self) -> SceneObject {
        SceneObject {
            model: math::to_columns(&self.model_matrix()),
            colour: [self.colour.x, self.colour.y, self.colour.z],
            material: self.material,
        }
    }
}

/// One object's slot in the shared scene buffer (80 bytes).
///
/// The physics kernel rewrites `model`'s translation column in place every
/// tick, the vertex shader reads the whole record.
#[derive(Clone, Copy, Debug, PartialEq, NoUninit, AnyBitPattern)]
#[repr(C)]
pub struct SceneObject {
    pub model: [[f32; 4]; 4],
    pub colour: [f32; 3],
    pub material: u32,
}

impl SceneObject {
    pub const BYTE_LENGTH: u64 = std::mem::size_of::<Self>() as u64;

    #[cfg(test)]
    pub fn position(&self) -> Vec3 {
        math::translation(&math::from_columns(self.model))
    }
}
